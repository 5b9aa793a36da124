//! List options for job-post queries: filter tree, sort, pagination.

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

use firelancer_core::{CustomerId, FacetValueId};
use firelancer_job_posts::{JobPost, JobPostState, Visibility};

/// Composable filter. `And([])` matches everything, `Or([])` nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPostFilter {
    CustomerId(CustomerId),
    /// Any of the listed states.
    State(Vec<JobPostState>),
    Visibility(Visibility),
    /// Case-insensitive substring of the title.
    TitleContains(String),
    BudgetBetween { min: Option<i64>, max: Option<i64> },
    FacetValueId(FacetValueId),
    And(Vec<JobPostFilter>),
    Or(Vec<JobPostFilter>),
}

impl JobPostFilter {
    pub fn and(self, other: JobPostFilter) -> JobPostFilter {
        match self {
            JobPostFilter::And(mut all) => {
                all.push(other);
                JobPostFilter::And(all)
            }
            first => JobPostFilter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, post: &JobPost) -> bool {
        match self {
            JobPostFilter::CustomerId(id) => post.customer_id() == *id,
            JobPostFilter::State(states) => states.contains(&post.state()),
            JobPostFilter::Visibility(v) => post.visibility() == *v,
            JobPostFilter::TitleContains(needle) => post
                .title()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            JobPostFilter::BudgetBetween { min, max } => {
                let amount = post.budget().amount;
                min.is_none_or(|m| amount >= m) && max.is_none_or(|m| amount <= m)
            }
            JobPostFilter::FacetValueId(id) => post.facet_value_ids().contains(id),
            JobPostFilter::And(all) => all.iter().all(|f| f.matches(post)),
            JobPostFilter::Or(any) => any.iter().any(|f| f.matches(post)),
        }
    }

    /// Append this filter as a parenthesised SQL predicate over `job_posts`.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            JobPostFilter::CustomerId(id) => {
                qb.push("customer_id = ").push_bind(*id.as_uuid());
            }
            JobPostFilter::State(states) => {
                let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
                qb.push("state = ANY(").push_bind(states).push(")");
            }
            JobPostFilter::Visibility(v) => {
                qb.push("visibility = ").push_bind(visibility_str(*v));
            }
            JobPostFilter::TitleContains(needle) => {
                qb.push("title ILIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)));
            }
            JobPostFilter::BudgetBetween { min, max } => {
                qb.push("(TRUE");
                if let Some(min) = min {
                    qb.push(" AND budget >= ").push_bind(*min);
                }
                if let Some(max) = max {
                    qb.push(" AND budget <= ").push_bind(*max);
                }
                qb.push(")");
            }
            JobPostFilter::FacetValueId(id) => {
                qb.push_bind(*id.as_uuid()).push(" = ANY(facet_value_ids)");
            }
            JobPostFilter::And(all) => push_group(qb, all, " AND ", "TRUE"),
            JobPostFilter::Or(any) => push_group(qb, any, " OR ", "FALSE"),
        }
    }
}

fn push_group(qb: &mut QueryBuilder<'_, Postgres>, filters: &[JobPostFilter], sep: &str, empty: &str) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, f) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(sep);
        }
        f.push_sql(qb);
    }
    qb.push(")");
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) fn visibility_str(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "PUBLIC",
        Visibility::InviteOnly => "INVITE_ONLY",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    PublishedAt,
    Title,
    Budget,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::PublishedAt => "published_at",
            SortField::Title => "title",
            SortField::Budget => "budget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobPostSort {
    pub field: SortField,
    pub order: SortOrder,
}

impl JobPostSort {
    pub fn compare(&self, a: &JobPost, b: &JobPost) -> std::cmp::Ordering {
        let ord = match self.field {
            SortField::CreatedAt => a.created_at().cmp(&b.created_at()),
            SortField::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
            SortField::PublishedAt => a.published_at().cmp(&b.published_at()),
            SortField::Title => a.title().cmp(b.title()),
            SortField::Budget => a.budget().amount.cmp(&b.budget().amount),
        };
        let ord = match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| a.id_typed().0.as_uuid().cmp(b.id_typed().0.as_uuid()))
    }

    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let dir = match self.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(format!(" ORDER BY {} {dir}, id ASC", self.field.column()));
    }
}

/// Pagination, sort and filter for `find_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostListOptions {
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub take: Option<usize>,
    #[serde(default)]
    pub sort: Option<JobPostSort>,
    #[serde(default)]
    pub filter: Option<JobPostFilter>,
}

impl JobPostListOptions {
    /// Maximum page size.
    pub const MAX_TAKE: usize = 1000;

    pub fn take(&self) -> usize {
        self.take.unwrap_or(Self::MAX_TAKE).min(Self::MAX_TAKE)
    }

    /// AND an extra predicate onto whatever the caller asked for.
    pub fn with_filter(mut self, extra: JobPostFilter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(extra),
            None => extra,
        });
        self
    }

    /// Limit results to posts owned by `customer_id`.
    pub fn restricted_to_customer(self, customer_id: CustomerId) -> Self {
        self.with_filter(JobPostFilter::CustomerId(customer_id))
    }
}

/// A page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub total_items: usize,
}

impl<T> PaginatedList<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedList<U> {
        PaginatedList {
            items: self.items.into_iter().map(f).collect(),
            total_items: self.total_items,
        }
    }
}
