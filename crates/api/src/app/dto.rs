use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use firelancer_core::{CollectionId, FacetValueId};
use firelancer_infra::job_posts::{JobPostFilter, JobPostListOptions, JobPostSort, Relations, SortField, SortOrder};
use firelancer_infra::job_queue::{JobId, JobListOptions, JobState, SubscribableJob};
use firelancer_job_posts::{Collection, JobPostState};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// `?relations=assets,facetValues`; absent loads every relation.
#[derive(Debug, Default, Deserialize)]
pub struct RelationsQuery {
    pub relations: Option<String>,
}

impl RelationsQuery {
    pub fn relations(&self) -> Result<Relations, Response> {
        match &self.relations {
            None => Ok(Relations::ALL),
            Some(csv) => Relations::parse(csv).map_err(errors::domain_error_to_response),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobPostsQuery {
    pub skip: Option<usize>,
    pub take: Option<usize>,
    /// Comma-separated states, e.g. `OPEN,CLOSED`.
    pub state: Option<String>,
    pub title: Option<String>,
    /// `createdAt`, `updatedAt`, `publishedAt`, `title` or `budget`.
    pub sort: Option<String>,
    /// `asc` or `desc` (default).
    pub order: Option<String>,
    pub relations: Option<String>,
}

impl ListJobPostsQuery {
    pub fn relations(&self) -> Result<Relations, Response> {
        RelationsQuery {
            relations: self.relations.clone(),
        }
        .relations()
    }

    pub fn list_options(&self) -> Result<JobPostListOptions, Response> {
        let mut filters = Vec::new();
        if let Some(csv) = &self.state {
            let states = csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<JobPostState>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(errors::domain_error_to_response)?;
            filters.push(JobPostFilter::State(states));
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            filters.push(JobPostFilter::TitleContains(title.trim().to_string()));
        }

        let sort = match &self.sort {
            None => None,
            Some(field) => Some(JobPostSort {
                field: parse_sort_field(field)?,
                order: parse_sort_order(self.order.as_deref())?,
            }),
        };

        Ok(JobPostListOptions {
            skip: self.skip.unwrap_or(0),
            take: self.take,
            sort,
            filter: (!filters.is_empty()).then_some(JobPostFilter::And(filters)),
        })
    }
}

fn parse_sort_field(s: &str) -> Result<SortField, Response> {
    match s {
        "createdAt" | "created_at" => Ok(SortField::CreatedAt),
        "updatedAt" | "updated_at" => Ok(SortField::UpdatedAt),
        "publishedAt" | "published_at" => Ok(SortField::PublishedAt),
        "title" => Ok(SortField::Title),
        "budget" => Ok(SortField::Budget),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_sort",
            "sort must be one of: createdAt, updatedAt, publishedAt, title, budget",
        )),
    }
}

fn parse_sort_order(s: Option<&str>) -> Result<SortOrder, Response> {
    match s.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(SortOrder::default()),
        Some("asc") => Ok(SortOrder::Asc),
        Some("desc") => Ok(SortOrder::Desc),
        Some(_) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_order",
            "order must be asc or desc",
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveCollectionRequest {
    #[serde(default)]
    pub id: Option<CollectionId>,
    pub slug: String,
    pub name: String,
    pub filter_facet_value_ids: Vec<FacetValueId>,
}

impl SaveCollectionRequest {
    pub fn into_collection(self) -> Collection {
        Collection {
            id: self.id.unwrap_or_default(),
            slug: self.slug,
            name: self.name,
            filter_facet_value_ids: self.filter_facet_value_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileIndexRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Empty `buffer_ids` targets every active buffer.
#[derive(Debug, Default, Deserialize)]
pub struct BufferIdsRequest {
    #[serde(default)]
    pub buffer_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Comma-separated queue names.
    pub queue: Option<String>,
    /// Comma-separated states, e.g. `FAILED,RETRYING`.
    pub state: Option<String>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl ListJobsQuery {
    pub fn list_options(&self) -> Result<JobListOptions, Response> {
        let states = split_csv(self.state.as_deref())
            .map(|s| s.parse::<JobState>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(errors::job_queue_error_to_response)?;
        Ok(JobListOptions {
            queue_names: split_csv(self.queue.as_deref()).map(str::to_string).collect(),
            states,
            skip: self.skip.unwrap_or(0),
            take: self.take,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveSettledJobsRequest {
    #[serde(default)]
    pub queue_names: Vec<String>,
    pub older_than: DateTime<Utc>,
}

fn split_csv(csv: Option<&str>) -> impl Iterator<Item = &str> {
    csv.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// -------------------------
// Response DTOs
// -------------------------

/// A submitted job: persisted (with an id) or held in a buffer.
#[derive(Debug, Serialize)]
pub struct ScheduledJobResponse {
    pub job_id: Option<JobId>,
    pub buffered: bool,
}

impl From<&SubscribableJob> for ScheduledJobResponse {
    fn from(job: &SubscribableJob) -> Self {
        Self {
            job_id: job.id(),
            buffered: job.is_buffered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_builds_an_and_filter() {
        let query = ListJobPostsQuery {
            skip: Some(5),
            state: Some("OPEN, closed".into()),
            title: Some(" rust ".into()),
            sort: Some("budget".into()),
            order: Some("DESC".into()),
            ..Default::default()
        };
        let options = query.list_options().unwrap();

        assert_eq!(options.skip, 5);
        assert_eq!(
            options.filter,
            Some(JobPostFilter::And(vec![
                JobPostFilter::State(vec![JobPostState::Open, JobPostState::Closed]),
                JobPostFilter::TitleContains("rust".into()),
            ]))
        );
        assert_eq!(
            options.sort,
            Some(JobPostSort {
                field: SortField::Budget,
                order: SortOrder::Desc
            })
        );
    }

    #[test]
    fn unknown_states_and_sorts_are_rejected() {
        let bad_state = ListJobPostsQuery {
            state: Some("ARCHIVED".into()),
            ..Default::default()
        };
        assert_eq!(bad_state.list_options().unwrap_err().status(), StatusCode::BAD_REQUEST);

        let bad_sort = ListJobPostsQuery {
            sort: Some("popularity".into()),
            ..Default::default()
        };
        assert_eq!(bad_sort.list_options().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn job_list_query_parses_queue_and_state_lists() {
        let query = ListJobsQuery {
            queue: Some("update-search-index,".into()),
            state: Some("FAILED,RETRYING".into()),
            ..Default::default()
        };
        let options = query.list_options().unwrap();
        assert_eq!(options.queue_names, vec!["update-search-index"]);
        assert_eq!(options.states, vec![JobState::Failed, JobState::Retrying]);

        let bad = ListJobsQuery {
            state: Some("DONE".into()),
            ..Default::default()
        };
        assert!(bad.list_options().is_err());
    }
}
