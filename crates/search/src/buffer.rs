use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use firelancer_core::{RequestContext, TenantId};
use firelancer_infra::job_queue::{Job, JobBuffer};
use firelancer_job_posts::JobPostId;

pub const UPDATE_SEARCH_INDEX_QUEUE: &str = "update-search-index";

/// Payload of an `update-search-index` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpdateSearchIndexJobData {
    UpdateJobPost {
        ctx: RequestContext,
        job_post_id: JobPostId,
    },
    DeleteJobPost {
        ctx: RequestContext,
        job_post_id: JobPostId,
    },
    UpdateProfile {
        ctx: RequestContext,
        profile_id: Uuid,
        title: String,
        description: String,
        enabled: bool,
    },
    DeleteProfile {
        ctx: RequestContext,
        profile_id: Uuid,
    },
}

impl UpdateSearchIndexJobData {
    pub fn ctx(&self) -> &RequestContext {
        match self {
            UpdateSearchIndexJobData::UpdateJobPost { ctx, .. }
            | UpdateSearchIndexJobData::DeleteJobPost { ctx, .. }
            | UpdateSearchIndexJobData::UpdateProfile { ctx, .. }
            | UpdateSearchIndexJobData::DeleteProfile { ctx, .. } => ctx,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            UpdateSearchIndexJobData::UpdateJobPost { .. } => "update-job-post",
            UpdateSearchIndexJobData::DeleteJobPost { .. } => "delete-job-post",
            UpdateSearchIndexJobData::UpdateProfile { .. } => "update-profile",
            UpdateSearchIndexJobData::DeleteProfile { .. } => "delete-profile",
        }
    }

    /// Dedup key of the update jobs; deletes are never collapsed.
    fn update_key(&self) -> Option<(&'static str, TenantId, Uuid)> {
        match self {
            UpdateSearchIndexJobData::UpdateJobPost { ctx, job_post_id } => {
                Some((self.type_name(), ctx.tenant_id(), *job_post_id.0.as_uuid()))
            }
            UpdateSearchIndexJobData::UpdateProfile { ctx, profile_id, .. } => {
                Some((self.type_name(), ctx.tenant_id(), *profile_id))
            }
            _ => None,
        }
    }
}

/// Collapses buffered `update-job-post` / `update-profile` jobs to one job
/// per entity. The most recently buffered job for an entity wins and takes
/// the slot of its first occurrence. Anything else passes through.
#[derive(Debug, Clone)]
pub struct SearchIndexJobBuffer {
    queue_name: String,
}

impl SearchIndexJobBuffer {
    pub const ID: &'static str = "search-plugin-update-search-index";

    /// `queue_name` is the full (prefixed) name of the index queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }
}

impl Default for SearchIndexJobBuffer {
    fn default() -> Self {
        Self::new(UPDATE_SEARCH_INDEX_QUEUE)
    }
}

impl JobBuffer for SearchIndexJobBuffer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn collect(&self, job: &Job) -> bool {
        job.queue_name == self.queue_name
            && matches!(
                job.data_as::<UpdateSearchIndexJobData>(),
                Ok(data) if data.update_key().is_some()
            )
    }

    fn reduce(&self, jobs: Vec<Job>) -> Vec<Job> {
        let mut out: Vec<Job> = Vec::with_capacity(jobs.len());
        let mut slots: Vec<((&'static str, TenantId, Uuid), usize)> = Vec::new();

        for job in jobs {
            let key = match job.data_as::<UpdateSearchIndexJobData>() {
                Ok(data) => data.update_key(),
                Err(err) => {
                    warn!(buffer = Self::ID, error = %err, "undecodable search job passed through");
                    None
                }
            };
            match key {
                Some(key) => match slots.iter().find(|(k, _)| *k == key) {
                    Some((_, slot)) => out[*slot] = job,
                    None => {
                        slots.push((key, out.len()));
                        out.push(job);
                    }
                },
                None => out.push(job),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job(data: &UpdateSearchIndexJobData) -> Job {
        Job::new(UPDATE_SEARCH_INDEX_QUEUE, serde_json::to_value(data).unwrap())
    }

    fn update_post(ctx: &RequestContext, id: JobPostId) -> UpdateSearchIndexJobData {
        UpdateSearchIndexJobData::UpdateJobPost {
            ctx: ctx.clone(),
            job_post_id: id,
        }
    }

    fn update_profile(ctx: &RequestContext, id: Uuid, title: &str) -> UpdateSearchIndexJobData {
        UpdateSearchIndexJobData::UpdateProfile {
            ctx: ctx.clone(),
            profile_id: id,
            title: title.into(),
            description: String::new(),
            enabled: true,
        }
    }

    fn decode(job: &Job) -> UpdateSearchIndexJobData {
        job.data_as().unwrap()
    }

    #[test]
    fn payloads_carry_a_kebab_case_type_tag() {
        let ctx = RequestContext::system(TenantId::new());
        let value = serde_json::to_value(update_post(&ctx, JobPostId::generate())).unwrap();
        assert_eq!(value["type"], "update-job-post");
    }

    #[test]
    fn repeated_updates_collapse_to_the_latest() {
        let ctx = RequestContext::system(TenantId::new());
        let id = Uuid::now_v7();
        let jobs = vec![
            job(&update_profile(&ctx, id, "first")),
            job(&update_profile(&ctx, id, "second")),
            job(&update_profile(&ctx, id, "third")),
        ];

        let out = SearchIndexJobBuffer::default().reduce(jobs);

        assert_eq!(out.len(), 1);
        assert_eq!(decode(&out[0]), update_profile(&ctx, id, "third"));
    }

    #[test]
    fn job_post_and_profile_updates_do_not_collide() {
        let ctx = RequestContext::system(TenantId::new());
        let shared = Uuid::now_v7();
        let jobs = vec![
            job(&update_post(&ctx, JobPostId::new(firelancer_core::AggregateId::from_uuid(shared)))),
            job(&update_profile(&ctx, shared, "p")),
        ];

        assert_eq!(SearchIndexJobBuffer::default().reduce(jobs).len(), 2);
    }

    #[test]
    fn deletes_are_neither_collected_nor_collapsed() {
        let ctx = RequestContext::system(TenantId::new());
        let delete = UpdateSearchIndexJobData::DeleteProfile {
            ctx: ctx.clone(),
            profile_id: Uuid::now_v7(),
        };
        let buffer = SearchIndexJobBuffer::default();

        assert!(!buffer.collect(&job(&delete)));
        assert!(buffer.collect(&job(&update_profile(&ctx, Uuid::now_v7(), "x"))));
        assert_eq!(buffer.reduce(vec![job(&delete), job(&delete)]).len(), 2);
    }

    #[test]
    fn other_queues_are_ignored() {
        let ctx = RequestContext::system(TenantId::new());
        let mut other = job(&update_post(&ctx, JobPostId::generate()));
        other.queue_name = "apply-collection-filters".into();

        assert!(!SearchIndexJobBuffer::default().collect(&other));
    }

    proptest! {
        #[test]
        fn at_most_one_job_per_entity(picks in prop::collection::vec((0usize..6, any::<bool>()), 0..40)) {
            let ctx = RequestContext::system(TenantId::new());
            let ids: Vec<Uuid> = (0..6).map(|_| Uuid::now_v7()).collect();
            let jobs: Vec<Job> = picks
                .iter()
                .enumerate()
                .map(|(n, (i, is_post))| {
                    let data = if *is_post {
                        update_post(&ctx, JobPostId::new(firelancer_core::AggregateId::from_uuid(ids[*i])))
                    } else {
                        update_profile(&ctx, ids[*i], &n.to_string())
                    };
                    job(&data)
                })
                .collect();

            let out = SearchIndexJobBuffer::default().reduce(jobs);

            let mut distinct: Vec<(usize, bool)> = picks.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(out.len(), distinct.len());

            // the survivor for each profile is its last buffered job
            for (i, is_post) in &distinct {
                if !*is_post {
                    let last = picks.iter().rposition(|(j, p)| j == i && !p).unwrap();
                    prop_assert!(out.iter().any(|j| decode(j) == update_profile(&ctx, ids[*i], &last.to_string())));
                }
            }
        }
    }
}
