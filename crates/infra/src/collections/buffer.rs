use serde::{Deserialize, Serialize};
use tracing::warn;

use firelancer_core::{CollectionId, RequestContext, TenantId};

use crate::job_queue::{Job, JobBuffer};

pub const APPLY_COLLECTION_FILTERS_QUEUE: &str = "apply-collection-filters";

/// Payload of an `apply-collection-filters` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCollectionFiltersJobData {
    pub ctx: RequestContext,
    pub collection_ids: Vec<CollectionId>,
}

/// Merges buffered filter jobs into one job per tenant whose
/// `collection_ids` is the de-duplicated union, in first-seen order.
#[derive(Debug, Clone)]
pub struct CollectionJobBuffer {
    queue_name: String,
}

impl CollectionJobBuffer {
    pub const ID: &'static str = "collection-filters";

    /// `queue_name` is the full (prefixed) name of the filter queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }
}

impl Default for CollectionJobBuffer {
    fn default() -> Self {
        Self::new(APPLY_COLLECTION_FILTERS_QUEUE)
    }
}

impl JobBuffer for CollectionJobBuffer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn collect(&self, job: &Job) -> bool {
        job.queue_name == self.queue_name
    }

    fn reduce(&self, jobs: Vec<Job>) -> Vec<Job> {
        // (tenant, template job, merged payload)
        let mut merged: Vec<(TenantId, Job, ApplyCollectionFiltersJobData)> = Vec::new();
        let mut passthrough = Vec::new();

        for job in jobs {
            let data: ApplyCollectionFiltersJobData = match job.data_as() {
                Ok(data) => data,
                Err(err) => {
                    warn!(buffer = Self::ID, error = %err, "undecodable collection job passed through");
                    passthrough.push(job);
                    continue;
                }
            };

            let tenant = data.ctx.tenant_id();
            match merged.iter_mut().find(|(t, _, _)| *t == tenant) {
                Some((_, _, acc)) => {
                    for id in data.collection_ids {
                        if !acc.collection_ids.contains(&id) {
                            acc.collection_ids.push(id);
                        }
                    }
                }
                None => {
                    let mut data = data;
                    let mut unique = Vec::with_capacity(data.collection_ids.len());
                    for id in data.collection_ids {
                        if !unique.contains(&id) {
                            unique.push(id);
                        }
                    }
                    data.collection_ids = unique;
                    merged.push((tenant, job, data));
                }
            }
        }

        let mut out: Vec<Job> = Vec::with_capacity(merged.len() + passthrough.len());
        for (_, template, data) in merged {
            let mut job = template;
            match serde_json::to_value(&data) {
                Ok(value) => job.data = value,
                Err(err) => warn!(buffer = Self::ID, error = %err, "failed to encode merged collection job"),
            }
            out.push(job);
        }
        out.extend(passthrough);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filter_job(ctx: &RequestContext, ids: &[CollectionId]) -> Job {
        let data = ApplyCollectionFiltersJobData {
            ctx: ctx.clone(),
            collection_ids: ids.to_vec(),
        };
        Job::new(APPLY_COLLECTION_FILTERS_QUEUE, serde_json::to_value(data).unwrap())
    }

    fn ids_of(job: &Job) -> Vec<CollectionId> {
        job.data_as::<ApplyCollectionFiltersJobData>().unwrap().collection_ids
    }

    #[test]
    fn overlapping_jobs_merge_into_one_union() {
        let ctx = RequestContext::system(TenantId::new());
        let [c1, c2, c3] = [CollectionId::new(), CollectionId::new(), CollectionId::new()];

        let out = CollectionJobBuffer::default().reduce(vec![filter_job(&ctx, &[c1, c2]), filter_job(&ctx, &[c2, c3])]);

        assert_eq!(out.len(), 1);
        assert_eq!(ids_of(&out[0]), vec![c1, c2, c3]);
    }

    #[test]
    fn nothing_buffered_reduces_to_nothing() {
        assert!(CollectionJobBuffer::default().reduce(Vec::new()).is_empty());
    }

    #[test]
    fn tenants_are_not_merged_together() {
        let a = RequestContext::system(TenantId::new());
        let b = RequestContext::system(TenantId::new());
        let c = CollectionId::new();

        let out = CollectionJobBuffer::default().reduce(vec![filter_job(&a, &[c]), filter_job(&b, &[c]), filter_job(&a, &[c])]);

        assert_eq!(out.len(), 2);
    }

    #[test]
    fn collects_only_its_own_queue() {
        let buffer = CollectionJobBuffer::new("staging-apply-collection-filters");
        let ctx = RequestContext::system(TenantId::new());

        assert!(!buffer.collect(&filter_job(&ctx, &[])));
        let mut job = filter_job(&ctx, &[]);
        job.queue_name = "staging-apply-collection-filters".into();
        assert!(buffer.collect(&job));
    }

    proptest! {
        #[test]
        fn reduced_ids_are_the_unique_union(batches in prop::collection::vec(prop::collection::vec(0usize..8, 0..5), 1..10)) {
            let pool: Vec<CollectionId> = (0..8).map(|_| CollectionId::new()).collect();
            let ctx = RequestContext::system(TenantId::new());
            let jobs: Vec<Job> = batches
                .iter()
                .map(|batch| filter_job(&ctx, &batch.iter().map(|i| pool[*i]).collect::<Vec<_>>()))
                .collect();

            let out = CollectionJobBuffer::default().reduce(jobs);
            prop_assert_eq!(out.len(), 1);

            let mut expected: Vec<CollectionId> = Vec::new();
            for i in batches.iter().flatten() {
                if !expected.contains(&pool[*i]) {
                    expected.push(pool[*i]);
                }
            }
            prop_assert_eq!(ids_of(&out[0]), expected);
        }
    }
}
