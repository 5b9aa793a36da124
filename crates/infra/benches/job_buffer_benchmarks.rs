use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use firelancer_core::{CollectionId, RequestContext, TenantId};
use firelancer_infra::collections::{APPLY_COLLECTION_FILTERS_QUEUE, ApplyCollectionFiltersJobData, CollectionJobBuffer};
use firelancer_infra::job_queue::{
    InMemoryJobBufferStorage, InMemoryJobQueueStrategy, Job, JobBuffer, JobBufferService, PollingConfig,
};

/// `count` filter jobs drawn from a pool of `distinct` collections.
fn filter_jobs(count: usize, distinct: usize) -> Vec<Job> {
    let ctx = RequestContext::system(TenantId::new());
    let pool: Vec<CollectionId> = (0..distinct).map(|_| CollectionId::new()).collect();
    (0..count)
        .map(|i| {
            let data = ApplyCollectionFiltersJobData {
                ctx: ctx.clone(),
                collection_ids: vec![pool[i % distinct], pool[(i * 7 + 3) % distinct]],
            };
            Job::new(APPLY_COLLECTION_FILTERS_QUEUE, serde_json::to_value(data).unwrap())
        })
        .collect()
}

fn bench_collection_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_buffer_reduce");
    let buffer = CollectionJobBuffer::default();

    for count in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("reduce", count), &count, |b, &count| {
            b.iter_batched(
                || filter_jobs(count, 25),
                |jobs| black_box(buffer.reduce(jobs)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_buffer_flush_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_flush_round_trip");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for count in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("add_then_flush", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let strategy = Arc::new(InMemoryJobQueueStrategy::in_memory(PollingConfig::default()));
                    let service = JobBufferService::new(Arc::new(InMemoryJobBufferStorage::new()), strategy);
                    service
                        .add_buffer(Arc::new(CollectionJobBuffer::default()))
                        .unwrap();
                    (service, filter_jobs(count, 25))
                },
                |(service, jobs)| {
                    rt.block_on(async {
                        for job in &jobs {
                            service.add(job).await.unwrap();
                        }
                        black_box(service.flush(&[]).await.unwrap())
                    })
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collection_reduce, bench_buffer_flush_round_trip);
criterion_main!(benches);
