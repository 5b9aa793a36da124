//! Job buffers: intercept jobs before they reach a queue and collapse them
//! into fewer jobs on flush.

pub mod postgres;
pub mod storage;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, warn};

use super::error::JobQueueError;
use super::strategy::JobQueueStrategy;
use super::types::Job;

pub use postgres::PostgresJobBufferStorage;
pub use storage::{InMemoryJobBufferStorage, JobBufferStorageStrategy};

/// A named interception rule.
pub trait JobBuffer: Send + Sync {
    /// Stable id; buffered jobs are stored under it.
    fn id(&self) -> &str;

    /// Whether `job` should be held by this buffer.
    fn collect(&self, job: &Job) -> bool;

    /// Collapse buffered jobs into the jobs to actually submit.
    fn reduce(&self, jobs: Vec<Job>) -> Vec<Job>;
}

/// Tracks active buffers and moves jobs between them and the queue strategy.
pub struct JobBufferService {
    storage: Arc<dyn JobBufferStorageStrategy>,
    strategy: Arc<dyn JobQueueStrategy>,
    buffers: RwLock<Vec<Arc<dyn JobBuffer>>>,
}

impl JobBufferService {
    pub fn new(storage: Arc<dyn JobBufferStorageStrategy>, strategy: Arc<dyn JobQueueStrategy>) -> Self {
        Self {
            storage,
            strategy,
            buffers: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Arc<dyn JobBuffer>>>, JobQueueError> {
        self.buffers
            .read()
            .map_err(|_| JobQueueError::Storage("buffer registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn JobBuffer>>>, JobQueueError> {
        self.buffers
            .write()
            .map_err(|_| JobQueueError::Storage("buffer registry lock poisoned".to_string()))
    }

    /// Start intercepting jobs with `buffer`.
    pub fn add_buffer(&self, buffer: Arc<dyn JobBuffer>) -> Result<(), JobQueueError> {
        let mut buffers = self.write()?;
        if buffers.iter().any(|b| b.id() == buffer.id()) {
            return Err(JobQueueError::BufferAlreadyRegistered(buffer.id().to_string()));
        }
        info!(buffer = buffer.id(), "job buffer activated");
        buffers.push(buffer);
        Ok(())
    }

    /// Stop intercepting. Already-buffered jobs stay stored until flushed.
    pub fn remove_buffer(&self, buffer_id: &str) -> Result<bool, JobQueueError> {
        let mut buffers = self.write()?;
        let before = buffers.len();
        buffers.retain(|b| b.id() != buffer_id);
        let removed = buffers.len() != before;
        if removed {
            info!(buffer = buffer_id, "job buffer deactivated");
        }
        Ok(removed)
    }

    pub fn active_buffer_ids(&self) -> Result<Vec<String>, JobQueueError> {
        Ok(self.read()?.iter().map(|b| b.id().to_string()).collect())
    }

    /// Store `job` in every active buffer that collects it.
    ///
    /// Returns `false` if no buffer took it (the caller submits it normally).
    pub async fn add(&self, job: &Job) -> Result<bool, JobQueueError> {
        let matching: Vec<Arc<dyn JobBuffer>> = self
            .read()?
            .iter()
            .filter(|b| b.collect(job))
            .cloned()
            .collect();

        for buffer in &matching {
            self.storage.add(buffer.id(), job.clone()).await?;
            debug!(buffer = buffer.id(), queue = %job.queue_name, "job buffered");
        }
        Ok(!matching.is_empty())
    }

    /// Buffered job counts. Empty `buffer_ids` means every active buffer.
    pub async fn buffer_size(&self, buffer_ids: &[String]) -> Result<HashMap<String, usize>, JobQueueError> {
        let ids = self.resolve_ids(buffer_ids)?;
        let mut sizes = self.storage.buffer_size(&ids).await?;
        for id in ids {
            sizes.entry(id).or_insert(0);
        }
        Ok(sizes)
    }

    /// Drain, reduce, and submit. Empty `buffer_ids` means every active buffer.
    ///
    /// Returns the jobs submitted to the queue strategy. Jobs stored under a
    /// buffer that is no longer active are submitted as they are. If a
    /// submission fails, the reduced jobs not yet submitted are stored back
    /// under their buffer before the error is returned.
    pub async fn flush(&self, buffer_ids: &[String]) -> Result<Vec<Job>, JobQueueError> {
        let ids = self.resolve_ids(buffer_ids)?;
        let active: Vec<Arc<dyn JobBuffer>> = self.read()?.iter().cloned().collect();
        let mut drained = self.storage.flush(&ids).await?;

        let mut to_submit: Vec<(String, Job)> = Vec::new();
        for id in &ids {
            let Some(jobs) = drained.remove(id) else {
                continue;
            };
            let buffered = jobs.len();
            let reduced = match active.iter().find(|b| b.id() == id) {
                Some(buffer) => buffer.reduce(jobs),
                None => {
                    warn!(buffer = %id, jobs = buffered, "flushing inactive buffer without reduction");
                    jobs
                }
            };
            info!(buffer = %id, buffered, submitted = reduced.len(), "job buffer flushed");
            to_submit.extend(reduced.into_iter().map(|job| (id.clone(), job)));
        }

        let mut submitted = Vec::with_capacity(to_submit.len());
        let mut pending = to_submit.into_iter();
        while let Some((id, job)) = pending.next() {
            match self.strategy.add(job.clone()).await {
                Ok(job) => submitted.push(job),
                Err(err) => {
                    self.restore(std::iter::once((id, job)).chain(pending)).await;
                    return Err(err);
                }
            }
        }
        Ok(submitted)
    }

    /// Put unsubmitted jobs back into storage after a failed flush.
    async fn restore(&self, jobs: impl Iterator<Item = (String, Job)>) {
        for (id, job) in jobs {
            if let Err(err) = self.storage.add(&id, job).await {
                error!(buffer = %id, error = %err, "buffered job lost after failed flush");
            }
        }
    }

    fn resolve_ids(&self, buffer_ids: &[String]) -> Result<Vec<String>, JobQueueError> {
        if buffer_ids.is_empty() {
            self.active_buffer_ids()
        } else {
            Ok(buffer_ids.to_vec())
        }
    }
}
