use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::job_queue::error::JobQueueError;
use crate::job_queue::types::Job;

/// Holds buffered jobs until they are flushed.
#[async_trait]
pub trait JobBufferStorageStrategy: Send + Sync {
    async fn add(&self, buffer_id: &str, job: Job) -> Result<(), JobQueueError>;

    /// Counts per requested buffer id. Ids without jobs may be omitted.
    async fn buffer_size(&self, buffer_ids: &[String]) -> Result<HashMap<String, usize>, JobQueueError>;

    /// Remove and return the buffered jobs of each id, in insertion order.
    ///
    /// Removal is atomic per call: two concurrent flushes never both return
    /// the same stored job.
    async fn flush(&self, buffer_ids: &[String]) -> Result<HashMap<String, Vec<Job>>, JobQueueError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobBufferStorage {
    buffers: Mutex<HashMap<String, Vec<Job>>>,
}

impl InMemoryJobBufferStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<Job>>>, JobQueueError> {
        self.buffers
            .lock()
            .map_err(|_| JobQueueError::Storage("buffer storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobBufferStorageStrategy for InMemoryJobBufferStorage {
    async fn add(&self, buffer_id: &str, job: Job) -> Result<(), JobQueueError> {
        self.lock()?.entry(buffer_id.to_string()).or_default().push(job);
        Ok(())
    }

    async fn buffer_size(&self, buffer_ids: &[String]) -> Result<HashMap<String, usize>, JobQueueError> {
        let buffers = self.lock()?;
        Ok(buffer_ids
            .iter()
            .map(|id| (id.clone(), buffers.get(id).map_or(0, Vec::len)))
            .collect())
    }

    async fn flush(&self, buffer_ids: &[String]) -> Result<HashMap<String, Vec<Job>>, JobQueueError> {
        let mut buffers = self.lock()?;
        Ok(buffer_ids
            .iter()
            .filter_map(|id| buffers.remove(id).map(|jobs| (id.clone(), jobs)))
            .collect())
    }
}
