//! Job scheduler
//!
//! One tokio task per scheduled record: sleep until due, wait for a worker
//! permit, run the processor. The handle map keeps a record from being
//! scheduled twice and lets cancellation drop jobs that have not started.

use crate::job_processor::JobProcessor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

struct ScheduledJob {
    handle: JoinHandle<()>,
    /// Set once the job holds a permit and is about to process
    started: bool,
}

type JobMap = Arc<Mutex<HashMap<Uuid, ScheduledJob>>>;

/// Bounded, deferred execution of call jobs
pub struct JobScheduler {
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
    jobs: JobMap,
}

impl JobScheduler {
    pub fn new(processor: Arc<JobProcessor>, worker_concurrency: usize) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(worker_concurrency.max(1))),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule processing of `call_id` after `delay`
    ///
    /// Returns `false` when the record already has a live job.
    pub fn schedule(&self, call_id: Uuid, delay: Duration) -> bool {
        // Held across spawn so the job cannot deregister before it is registered
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&call_id) {
            debug!("Call {} already scheduled", call_id);
            return false;
        }

        let processor = self.processor.clone();
        let permits = self.permits.clone();
        let registry = self.jobs.clone();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    registry.lock().remove(&call_id);
                    return;
                }
            };

            {
                let mut jobs = registry.lock();
                match jobs.get_mut(&call_id) {
                    Some(job) => job.started = true,
                    // Aborted while waiting for the permit
                    None => return,
                }
            }

            if let Err(e) = processor.process(call_id).await {
                error!("Job for call {} failed: {}", call_id, e);
            }

            registry.lock().remove(&call_id);
        });

        jobs.insert(
            call_id,
            ScheduledJob {
                handle,
                started: false,
            },
        );
        debug!("Scheduled call {} in {:?}", call_id, delay);
        true
    }

    /// Drop a job that has not started processing
    ///
    /// A job already running is left alone; it will see the record's new
    /// status on its next reload.
    pub fn abort(&self, call_id: Uuid) -> bool {
        let mut jobs = self.jobs.lock();
        let not_started = matches!(jobs.get(&call_id), Some(job) if !job.started);
        if !not_started {
            return false;
        }

        if let Some(job) = jobs.remove(&call_id) {
            job.handle.abort();
        }
        info!("Aborted scheduled job for call {}", call_id);
        true
    }

    pub fn is_scheduled(&self, call_id: Uuid) -> bool {
        self.jobs.lock().contains_key(&call_id)
    }

    /// Jobs waiting or running
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Stop accepting permits and abort every job that has not started
    pub fn shutdown(&self) {
        self.permits.close();
        let mut jobs = self.jobs.lock();
        let waiting: Vec<Uuid> = jobs
            .iter()
            .filter(|(_, job)| !job.started)
            .map(|(id, _)| *id)
            .collect();

        for id in &waiting {
            if let Some(job) = jobs.remove(id) {
                job.handle.abort();
            }
        }
        info!("Scheduler shut down, {} waiting jobs dropped", waiting.len());
    }
}
