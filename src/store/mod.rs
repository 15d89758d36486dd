//! In-memory job store.
//!
//! Jobs live for the lifetime of the process only. A single mutex guards the
//! records together with an ordered index keyed by `(Reverse(priority), id)`,
//! so iteration yields the highest priority first and, within a priority,
//! the earliest inserted job first.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::models::job::{Job, JobId, JobStatus, NewJob};

type OrderKey = (Reverse<i64>, JobId);

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, Job>,
    order: BTreeSet<OrderKey>,
}

impl StoreInner {
    fn ordered(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().filter_map(|(_, id)| self.jobs.get(id))
    }
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Owned job storage with a strictly increasing id generator.
pub struct JobStore {
    next_id: AtomicU64,
    inner: Mutex<StoreInner>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Insert a new pending job and return its record.
    pub async fn create(&self, new_job: NewJob) -> Job {
        let mut inner = self.inner.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let job = Job {
            id,
            job_type: new_job.job_type,
            payload: new_job.payload,
            priority: new_job.priority,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
        };

        inner.order.insert((Reverse(job.priority), id));
        inner.jobs.insert(id, job.clone());
        job
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().await.jobs.get(&id).cloned()
    }

    /// First job in priority order matching `predicate`.
    pub async fn find_first<P>(&self, predicate: P) -> Option<Job>
    where
        P: Fn(&Job) -> bool,
    {
        let inner = self.inner.lock().await;
        let found = inner.ordered().find(|job| predicate(job)).cloned();
        found
    }

    /// Apply `f` to the job with `id`. Returns `None` if no such job exists.
    pub async fn mutate<F, R>(&self, id: JobId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut inner = self.inner.lock().await;
        inner.jobs.get_mut(&id).map(f)
    }

    /// Select the first job matching `predicate` and mutate it while holding
    /// the lock, so no other caller can select the same job in between.
    pub async fn claim_first<P, F>(&self, predicate: P, f: F) -> Option<Job>
    where
        P: Fn(&Job) -> bool,
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.lock().await;
        let id = inner.ordered().find(|job| predicate(job)).map(|job| job.id)?;
        let job = inner.jobs.get_mut(&id)?;
        f(job);
        Some(job.clone())
    }

    pub async fn count_by_status(&self) -> StatusCounts {
        let inner = self.inner.lock().await;
        let mut counts = StatusCounts::default();
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
