//! In-memory job queue.

use super::job::{Job, JobRequest, JobState};
use super::JobScheduler;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

/// Job queue kept in memory.
///
/// Jobs are picked by priority, then earliest start, then scheduling
/// order.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    inner: Mutex<Vec<Job>>,
}

impl InMemoryJobQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next job due at `now` and marks it started.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<Job> {
        let mut jobs = self.inner.lock();
        let index = jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.state == JobState::Pending && job.eta <= now)
            .min_by_key(|(index, job)| (job.priority, job.eta, *index))
            .map(|(index, _)| index)?;
        let job = &mut jobs[index];
        job.state = JobState::Started;
        job.attempts += 1;
        Some(job.clone())
    }

    /// Marks a job done.
    pub fn complete(&self, id: Uuid, message: Option<String>) {
        self.update(id, |job| job.state = JobState::Done(message));
    }

    /// Puts a started job back, to run again at `eta`.
    pub fn postpone(&self, id: Uuid, eta: DateTime<Utc>, error: String) {
        self.update(id, |job| {
            job.state = JobState::Pending;
            job.eta = eta;
            job.last_error = Some(error);
        });
    }

    /// Marks a job failed.
    pub fn fail(&self, id: Uuid, error: String) {
        self.update(id, |job| {
            job.last_error = Some(error.clone());
            job.state = JobState::Failed(error);
        });
    }

    /// Returns a job.
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().iter().find(|job| job.id == id).cloned()
    }

    /// Returns every job in scheduling order.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().clone()
    }

    /// Returns the jobs of one function in scheduling order.
    pub fn jobs_for(&self, function: &str) -> Vec<Job> {
        self.inner
            .lock()
            .iter()
            .filter(|job| job.function == function)
            .cloned()
            .collect()
    }

    /// Returns the number of pending jobs, due or not.
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .filter(|job| job.state == JobState::Pending)
            .count()
    }

    /// Returns the earliest start among pending jobs.
    pub fn next_eta(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .iter()
            .filter(|job| job.state == JobState::Pending)
            .map(|job| job.eta)
            .min()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.inner.lock().iter_mut().find(|job| job.id == id) {
            f(job);
        }
    }
}

impl JobScheduler for InMemoryJobQueue {
    fn schedule(&self, request: JobRequest) -> Uuid {
        let job = Job::from_request(request, Utc::now());
        let id = job.id;
        tracing::debug!(%id, function = %job.function, priority = job.priority, "job scheduled");
        self.inner.lock().push(job);
        id
    }
}
