//! Thread-safe job table
//!
//! One mutex guards every read and write. Jobs are never evicted.

use crate::job::{Job, JobId, JobState};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table stays consistent across a panicking holder: every critical
    /// section is a single insert or lookup.
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, job: Job) {
        self.lock().insert(job.id.clone(), job);
    }

    /// Record the terminal state of `id`.
    ///
    /// Returns `false` if the job is unknown or already terminal.
    pub fn finish(&self, id: &JobId, state: JobState) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(id) {
            Some(job) if matches!(job.state, JobState::Queued) => {
                job.state = state;
                true
            }
            Some(_) => {
                warn!("Job {} already finished, ignoring second result", id);
                false
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{FailureKind, JobFailure, JobStatus};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_insert_get_finish() {
        let store = JobStore::new();
        assert!(store.is_empty());

        let id = JobId::generate();
        store.insert(Job::queued(id.clone(), PathBuf::from("a.mp4"), 5));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id.as_str()).map(|j| j.status()), Some(JobStatus::Queued));

        assert!(store.finish(&id, JobState::Done(Arc::default())));
        assert_eq!(store.get(id.as_str()).map(|j| j.status()), Some(JobStatus::Done));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let store = JobStore::new();
        let id = JobId::generate();
        store.insert(Job::queued(id.clone(), PathBuf::from("a.mp4"), 5));
        store.finish(&id, JobState::Done(Arc::default()));

        let failure = JobFailure {
            error: "late".to_string(),
            kind: FailureKind::Internal,
        };
        assert!(!store.finish(&id, JobState::Error(failure)));
        assert_eq!(store.get(id.as_str()).map(|j| j.status()), Some(JobStatus::Done));
    }

    #[test]
    fn test_unknown_id() {
        let store = JobStore::new();
        assert!(store.get("0123456789abcdef0123456789abcdef").is_none());
        assert!(!store.finish(&JobId::generate(), JobState::Done(Arc::default())));
    }
}
