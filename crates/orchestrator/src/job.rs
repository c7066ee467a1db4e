//! Job identifiers, states and status snapshots

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use video_emotion_pipeline::VideoAnalysisResult;

/// Opaque job identifier: a v4 UUID as 32 lowercase hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Observable job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Done,
    Error,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued)
    }
}

/// Why a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The video could not be opened or decoded
    SourceUnavailable,
    /// The analysis itself broke down
    Internal,
}

/// Error payload of a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub error: String,
    pub kind: FailureKind,
}

/// Job state; the result exists exactly when the state is terminal
#[derive(Debug, Clone)]
pub enum JobState {
    Queued,
    Done(Arc<VideoAnalysisResult>),
    Error(JobFailure),
}

/// Snapshot of one job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub video: PathBuf,
    pub interval: u32,
    pub state: JobState,
}

impl Job {
    pub(crate) fn queued(id: JobId, video: PathBuf, interval: u32) -> Self {
        Self {
            id,
            video,
            interval,
            state: JobState::Queued,
        }
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Queued => JobStatus::Queued,
            JobState::Done(_) => JobStatus::Done,
            JobState::Error(_) => JobStatus::Error,
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&VideoAnalysisResult> {
        match &self.state {
            JobState::Done(result) => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

/// `{"job_id": ..., "status": ..., "data": null | [frames] | {"error", "kind"}}`
impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Job", 3)?;
        s.serialize_field("job_id", &self.id)?;
        s.serialize_field("status", &self.status())?;
        match &self.state {
            JobState::Queued => s.serialize_field("data", &Option::<()>::None)?,
            JobState::Done(result) => s.serialize_field("data", result.as_ref())?,
            JobState::Error(failure) => s.serialize_field("data", failure)?,
        }
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use video_emotion_pipeline::FrameResult;

    #[test]
    fn test_job_id_format() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, JobId::generate());
    }

    #[test]
    fn test_queued_snapshot() {
        let job = Job::queued(JobId("abc".to_string()), PathBuf::from("v.mp4"), 10);
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.result().is_none() && job.failure().is_none());
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            json!({"job_id": "abc", "status": "queued", "data": null})
        );
    }

    #[test]
    fn test_done_snapshot() {
        let result: VideoAnalysisResult = vec![FrameResult::no_face(0)].into_iter().collect();
        let job = Job {
            state: JobState::Done(Arc::new(result)),
            ..Job::queued(JobId("abc".to_string()), PathBuf::from("v.mp4"), 10)
        };
        assert!(job.status().is_terminal());
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            json!({
                "job_id": "abc",
                "status": "done",
                "data": [{"frame_index": 0, "emotion": "no_face_detected", "confidence": 0.0}]
            })
        );
    }

    #[test]
    fn test_error_snapshot() {
        let job = Job {
            state: JobState::Error(JobFailure {
                error: "Cannot open video v.mp4: No such video".to_string(),
                kind: FailureKind::SourceUnavailable,
            }),
            ..Job::queued(JobId("abc".to_string()), PathBuf::from("v.mp4"), 10)
        };
        assert_eq!(
            serde_json::to_value(&job).unwrap()["data"],
            json!({"error": "Cannot open video v.mp4: No such video", "kind": "source_unavailable"})
        );
    }
}
