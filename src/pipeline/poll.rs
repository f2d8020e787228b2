//! Poll loop: drive a submitted job to a terminal status.
//!
//! The wait between queries starts at the policy's initial interval and
//! grows by its backoff factor up to `max_interval`. With `max_wait` set the
//! loop gives up once that much time has passed; without it the loop only
//! ends when the service reports `done` or `failed`.

use crate::client::DocumentService;
use crate::config::PollPolicy;
use crate::error::FileError;
use crate::output::{JobHandle, JobResult, JobStatus};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Why the poll loop stopped without a terminal status.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("job still running after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Service(#[from] FileError),
}

/// Query `job` until it is `done` or `failed`.
///
/// A `failed` job is returned as [`JobResult::Failed`], not as an error:
/// the caller decides what a failed step means for its file.
pub async fn await_completion(
    service: &dyn DocumentService,
    job: &JobHandle,
    policy: &PollPolicy,
) -> Result<JobResult, PollError> {
    let start = Instant::now();
    let mut delay = policy.initial_interval;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match service.job_status(job).await? {
            JobStatus::Done(payload) => {
                debug!("Job {} done after {} queries", job, attempt);
                return Ok(JobResult::Done(payload));
            }
            JobStatus::Failed(error) => {
                warn!("Job {} failed: {}", job, error);
                return Ok(JobResult::Failed(error));
            }
            JobStatus::InProgress => {}
        }

        let mut wait = delay;
        if let Some(max_wait) = policy.max_wait {
            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Err(PollError::TimedOut(elapsed));
            }
            wait = wait.min(max_wait - elapsed);
        }

        sleep(wait).await;
        delay = policy.next_interval(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::UploadTarget;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::path::Path;
    use std::sync::Mutex;

    /// Answers status queries from a script, repeating the last entry.
    struct ScriptedStatus {
        script: Mutex<Vec<JobStatus>>,
        queries: Mutex<u32>,
    }

    impl ScriptedStatus {
        fn new(mut script: Vec<JobStatus>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                queries: Mutex::new(0),
            }
        }

        fn queries(&self) -> u32 {
            *self.queries.lock().unwrap()
        }
    }

    #[async_trait]
    impl DocumentService for ScriptedStatus {
        async fn submit_job(
            &self,
            _operation: &str,
            _body: &Value,
        ) -> Result<JobHandle, crate::error::SequencerError> {
            unreachable!()
        }

        async fn job_status(&self, _job: &JobHandle) -> Result<JobStatus, FileError> {
            *self.queries.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.pop().unwrap())
            } else {
                Ok(script[0].clone())
            }
        }

        async fn request_upload_target(&self, _m: &str) -> Result<UploadTarget, FileError> {
            unreachable!()
        }

        async fn upload_file(&self, _t: &UploadTarget, _p: &Path, _m: &str) -> Result<(), FileError> {
            unreachable!()
        }

        async fn download_to(&self, _u: &str, _d: &Path) -> Result<u64, FileError> {
            unreachable!()
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy::fixed(Duration::from_millis(1))
    }

    fn job() -> JobHandle {
        JobHandle("https://jobs/1".into())
    }

    #[tokio::test]
    async fn loops_until_done() {
        let service = ScriptedStatus::new(vec![
            JobStatus::InProgress,
            JobStatus::InProgress,
            JobStatus::Done(Map::new()),
        ]);
        let result = await_completion(&service, &job(), &fast()).await.unwrap();
        assert_eq!(result, JobResult::Done(Map::new()));
        assert_eq!(service.queries(), 3);
    }

    #[tokio::test]
    async fn failed_is_a_result_not_an_error() {
        let service = ScriptedStatus::new(vec![
            JobStatus::InProgress,
            JobStatus::Failed(json!({"code": "ERROR", "message": "bad"})),
        ]);
        let result = await_completion(&service, &job(), &fast()).await.unwrap();
        assert_eq!(result, JobResult::Failed(json!({"code": "ERROR", "message": "bad"})));
    }

    #[tokio::test]
    async fn gives_up_after_max_wait() {
        let service = ScriptedStatus::new(vec![JobStatus::InProgress]);
        let policy = fast().with_max_wait(Some(Duration::from_millis(20)));
        let err = await_completion(&service, &job(), &policy).await.unwrap_err();
        assert!(matches!(err, PollError::TimedOut(d) if d >= Duration::from_millis(20)));
        assert!(service.queries() >= 2);
    }
}
