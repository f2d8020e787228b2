//! Remote job client: token acquisition, job submission, status queries,
//! asset upload and download.
//!
//! The executor only sees the [`DocumentService`] trait, so tests can drive
//! whole pipelines against an in-memory fake. [`ServiceClient`] is the
//! reqwest-backed implementation used by the binary.
//!
//! ## Protocol
//!
//! ```text
//! POST {token_url}?client_id=…            form: client_secret, grant_type, scope
//! POST {api}/assets                        {"mediaType": …}  → assetID, uploadUri
//! PUT  uploadUri                           raw bytes          → 200
//! POST {api}/operation/{name}              {"assetID": …, …}  → 201 + location
//! GET  location                            → {"status": "in progress" | "done" | "failed", …}
//! GET  downloadUri                         raw bytes (pre-signed, no auth headers)
//! ```
//!
//! Every call to the service itself carries `X-API-Key` and a bearer token.
//! The token is acquired once per run and never refreshed.
//!
//! ## Timeouts
//!
//! The JSON calls (token, `/assets`, submission, status) are bounded end to
//! end by `request_timeout_secs`. The streamed upload and download have no
//! overall limit: they only fail when connecting takes too long or when the
//! connection sits idle for longer than that same number of seconds.

use crate::config::{Credentials, RunConfig};
use crate::error::{FileError, SequencerError};
use crate::output::{JobHandle, JobStatus, UploadTarget};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// The operations the pipeline needs from the remote service.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Submit a job. Anything but an accepted submission with a location is
    /// fatal for the whole run.
    async fn submit_job(&self, operation: &str, body: &Value) -> Result<JobHandle, SequencerError>;

    /// Query a job's current status once.
    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, FileError>;

    /// Ask where to place bytes of the given media type.
    async fn request_upload_target(&self, media_type: &str) -> Result<UploadTarget, FileError>;

    /// Stream a local file to an upload target.
    async fn upload_file(
        &self,
        target: &UploadTarget,
        path: &Path,
        media_type: &str,
    ) -> Result<(), FileError>;

    /// Fetch a finished artifact into `dest`, returning the bytes written.
    /// The parent directory must already exist.
    async fn download_to(&self, download_uri: &str, dest: &Path) -> Result<u64, FileError>;
}

/// A bearer token for the service.
#[derive(Clone, PartialEq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Build the shared HTTP client: bounded connect and idle read, no
/// whole-request limit.
pub fn http_client(config: &RunConfig) -> Result<reqwest::Client, SequencerError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| SequencerError::Internal(format!("HTTP client: {e}")))
}

/// Acquire a client-credentials token.
pub async fn acquire_token(
    http: &reqwest::Client,
    config: &RunConfig,
    credentials: &Credentials,
) -> Result<AccessToken, SequencerError> {
    debug!("Requesting access token from {}", config.token_url);
    let response = http
        .post(&config.token_url)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .query(&[("client_id", credentials.client_id.as_str())])
        .form(&[
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", config.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| SequencerError::TokenRequestFailed {
            reason: e.to_string(),
        })?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| SequencerError::TokenRequestFailed {
            reason: format!("unreadable token response: {e}"),
        })?;

    parse_token_response(&body)
}

/// Extract `access_token`, or turn `error`/`error_description` into a fatal error.
pub fn parse_token_response(body: &Value) -> Result<AccessToken, SequencerError> {
    if let Some(token) = body.get("access_token").and_then(Value::as_str) {
        return Ok(AccessToken::new(token));
    }
    let code = body.get("error").map(value_text).unwrap_or_default();
    let description = body
        .get("error_description")
        .map(value_text)
        .unwrap_or_default();
    let reason = match (code.is_empty(), description.is_empty()) {
        (true, true) => "response carried no access_token".to_string(),
        (false, true) => code,
        (true, false) => description,
        (false, false) => format!("{code} - {description}"),
    };
    Err(SequencerError::TokenRequestFailed { reason })
}

/// Human-readable reason from an upload failure body (`message`, `reason`).
pub fn refusal_reason(status: StatusCode, body: &Value) -> String {
    let message = body.get("message").map(value_text);
    let reason = body.get("reason").map(value_text);
    match (message, reason) {
        (Some(m), Some(r)) => format!("{m} - {r}"),
        (Some(m), None) => m,
        (None, Some(r)) => r,
        (None, None) => format!("HTTP {status}"),
    }
}

/// Transfer error text that says so when the connection went idle.
fn transfer_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("transfer stalled (idle read timeout): {e}")
    } else {
        e.to_string()
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// HTTP client for the document service.
pub struct ServiceClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    token: AccessToken,
    request_timeout: Duration,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl ServiceClient {
    /// Build an HTTP client, acquire a token and return a ready client.
    pub async fn connect(
        config: &RunConfig,
        credentials: &Credentials,
    ) -> Result<Self, SequencerError> {
        let http = http_client(config)?;
        let token = acquire_token(&http, config, credentials).await?;
        info!("Access token acquired for client {}", credentials.client_id);
        Ok(Self::with_token(
            http,
            config.api_url.clone(),
            credentials.client_id.clone(),
            token,
        )
        .request_timeout(Duration::from_secs(config.request_timeout_secs)))
    }

    /// Create a client from an existing token (reusing a [`reqwest::Client`]).
    pub fn with_token(
        http: reqwest::Client,
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        token: AccessToken,
    ) -> Self {
        let mut api_url = api_url.into();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        Self {
            http,
            api_url,
            client_id: client_id.into(),
            token,
            request_timeout: Duration::from_secs(RunConfig::default().request_timeout_secs),
        }
    }

    /// End-to-end limit for each JSON call. Transfers are not affected.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn operation_url(&self, operation: &str) -> String {
        format!("{}operation/{}", self.api_url, operation)
    }

    pub fn assets_url(&self) -> String {
        format!("{}assets", self.api_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-API-Key", &self.client_id)
            .bearer_auth(self.token.as_str())
            .timeout(self.request_timeout)
    }
}

#[async_trait]
impl DocumentService for ServiceClient {
    async fn submit_job(&self, operation: &str, body: &Value) -> Result<JobHandle, SequencerError> {
        let url = self.operation_url(operation);
        debug!("POST {}", url);
        let response = self
            .authorized(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| SequencerError::JobSubmissionFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SequencerError::JobRejected {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| JobHandle(loc.to_string()))
            .ok_or_else(|| SequencerError::JobSubmissionFailed {
                operation: operation.to_string(),
                reason: "accepted without a location header".to_string(),
            })
    }

    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, FileError> {
        let response = self
            .authorized(self.http.get(&job.0))
            .send()
            .await
            .map_err(|e| FileError::Transport {
                detail: format!("status query {job}: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FileError::Transport {
                detail: format!("status query {job}: HTTP {status}: {body}"),
            });
        }

        let body: Value = response.json().await.map_err(|e| FileError::Transport {
            detail: format!("status query {job}: {e}"),
        })?;
        Ok(JobStatus::from_value(body))
    }

    async fn request_upload_target(&self, media_type: &str) -> Result<UploadTarget, FileError> {
        let response = self
            .authorized(self.http.post(self.assets_url()))
            .json(&json!({ "mediaType": media_type }))
            .send()
            .await
            .map_err(|e| FileError::Transport {
                detail: format!("asset provisioning: {e}"),
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        serde_json::from_value::<UploadTarget>(body.clone()).map_err(|_| {
            FileError::UploadRefused {
                reason: format!(
                    "no upload target provisioned for {media_type} ({})",
                    refusal_reason(status, &body)
                ),
            }
        })
    }

    async fn upload_file(
        &self,
        target: &UploadTarget,
        path: &Path,
        media_type: &str,
    ) -> Result<(), FileError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FileError::UploadRefused {
                reason: format!("cannot open {}: {e}", path.display()),
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| FileError::UploadRefused {
                reason: format!("cannot stat {}: {e}", path.display()),
            })?
            .len();

        debug!("PUT {} ({} bytes, {})", path.display(), size, media_type);
        let response = self
            .http
            .put(&target.upload_uri)
            .header(header::CONTENT_TYPE, media_type)
            .header(header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| FileError::Transport {
                detail: format!("upload {}: {}", path.display(), transfer_error(&e)),
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(FileError::UploadRefused {
            reason: refusal_reason(status, &body),
        })
    }

    async fn download_to(&self, download_uri: &str, dest: &Path) -> Result<u64, FileError> {
        let save_failed = |detail: String| FileError::SaveFailed {
            path: dest.to_path_buf(),
            detail,
        };

        let response = self
            .http
            .get(download_uri)
            .send()
            .await
            .map_err(|e| save_failed(transfer_error(&e)))?;
        if !response.status().is_success() {
            return Err(save_failed(format!("HTTP {}", response.status())));
        }

        // Write next to the destination, then rename, so a broken stream
        // never leaves a truncated file behind.
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| save_failed(e.to_string()))?;
        let std_file = tmp.reopen().map_err(|e| save_failed(e.to_string()))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| save_failed(transfer_error(&e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| save_failed(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| save_failed(e.to_string()))?;
        drop(file);

        tmp.persist(dest).map_err(|e| save_failed(e.error.to_string()))?;
        Ok(written)
    }
}
