//! Configuration types for a sequencing run.
//!
//! Everything the executor and the output stage consult is passed in
//! explicitly: [`RunConfig`] (service endpoints, polling, admission rules)
//! and [`RunOptions`] (the trailing `key=value` arguments). Both are read
//! once at startup and never mutated afterwards.

use crate::error::SequencerError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://pdf-services-ue1.adobe.io/";
pub const DEFAULT_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v2";
pub const DEFAULT_SCOPE: &str = "openid,AdobeID,read_organizations";

/// Configuration for a sequencing run.
///
/// Built via [`RunConfig::builder()`] or using [`RunConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_sequencer::{PollPolicy, RunConfig};
/// use std::time::Duration;
///
/// let config = RunConfig::builder()
///     .api_url("https://pdf-services-ew1.adobe.io/")
///     .poll_policy(PollPolicy::fixed(Duration::from_millis(500)))
///     .prevent_font_substitution(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Base URL of the document service. Always ends with `/`.
    pub api_url: String,

    /// OAuth2 token endpoint for the client-credentials grant.
    pub token_url: String,

    /// Scope requested with the access token.
    pub scope: String,

    /// HTTP timeout in seconds. Default: 120.
    ///
    /// Bounds token, provisioning, submission and status calls end to end.
    /// For streamed uploads and downloads it is the connect and idle-read
    /// limit only, so a slow transfer that keeps moving is never cut off.
    pub request_timeout_secs: u64,

    /// How job status is re-queried until it turns terminal.
    pub poll: PollPolicy,

    /// Skip `createpdf` inputs whose fonts would be substituted. Default: false.
    pub prevent_font_substitution: bool,

    /// Optional observer for batch, file and step events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            request_timeout_secs: 120,
            poll: PollPolicy::default(),
            prevent_font_substitution: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll", &self.poll)
            .field("prevent_font_substitution", &self.prevent_font_substitution)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.config.api_url = url;
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.token_url = url.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn prevent_font_substitution(mut self, v: bool) -> Self {
        self.config.prevent_font_substitution = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, SequencerError> {
        let c = &self.config;
        if !(c.api_url.starts_with("http://") || c.api_url.starts_with("https://")) {
            return Err(SequencerError::InvalidConfig(format!(
                "API URL must be http(s), got '{}'",
                c.api_url
            )));
        }
        if c.poll.initial_interval.is_zero() {
            return Err(SequencerError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if c.poll.backoff_factor.is_nan() || c.poll.backoff_factor < 1.0 {
            return Err(SequencerError::InvalidConfig(format!(
                "Poll backoff factor must be ≥ 1.0, got {}",
                c.poll.backoff_factor
            )));
        }
        Ok(self.config)
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// How the poll loop spaces out status queries.
///
/// The wait starts at `initial_interval`, grows by `backoff_factor` after every
/// non-terminal answer and never exceeds `max_interval`. Once `max_wait` has
/// elapsed the job is abandoned for that file; `None` waits forever.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(1000),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(16),
            max_wait: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PollPolicy {
    /// A constant interval with no overall limit.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            backoff_factor: 1.0,
            max_interval: interval,
            max_wait: None,
        }
    }

    /// Policy for a user-chosen first interval. With an overall limit the
    /// default backoff applies (the cap never drops below `initial_interval`);
    /// without one the interval stays fixed.
    pub fn starting_at(initial_interval: Duration, max_wait: Option<Duration>) -> Self {
        match max_wait {
            None => Self::fixed(initial_interval),
            Some(limit) => {
                let defaults = Self::default();
                Self {
                    initial_interval,
                    max_interval: defaults.max_interval.max(initial_interval),
                    ..defaults
                }
                .with_max_wait(Some(limit))
            }
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Delay to use after `current`, clamped to `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_factor) as u64;
        Duration::from_millis(next_ms).min(self.max_interval)
    }
}

// ── Run options ──────────────────────────────────────────────────────────

/// Run-level `key=value` parameters supplied after the positional arguments.
///
/// Consulted by `protectpdf` (`ownerPassword`, `userPassword`, `permissions`)
/// and by the output stage (`moveProcessed`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions(BTreeMap<String, String>);

impl RunOptions {
    pub const OWNER_PASSWORD: &'static str = "ownerPassword";
    pub const USER_PASSWORD: &'static str = "userPassword";
    pub const PERMISSIONS: &'static str = "permissions";
    pub const MOVE_PROCESSED: &'static str = "moveProcessed";

    /// Parse trailing arguments. Each is split on its first `=`; an argument
    /// without `=` becomes a key with an empty value. Later keys overwrite.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let map = args
            .into_iter()
            .filter_map(|arg| {
                let arg = arg.as_ref();
                let (key, value) = arg.split_once('=').unwrap_or((arg, ""));
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect();
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn owner_password(&self) -> Option<&str> {
        self.get(Self::OWNER_PASSWORD)
    }

    pub fn user_password(&self) -> Option<&str> {
        self.get(Self::USER_PASSWORD)
    }

    /// The comma-separated permission list, split as given.
    pub fn permissions(&self) -> Option<Vec<String>> {
        self.get(Self::PERMISSIONS)
            .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
    }

    pub fn move_processed(&self) -> bool {
        matches!(
            self.get(Self::MOVE_PROCESSED).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes")
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Client identifier and secret for the client-credentials grant.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub const CLIENT_ID_VAR: &'static str = "CLIENT_ID";
    pub const CLIENT_SECRET_VAR: &'static str = "CLIENT_SECRET";

    /// Read `CLIENT_ID` and `CLIENT_SECRET` from the process environment.
    pub fn from_env() -> Result<Self, SequencerError> {
        let read = |var: &'static str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(SequencerError::MissingCredentials { var })
        };
        Ok(Self {
            client_id: read(Self::CLIENT_ID_VAR)?,
            client_secret: read(Self::CLIENT_SECRET_VAR)?,
        })
    }
}

// ── Settings file ────────────────────────────────────────────────────────

/// Contents of the JSON run-configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSettings {
    pub prevent_font_substitution: bool,
}

impl RunSettings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SequencerError> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| SequencerError::ConfigLoad {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SequencerError::ConfigLoad {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }
}
