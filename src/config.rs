//! Configuration types for uid-bridge

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Environment variable overriding [`CertConfig::cert_dir`]
pub const CERT_DIR_ENV: &str = "CERT_DIR";

/// Main configuration for the bridge
///
/// Fields are organized into logical sub-configs:
/// - [`agent`](AgentConfig) — where and how to reach the Agent
/// - [`dispatch`](DispatchConfig) — batching and pacing of jobs
/// - [`certs`](CertConfig) — where client credentials live
/// - [`logging`](LogConfig) — tracing filter and in-memory log buffer
/// - [`server`](ServerIntegrationConfig) — the HTTP control surface
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Agent connection settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Batch dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Certificate locations
    #[serde(default)]
    pub certs: CertConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(config)
    }

    /// Apply environment overrides (currently `CERT_DIR`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(CERT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.certs.cert_dir = PathBuf::from(dir);
        }
        self
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.default_batch_size == 0 {
            return Err(invalid("dispatch.default_batch_size", "must be at least 1"));
        }
        if self.dispatch.count_batch_size == 0 {
            return Err(invalid("dispatch.count_batch_size", "must be at least 1"));
        }
        if self.dispatch.rate_limit_every == 0 {
            return Err(invalid("dispatch.rate_limit_every", "must be at least 1"));
        }
        if self.logging.buffer_capacity == 0 {
            return Err(invalid("logging.buffer_capacity", "must be at least 1"));
        }
        if let Err(e) = crate::transport::Endpoint::parse(&self.agent.endpoint) {
            return Err(invalid("agent.endpoint", &e.to_string()));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

/// Agent connection settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AgentConfig {
    /// Initial Agent endpoint as `host:port` (default: "127.0.0.1:5006")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Whole-exchange timeout for one delivery (default: 10 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,

    /// Raw connect timeout used by the probe's reachability stage (default: 4 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub connect_timeout: Duration,

    /// Certificate bundle used when a request names none (default: "default")
    #[serde(default = "default_cert_bundle")]
    pub cert_bundle: String,

    /// TLS negotiation policy
    #[serde(default)]
    pub tls: TlsPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            cert_bundle: default_cert_bundle(),
            tls: TlsPolicy::default(),
        }
    }
}

/// Lowest TLS protocol version offered to the Agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MinTlsVersion {
    /// TLS 1.0
    #[default]
    #[serde(rename = "tls1.0")]
    Tls10,
    /// TLS 1.1
    #[serde(rename = "tls1.1")]
    Tls11,
    /// TLS 1.2
    #[serde(rename = "tls1.2")]
    Tls12,
}

/// TLS policy for the Agent connection
///
/// INTENTIONALLY WEAKENED by default for legacy Agents: protocol versions down
/// to TLS 1.0 are offered and the Agent's certificate is not matched against
/// the endpoint host name. The certificate chain is still required and is
/// validated against the configured trust anchor only (public roots are never
/// trusted). Set `verify_hostname = true` and `min_version = "tls1.2"` for
/// Agents with proper certificates.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TlsPolicy {
    /// Oldest protocol version offered (default: tls1.0)
    #[serde(default)]
    pub min_version: MinTlsVersion,

    /// Check the certificate's names against the endpoint host (default: false)
    #[serde(default)]
    pub verify_hostname: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::legacy()
    }
}

impl TlsPolicy {
    /// Relaxed policy for legacy Agents: TLS 1.0+, no hostname check
    pub fn legacy() -> Self {
        Self {
            min_version: MinTlsVersion::Tls10,
            verify_hostname: false,
        }
    }
}

/// Batch dispatch settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DispatchConfig {
    /// Batch size for range jobs that do not specify one (default: 500)
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Fixed batch size for count jobs (default: 500)
    #[serde(default = "default_batch_size")]
    pub count_batch_size: usize,

    /// Pause after every batch (default: 10 ms)
    #[serde(default = "default_batch_pause", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub batch_pause: Duration,

    /// Count jobs take the long pause whenever `sent` reaches a multiple of this (default: 1000)
    #[serde(default = "default_rate_limit_every")]
    pub rate_limit_every: u64,

    /// Long pause for the count-job rate-limit tier (default: 2000 ms)
    #[serde(default = "default_rate_limit_pause", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub rate_limit_pause: Duration,

    /// How long emergency stop waits for the worker before forcing a reset (default: 2000 ms)
    #[serde(default = "default_emergency_grace", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub emergency_grace: Duration,

    /// Log a progress line every N batches of a range job (default: 10)
    #[serde(default = "default_progress_log_every")]
    pub progress_log_every: u64,

    /// Failures kept in a job report (default: 100)
    #[serde(default = "default_max_recorded_failures")]
    pub max_recorded_failures: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            count_batch_size: default_batch_size(),
            batch_pause: default_batch_pause(),
            rate_limit_every: default_rate_limit_every(),
            rate_limit_pause: default_rate_limit_pause(),
            emergency_grace: default_emergency_grace(),
            progress_log_every: default_progress_log_every(),
            max_recorded_failures: default_max_recorded_failures(),
        }
    }
}

/// Certificate locations
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CertConfig {
    /// Directory holding the default bundle; named bundles live in subdirectories (default: "certs")
    #[serde(default = "default_cert_dir")]
    #[schema(value_type = String)]
    pub cert_dir: PathBuf,

    /// Client certificate file name (default: "uia-client.crt")
    #[serde(default = "default_client_cert")]
    pub client_cert: String,

    /// Client private key file name (default: "uia-client.key")
    #[serde(default = "default_client_key")]
    pub client_key: String,

    /// Trust anchor file name (default: "rootCA.crt")
    #[serde(default = "default_trust_anchor")]
    pub trust_anchor: String,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            client_cert: default_client_cert(),
            client_key: default_client_key(),
            trust_anchor: default_trust_anchor(),
        }
    }
}

/// Logging settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence (default: "info")
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Lines kept in the in-memory log buffer (default: 50)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_endpoint() -> String {
    "127.0.0.1:5006".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(4)
}

fn default_cert_bundle() -> String {
    "default".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_pause() -> Duration {
    Duration::from_millis(10)
}

fn default_rate_limit_every() -> u64 {
    1000
}

fn default_rate_limit_pause() -> Duration {
    Duration::from_secs(2)
}

fn default_emergency_grace() -> Duration {
    Duration::from_secs(2)
}

fn default_progress_log_every() -> u64 {
    10
}

fn default_max_recorded_failures() -> usize {
    100
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_client_cert() -> String {
    "uia-client.crt".to_string()
}

fn default_client_key() -> String {
    "uia-client.key".to_string()
}

fn default_trust_anchor() -> String {
    "rootCA.crt".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_buffer_capacity() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
