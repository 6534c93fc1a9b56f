//! Core types for uid-bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use utoipa::ToSchema;

/// Unique identifier for a dispatch job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address-binding action (`<login>` / `<logout>`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BindAction {
    /// Bind the principal to the address
    #[default]
    Login,
    /// Remove the binding
    Logout,
}

impl BindAction {
    /// Payload element name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            BindAction::Login => "login",
            BindAction::Logout => "logout",
        }
    }

    /// Parse a payload element name
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "login" => Some(BindAction::Login),
            "logout" => Some(BindAction::Logout),
            _ => None,
        }
    }
}

impl std::fmt::Display for BindAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag action, covering both user tags and address tags
///
/// `RegisterUser`/`UnregisterUser` tag principals (`user=` attribute);
/// `Register`/`Unregister` tag addresses (`ip=` attribute).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TagAction {
    /// Attach a tag to a user
    RegisterUser,
    /// Detach a tag from a user
    UnregisterUser,
    /// Attach a tag to an address
    Register,
    /// Detach a tag from an address
    Unregister,
}

impl TagAction {
    /// Payload element name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TagAction::RegisterUser => "register-user",
            TagAction::UnregisterUser => "unregister-user",
            TagAction::Register => "register",
            TagAction::Unregister => "unregister",
        }
    }

    /// Parse a payload element name
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "register-user" => Some(TagAction::RegisterUser),
            "unregister-user" => Some(TagAction::UnregisterUser),
            "register" => Some(TagAction::Register),
            "unregister" => Some(TagAction::Unregister),
            _ => None,
        }
    }

    /// Whether the subject of this action is a user (as opposed to an address)
    pub fn targets_users(&self) -> bool {
        matches!(self, TagAction::RegisterUser | TagAction::UnregisterUser)
    }

    /// Entry attribute carrying the subject (`user` or `ip`)
    pub fn subject_attribute(&self) -> &'static str {
        if self.targets_users() { "user" } else { "ip" }
    }
}

impl std::fmt::Display for TagAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One principal/address binding to transmit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Entry {
    /// Principal name (e.g. `domain\user1`)
    pub name: String,
    /// Bound address
    #[schema(value_type = String)]
    pub ip: IpAddr,
    /// Binding lifetime in seconds
    pub timeout: u64,
}

impl Entry {
    /// Create a new entry
    pub fn new(name: impl Into<String>, ip: IpAddr, timeout: u64) -> Self {
        Self {
            name: name.into(),
            ip,
            timeout,
        }
    }
}

/// One tag assignment: a subject (user name or address) and a tag label
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagEntry {
    /// User name or address, depending on the [`TagAction`]
    pub subject: String,
    /// Tag label
    pub tag: String,
}

impl TagEntry {
    /// Create a new tag entry
    pub fn new(subject: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            tag: tag.into(),
        }
    }
}

/// A complete protocol message: one operation kind plus its ordered entries
///
/// A `Bindings` or `Tags` message is the atomic unit of transmission (a batch):
/// it is encoded into exactly one document and sent in exactly one transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UidMessage {
    /// Address-binding update
    Bindings {
        /// login or logout
        action: BindAction,
        /// Ordered entries
        entries: Vec<Entry>,
    },
    /// User-tag or address-tag update
    Tags {
        /// Tag action
        action: TagAction,
        /// Ordered entries
        entries: Vec<TagEntry>,
    },
    /// Fixed liveness probe (`<show><version/></show>`)
    VersionProbe,
}

impl UidMessage {
    /// Number of entries carried
    pub fn len(&self) -> usize {
        match self {
            UidMessage::Bindings { entries, .. } => entries.len(),
            UidMessage::Tags { entries, .. } => entries.len(),
            UidMessage::VersionProbe => 0,
        }
    }

    /// True when the message carries no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload element name (`login`, `register-user`, `show`, ...)
    pub fn action_name(&self) -> &'static str {
        match self {
            UidMessage::Bindings { action, .. } => action.as_str(),
            UidMessage::Tags { action, .. } => action.as_str(),
            UidMessage::VersionProbe => "show",
        }
    }
}

/// Raw successful response from the Agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentResponse {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Response body
    pub body: String,
}

/// Shape of a job's entry source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobShape {
    /// Every usable host of a network range
    Range,
    /// An explicit count of consecutive addresses
    Count,
}

/// Dispatch engine state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EngineState {
    /// No job
    Idle = 0,
    /// A job worker is running
    Running = 1,
    /// Stop requested, worker not yet unwound
    Stopping = 2,
}

impl EngineState {
    /// Convert from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Running,
            2 => EngineState::Stopping,
            _ => EngineState::Idle,
        }
    }
}

/// Terminal outcome of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    /// Source exhausted, every batch attempted
    Completed,
    /// Stopped by request
    Cancelled,
    /// Aborted by a fault outside the per-batch policy
    Failed,
}

/// Progress snapshot of the current job
///
/// Read without locking; `sent` may be momentarily stale but is never torn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Current job, if any
    pub job_id: Option<JobId>,
    /// Entries in batches whose transport call has returned
    pub sent: u64,
    /// Total entries for count-driven jobs; 0 (unknown) for range-driven jobs
    pub total: u64,
    /// Whether a job is running
    pub running: bool,
    /// Engine state
    pub state: EngineState,
}

/// One batch whose delivery failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchFailure {
    /// Zero-based batch index within the job
    pub batch_index: u64,
    /// Entries in the batch
    pub size: usize,
    /// Transport error text
    pub error: String,
}

/// Per-job delivery report
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobReport {
    /// Job identifier
    pub job_id: JobId,
    /// Source shape
    pub shape: JobShape,
    /// Binding action applied to every entry
    pub action: BindAction,
    /// Target endpoint
    pub endpoint: String,
    /// Terminal outcome
    pub outcome: JobOutcome,
    /// Entries whose batch transport call returned (success or failure)
    pub sent: u64,
    /// Known total (0 for range jobs)
    pub total: u64,
    /// Batches delivered successfully
    pub batches_sent: u64,
    /// Batches whose delivery failed
    pub batches_failed: u64,
    /// First recorded failures (bounded)
    pub failures: Vec<BatchFailure>,
    /// When the worker started
    pub started_at: DateTime<Utc>,
    /// When the worker finished
    pub finished_at: DateTime<Utc>,
}

/// Request to start a range-driven job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RangeJobSpec {
    /// Network in CIDR notation (e.g. `10.0.0.0/16`)
    pub subnet: String,
    /// Name prefix; entry names are `prefix + n` (1-based)
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    /// Binding lifetime in seconds (default: 3600)
    #[serde(default = "default_entry_timeout")]
    pub timeout: u64,
    /// Entries per batch (default: configured default batch size)
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Agent endpoint (default: the stored endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Certificate bundle name (default: configured bundle)
    #[serde(default)]
    pub cert_bundle: Option<String>,
    /// login or logout (default: login)
    #[serde(default)]
    pub operation: BindAction,
}

/// Request to start a count-driven job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CountJobSpec {
    /// Number of entries
    pub count: u64,
    /// Name prefix; entry names are `prefix + n` (1-based)
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    /// First address (default: 10.0.0.1)
    #[serde(default = "default_base_ip")]
    pub base_ip: String,
    /// Binding lifetime in seconds (default: 3600)
    #[serde(default = "default_entry_timeout")]
    pub timeout: u64,
    /// Agent endpoint (default: the stored endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Certificate bundle name (default: configured bundle)
    #[serde(default)]
    pub cert_bundle: Option<String>,
    /// login or logout (default: login)
    #[serde(default)]
    pub operation: BindAction,
}

/// Request to send one binding immediately
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SingleMappingRequest {
    /// Address to bind
    pub ip: String,
    /// Principal name
    pub username: String,
    /// Binding lifetime in seconds (default: 3600)
    #[serde(default = "default_entry_timeout")]
    pub timeout: u64,
    /// login or logout (default: login)
    #[serde(default)]
    pub operation: BindAction,
    /// Agent endpoint (default: the stored endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Certificate bundle name (default: configured bundle)
    #[serde(default)]
    pub cert_bundle: Option<String>,
}

/// Request to send a list of tag assignments in one document
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TagRequest {
    /// Tag action; also decides whether subjects are users or addresses
    pub action: TagAction,
    /// Assignments, sent in order
    pub items: Vec<TagEntry>,
    /// Agent endpoint (default: the stored endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Certificate bundle name (default: configured bundle)
    #[serde(default)]
    pub cert_bundle: Option<String>,
}

/// Request to verify (or force-accept) an Agent endpoint
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Endpoint as `host:port`
    pub endpoint: String,
    /// Certificate bundle used for the protocol stage (default: configured bundle)
    #[serde(default)]
    pub cert_bundle: Option<String>,
    /// Store the endpoint as verified without probing it
    #[serde(default)]
    pub force: bool,
}

pub(crate) fn default_user_prefix() -> String {
    "domain\\user".to_string()
}

pub(crate) fn default_entry_timeout() -> u64 {
    3600
}

fn default_base_ip() -> String {
    "10.0.0.1".to_string()
}

/// Connectivity probe stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ProbeStage {
    /// Endpoint string could not be parsed
    #[serde(rename = "Format")]
    Format,
    /// Raw TCP connect failed
    #[serde(rename = "TCP")]
    Tcp,
    /// TLS handshake or protocol round-trip failed
    #[serde(rename = "mTLS/API")]
    MtlsApi,
}

impl std::fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProbeStage::Format => "Format",
            ProbeStage::Tcp => "TCP",
            ProbeStage::MtlsApi => "mTLS/API",
        })
    }
}

/// Service status as seen by the control surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentStatus {
    /// Always "online" while the service answers
    pub status: String,
    /// Whether a job is running
    pub job_active: bool,
    /// Whether the stored endpoint has been verified (or force-accepted)
    pub config_verified: bool,
    /// Stored Agent endpoint
    pub agent_endpoint: String,
}

/// Events emitted by the dispatcher
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job worker started
    JobStarted {
        /// Job identifier
        job_id: JobId,
        /// Source shape
        shape: JobShape,
        /// Binding action
        action: BindAction,
        /// Known total (0 for range jobs)
        total: u64,
    },
    /// A batch was delivered
    BatchSent {
        /// Job identifier
        job_id: JobId,
        /// Zero-based batch index
        batch_index: u64,
        /// Entries in the batch
        size: usize,
        /// Cumulative `sent` after this batch
        sent: u64,
    },
    /// A batch delivery failed; the job continues
    BatchFailed {
        /// Job identifier
        job_id: JobId,
        /// Zero-based batch index
        batch_index: u64,
        /// Entries in the batch
        size: usize,
        /// Transport error text
        error: String,
    },
    /// A job reached a terminal state
    JobFinished {
        /// Job identifier
        job_id: JobId,
        /// Terminal outcome
        outcome: JobOutcome,
        /// Final `sent`
        sent: u64,
    },
    /// Engine state was forcibly reset
    EmergencyStop {
        /// Job that was active, if any
        job_id: Option<JobId>,
    },
    /// An endpoint was accepted as the Agent endpoint
    EndpointVerified {
        /// The endpoint
        endpoint: String,
        /// True when verification was bypassed
        forced: bool,
    },
    /// Endpoint verification failed
    VerificationFailed {
        /// The endpoint
        endpoint: String,
        /// Failing stage
        stage: ProbeStage,
        /// Failure message
        error: String,
    },
}

impl Event {
    /// Event name used for SSE framing
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobStarted { .. } => "job_started",
            Event::BatchSent { .. } => "batch_sent",
            Event::BatchFailed { .. } => "batch_failed",
            Event::JobFinished { .. } => "job_finished",
            Event::EmergencyStop { .. } => "emergency_stop",
            Event::EndpointVerified { .. } => "endpoint_verified",
            Event::VerificationFailed { .. } => "verification_failed",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_action_subject_attribute_follows_target() {
        assert_eq!(TagAction::RegisterUser.subject_attribute(), "user");
        assert_eq!(TagAction::UnregisterUser.subject_attribute(), "user");
        assert_eq!(TagAction::Register.subject_attribute(), "ip");
        assert_eq!(TagAction::Unregister.subject_attribute(), "ip");
    }

    #[test]
    fn tag_action_serde_uses_wire_names() {
        let json = serde_json::to_string(&TagAction::UnregisterUser).expect("serialize");
        assert_eq!(json, "\"unregister-user\"");
        let parsed: TagAction = serde_json::from_str("\"register\"").expect("deserialize");
        assert_eq!(parsed, TagAction::Register);
    }

    #[test]
    fn probe_stage_display_matches_serde_name() {
        for stage in [ProbeStage::Format, ProbeStage::Tcp, ProbeStage::MtlsApi] {
            let json = serde_json::to_string(&stage).expect("serialize");
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn engine_state_round_trips_through_u8() {
        for state in [EngineState::Idle, EngineState::Running, EngineState::Stopping] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
        assert_eq!(EngineState::from_u8(99), EngineState::Idle);
    }

    #[test]
    fn range_spec_defaults_apply() {
        let spec: RangeJobSpec =
            serde_json::from_str(r#"{"subnet":"10.0.0.0/30"}"#).expect("deserialize");
        assert_eq!(spec.user_prefix, "domain\\user");
        assert_eq!(spec.timeout, 3600);
        assert_eq!(spec.batch_size, None);
        assert_eq!(spec.operation, BindAction::Login);
    }

    #[test]
    fn count_spec_defaults_apply() {
        let spec: CountJobSpec = serde_json::from_str(r#"{"count":3}"#).expect("deserialize");
        assert_eq!(spec.base_ip, "10.0.0.1");
        assert_eq!(spec.operation, BindAction::Login);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::JobFinished {
            job_id: JobId(2),
            outcome: JobOutcome::Cancelled,
            sent: 4,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "job_finished");
        assert_eq!(value["outcome"], "cancelled");
        assert_eq!(event.name(), "job_finished");
    }
}
