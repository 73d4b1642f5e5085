use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Accounts and sessions
// ---------------------------------------------------------------------------

/// A sportsbook account a session can be opened for. Credentials stay with
/// the human doing the manual login; only identity and the login URL live
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub sportsbook: String,
    pub login_url: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initiated,
    WaitingLogin,
    Authenticated,
    Capturing,
    Ready,
    Incomplete,
    Error,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Initiated => "INITIATED",
            SessionState::WaitingLogin => "WAITING_LOGIN",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Capturing => "CAPTURING",
            SessionState::Ready => "READY",
            SessionState::Incomplete => "INCOMPLETE",
            SessionState::Error => "ERROR",
            SessionState::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// Operational view of one registered session, cheap to list.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub account_id: i64,
    pub sportsbook: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

/// Returned by `check_status`: terminal state plus capture counts. Counts
/// only — the full record never travels over the polling interface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub account_id: i64,
    pub state: SessionState,
    pub capture: Option<CaptureSummary>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CaptureSummary {
    pub rest_endpoints: usize,
    pub has_websocket: bool,
    pub headers_captured: usize,
}

// ---------------------------------------------------------------------------
// Capture record
// ---------------------------------------------------------------------------

/// Everything observed during one capture window. Built incrementally while
/// the window is open, immutable once it closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub rest_api: RestCapture,
    pub web_socket: WsCapture,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestCapture {
    /// scheme://host of the first relevant request.
    pub base_url: Option<String>,
    /// Allow-listed headers, first-seen value wins per key.
    pub headers: BTreeMap<String, String>,
    /// First authorization-style header value observed.
    pub auth_token: Option<String>,
    pub endpoints: Vec<CapturedEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEndpoint {
    pub method: String,
    pub path: String,
    /// Query string including the leading `?`, empty if none.
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsCapture {
    /// First socket URL seen during the window.
    pub url: Option<String>,
    /// First outgoing text frame on that socket.
    pub subscribe_payload: Option<String>,
    pub headers_observed: BTreeMap<String, String>,
    /// Incoming frames matching known data markers, one sample per socket.
    pub sample_payloads: Vec<String>,
}

impl CaptureRecord {
    /// A record needs at least one REST endpoint or one socket URL before it
    /// is worth validating.
    pub fn is_eligible(&self) -> bool {
        !self.rest_api.endpoints.is_empty() || self.web_socket.url.is_some()
    }

    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            rest_endpoints: self.rest_api.endpoints.len(),
            has_websocket: self.web_socket.url.is_some(),
            headers_captured: self.rest_api.headers.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfileType {
    Public,
    Private,
}

impl ProfileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Public => "PUBLIC",
            ProfileType::Private => "PRIVATE",
        }
    }
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub enforced: bool,
}

impl RateLimit {
    /// Default applied to PUBLIC profiles that don't declare their own.
    pub fn default_public() -> Self {
        Self { requests_per_minute: 30, burst: 5, enforced: false }
    }
}

/// A validated, persistable endpoint profile. Only the validator constructs
/// these; by then every field holds a checked or defaulted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointProfile {
    pub whitelabel: String,
    pub provider: String,
    pub profile_type: ProfileType,
    pub endpoint_url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub auth_required: bool,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub rate_limit: RateLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EndpointProfile {
    pub fn storage_key(&self) -> String {
        profile_key(&self.whitelabel, &self.provider, self.profile_type)
    }
}

/// Persistence key: `endpoint_profile:{whitelabel}:{provider}:{profile_type}`.
pub fn profile_key(whitelabel: &str, provider: &str, profile_type: ProfileType) -> String {
    format!("endpoint_profile:{whitelabel}:{provider}:{profile_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_key_format() {
        assert_eq!(
            profile_key("nova", "NOVA", ProfileType::Private),
            "endpoint_profile:nova:NOVA:PRIVATE"
        );
        assert_eq!(
            profile_key("nova", "NOVA", ProfileType::Public),
            "endpoint_profile:nova:NOVA:PUBLIC"
        );
    }

    #[test]
    fn empty_record_is_not_eligible() {
        let record = CaptureRecord::default();
        assert!(!record.is_eligible());
    }

    #[test]
    fn websocket_only_record_is_eligible() {
        let mut record = CaptureRecord::default();
        record.web_socket.url = Some("wss://nova.example/feed".to_string());
        assert!(record.is_eligible());
        let summary = record.summary();
        assert_eq!(summary.rest_endpoints, 0);
        assert!(summary.has_websocket);
    }

    #[test]
    fn session_state_serializes_screaming_snake() {
        let s = serde_json::to_string(&SessionState::WaitingLogin).unwrap();
        assert_eq!(s, "\"WAITING_LOGIN\"");
    }

    #[test]
    fn profile_type_round_trips() {
        let t: ProfileType = serde_json::from_str("\"PRIVATE\"").unwrap();
        assert_eq!(t, ProfileType::Private);
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"PRIVATE\"");
    }
}
