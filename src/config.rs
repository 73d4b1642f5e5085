/// Bounded wait for network activity to go idle before closing a capture
/// window. Timing out is not an error — capture proceeds with whatever was
/// observed up to that point.
pub const NETWORK_IDLE_TIMEOUT_MS: u64 = 30_000;

/// Fixed delay after network idle to let late WebSocket handshakes land.
pub const SETTLE_DELAY_MS: u64 = 5_000;

/// A page whose URL contains any of these substrings is still a login page,
/// regardless of what the DOM probes report.
pub const LOGIN_URL_MARKERS: &[&str] = &["login", "signin", "auth"];

/// Substring markers that flag a request URL as part of the target's API
/// surface. Everything else is ignored by the capture engine.
pub const API_URL_MARKERS: &[&str] = &["/api/", "/v1/", "/bet/", "/odds", "/match"];

/// Requests whose path ends in one of these extensions are static assets.
pub const STATIC_ASSET_EXTENSIONS: &[&str] =
    &["js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2"];

/// Request headers copied into the capture record, first-seen value wins.
pub const CAPTURED_HEADERS: &[&str] = &[
    "authorization",
    "x-auth-token",
    "cookie",
    "user-agent",
    "accept",
    "content-type",
];

/// Headers checked (in order) for an authorization-style token.
pub const AUTH_TOKEN_HEADERS: &[&str] = &["authorization", "x-auth-token"];

/// Top-level JSON fields that mark an incoming WS frame as a data payload
/// worth keeping as a sample for downstream schema inference.
pub const DATA_MARKER_FIELDS: &[&str] = &["odds", "match"];

/// Generic DOM probes for the authentication heuristic. Any one resolving
/// visible counts as a positive signal; provider-specific probes are
/// appended via `ProbeSet::with_probe`.
pub const AUTH_PROBE_SELECTORS: &[&str] = &[
    r#"[class*="balance"]"#,
    r#"[class*="user"]"#,
    r#"[class*="logout"]"#,
    r#"[href*="logout"]"#,
    r#"[id*="balance"]"#,
];

/// Fixed fingerprint for every isolated browsing context, so sessions are
/// indistinguishable from each other to the target service.
pub const CONTEXT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const CONTEXT_VIEWPORT: (u32, u32) = (1366, 768);
pub const CONTEXT_LOCALE: &str = "en-US";
pub const CONTEXT_TIMEZONE: &str = "Asia/Singapore";

/// PRIVATE profiles carry captured auth tokens, which go stale quickly.
pub const PRIVATE_PROFILE_TTL_SECS: u64 = 86_400;
/// PUBLIC profiles are stable; keep them a week.
pub const PUBLIC_PROFILE_TTL_SECS: u64 = 7 * 86_400;

/// Version tag written alongside every persisted profile.
pub const PROFILE_VERSION: &str = "1.0";

/// Rate limit attached to captured PRIVATE candidates. Passive capture sees
/// no rate-limit headers, and PRIVATE profiles are rejected without one.
pub const CAPTURED_RATE_LIMIT_RPM: u32 = 60;
pub const CAPTURED_RATE_LIMIT_BURST: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Run the browsing engine headless (HEADLESS). Manual-login flows want
    /// a visible window, so the default is false.
    pub headless: bool,
    pub network_idle_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub private_profile_ttl_secs: u64,
    pub public_profile_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            headless: std::env::var("HEADLESS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            network_idle_timeout_ms: env_u64("CAPTURE_IDLE_TIMEOUT_MS", NETWORK_IDLE_TIMEOUT_MS),
            settle_delay_ms: env_u64("CAPTURE_SETTLE_DELAY_MS", SETTLE_DELAY_MS),
            private_profile_ttl_secs: env_u64("PRIVATE_PROFILE_TTL_SECS", PRIVATE_PROFILE_TTL_SECS),
            public_profile_ttl_secs: env_u64("PUBLIC_PROFILE_TTL_SECS", PUBLIC_PROFILE_TTL_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            headless: false,
            network_idle_timeout_ms: NETWORK_IDLE_TIMEOUT_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            private_profile_ttl_secs: PRIVATE_PROFILE_TTL_SECS,
            public_profile_ttl_secs: PUBLIC_PROFILE_TTL_SECS,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
