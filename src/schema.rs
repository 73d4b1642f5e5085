use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::{EndpointProfile, ProfileType, RateLimit};

pub const VALID_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const MIN_TIMEOUT_MS: i64 = 100;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const MAX_RETRY_ATTEMPTS: i64 = 5;

// ---------------------------------------------------------------------------
// Candidate shapes
// ---------------------------------------------------------------------------

/// An unvalidated profile as it arrives from a batch file or a capture.
/// Every field is optional so validation can report all problems at once;
/// unknown fields are dropped by deserialization, not errored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileCandidate {
    pub whitelabel: Option<String>,
    pub provider: Option<String>,
    pub profile_type: Option<String>,
    pub endpoint_url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub auth_required: Option<bool>,
    pub timeout_ms: Option<i64>,
    pub retry_attempts: Option<i64>,
    pub rate_limit: Option<RateLimitCandidate>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitCandidate {
    pub requests_per_minute: Option<i64>,
    pub burst: Option<i64>,
    pub enforced: Option<bool>,
}

// ---------------------------------------------------------------------------
// Validation error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Aggregate of every rule violation found in one candidate. Validation
/// never short-circuits, so the caller sees the full breakdown at once.
#[derive(Debug, Clone, Error)]
#[error("endpoint profile validation failed: {}", format_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn names_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Pure validation. Applies defaults, range-checks numeric fields, and
/// enforces the conditional rate-limit rule: PRIVATE requires one, PUBLIC
/// falls back to the documented default.
pub fn validate(candidate: &ProfileCandidate) -> Result<EndpointProfile, ValidationError> {
    let mut violations = Vec::new();
    let mut fail = |field: &str, message: String| {
        violations.push(FieldViolation { field: field.to_string(), message });
    };

    let whitelabel = required_string(candidate.whitelabel.as_deref(), "whitelabel", &mut fail);
    let provider = required_string(candidate.provider.as_deref(), "provider", &mut fail);

    let profile_type = match candidate.profile_type.as_deref() {
        Some("PUBLIC") => Some(ProfileType::Public),
        Some("PRIVATE") => Some(ProfileType::Private),
        Some(other) => {
            fail("profile_type", format!("must be PUBLIC or PRIVATE, got {other:?}"));
            None
        }
        None => {
            fail("profile_type", "is required".to_string());
            None
        }
    };

    let endpoint_url = match candidate.endpoint_url.as_deref() {
        Some(raw) => match Url::parse(raw) {
            Ok(_) => Some(raw.to_string()),
            Err(e) => {
                fail("endpoint_url", format!("must be a well-formed URI: {e}"));
                None
            }
        },
        None => {
            fail("endpoint_url", "is required".to_string());
            None
        }
    };

    let method = match candidate.method.as_deref() {
        Some(m) if VALID_METHODS.contains(&m) => m.to_string(),
        Some(m) => {
            fail("method", format!("must be one of {VALID_METHODS:?}, got {m:?}"));
            String::new()
        }
        None => "GET".to_string(),
    };

    let timeout_ms = match candidate.timeout_ms {
        Some(t) if t >= MIN_TIMEOUT_MS => t as u64,
        Some(t) => {
            fail("timeout_ms", format!("must be >= {MIN_TIMEOUT_MS}, got {t}"));
            0
        }
        None => DEFAULT_TIMEOUT_MS,
    };

    let retry_attempts = match candidate.retry_attempts {
        Some(r) if (0..=MAX_RETRY_ATTEMPTS).contains(&r) => r as u32,
        Some(r) => {
            fail("retry_attempts", format!("must be in 0..={MAX_RETRY_ATTEMPTS}, got {r}"));
            0
        }
        None => DEFAULT_RETRY_ATTEMPTS,
    };

    // Conditional rule. When profile_type itself is invalid there is nothing
    // meaningful to check the rate limit against, so it is skipped and only
    // the profile_type violation is reported.
    let rate_limit = match (profile_type, candidate.rate_limit.as_ref()) {
        (Some(ProfileType::Private), None) => {
            fail("rate_limit", "is required for PRIVATE profiles".to_string());
            None
        }
        (Some(_), Some(rl)) => validate_rate_limit(rl, &mut fail),
        (Some(ProfileType::Public), None) => Some(RateLimit::default_public()),
        (None, _) => None,
    };

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let now = Utc::now();
    Ok(EndpointProfile {
        whitelabel: whitelabel.unwrap_or_default(),
        provider: provider.unwrap_or_default(),
        profile_type: profile_type.expect("checked above"),
        endpoint_url: endpoint_url.expect("checked above"),
        method,
        headers: candidate.headers.clone().unwrap_or_default(),
        auth_required: candidate.auth_required.unwrap_or(false),
        timeout_ms,
        retry_attempts,
        rate_limit: rate_limit.expect("checked above"),
        description: candidate.description.clone(),
        created_at: candidate.created_at.unwrap_or(now),
        updated_at: candidate.updated_at.unwrap_or(now),
    })
}

fn required_string(
    value: Option<&str>,
    field: &str,
    fail: &mut impl FnMut(&str, String),
) -> Option<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Some(s.to_string()),
        Some(_) => {
            fail(field, "must not be empty".to_string());
            None
        }
        None => {
            fail(field, "is required".to_string());
            None
        }
    }
}

fn validate_rate_limit(
    rl: &RateLimitCandidate,
    fail: &mut impl FnMut(&str, String),
) -> Option<RateLimit> {
    let mut ok = true;

    let requests_per_minute = match rl.requests_per_minute {
        Some(r) if r >= 1 => r as u32,
        Some(r) => {
            fail("rate_limit.requests_per_minute", format!("must be >= 1, got {r}"));
            ok = false;
            0
        }
        None => {
            fail("rate_limit.requests_per_minute", "is required".to_string());
            ok = false;
            0
        }
    };

    let burst = match rl.burst {
        Some(b) if b >= 1 => b as u32,
        Some(b) => {
            fail("rate_limit.burst", format!("must be >= 1, got {b}"));
            ok = false;
            0
        }
        None => {
            fail("rate_limit.burst", "is required".to_string());
            ok = false;
            0
        }
    };

    let enforced = match rl.enforced {
        Some(e) => e,
        None => {
            fail("rate_limit.enforced", "is required".to_string());
            ok = false;
            false
        }
    };

    ok.then_some(RateLimit { requests_per_minute, burst, enforced })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_candidate(profile_type: &str) -> ProfileCandidate {
        ProfileCandidate {
            whitelabel: Some("nova".to_string()),
            provider: Some("NOVA".to_string()),
            profile_type: Some(profile_type.to_string()),
            endpoint_url: Some("https://api.nova.example/v1/odds".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn public_defaults_applied() {
        let profile = validate(&base_candidate("PUBLIC")).unwrap();
        assert_eq!(profile.method, "GET");
        assert_eq!(profile.timeout_ms, 5_000);
        assert_eq!(profile.retry_attempts, 3);
        assert!(!profile.auth_required);
        assert_eq!(
            profile.rate_limit,
            RateLimit { requests_per_minute: 30, burst: 5, enforced: false }
        );
    }

    #[test]
    fn private_without_rate_limit_rejected() {
        let err = validate(&base_candidate("PRIVATE")).unwrap_err();
        assert!(err.names_field("rate_limit"), "{err}");
    }

    #[test]
    fn private_with_rate_limit_accepted() {
        let mut candidate = base_candidate("PRIVATE");
        candidate.rate_limit = Some(RateLimitCandidate {
            requests_per_minute: Some(120),
            burst: Some(20),
            enforced: Some(true),
        });
        let profile = validate(&candidate).unwrap();
        assert_eq!(profile.profile_type, ProfileType::Private);
        assert_eq!(profile.rate_limit.requests_per_minute, 120);
        assert!(profile.rate_limit.enforced);
    }

    #[test]
    fn incomplete_rate_limit_reports_each_missing_field() {
        let mut candidate = base_candidate("PRIVATE");
        candidate.rate_limit = Some(RateLimitCandidate {
            requests_per_minute: Some(0),
            burst: None,
            enforced: None,
        });
        let err = validate(&candidate).unwrap_err();
        assert!(err.names_field("rate_limit.requests_per_minute"));
        assert!(err.names_field("rate_limit.burst"));
        assert!(err.names_field("rate_limit.enforced"));
    }

    #[test]
    fn violations_are_collected_not_short_circuited() {
        let candidate = ProfileCandidate {
            profile_type: Some("SECRET".to_string()),
            endpoint_url: Some("not a url".to_string()),
            method: Some("TRACE".to_string()),
            timeout_ms: Some(50),
            retry_attempts: Some(9),
            ..Default::default()
        };
        let err = validate(&candidate).unwrap_err();
        for field in
            ["whitelabel", "provider", "profile_type", "endpoint_url", "method", "timeout_ms", "retry_attempts"]
        {
            assert!(err.names_field(field), "missing violation for {field}: {err}");
        }
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let mut candidate = base_candidate("PUBLIC");
        candidate.timeout_ms = Some(100);
        candidate.retry_attempts = Some(0);
        let profile = validate(&candidate).unwrap();
        assert_eq!(profile.timeout_ms, 100);
        assert_eq!(profile.retry_attempts, 0);

        candidate.retry_attempts = Some(5);
        assert_eq!(validate(&candidate).unwrap().retry_attempts, 5);
    }

    #[test]
    fn unknown_fields_are_stripped_on_deserialize() {
        let raw = r#"{
            "whitelabel": "nova",
            "provider": "NOVA",
            "profile_type": "PUBLIC",
            "endpoint_url": "https://api.nova.example/v1/odds",
            "shoe_size": 44,
            "nested": {"junk": true}
        }"#;
        let candidate: ProfileCandidate = serde_json::from_str(raw).unwrap();
        assert!(validate(&candidate).is_ok());
    }

    #[test]
    fn supplied_timestamps_are_preserved() {
        let mut candidate = base_candidate("PUBLIC");
        let t = "2026-01-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        candidate.created_at = Some(t);
        candidate.updated_at = Some(t);
        let profile = validate(&candidate).unwrap();
        assert_eq!(profile.created_at, t);
        assert_eq!(profile.updated_at, t);
    }

    #[test]
    fn aggregate_message_names_every_field() {
        let err = validate(&ProfileCandidate::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("profile_type"));
        assert!(msg.contains("endpoint_url"));
        assert!(msg.contains("whitelabel"));
    }
}
