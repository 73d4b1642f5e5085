use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{Config, PROFILE_VERSION};
use crate::error::{AppError, Result};
use crate::schema::{validate, ProfileCandidate};
use crate::types::{profile_key, EndpointProfile, ProfileType};

// ---------------------------------------------------------------------------
// Key-value capability
// ---------------------------------------------------------------------------

/// The external TTL-capable key-value service, consumed as a capability.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, expiry: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// In-process KV backend with lazy expiry. Backing store for tests and the
/// loader binary; deployments substitute a networked client at the trait.
pub struct MemoryKv {
    entries: DashMap<String, MemoryEntry>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: &str, expiry: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry { value: value.to_string(), expires_at: Instant::now() + expiry },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired entries are dropped on read.
        self.entries.remove_if(key, |_, e| e.expires_at <= Instant::now());
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Profile store
// ---------------------------------------------------------------------------

/// Validation-gated persistence for endpoint profiles. Writes are keyed by
/// (whitelabel, provider, profile_type) and idempotent — last write wins.
pub struct ProfileStore {
    kv: Arc<dyn KvStore>,
    public_ttl: Duration,
    private_ttl: Duration,
}

impl ProfileStore {
    pub fn new(kv: Arc<dyn KvStore>, cfg: &Config) -> Self {
        Self {
            kv,
            public_ttl: Duration::from_secs(cfg.public_profile_ttl_secs),
            private_ttl: Duration::from_secs(cfg.private_profile_ttl_secs),
        }
    }

    /// Validates the candidate and writes the result. An invalid candidate
    /// is rejected with the validator's aggregate error; nothing is written.
    pub async fn save(&self, candidate: &ProfileCandidate) -> Result<String> {
        let profile = validate(candidate)?;
        let key = profile.storage_key();
        let ttl = match profile.profile_type {
            ProfileType::Public => self.public_ttl,
            ProfileType::Private => self.private_ttl,
        };

        let payload = stored_payload(&profile)?;
        self.kv.set(&key, &payload, ttl).await?;
        info!(key, profile_type = %profile.profile_type, "endpoint profile saved");
        Ok(key)
    }

    /// Absent key and unparsable payload both degrade to `None` — a missing
    /// profile is an expected steady state, not an error.
    pub async fn load(
        &self,
        whitelabel: &str,
        provider: &str,
        profile_type: ProfileType,
    ) -> Result<Option<EndpointProfile>> {
        let key = profile_key(whitelabel, provider, profile_type);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<EndpointProfile>(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(key, error = %e, "stored profile failed to parse, treating as absent");
                Ok(None)
            }
        }
    }

    /// Loads one profile object or an array of them from a JSON file.
    /// All-or-nothing: the whole batch is validated before the first write,
    /// and the first failure aborts with its index annotated.
    pub async fn load_batch(&self, path: &Path) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            single => vec![single],
        };

        let mut profiles = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let candidate: ProfileCandidate = serde_json::from_value(item)
                .map_err(|e| AppError::BatchItem { index, message: e.to_string() })?;
            let profile = validate(&candidate)
                .map_err(|e| AppError::BatchItem { index, message: e.to_string() })?;
            profiles.push(profile);
        }

        let mut keys = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            let key = profile.storage_key();
            let ttl = match profile.profile_type {
                ProfileType::Public => self.public_ttl,
                ProfileType::Private => self.private_ttl,
            };
            let payload = stored_payload(profile)?;
            self.kv.set(&key, &payload, ttl).await?;
            keys.push(key);
        }
        info!(count = keys.len(), "batch load complete");
        Ok(keys)
    }
}

/// Serialized profile plus bookkeeping fields (`captured_at`, `version`).
/// Loads deserialize into `EndpointProfile`, which ignores the extras.
fn stored_payload(profile: &EndpointProfile) -> Result<String> {
    let mut value = serde_json::to_value(profile)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("captured_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        map.insert("version".to_string(), serde_json::json!(PROFILE_VERSION));
    }
    Ok(value.to_string())
}
