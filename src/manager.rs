use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::auth::ProbeSet;
use crate::browser::{BrowserEngine, BrowsingContext, ContextOptions, Page};
use crate::capture::{capture, CaptureWindow};
use crate::config::{Config, CAPTURED_RATE_LIMIT_BURST, CAPTURED_RATE_LIMIT_RPM};
use crate::error::{AppError, Result};
use crate::schema::{ProfileCandidate, RateLimitCandidate};
use crate::store::ProfileStore;
use crate::types::{
    Account, CaptureRecord, CaptureSummary, SessionState, SessionSummary, StatusReport,
};

// ---------------------------------------------------------------------------
// Session registry entry
// ---------------------------------------------------------------------------

struct Session {
    account: Account,
    context: Arc<dyn BrowsingContext>,
    page: Arc<dyn Page>,
    state: SessionState,
    created_at: DateTime<Utc>,
    last_capture: Option<CaptureSummary>,
    /// Guards the one-and-only context release across close/shutdown races.
    released: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Owns every live session. The registry is the only shared mutable
/// structure; each session's context, page, and in-progress capture belong
/// exclusively to that session.
///
/// `check_status` performs blocking DOM/network work and must not be called
/// concurrently for the same account; polls for different accounts are safe.
pub struct SessionManager {
    engine: Arc<dyn BrowserEngine>,
    profiles: ProfileStore,
    probes: ProbeSet,
    registry: DashMap<i64, Session>,
    window: CaptureWindow,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn BrowserEngine>, profiles: ProfileStore, cfg: &Config) -> Self {
        Self {
            engine,
            profiles,
            probes: ProbeSet::generic(),
            registry: DashMap::new(),
            window: CaptureWindow {
                network_idle_timeout: Duration::from_millis(cfg.network_idle_timeout_ms),
                settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            },
        }
    }

    /// Swap in a probe battery extended with provider-specific probes.
    pub fn with_probes(mut self, probes: ProbeSet) -> Self {
        self.probes = probes;
        self
    }

    /// Opens an isolated browsing context for the account, navigates to its
    /// login URL, and registers the session as WAITING_LOGIN. On any failure
    /// nothing is registered and the context is released.
    pub async fn initiate(&self, account: Account) -> Result<SessionSummary> {
        if self.registry.contains_key(&account.id) {
            return Err(AppError::SessionInit(format!(
                "account {} already has an active session",
                account.id
            )));
        }

        info!(
            account_id = account.id,
            sportsbook = %account.sportsbook,
            username = %account.username,
            "initiating manual login session"
        );

        let context = self
            .engine
            .new_context(&ContextOptions::default())
            .await
            .map_err(|e| AppError::SessionInit(e.to_string()))?;

        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                let _ = context.close().await;
                return Err(AppError::SessionInit(e.to_string()));
            }
        };

        if let Err(e) = page.goto(&account.login_url).await {
            let _ = context.close().await;
            return Err(AppError::SessionInit(format!(
                "navigation to {} failed: {e}",
                account.login_url
            )));
        }

        let summary = SessionSummary {
            account_id: account.id,
            sportsbook: account.sportsbook.clone(),
            state: SessionState::WaitingLogin,
            created_at: Utc::now(),
        };
        self.registry.insert(
            account.id,
            Session {
                account,
                context,
                page,
                state: SessionState::WaitingLogin,
                created_at: summary.created_at,
                last_capture: None,
                released: Arc::new(AtomicBool::new(false)),
            },
        );
        info!(account_id = summary.account_id, "browser opened, waiting for manual login");
        Ok(summary)
    }

    /// Runs the authentication heuristic for the account's session. Safe to
    /// poll: while unauthenticated it changes nothing. On the first
    /// authenticated poll it runs the capture window synchronously, then
    /// validates and persists, reporting the terminal state with capture
    /// counts only.
    pub async fn check_status(&self, account_id: i64) -> Result<StatusReport> {
        let (page, account, state, last_capture) = {
            let session =
                self.registry.get(&account_id).ok_or(AppError::NoSession(account_id))?;
            (
                session.page.clone(),
                session.account.clone(),
                session.state,
                session.last_capture,
            )
        };

        // Terminal and in-flight states are reported as-is; only
        // WAITING_LOGIN advances the machine.
        if state != SessionState::WaitingLogin {
            return Ok(StatusReport { account_id, state, capture: last_capture });
        }

        if !self.probes.is_authenticated(page.as_ref()).await {
            return Ok(StatusReport {
                account_id,
                state: SessionState::WaitingLogin,
                capture: None,
            });
        }

        info!(account_id, "user authenticated, starting endpoint capture");
        self.set_state(account_id, SessionState::Authenticated);
        self.set_state(account_id, SessionState::Capturing);

        let record = match capture(page.as_ref(), &self.window).await {
            Ok(record) => record,
            Err(e) => {
                error!(account_id, error = %e, "capture window aborted");
                self.set_state(account_id, SessionState::Error);
                return Err(e);
            }
        };

        let summary = record.summary();
        if !record.is_eligible() {
            warn!(account_id, "capture produced no endpoints, session incomplete");
            self.finish(account_id, SessionState::Incomplete, summary);
            return Ok(StatusReport {
                account_id,
                state: SessionState::Incomplete,
                capture: Some(summary),
            });
        }

        let candidate = capture_candidate(&account, &record);
        let state = match self.profiles.save(&candidate).await {
            Ok(key) => {
                info!(account_id, key, "endpoint profile persisted, session ready");
                SessionState::Ready
            }
            Err(AppError::Validation(e)) => {
                warn!(account_id, error = %e, "captured profile failed validation");
                SessionState::Incomplete
            }
            Err(e) => {
                error!(account_id, error = %e, "profile store write failed");
                self.set_state(account_id, SessionState::Error);
                return Err(e);
            }
        };

        self.finish(account_id, state, summary);
        Ok(StatusReport { account_id, state, capture: Some(summary) })
    }

    /// Releases the session's browsing context and removes it from the
    /// registry. Unknown accounts and repeated closes are no-ops.
    pub async fn close(&self, account_id: i64) {
        let Some((_, session)) = self.registry.remove(&account_id) else {
            return;
        };
        if session.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = session.context.close().await {
            warn!(account_id, error = %e, "error closing browsing context");
        }
        info!(account_id, state = %SessionState::Closed, "session closed");
    }

    /// Drains the registry, closing every session. Called at process
    /// shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<i64> = self.registry.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.close(id).await;
        }
    }

    /// Session summaries ordered by creation time.
    pub fn list_active(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .registry
            .iter()
            .map(|entry| SessionSummary {
                account_id: entry.account.id,
                sportsbook: entry.account.sportsbook.clone(),
                state: entry.state,
                created_at: entry.created_at,
            })
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then(a.account_id.cmp(&b.account_id))
        });
        sessions
    }

    fn set_state(&self, account_id: i64, state: SessionState) {
        if let Some(mut session) = self.registry.get_mut(&account_id) {
            session.state = state;
        }
    }

    fn finish(&self, account_id: i64, state: SessionState, summary: CaptureSummary) {
        if let Some(mut session) = self.registry.get_mut(&account_id) {
            session.state = state;
            session.last_capture = Some(summary);
        }
    }
}

/// Maps a capture record onto a PRIVATE profile candidate for the account's
/// provider identity. The whitelabel is the lowercased provider name, as the
/// original deployment keyed it.
fn capture_candidate(account: &Account, record: &CaptureRecord) -> ProfileCandidate {
    let endpoint_url = record
        .rest_api
        .base_url
        .clone()
        .or_else(|| record.web_socket.url.clone());
    let method = record
        .rest_api
        .endpoints
        .first()
        .map(|e| e.method.clone());

    ProfileCandidate {
        whitelabel: Some(account.sportsbook.to_lowercase()),
        provider: Some(account.sportsbook.clone()),
        profile_type: Some("PRIVATE".to_string()),
        endpoint_url,
        method,
        headers: Some(record.rest_api.headers.clone()),
        auth_required: Some(record.rest_api.auth_token.is_some()),
        rate_limit: Some(RateLimitCandidate {
            requests_per_minute: Some(CAPTURED_RATE_LIMIT_RPM as i64),
            burst: Some(CAPTURED_RATE_LIMIT_BURST as i64),
            enforced: Some(true),
        }),
        description: Some(format!(
            "Captured endpoint profile for {} ({} REST endpoints)",
            account.sportsbook,
            record.rest_api.endpoints.len()
        )),
        ..Default::default()
    }
}
