use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::debug;

use crate::browser::Page;
use crate::config::{AUTH_PROBE_SELECTORS, LOGIN_URL_MARKERS};

/// One authentication signal. Probes never error: a probe that cannot
/// evaluate (element absent, page mid-navigation) reports negative.
#[async_trait]
pub trait AuthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, page: &dyn Page) -> bool;
}

/// DOM-presence probe: positive when the selector resolves to a visible
/// element.
pub struct SelectorProbe {
    name: String,
    selector: String,
}

impl SelectorProbe {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self { name: name.into(), selector: selector.into() }
    }
}

#[async_trait]
impl AuthProbe for SelectorProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, page: &dyn Page) -> bool {
        page.is_visible(&self.selector).await.unwrap_or(false)
    }
}

/// Ordered battery of probes evaluated in parallel. The generic set is
/// heuristic and known to misfire on unrelated "user"/"balance" class names;
/// provider-specific probes are appended with `with_probe`.
pub struct ProbeSet {
    probes: Vec<Arc<dyn AuthProbe>>,
}

impl ProbeSet {
    /// The provider-agnostic battery: balance indicator, user menu, logout
    /// control by class or link, balance by id.
    pub fn generic() -> Self {
        let probes = AUTH_PROBE_SELECTORS
            .iter()
            .map(|selector| {
                Arc::new(SelectorProbe::new(format!("dom:{selector}"), *selector))
                    as Arc<dyn AuthProbe>
            })
            .collect();
        Self { probes }
    }

    pub fn with_probe(mut self, probe: Arc<dyn AuthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Authenticated = at least one positive probe AND the page URL is not a
    /// login-indicator URL.
    pub async fn is_authenticated(&self, page: &dyn Page) -> bool {
        let checks = self.probes.iter().map(|p| p.check(page));
        let results = join_all(checks).await;
        let positive = results.iter().any(|&r| r);

        if positive {
            for (probe, hit) in self.probes.iter().zip(&results) {
                if *hit {
                    debug!(probe = probe.name(), "auth probe positive");
                }
            }
        }

        positive && !is_login_url(&page.url())
    }
}

/// True when the URL still looks like a login page.
pub fn is_login_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    LOGIN_URL_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePage;

    #[test]
    fn login_url_markers() {
        assert!(is_login_url("https://nova.example/login"));
        assert!(is_login_url("https://nova.example/SignIn?next=/"));
        assert!(is_login_url("https://nova.example/oauth/authorize"));
        assert!(!is_login_url("https://nova.example/sports/live"));
    }

    #[tokio::test]
    async fn no_signals_means_not_authenticated() {
        let page = FakePage::new();
        page.set_url("https://nova.example/sports");
        assert!(!ProbeSet::generic().is_authenticated(page.as_ref()).await);
    }

    #[tokio::test]
    async fn single_positive_probe_suffices() {
        let page = FakePage::new();
        page.set_url("https://nova.example/sports");
        page.set_visible(AUTH_PROBE_SELECTORS[0]);
        assert!(ProbeSet::generic().is_authenticated(page.as_ref()).await);
    }

    #[tokio::test]
    async fn login_url_overrides_positive_signals() {
        let page = FakePage::new();
        page.set_url("https://nova.example/login?step=2");
        page.set_visible(AUTH_PROBE_SELECTORS[0]);
        page.set_visible(AUTH_PROBE_SELECTORS[2]);
        assert!(!ProbeSet::generic().is_authenticated(page.as_ref()).await);
    }

    #[tokio::test]
    async fn failing_probe_counts_negative() {
        // A closed page makes every is_visible call error; the battery must
        // swallow that and report unauthenticated rather than propagate.
        let page = FakePage::new();
        page.set_url("https://nova.example/sports");
        page.close_now();
        assert!(!ProbeSet::generic().is_authenticated(page.as_ref()).await);
    }

    #[tokio::test]
    async fn provider_probe_extends_battery() {
        struct AlwaysYes;
        #[async_trait]
        impl AuthProbe for AlwaysYes {
            fn name(&self) -> &str {
                "provider:always-yes"
            }
            async fn check(&self, _page: &dyn Page) -> bool {
                true
            }
        }

        let page = FakePage::new();
        page.set_url("https://nova.example/sports");
        let probes = ProbeSet::generic().with_probe(Arc::new(AlwaysYes));
        assert!(probes.is_authenticated(page.as_ref()).await);
    }
}
