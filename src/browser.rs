use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{CONTEXT_LOCALE, CONTEXT_TIMEZONE, CONTEXT_USER_AGENT, CONTEXT_VIEWPORT};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Context options
// ---------------------------------------------------------------------------

/// Fingerprint for an isolated browsing context. Every session gets the same
/// fixed fingerprint so contexts don't leak identifying state into each
/// other; only the cookie/storage jar differs.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            user_agent: CONTEXT_USER_AGENT.to_string(),
            viewport: CONTEXT_VIEWPORT,
            locale: CONTEXT_LOCALE.to_string(),
            timezone: CONTEXT_TIMEZONE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traffic events
// ---------------------------------------------------------------------------

/// One observable traffic event on a page. The engine behind the `Page`
/// trait pushes these into every subscribed receiver; senders drop when the
/// context closes, which is how a capture window learns its page is gone.
#[derive(Debug, Clone)]
pub enum PageEvent {
    Request {
        method: String,
        url: String,
        /// Header names are expected lowercase, as browsers report them.
        headers: HashMap<String, String>,
    },
    WebSocketOpened {
        url: String,
        headers: HashMap<String, String>,
    },
    FrameSent {
        socket_url: String,
        payload: Vec<u8>,
    },
    FrameReceived {
        socket_url: String,
        payload: Vec<u8>,
    },
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// The headless browsing engine, consumed as a capability. Implementations
/// wrap a real driver (e.g. a Playwright server); tests use the scripted
/// fake below.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_context(&self, opts: &ContextOptions) -> Result<Arc<dyn BrowsingContext>>;
}

#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
    /// Releases the context and everything under it. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    fn url(&self) -> String;
    /// DOM-presence probe. Errors (element absent, page navigating) are the
    /// caller's to swallow.
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    /// Resolves `true` when network activity goes idle, `false` when the
    /// bound elapses first. Never errors.
    async fn wait_for_network_idle(&self, timeout: Duration) -> bool;
    /// Registers a traffic listener. The sender side is torn down when the
    /// context closes, ending the stream.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PageEvent>;
    fn is_closed(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Scripted fake — shared by module tests across the crate
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::error::AppError;

    /// Scripted page: tests set the URL and visible selectors, and feed
    /// traffic through `emit`. Events emitted before a subscriber attaches
    /// are replayed from a backlog so tests stay deterministic.
    pub struct FakePage {
        url: Mutex<String>,
        visible: Mutex<HashSet<String>>,
        backlog: Mutex<Vec<PageEvent>>,
        subscribers: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
        closed: AtomicBool,
        pub fail_goto: AtomicBool,
    }

    impl FakePage {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                url: Mutex::new(String::new()),
                visible: Mutex::new(HashSet::new()),
                backlog: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                fail_goto: AtomicBool::new(false),
            })
        }

        pub fn set_url(&self, url: &str) {
            *self.url.lock().unwrap() = url.to_string();
        }

        pub fn set_visible(&self, selector: &str) {
            self.visible.lock().unwrap().insert(selector.to_string());
        }

        pub fn emit(&self, event: PageEvent) {
            let mut subs = self.subscribers.lock().unwrap();
            subs.retain(|tx| tx.send(event.clone()).is_ok());
            self.backlog.lock().unwrap().push(event);
        }

        pub fn request(&self, method: &str, url: &str, headers: &[(&str, &str)]) {
            self.emit(PageEvent::Request {
                method: method.to_string(),
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }

        pub fn close_now(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.subscribers.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl Page for FakePage {
        async fn goto(&self, url: &str) -> Result<()> {
            if self.fail_goto.load(Ordering::SeqCst) {
                return Err(AppError::Browser(format!("navigation to {url} failed")));
            }
            self.set_url(url);
            Ok(())
        }

        fn url(&self) -> String {
            self.url.lock().unwrap().clone()
        }

        async fn is_visible(&self, selector: &str) -> Result<bool> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(AppError::Browser("page closed".to_string()));
            }
            Ok(self.visible.lock().unwrap().contains(selector))
        }

        async fn wait_for_network_idle(&self, _timeout: Duration) -> bool {
            true
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<PageEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            for event in self.backlog.lock().unwrap().iter() {
                let _ = tx.send(event.clone());
            }
            if self.closed.load(Ordering::SeqCst) {
                drop(tx);
            } else {
                self.subscribers.lock().unwrap().push(tx);
            }
            rx
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub struct FakeContext {
        pub page: Arc<FakePage>,
        closed: AtomicBool,
    }

    impl FakeContext {
        pub fn new(page: Arc<FakePage>) -> Arc<Self> {
            Arc::new(Self { page, closed: AtomicBool::new(false) })
        }

        pub fn was_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrowsingContext for FakeContext {
        async fn new_page(&self) -> Result<Arc<dyn Page>> {
            Ok(self.page.clone() as Arc<dyn Page>)
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            self.page.close_now();
            Ok(())
        }
    }

    /// Hands out one pre-scripted context per `new_context` call, in order.
    pub struct FakeEngine {
        contexts: Mutex<Vec<Arc<FakeContext>>>,
        pub fail_launch: AtomicBool,
    }

    impl FakeEngine {
        pub fn new(contexts: Vec<Arc<FakeContext>>) -> Arc<Self> {
            // Pop from the back; store reversed so calls come out in order.
            let mut contexts = contexts;
            contexts.reverse();
            Arc::new(Self { contexts: Mutex::new(contexts), fail_launch: AtomicBool::new(false) })
        }

        pub fn single(page: Arc<FakePage>) -> (Arc<Self>, Arc<FakeContext>) {
            let ctx = FakeContext::new(page);
            (Self::new(vec![ctx.clone()]), ctx)
        }
    }

    #[async_trait]
    impl BrowserEngine for FakeEngine {
        async fn new_context(&self, _opts: &ContextOptions) -> Result<Arc<dyn BrowsingContext>> {
            if self.fail_launch.load(Ordering::SeqCst) {
                return Err(AppError::Browser("engine unavailable".to_string()));
            }
            self.contexts
                .lock()
                .unwrap()
                .pop()
                .map(|c| c as Arc<dyn BrowsingContext>)
                .ok_or_else(|| AppError::Browser("no more scripted contexts".to_string()))
        }
    }

    #[tokio::test]
    async fn backlog_replays_to_late_subscribers() {
        let page = FakePage::new();
        page.request("GET", "https://nova.example/api/odds", &[]);
        let mut rx = page.subscribe();
        match rx.recv().await {
            Some(PageEvent::Request { method, .. }) => assert_eq!(method, "GET"),
            other => panic!("expected replayed request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_ends_subscriber_streams() {
        let page = FakePage::new();
        let mut rx = page.subscribe();
        page.close_now();
        assert!(rx.recv().await.is_none());
        assert!(page.is_closed());
    }
}
