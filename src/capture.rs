use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Page, PageEvent};
use crate::config::{
    API_URL_MARKERS, AUTH_TOKEN_HEADERS, CAPTURED_HEADERS, DATA_MARKER_FIELDS,
    NETWORK_IDLE_TIMEOUT_MS, SETTLE_DELAY_MS, STATIC_ASSET_EXTENSIONS,
};
use crate::error::{AppError, Result};
use crate::types::{CaptureRecord, CapturedEndpoint};

// ---------------------------------------------------------------------------
// Capture window
// ---------------------------------------------------------------------------

/// Bounds for one capture run: a network-idle wait that falls back to
/// proceeding on timeout, then a fixed settle delay for late socket
/// handshakes.
#[derive(Debug, Clone, Copy)]
pub struct CaptureWindow {
    pub network_idle_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for CaptureWindow {
    fn default() -> Self {
        Self {
            network_idle_timeout: Duration::from_millis(NETWORK_IDLE_TIMEOUT_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
        }
    }
}

/// Observe a page's traffic for the duration of `window` and build a capture
/// record from it.
///
/// Individual bad requests or frames are never errors; the only failure mode
/// is the browsing context closing mid-window, which aborts the whole
/// capture. Handlers are torn down deterministically when this returns — the
/// subscription receiver drops with it.
pub async fn capture(page: &dyn Page, window: &CaptureWindow) -> Result<CaptureRecord> {
    let mut rx = page.subscribe();
    let mut builder = RecordBuilder::new();

    info!("starting endpoint capture");

    if !page.wait_for_network_idle(window.network_idle_timeout).await {
        warn!("network idle timeout, proceeding with captured data");
    }

    let settle = tokio::time::sleep(window.settle_delay);
    tokio::pin!(settle);

    loop {
        tokio::select! {
            _ = &mut settle => break,
            event = rx.recv() => match event {
                Some(event) => builder.apply(event),
                None => {
                    if page.is_closed() {
                        return Err(AppError::CaptureAborted(
                            "browsing context closed mid-window".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
    }

    let record = builder.finish();
    info!(
        rest_endpoints = record.rest_api.endpoints.len(),
        has_websocket = record.web_socket.url.is_some(),
        base_url = record.rest_api.base_url.as_deref().unwrap_or("-"),
        "endpoint capture complete"
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// Record builder
// ---------------------------------------------------------------------------

/// Accumulates classified traffic into a capture record. First occurrence
/// wins everywhere: base URL, auth token, per-key headers, per-(method,path)
/// endpoints, socket URL, subscribe payload.
struct RecordBuilder {
    record: CaptureRecord,
    /// `{method}:{path}` keys already appended.
    seen_endpoints: HashSet<String>,
    /// Socket URLs that already contributed a sample payload.
    sampled_sockets: HashSet<String>,
}

impl RecordBuilder {
    fn new() -> Self {
        Self {
            record: CaptureRecord::default(),
            seen_endpoints: HashSet::new(),
            sampled_sockets: HashSet::new(),
        }
    }

    fn apply(&mut self, event: PageEvent) {
        match event {
            PageEvent::Request { method, url, headers } => {
                self.apply_request(&method, &url, &headers)
            }
            PageEvent::WebSocketOpened { url, headers } => self.apply_socket(&url, &headers),
            PageEvent::FrameSent { socket_url, payload } => {
                self.apply_sent_frame(&socket_url, &payload)
            }
            PageEvent::FrameReceived { socket_url, payload } => {
                self.apply_received_frame(&socket_url, &payload)
            }
        }
    }

    fn apply_request(&mut self, method: &str, raw_url: &str, headers: &HashMap<String, String>) {
        if method != "GET" && method != "POST" {
            return;
        }
        let url = match Url::parse(raw_url) {
            Ok(u) => u,
            Err(_) => return,
        };
        if is_static_asset(url.path()) || !is_relevant_url(raw_url) {
            return;
        }

        let rest = &mut self.record.rest_api;

        if rest.base_url.is_none() {
            if let Some(host) = url.host_str() {
                let mut base = format!("{}://{host}", url.scheme());
                if let Some(port) = url.port() {
                    base.push_str(&format!(":{port}"));
                }
                rest.base_url = Some(base);
            }
        }

        if rest.auth_token.is_none() {
            for &name in AUTH_TOKEN_HEADERS {
                if let Some(value) = header_get(headers, name) {
                    rest.auth_token = Some(value.to_string());
                    break;
                }
            }
        }

        for &name in CAPTURED_HEADERS {
            if let Some(value) = header_get(headers, name) {
                rest.headers.entry(name.to_string()).or_insert_with(|| value.to_string());
            }
        }

        let key = format!("{method}:{}", url.path());
        if self.seen_endpoints.insert(key) {
            let endpoint = CapturedEndpoint {
                method: method.to_string(),
                path: url.path().to_string(),
                query: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
                timestamp: Utc::now(),
            };
            debug!(method, path = %endpoint.path, "captured REST endpoint");
            rest.endpoints.push(endpoint);
        }
    }

    fn apply_socket(&mut self, url: &str, headers: &HashMap<String, String>) {
        let ws = &mut self.record.web_socket;
        if ws.url.is_none() {
            info!(url, "WebSocket connection detected");
            ws.url = Some(url.to_string());
            for (name, value) in headers {
                ws.headers_observed
                    .entry(name.to_ascii_lowercase())
                    .or_insert_with(|| value.clone());
            }
        }
    }

    fn apply_sent_frame(&mut self, socket_url: &str, payload: &[u8]) {
        let ws = &mut self.record.web_socket;
        if ws.url.as_deref() != Some(socket_url) || ws.subscribe_payload.is_some() {
            return;
        }
        // Non-text frames are expected noise, not errors.
        if let Ok(text) = std::str::from_utf8(payload) {
            debug!(payload = text, "captured WebSocket subscribe payload");
            ws.subscribe_payload = Some(text.to_string());
        }
    }

    fn apply_received_frame(&mut self, socket_url: &str, payload: &[u8]) {
        if self.sampled_sockets.contains(socket_url) {
            return;
        }
        let Ok(text) = std::str::from_utf8(payload) else {
            return;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };
        let Some(object) = value.as_object() else {
            return;
        };
        if DATA_MARKER_FIELDS.iter().any(|f| object.contains_key(*f)) {
            self.sampled_sockets.insert(socket_url.to_string());
            self.record.web_socket.sample_payloads.push(text.to_string());
        }
    }

    fn finish(self) -> CaptureRecord {
        self.record
    }
}

// ---------------------------------------------------------------------------
// Classification helpers
// ---------------------------------------------------------------------------

/// Case-insensitive header lookup; browser engines mostly report lowercase
/// names but this keeps the comparison honest.
fn header_get<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn is_static_asset(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or("");
    match file.rsplit_once('.') {
        Some((_, ext)) => {
            STATIC_ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        None => false,
    }
}

pub fn is_relevant_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    API_URL_MARKERS.iter().any(|m| lower.contains(m))
}
