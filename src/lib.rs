//! Automated discovery and persistence of a sportsbook's private API
//! surface.
//!
//! A [`manager::SessionManager`] opens an isolated browsing context per
//! account and waits for the human to log in manually. Once the
//! authentication heuristic fires, a bounded capture window observes the
//! page's REST and WebSocket traffic, the result is validated against the
//! endpoint-profile schema, and valid profiles land in the key-value store
//! under `endpoint_profile:{whitelabel}:{provider}:{profile_type}`.
//!
//! The browsing engine and the key-value service are consumed as
//! capabilities ([`browser::BrowserEngine`], [`store::KvStore`]); downstream
//! arbitrage matching only ever reads the persisted profiles.

pub mod auth;
pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod manager;
pub mod schema;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{AppError, Result};
pub use manager::SessionManager;
pub use schema::{validate, ProfileCandidate, ValidationError};
pub use store::{KvStore, MemoryKv, ProfileStore};
pub use types::{CaptureRecord, EndpointProfile, ProfileType, SessionState};
