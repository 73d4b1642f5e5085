//! File-ingestion CLI: validates endpoint profiles from a JSON file and
//! loads them into the key-value store. The file may hold one profile
//! object or an array; the batch is all-or-nothing.
//!
//! The binary wires the in-process [`MemoryKv`] backend behind the
//! [`KvStore`] seam; a deployment substitutes its networked client there.
//!
//! Exit codes: 0 with each persisted key printed, 1 on missing argument,
//! missing file, invalid JSON, or any validation failure.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use endpoint_capture::store::{MemoryKv, ProfileStore};
use endpoint_capture::Config;

#[tokio::main]
async fn main() {
    let cfg = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("Error: no file path provided");
        eprintln!("Usage: profile-loader <profiles.json>");
        std::process::exit(1);
    };

    let store = ProfileStore::new(MemoryKv::new(), &cfg);
    match store.load_batch(&path).await {
        Ok(keys) => {
            for key in &keys {
                println!("✓ Loaded profile: {key}");
            }
            println!("Successfully loaded {} profile(s)", keys.len());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
