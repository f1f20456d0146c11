//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use lab_progress::{
    config::TrackingConfig,
    document::ProgressDocument,
    schedule::TokioScheduler,
    store::{DocumentStore, Member, MemoryMemberStore},
};
use std::{path::PathBuf, rc::Rc};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Let locally spawned store writes finish.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[allow(dead_code)]
pub fn signed_in(id: &str) -> MemoryMemberStore {
    MemoryMemberStore::with_member(Member {
        id: id.to_string(),
        ..Default::default()
    })
}

/// A document adapter for one page view over `store`.
#[allow(dead_code)]
pub fn page_view(store: &MemoryMemberStore) -> DocumentStore<MemoryMemberStore, TokioScheduler> {
    init_logging();
    DocumentStore::new(
        store.clone(),
        TokioScheduler::default(),
        Rc::new(TrackingConfig::default()),
    )
}

#[allow(dead_code)]
pub fn stored_progress(store: &MemoryMemberStore) -> ProgressDocument {
    store
        .field(&TrackingConfig::default().progress_field_key)
        .map(|raw| serde_json::from_str(&raw).unwrap())
        .unwrap_or_default()
}

/// Write a tracking config file into `temp_dir` and return its path.
#[allow(dead_code)]
pub fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
    let path = temp_dir.path().join("tracking.toml");
    std::fs::write(&path, content).unwrap();
    path
}
