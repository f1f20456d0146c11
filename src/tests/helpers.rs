//! Shared test utilities for tracking tests

use crate::{
    config::TrackingConfig,
    document::{AssetProgress, ProgressDocument},
    schedule::TokioScheduler,
    store::{DocumentStore, Member, MemoryMemberStore},
};
use std::rc::Rc;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Let locally spawned fire-and-forget writes run to completion.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

pub fn member(id: &str) -> Member {
    Member {
        id: id.to_string(),
        ..Default::default()
    }
}

/// Member whose progress field already holds `doc`.
pub fn member_with_progress(id: &str, doc: &ProgressDocument) -> Member {
    let mut member = member(id);
    member.custom_fields.insert(
        TrackingConfig::default().progress_field_key,
        serde_json::to_string(doc).unwrap(),
    );
    member
}

pub fn record(
    id: &str,
    topics: &[&str],
    started: bool,
    completed: bool,
    percent: u8,
) -> AssetProgress {
    AssetProgress {
        id: id.to_string(),
        title: id.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        started,
        completed,
        percent_watched: percent,
        last_position: 0.0,
    }
}

pub fn doc_store(store: &MemoryMemberStore) -> DocumentStore<MemoryMemberStore, TokioScheduler> {
    init_logging();
    DocumentStore::new(
        store.clone(),
        TokioScheduler::default(),
        Rc::new(TrackingConfig::default()),
    )
}

/// Progress document as currently stored for the member.
pub fn stored_progress(store: &MemoryMemberStore) -> Option<ProgressDocument> {
    store
        .field(&TrackingConfig::default().progress_field_key)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}
