//! Progress and activity document store adapter.
//!
//! The remote member store is an opaque key-value store: it hands back the whole member record
//! and accepts whole-field overwrites, never merges. [`DocumentStore`] layers the two persisted
//! documents on top of it:
//!
//! - reads happen once per page view and recover from malformed JSON by substituting an empty
//!   document;
//! - writes are fire-and-forget: the document is serialized at call time, the update is spawned
//!   on the [`Scheduler`], and the outcome is only logged. Nothing is retried or queued.
//!
//! Two page views writing the same field race at document granularity; the last write the store
//! observes wins.
use crate::{
    config::TrackingConfig,
    document::{ActivityDocument, ProgressDocument},
    error::TrackingError,
    schedule::Scheduler,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, rc::Rc, sync::Arc};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// Session-scoped view of the member profile store.
pub trait MemberStore: Clone + 'static {
    /// `Ok(None)` means an anonymous viewer.
    fn current_member(&self) -> impl Future<Output = Result<Option<Member>, TrackingError>>;

    /// Overwrite each listed custom field of the current member.
    fn update_member(
        &self,
        fields: BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), TrackingError>>;
}

pub struct DocumentStore<S, X> {
    store: S,
    scheduler: X,
    config: Rc<TrackingConfig>,
}

impl<S: Clone, X: Clone> Clone for DocumentStore<S, X> {
    fn clone(&self) -> Self {
        DocumentStore {
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: MemberStore, X: Scheduler> DocumentStore<S, X> {
    pub fn new(store: S, scheduler: X, config: Rc<TrackingConfig>) -> Self {
        DocumentStore {
            store,
            scheduler,
            config,
        }
    }

    pub fn scheduler(&self) -> &X {
        &self.scheduler
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub async fn current_member(&self) -> Result<Option<Member>, TrackingError> {
        self.store.current_member().await
    }

    pub fn load_progress(&self, member: &Member) -> ProgressDocument {
        let mut doc: ProgressDocument = read_field(member, &self.config.progress_field_key);
        doc.dedup_ids();
        doc.normalize_completed();
        doc
    }

    pub fn load_activity(&self, member: &Member) -> ActivityDocument {
        read_field(member, &self.config.activity_field_key)
    }

    pub fn persist_progress(&self, doc: &ProgressDocument) {
        self.persist(&self.config.progress_field_key, doc)
    }

    pub fn persist_activity(&self, doc: &ActivityDocument) {
        self.persist(&self.config.activity_field_key, doc)
    }

    /// Fire-and-forget whole-document write of `doc` under `field_key`.
    pub fn persist<D: Serialize>(&self, field_key: &str, doc: &D) {
        let encoded = match serde_json::to_string(doc) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("[Store] could not encode '{field_key}': {e}");
                return;
            }
        };
        let mut fields = BTreeMap::new();
        fields.insert(field_key.to_string(), encoded);
        let store = self.store.clone();
        let field_key = field_key.to_string();
        self.scheduler.spawn(async move {
            match store.update_member(fields).await {
                Ok(()) => tracing::debug!("[Store] saved '{field_key}'"),
                Err(e) => tracing::warn!("[Store] save of '{field_key}' failed: {e}"),
            }
        });
    }
}

fn read_field<D: DeserializeOwned + Default>(member: &Member, field_key: &str) -> D {
    let Some(raw) = member.custom_fields.get(field_key) else {
        return D::default();
    };
    if raw.trim().is_empty() {
        return D::default();
    }
    match serde_json::from_str(raw).map_err(TrackingError::from) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(
                "[Store] member {} field '{field_key}' is malformed, starting empty: {e}",
                member.id
            );
            D::default()
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    member: Option<Member>,
    writes: Vec<BTreeMap<String, String>>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Member store held in process memory.
///
/// Useful for native hosts and tests: it records every write and can be told to fail reads or
/// writes.
/// Clones share state, so two [`DocumentStore`]s over clones behave like two tabs of one member.
#[derive(Debug, Clone, Default)]
pub struct MemoryMemberStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMemberStore {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_member(member: Member) -> Self {
        let store = Self::default();
        store.set_member(Some(member));
        store
    }

    pub fn set_member(&self, member: Option<Member>) {
        self.state.lock().member = member;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn field(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .member
            .as_ref()
            .and_then(|m| m.custom_fields.get(key).cloned())
    }

    pub fn writes(&self) -> Vec<BTreeMap<String, String>> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }
}

impl MemberStore for MemoryMemberStore {
    fn current_member(&self) -> impl Future<Output = Result<Option<Member>, TrackingError>> {
        let result = {
            let state = self.state.lock();
            if state.fail_reads {
                Err(TrackingError::Store("member unavailable".to_string()))
            } else {
                Ok(state.member.clone())
            }
        };
        async move { result }
    }

    fn update_member(
        &self,
        fields: BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), TrackingError>> {
        let result = {
            let mut state = self.state.lock();
            if state.fail_writes {
                Err(TrackingError::Store("write rejected".to_string()))
            } else if let Some(member) = state.member.as_mut() {
                member.custom_fields.extend(fields.clone());
                state.writes.push(fields);
                Ok(())
            } else {
                Err(TrackingError::Store("no current member".to_string()))
            }
        };
        async move { result }
    }
}
