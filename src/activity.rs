//! Activity counters for discrete actions: worksheet downloads and outbound publication clicks.
//!
//! Same persistence pattern as progress tracking: load the member's activity document once per
//! page view, find-or-create the entry by slug, bump its count and timestamps, write the whole
//! document back fire-and-forget.
use crate::{
    document::{ActivityDocument, ClickEntry, DownloadEntry},
    identity::AssetIdentity,
    page::{Notice, Page},
    schedule::{Readiness, Scheduler},
    store::{DocumentStore, MemberStore},
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Download,
    Click,
}

/// Attributes read off the element the viewer acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTarget {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

trait CountedEntry {
    fn slug(&self) -> &str;
    fn bump(&mut self, at: &str);
}

impl CountedEntry for DownloadEntry {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn bump(&mut self, at: &str) {
        self.count = self.count.max(1).saturating_add(1);
        self.last_downloaded = at.to_string();
    }
}

impl CountedEntry for ClickEntry {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn bump(&mut self, at: &str) {
        self.count = self.count.max(1).saturating_add(1);
        self.last_clicked = at.to_string();
    }
}

/// Increment the entry for `slug`, or append the one built by `create`. Returns its index.
fn count_entry<E: CountedEntry>(
    entries: &mut Vec<E>,
    slug: &str,
    at: &str,
    create: impl FnOnce() -> E,
) -> usize {
    match entries.iter().position(|entry| entry.slug() == slug) {
        Some(index) => {
            entries[index].bump(at);
            index
        }
        None => {
            entries.push(create());
            entries.len() - 1
        }
    }
}

pub fn record_download<'d>(
    doc: &'d mut ActivityDocument,
    slug: &str,
    name: &str,
    topic: &str,
    at: &str,
) -> &'d DownloadEntry {
    let index = count_entry(&mut doc.downloads, slug, at, || DownloadEntry {
        slug: slug.to_string(),
        name: name.to_string(),
        topic: topic.to_string(),
        count: 1,
        first_downloaded: at.to_string(),
        last_downloaded: at.to_string(),
    });
    &doc.downloads[index]
}

pub fn record_click<'d>(
    doc: &'d mut ActivityDocument,
    slug: &str,
    name: &str,
    topic: &str,
    url: &str,
    at: &str,
) -> &'d ClickEntry {
    let index = count_entry(&mut doc.clicks, slug, at, || ClickEntry {
        slug: slug.to_string(),
        name: name.to_string(),
        topic: topic.to_string(),
        url: url.to_string(),
        count: 1,
        first_clicked: at.to_string(),
        last_clicked: at.to_string(),
    });
    &doc.clicks[index]
}

/// Activity tracking bound to one page view of one member.
pub struct ActivityTracker<S, X, P> {
    docs: DocumentStore<S, X>,
    page: Rc<P>,
    identity: AssetIdentity,
    title: String,
    document: ActivityDocument,
}

impl<S, X, P> ActivityTracker<S, X, P>
where
    S: MemberStore,
    X: Scheduler,
    P: Page,
{
    /// `None` for anonymous viewers or an unavailable store: nothing is recorded.
    pub async fn start(
        docs: DocumentStore<S, X>,
        page: Rc<P>,
        readiness: &Readiness,
    ) -> Option<Self> {
        readiness.wait().await;
        let member = match docs.current_member().await {
            Ok(Some(member)) => member,
            Ok(None) => {
                tracing::debug!("[Activity] no member logged in, skipping activity tracking");
                return None;
            }
            Err(e) => {
                tracing::warn!("[Activity] member store unavailable: {e}");
                return None;
            }
        };
        let document = docs.load_activity(&member);
        let identity = AssetIdentity::resolve(page.as_ref());
        tracing::debug!("[Activity] initialized for member {}", member.id);
        Some(ActivityTracker {
            docs,
            title: page.title(),
            page,
            identity,
            document,
        })
    }

    pub fn document(&self) -> &ActivityDocument {
        &self.document
    }

    pub fn record(&mut self, kind: ActivityKind, target: &TrackTarget) {
        self.record_at(kind, target, Utc::now())
    }

    pub fn record_at(&mut self, kind: ActivityKind, target: &TrackTarget, now: DateTime<Utc>) {
        let slug = target
            .slug
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.identity.asset_id.clone());
        let name = target
            .name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.title.clone());
        let topic = self.identity.primary_topic();
        let at = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        match kind {
            ActivityKind::Download => {
                let entry = record_download(&mut self.document, &slug, &name, topic, &at);
                tracing::debug!("[Activity] download tracked: {} x{}", entry.slug, entry.count);
            }
            ActivityKind::Click => {
                let url = target.url.as_deref().unwrap_or_default();
                let entry = record_click(&mut self.document, &slug, &name, topic, url, &at);
                tracing::debug!(
                    "[Activity] external link tracked: {} x{}",
                    entry.slug,
                    entry.count
                );
            }
        }
        self.docs.persist_activity(&self.document);
        if kind == ActivityKind::Download {
            self.page.notify(&Notice::DownloadTracked);
        }
    }
}
