//! Activity counters against in-memory hosts

use super::helpers::*;
use crate::{
    activity::{ActivityKind, ActivityTracker, TrackTarget},
    config::TrackingConfig,
    document::ActivityDocument,
    memory::MemoryPage,
    page::Notice,
    schedule::{Readiness, TokioScheduler},
    store::MemoryMemberStore,
};
use chrono::{TimeZone, Utc};
use std::rc::Rc;
use test_log::test;
use tokio::task::LocalSet;

type Tracker = ActivityTracker<MemoryMemberStore, TokioScheduler, MemoryPage>;

fn page() -> Rc<MemoryPage> {
    Rc::new(
        MemoryPage::new("/practice/grounding/")
            .with_title("Grounding Practice")
            .with_topic_tags(&["grief", "loss"]),
    )
}

async fn start(store: &MemoryMemberStore, page: Rc<MemoryPage>) -> Option<Tracker> {
    let ready = Readiness::new();
    ready.fire();
    ActivityTracker::start(doc_store(store), page, &ready).await
}

fn stored_activity(store: &MemoryMemberStore) -> ActivityDocument {
    let raw = store
        .field(&TrackingConfig::default().activity_field_key)
        .expect("activity document written");
    serde_json::from_str(&raw).unwrap()
}

#[test(tokio::test)]
async fn anonymous_viewer_records_nothing() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::anonymous();
            assert!(start(&store, page()).await.is_none());
            assert_eq!(store.write_count(), 0);
        })
        .await;
}

#[test(tokio::test)]
async fn download_falls_back_to_page_identity() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::with_member(member("mem_1"));
            let page = page();
            let mut tracker = start(&store, page.clone()).await.unwrap();

            let first = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
            let second = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
            tracker.record_at(ActivityKind::Download, &TrackTarget::default(), first);
            tracker.record_at(ActivityKind::Download, &TrackTarget::default(), second);
            settle().await;

            let stored = stored_activity(&store);
            assert_eq!(stored.downloads.len(), 1);
            let entry = &stored.downloads[0];
            assert_eq!(entry.slug, "grounding");
            assert_eq!(entry.name, "Grounding Practice");
            assert_eq!(entry.topic, "grief");
            assert_eq!(entry.count, 2);
            assert_eq!(entry.first_downloaded, "2026-03-01T09:30:00.000Z");
            assert_eq!(entry.last_downloaded, "2026-03-02T10:00:00.000Z");
            assert_eq!(store.write_count(), 2);
            assert_eq!(
                page.notices(),
                vec![Notice::DownloadTracked, Notice::DownloadTracked]
            );
        })
        .await;
}

#[test(tokio::test)]
async fn clicks_share_the_document_with_downloads() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::with_member(member("mem_1"));
            let page = page();
            let mut tracker = start(&store, page.clone()).await.unwrap();

            tracker.record(
                ActivityKind::Download,
                &TrackTarget {
                    slug: Some("worksheet".into()),
                    name: Some("Worksheet".into()),
                    url: None,
                },
            );
            tracker.record(
                ActivityKind::Click,
                &TrackTarget {
                    slug: Some("paper".into()),
                    name: Some("  ".into()),
                    url: Some("https://journal.example/paper".into()),
                },
            );
            settle().await;

            let stored = stored_activity(&store);
            assert_eq!(&stored, tracker.document());
            assert_eq!(stored.downloads[0].slug, "worksheet");
            let click = &stored.clicks[0];
            assert_eq!(click.slug, "paper");
            assert_eq!(click.name, "Grounding Practice");
            assert_eq!(click.url, "https://journal.example/paper");
            assert_eq!(click.count, 1);
            assert_eq!(click.first_clicked, click.last_clicked);
            // Clicks are silent.
            assert_eq!(page.notices(), vec![Notice::DownloadTracked]);
        })
        .await;
}

#[test(tokio::test)]
async fn progress_field_is_left_alone() {
    LocalSet::new()
        .run_until(async {
            let mut existing = crate::document::ProgressDocument::default();
            existing.watched.push(record("grounding", &["grief"], true, false, 30));
            let store = MemoryMemberStore::with_member(member_with_progress("mem_1", &existing));
            let mut tracker = start(&store, page()).await.unwrap();

            tracker.record(ActivityKind::Download, &TrackTarget::default());
            settle().await;

            let writes = store.writes();
            assert_eq!(writes.len(), 1);
            assert!(writes[0].contains_key("activity-data"));
            assert!(!writes[0].contains_key("video-data"));
            assert_eq!(stored_progress(&store), Some(existing));
        })
        .await;
}
