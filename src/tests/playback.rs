//! Playback sessions against in-memory hosts

use super::helpers::*;
use crate::{
    document::ProgressDocument,
    memory::{MemoryPage, ScriptedPlayer},
    page::Notice,
    playback::{PlaybackSession, PlaybackState, PlayerEvent},
    schedule::{Readiness, TokioScheduler},
    store::MemoryMemberStore,
};
use std::rc::Rc;
use test_log::test;
use tokio::task::LocalSet;

const SOURCE: &str = "https://vimeo.com/1154941604/fb7da4d87b";

type Session = PlaybackSession<MemoryMemberStore, TokioScheduler, MemoryPage, ScriptedPlayer>;

fn page() -> Rc<MemoryPage> {
    Rc::new(
        MemoryPage::new("/practice/grounding")
            .with_title("Grounding")
            .with_topic_tags(&["grief", "grief", " ", "loss"])
            .with_player_source(SOURCE),
    )
}

fn ready() -> Readiness {
    let ready = Readiness::new();
    ready.fire();
    ready
}

async fn start(
    store: &MemoryMemberStore,
    page: Rc<MemoryPage>,
    player: &ScriptedPlayer,
) -> Option<Session> {
    let player = player.clone();
    PlaybackSession::start(doc_store(store), page, &ready(), move |_| Some(player)).await
}

fn tick(seconds: f64) -> PlayerEvent {
    PlayerEvent::TimeUpdate {
        seconds,
        fraction: seconds / 100.0,
    }
}

fn pause(seconds: f64) -> PlayerEvent {
    PlayerEvent::Pause {
        seconds,
        fraction: seconds / 100.0,
    }
}

#[test(tokio::test)]
async fn resume_seeks_once_and_notifies() {
    LocalSet::new()
        .run_until(async {
            let mut saved = record("grounding", &["grief"], true, false, 6);
            saved.last_position = 6.0;
            let mut doc = ProgressDocument::default();
            doc.watched.push(saved);
            let store = MemoryMemberStore::with_member(member_with_progress("mem_1", &doc));
            let page = page();
            let player = ScriptedPlayer::new(Some(100.0));

            let mut session = start(&store, page.clone(), &player).await.unwrap();
            assert_eq!(session.tracker().state(), PlaybackState::InProgress);
            session.handle(PlayerEvent::Play).await;
            session.handle(pause(7.0)).await;
            session.handle(PlayerEvent::Play).await;
            settle().await;

            assert_eq!(player.seeks(), vec![6.0]);
            assert_eq!(page.notices(), vec![Notice::Resumed(6.0)]);
            assert_eq!(store.write_count(), 3);
        })
        .await;
}

#[test(tokio::test)]
async fn completed_record_with_stale_position_is_repaired_on_write() {
    LocalSet::new()
        .run_until(async {
            let mut stale = record("grounding", &["grief"], true, true, 31);
            stale.last_position = 31.0;
            let mut doc = ProgressDocument::default();
            doc.watched.push(stale);
            let store = MemoryMemberStore::with_member(member_with_progress("mem_1", &doc));
            let page = page();
            let player = ScriptedPlayer::new(Some(100.0));

            let mut session = start(&store, page.clone(), &player).await.unwrap();
            assert_eq!(session.tracker().state(), PlaybackState::Completed);
            session.handle(PlayerEvent::Play).await;
            session.handle(pause(12.0)).await;
            settle().await;

            assert!(player.seeks().is_empty());
            let written = stored_progress(&store).unwrap();
            let record = written.get("grounding").unwrap();
            assert!(record.completed);
            assert_eq!(record.percent_watched, 100);
            assert_eq!(record.last_position, 0.0);
        })
        .await;
}

#[test(tokio::test)]
async fn below_resume_threshold_does_not_seek() {
    LocalSet::new()
        .run_until(async {
            let mut saved = record("grounding", &[], true, false, 4);
            saved.last_position = 4.0;
            let mut doc = ProgressDocument::default();
            doc.watched.push(saved);
            let store = MemoryMemberStore::with_member(member_with_progress("mem_1", &doc));
            let page = page();
            let player = ScriptedPlayer::new(Some(100.0));

            let mut session = start(&store, page.clone(), &player).await.unwrap();
            session.handle(PlayerEvent::Play).await;
            assert!(player.seeks().is_empty());
            assert!(page.notices().is_empty());
        })
        .await;
}

#[test(tokio::test)]
async fn failed_seek_skips_resume_notice() {
    LocalSet::new()
        .run_until(async {
            let mut saved = record("grounding", &[], true, false, 30);
            saved.last_position = 30.0;
            let mut doc = ProgressDocument::default();
            doc.watched.push(saved);
            let store = MemoryMemberStore::with_member(member_with_progress("mem_1", &doc));
            let page = page();
            let player = ScriptedPlayer::new(Some(100.0));
            player.set_fail_seek(true);

            let mut session = start(&store, page.clone(), &player).await.unwrap();
            session.handle(PlayerEvent::Play).await;
            settle().await;
            assert!(page.notices().is_empty());
            assert_eq!(store.write_count(), 1);
        })
        .await;
}

#[test(tokio::test)]
async fn full_view_writes_in_event_order() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::with_member(member("mem_1"));
            let page = page();
            let player = ScriptedPlayer::new(Some(100.0));
            let session = start(&store, page.clone(), &player).await.unwrap();

            player.emit(PlayerEvent::Play);
            for t in 1..=9 {
                player.emit(tick(t as f64));
            }
            player.emit(tick(10.0));
            player.emit(pause(11.0));
            player.emit(PlayerEvent::Ended);
            player.emit(tick(2.0));
            player.close();

            let document = session.run().await;
            settle().await;

            assert_eq!(store.write_count(), 4);
            let stored = stored_progress(&store).unwrap();
            assert_eq!(stored, document);
            let record = stored.get("grounding").unwrap();
            assert_eq!(record.title, "Grounding");
            assert_eq!(record.topics, vec!["grief".to_string(), "loss".to_string()]);
            assert!(record.started && record.completed);
            assert_eq!(record.percent_watched, 100);
            assert_eq!(record.last_position, 0.0);
            assert_eq!(page.notices(), vec![Notice::Completed]);
        })
        .await;
}

#[test(tokio::test)]
async fn write_failures_do_not_stop_tracking() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::with_member(member("mem_1"));
            store.set_fail_writes(true);
            let player = ScriptedPlayer::new(Some(100.0));
            let mut session = start(&store, page(), &player).await.unwrap();

            session.handle(PlayerEvent::Play).await;
            session.handle(pause(20.0)).await;
            settle().await;
            assert_eq!(store.write_count(), 0);
            assert_eq!(session.document().get("grounding").unwrap().percent_watched, 20);

            store.set_fail_writes(false);
            session.handle(pause(25.0)).await;
            settle().await;
            let stored = stored_progress(&store).unwrap();
            let record = stored.get("grounding").unwrap();
            assert!(record.started);
            assert_eq!(record.last_position, 25.0);
        })
        .await;
}

#[test(tokio::test)]
async fn missing_collaborators_never_start() {
    LocalSet::new()
        .run_until(async {
            let player = ScriptedPlayer::new(Some(100.0));

            let anonymous = MemoryMemberStore::anonymous();
            assert!(start(&anonymous, page(), &player).await.is_none());

            let store = MemoryMemberStore::with_member(member("mem_1"));
            let no_container = Rc::new(MemoryPage::new("/practice/grounding"));
            assert!(start(&store, no_container, &player).await.is_none());

            let bad_source = Rc::new(
                MemoryPage::new("/practice/grounding")
                    .with_player_source("https://example.com/v/1"),
            );
            assert!(start(&store, bad_source, &player).await.is_none());

            let no_id = Rc::new(MemoryPage::new("/").with_player_source(SOURCE));
            assert!(start(&store, no_id, &player).await.is_none());

            let offline = MemoryMemberStore::with_member(member("mem_1"));
            offline.set_fail_reads(true);
            assert!(start(&offline, page(), &player).await.is_none());

            let no_player: Option<Session> =
                PlaybackSession::start(doc_store(&store), page(), &ready(), |_| None).await;
            assert!(no_player.is_none());

            settle().await;
            assert_eq!(store.write_count(), 0);
            assert_eq!(anonymous.write_count(), 0);
        })
        .await;
}

#[test(tokio::test)]
async fn concurrent_tabs_last_write_wins() {
    LocalSet::new()
        .run_until(async {
            let store = MemoryMemberStore::with_member(member("mem_1"));
            let tab_a = Rc::new(MemoryPage::new("/practice/first").with_player_source(SOURCE));
            let tab_b = Rc::new(MemoryPage::new("/practice/second").with_player_source(SOURCE));
            let player_a = ScriptedPlayer::new(Some(100.0));
            let player_b = ScriptedPlayer::new(Some(100.0));

            // Both tabs read the (empty) document before either writes.
            let mut a = start(&store, tab_a, &player_a).await.unwrap();
            let mut b = start(&store, tab_b, &player_b).await.unwrap();

            a.handle(PlayerEvent::Play).await;
            settle().await;
            b.handle(PlayerEvent::Play).await;
            settle().await;

            let stored = stored_progress(&store).unwrap();
            assert!(stored.get("second").is_some());
            assert!(stored.get("first").is_none(), "tab A's edit is overwritten");
        })
        .await;
}
