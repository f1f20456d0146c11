//! # lab-progress
//!
//! Client-embedded progress tracking for a video learning portal.
//!
//! ## Overview
//!
//! For each video a member watches, lab-progress observes the embedded player, derives
//! normalized progress, persists it into the member's profile store, and reflects the stored
//! state back into on-page progress indicators. The store offers whole-field reads and writes
//! only, never merges, so every write is a read-modify-write of a whole JSON document.
//!
//! ### Key Features
//!
//! - **Playback state machine**: not started → started → in progress → completed, with resume,
//!   throttled write-through and monotonic completion
//! - **Field-level merge**: updates touch only the fields they carry, topics are assigned once
//! - **Fire-and-forget persistence**: failures are logged, never retried, never block tracking
//! - **Rendering sync loop**: idempotent passes, bounded readiness polling, a standing watch
//!   for late indicators, and a leading debounce for refocus/visibility bursts
//! - **Activity counters**: download and outbound click counts in a second document
//! - **Topic roll-ups**: per-topic completion with an opportunistically cached expected total
//!
//! ## Architecture
//!
//! Host interaction is behind traits so the same core runs natively and in the browser:
//!
//! - **[`store::MemberStore`]**: the remote member profile store
//! - **[`page::Page`]** / **[`page::Indicator`]**: the DOM structural contract
//! - **[`playback::Player`]**: the embedded player
//! - **[`schedule::Scheduler`]**: clock, timers and local task spawning
//!
//! In-process implementations live in [`memory`] and [`store::MemoryMemberStore`]; the browser
//! implementations are in `wasm` (feature `wasm`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lab_progress::{
//!     config::TrackingConfig,
//!     memory::{MemoryPage, ScriptedPlayer},
//!     playback::{PlaybackSession, PlayerEvent},
//!     schedule::{Readiness, TokioScheduler},
//!     store::{DocumentStore, Member, MemoryMemberStore},
//! };
//! use std::rc::Rc;
//!
//! # async fn example() {
//! let store = MemoryMemberStore::with_member(Member { id: "mem_1".into(), ..Default::default() });
//! let docs = DocumentStore::new(store, TokioScheduler::default(), Rc::new(TrackingConfig::default()));
//! let page = Rc::new(
//!     MemoryPage::new("/practice/grounding").with_player_source("https://vimeo.com/1154941604"),
//! );
//! let player = ScriptedPlayer::new(Some(300.0));
//! let ready = Readiness::new();
//! ready.fire();
//!
//! let events = player.clone();
//! if let Some(session) = PlaybackSession::start(docs, page, &ready, |_| Some(player)).await {
//!     events.emit(PlayerEvent::Play);
//!     events.close();
//!     let document = session.run().await;
//!     assert!(document.get("grounding").unwrap().started);
//! }
//! # }
//! ```
//!
//! ## Consistency
//!
//! Each page view holds its own copy of the member's document, read once at load time. Writes
//! from two tabs race at document granularity and the last write the store observes wins. The
//! worst case is a lost progress tick, which is accepted.
//!
//! ## Features
//!
//! - **default**: host-independent core, tokio scheduler on native targets
//! - **wasm**: browser bindings (`web-sys` page, JS member store and player)

pub mod activity;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod memory;
pub mod merge;
pub mod page;
pub mod playback;
pub mod render;
pub mod schedule;
pub mod source;
pub mod store;
#[cfg(test)]
mod tests;
pub mod topics;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use error::*;
