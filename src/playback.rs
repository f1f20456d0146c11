//! Playback state machine and its per-page-view driver.
//!
//! [`PlaybackTracker`] is a pure state machine: it consumes [`PlayerEvent`]s and answers with the
//! [`Effect`]s the host must carry out (resume the player, show a notice, persist a patch). It
//! owns every policy decision (resume threshold, write throttle, completion threshold) and has
//! no I/O, so it is tested directly.
//!
//! [`PlaybackSession`] binds one tracker to one page view: it waits for readiness, resolves the
//! member, the asset identity and the player, then executes effects as events arrive. Any missing
//! collaborator (no member, no container, unparseable source, player that fails to initialise)
//! means the session never starts. That is a silent no-op, not an error.
//!
//! ```text
//!  NotStarted --play--> Started --timeupdate--> InProgress --percent >= threshold / ended--> Completed
//!                                                                                   (terminal)
//! ```
use crate::{
    config::TrackingConfig,
    document::{clamp_percent, AssetProgress, ProgressDocument},
    error::TrackingError,
    identity::AssetIdentity,
    merge::{apply_patch, AssetContext, ProgressPatch},
    page::{Notice, Page},
    schedule::{Readiness, Scheduler},
    source::PlayerSource,
    store::{DocumentStore, MemberStore},
};
use futures::{stream::LocalBoxStream, StreamExt};
use std::{future::Future, rc::Rc};

/// Events surfaced by the embedded player. Positions are media seconds; `fraction` is the
/// player's own 0..=1 progress estimate, used when the duration is unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    Play,
    TimeUpdate { seconds: f64, fraction: f64 },
    Pause { seconds: f64, fraction: f64 },
    Ended,
}

pub trait Player {
    fn duration(&self) -> impl Future<Output = Result<f64, TrackingError>>;

    fn set_current_time(&self, seconds: f64) -> impl Future<Output = Result<(), TrackingError>>;

    /// Event stream for this player. Called once per session.
    fn events(&self) -> LocalBoxStream<'static, PlayerEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    NotStarted,
    Started,
    InProgress,
    Completed,
}

impl PlaybackState {
    fn from_record(record: Option<&AssetProgress>) -> Self {
        match record {
            Some(r) if r.completed => PlaybackState::Completed,
            Some(r) if r.started => PlaybackState::InProgress,
            _ => PlaybackState::NotStarted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Seek the player to the saved position, then tell the viewer.
    Resume(f64),
    Notify(Notice),
    Persist(ProgressPatch),
}

#[derive(Debug, Clone)]
pub struct PlaybackTracker {
    state: PlaybackState,
    percent: u8,
    saved_position: f64,
    has_played: bool,
    last_save_position: f64,
    duration: Option<f64>,
    completion_threshold: u8,
    save_interval: f64,
    resume_threshold: f64,
}

impl PlaybackTracker {
    /// Tracker for an asset whose stored record (if any) is `record`.
    pub fn new(config: &TrackingConfig, record: Option<&AssetProgress>) -> Self {
        PlaybackTracker {
            state: PlaybackState::from_record(record),
            percent: record.map(|r| r.percent_watched).unwrap_or(0),
            saved_position: record.map(|r| r.last_position).unwrap_or(0.0),
            has_played: false,
            last_save_position: 0.0,
            duration: None,
            completion_threshold: config.completion_threshold,
            save_interval: config.save_interval_seconds,
            resume_threshold: config.resume_threshold_seconds,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn set_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
        }
    }

    pub fn handle(&mut self, event: PlayerEvent) -> Vec<Effect> {
        match event {
            PlayerEvent::Play => self.on_play(),
            PlayerEvent::TimeUpdate { seconds, fraction } => self.on_time_update(seconds, fraction),
            PlayerEvent::Pause { seconds, fraction } => self.on_pause(seconds, fraction),
            PlayerEvent::Ended => {
                if self.state == PlaybackState::Completed {
                    Vec::new()
                } else {
                    self.complete()
                }
            }
        }
    }

    fn on_play(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.has_played {
            self.has_played = true;
            // A completed record has no resume position, so this never fires for it.
            if self.state != PlaybackState::Completed && self.saved_position > self.resume_threshold
            {
                tracing::debug!("[Playback] resuming from {}s", self.saved_position);
                effects.push(Effect::Resume(self.saved_position));
            }
        }
        if self.state == PlaybackState::NotStarted {
            self.state = PlaybackState::Started;
        }
        effects.push(Effect::Persist(ProgressPatch::started()));
        effects
    }

    fn on_time_update(&mut self, seconds: f64, fraction: f64) -> Vec<Effect> {
        if self.state == PlaybackState::Completed {
            return Vec::new();
        }
        let percent = self.observe(seconds, fraction);
        if percent >= self.completion_threshold {
            return self.complete();
        }
        if seconds - self.last_save_position >= self.save_interval {
            self.last_save_position = seconds;
            return vec![Effect::Persist(ProgressPatch::position(seconds, percent))];
        }
        Vec::new()
    }

    fn on_pause(&mut self, seconds: f64, fraction: f64) -> Vec<Effect> {
        if self.state == PlaybackState::Completed {
            return Vec::new();
        }
        let percent = self.observe(seconds, fraction);
        if percent >= self.completion_threshold {
            return self.complete();
        }
        self.last_save_position = seconds;
        vec![Effect::Persist(ProgressPatch::position(seconds, percent))]
    }

    fn observe(&mut self, seconds: f64, fraction: f64) -> u8 {
        let percent = match self.duration {
            Some(duration) => clamp_percent(seconds / duration * 100.0),
            None => clamp_percent(fraction * 100.0),
        };
        self.percent = percent;
        if matches!(self.state, PlaybackState::NotStarted | PlaybackState::Started) {
            self.state = PlaybackState::InProgress;
        }
        percent
    }

    fn complete(&mut self) -> Vec<Effect> {
        tracing::debug!("[Playback] completed");
        self.state = PlaybackState::Completed;
        self.percent = 100;
        self.saved_position = 0.0;
        vec![
            Effect::Persist(ProgressPatch::completed()),
            Effect::Notify(Notice::Completed),
        ]
    }
}

/// One tracked playback for one page view.
pub struct PlaybackSession<S, X, P, Pl> {
    docs: DocumentStore<S, X>,
    page: Rc<P>,
    player: Pl,
    identity: AssetIdentity,
    title: String,
    document: ProgressDocument,
    tracker: PlaybackTracker,
}

impl<S, X, P, Pl> PlaybackSession<S, X, P, Pl>
where
    S: MemberStore,
    X: Scheduler,
    P: Page,
    Pl: Player,
{
    /// Resolve everything a session needs. `None` means tracking stays off for this page view.
    ///
    /// `connect` builds the player for the parsed source; returning `None` signals that the
    /// player could not be initialised.
    pub async fn start<C>(
        docs: DocumentStore<S, X>,
        page: Rc<P>,
        readiness: &Readiness,
        connect: C,
    ) -> Option<Self>
    where
        C: FnOnce(&PlayerSource) -> Option<Pl>,
    {
        readiness.wait().await;
        let member = match docs.current_member().await {
            Ok(Some(member)) => member,
            Ok(None) => {
                tracing::debug!("[Playback] no member logged in");
                return None;
            }
            Err(e) if e.disables_tracking() => {
                tracing::warn!("[Playback] member store unavailable, tracking disabled: {e}");
                return None;
            }
            Err(e) => {
                tracing::debug!("[Playback] could not read member, treating as anonymous: {e}");
                return None;
            }
        };

        let identity = AssetIdentity::resolve(page.as_ref());
        if identity.is_empty() {
            tracing::debug!("[Playback] no asset id in location");
            return None;
        }
        let Some(reference) = page.player_source() else {
            tracing::debug!("[Playback] no player container");
            return None;
        };
        let Some(source) = PlayerSource::parse(&reference) else {
            tracing::debug!("[Playback] could not parse player source {reference:?}");
            return None;
        };
        let Some(player) = connect(&source) else {
            tracing::debug!("[Playback] player did not initialise");
            return None;
        };

        let document = docs.load_progress(&member);
        let mut tracker = PlaybackTracker::new(docs.config(), document.get(&identity.asset_id));
        match player.duration().await {
            Ok(duration) => tracker.set_duration(duration),
            Err(e) => tracing::debug!("[Playback] duration unavailable: {e}"),
        }
        tracing::info!(
            "[Playback] tracking '{}' for member {} (state {:?})",
            identity.asset_id,
            member.id,
            tracker.state()
        );
        Some(PlaybackSession {
            docs,
            title: page.title(),
            page,
            player,
            identity,
            document,
            tracker,
        })
    }

    pub fn tracker(&self) -> &PlaybackTracker {
        &self.tracker
    }

    pub fn document(&self) -> &ProgressDocument {
        &self.document
    }

    /// Consume player events until the stream ends (page teardown).
    pub async fn run(mut self) -> ProgressDocument {
        let mut events = self.player.events();
        while let Some(event) = events.next().await {
            self.handle(event).await;
        }
        self.document
    }

    pub async fn handle(&mut self, event: PlayerEvent) {
        for effect in self.tracker.handle(event) {
            match effect {
                Effect::Resume(seconds) => match self.player.set_current_time(seconds).await {
                    Ok(()) => self.page.notify(&Notice::Resumed(seconds)),
                    Err(e) => tracing::debug!("[Playback] resume seek failed: {e}"),
                },
                Effect::Notify(notice) => self.page.notify(&notice),
                Effect::Persist(patch) => self.persist(&patch),
            }
        }
    }

    fn persist(&mut self, patch: &ProgressPatch) {
        let ctx = AssetContext {
            id: &self.identity.asset_id,
            title: &self.title,
            topics: &self.identity.topics,
        };
        let record = apply_patch(&mut self.document, ctx, patch);
        tracing::debug!("[Playback] updated {record:?}");
        self.docs.persist_progress(&self.document);
    }
}
