//! In-process host implementations.
//!
//! [`MemoryPage`] and [`ScriptedPlayer`] stand in for the browser page and the embedded player
//! when the tracking core runs natively: in tests, in server-side previews, or in any embedding
//! that has no DOM. Together with [`crate::store::MemoryMemberStore`] they cover every host
//! trait. Handles share state through `Rc`, so a test keeps a clone and inspects what the core did.
use crate::{
    error::TrackingError,
    page::{Indicator, Notice, Page, StateRegion},
    playback::{Player, PlayerEvent},
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    stream::{self, LocalBoxStream},
    StreamExt,
};
use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::Rc,
};

/// Visible state of one in-memory indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSnapshot {
    pub visible: bool,
    pub not_started: bool,
    pub in_progress: bool,
    pub completed: bool,
    pub percent_text: Option<String>,
    pub bar_width: Option<u8>,
}

impl IndicatorSnapshot {
    /// Regions currently shown.
    pub fn shown(&self) -> Vec<StateRegion> {
        StateRegion::ALL
            .into_iter()
            .filter(|region| match region {
                StateRegion::NotStarted => self.not_started,
                StateRegion::InProgress => self.in_progress,
                StateRegion::Completed => self.completed,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryIndicator {
    key: Option<String>,
    topics: Vec<String>,
    state: Rc<RefCell<IndicatorSnapshot>>,
}

impl MemoryIndicator {
    pub fn new(key: Option<&str>, topics: &[&str]) -> Self {
        MemoryIndicator {
            key: key.map(str::to_string),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            state: Rc::new(RefCell::new(IndicatorSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.state.borrow().clone()
    }
}

impl Indicator for MemoryIndicator {
    fn key(&self) -> Option<String> {
        self.key.clone()
    }

    fn set_region_visible(&self, region: StateRegion, visible: bool) {
        let mut state = self.state.borrow_mut();
        match region {
            StateRegion::NotStarted => state.not_started = visible,
            StateRegion::InProgress => state.in_progress = visible,
            StateRegion::Completed => state.completed = visible,
        }
    }

    fn set_percent_text(&self, text: &str) {
        self.state.borrow_mut().percent_text = Some(text.to_string());
    }

    fn set_bar_width(&self, percent: u8) {
        self.state.borrow_mut().bar_width = Some(percent);
    }

    fn set_visible(&self, visible: bool) {
        self.state.borrow_mut().visible = visible;
    }
}

type Watchers = RefCell<Vec<UnboundedSender<MemoryIndicator>>>;

#[derive(Debug, Default)]
pub struct MemoryPage {
    path: RefCell<String>,
    title: RefCell<String>,
    topic_tags: RefCell<Vec<String>>,
    player_source: RefCell<Option<String>>,
    assets: RefCell<Vec<MemoryIndicator>>,
    topics: RefCell<Vec<MemoryIndicator>>,
    notices: RefCell<Vec<Notice>>,
    asset_watchers: Watchers,
    topic_watchers: Watchers,
}

impl MemoryPage {
    pub fn new(path: &str) -> Self {
        let page = MemoryPage::default();
        page.path.replace(path.to_string());
        page
    }

    pub fn with_title(self, title: &str) -> Self {
        self.title.replace(title.to_string());
        self
    }

    pub fn with_topic_tags(self, tags: &[&str]) -> Self {
        self.topic_tags
            .replace(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_player_source(self, source: &str) -> Self {
        self.player_source.replace(Some(source.to_string()));
        self
    }

    /// Insert an asset indicator, as a listing would, and notify active watches.
    pub fn add_asset_indicator(&self, asset_id: &str, topics: &[&str]) -> MemoryIndicator {
        let indicator = MemoryIndicator::new(Some(asset_id), topics);
        self.assets.borrow_mut().push(indicator.clone());
        broadcast(&self.asset_watchers, &indicator);
        indicator
    }

    pub fn add_topic_indicator(&self, topic: &str) -> MemoryIndicator {
        let indicator = MemoryIndicator::new(Some(topic), &[]);
        self.topics.borrow_mut().push(indicator.clone());
        broadcast(&self.topic_watchers, &indicator);
        indicator
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }
}

fn broadcast(watchers: &Watchers, indicator: &MemoryIndicator) {
    // Closed receivers are dropped watches.
    watchers
        .borrow_mut()
        .retain(|tx| tx.unbounded_send(indicator.clone()).is_ok());
}

fn watch(watchers: &Watchers) -> LocalBoxStream<'static, MemoryIndicator> {
    let (tx, rx) = unbounded();
    watchers.borrow_mut().push(tx);
    rx.boxed_local()
}

impl Page for MemoryPage {
    type Indicator = MemoryIndicator;

    fn location_path(&self) -> String {
        self.path.borrow().clone()
    }

    fn title(&self) -> String {
        self.title.borrow().clone()
    }

    fn topic_tags(&self) -> Vec<String> {
        self.topic_tags.borrow().clone()
    }

    fn player_source(&self) -> Option<String> {
        self.player_source.borrow().clone()
    }

    fn asset_indicators(&self) -> Vec<MemoryIndicator> {
        self.assets.borrow().clone()
    }

    fn topic_indicators(&self) -> Vec<MemoryIndicator> {
        self.topics.borrow().clone()
    }

    fn rendered_asset_count(&self, topic: &str) -> usize {
        self.assets
            .borrow()
            .iter()
            .filter(|indicator| indicator.topics.iter().any(|t| t == topic))
            .count()
    }

    fn notify(&self, notice: &Notice) {
        tracing::info!("[MemoryPage] {}", notice.message());
        self.notices.borrow_mut().push(notice.clone());
    }

    fn watch_asset_indicators(&self) -> LocalBoxStream<'static, MemoryIndicator> {
        watch(&self.asset_watchers)
    }

    fn watch_topic_indicators(&self) -> LocalBoxStream<'static, MemoryIndicator> {
        watch(&self.topic_watchers)
    }
}

/// Player whose events are pushed by the caller.
#[derive(Debug, Clone)]
pub struct ScriptedPlayer {
    duration: Option<f64>,
    fail_seek: Rc<Cell<bool>>,
    seeks: Rc<RefCell<Vec<f64>>>,
    tx: UnboundedSender<PlayerEvent>,
    rx: Rc<RefCell<Option<UnboundedReceiver<PlayerEvent>>>>,
}

impl ScriptedPlayer {
    /// `duration` of `None` models a player that cannot report it.
    pub fn new(duration: Option<f64>) -> Self {
        let (tx, rx) = unbounded();
        ScriptedPlayer {
            duration,
            fail_seek: Rc::new(Cell::new(false)),
            seeks: Rc::new(RefCell::new(Vec::new())),
            tx,
            rx: Rc::new(RefCell::new(Some(rx))),
        }
    }

    pub fn emit(&self, event: PlayerEvent) {
        // The receiver only goes away when the session ended.
        let _ = self.tx.unbounded_send(event);
    }

    /// End the event stream, as page teardown would.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    pub fn set_fail_seek(&self, fail: bool) {
        self.fail_seek.set(fail);
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.borrow().clone()
    }
}

impl Player for ScriptedPlayer {
    fn duration(&self) -> impl Future<Output = Result<f64, TrackingError>> {
        let duration = self
            .duration
            .ok_or_else(|| TrackingError::Player("duration unavailable".to_string()));
        async move { duration }
    }

    fn set_current_time(&self, seconds: f64) -> impl Future<Output = Result<(), TrackingError>> {
        let result = if self.fail_seek.get() {
            Err(TrackingError::Player("seek rejected".to_string()))
        } else {
            self.seeks.borrow_mut().push(seconds);
            Ok(())
        };
        async move { result }
    }

    fn events(&self) -> LocalBoxStream<'static, PlayerEvent> {
        match self.rx.borrow_mut().take() {
            Some(rx) => rx.boxed_local(),
            None => stream::empty().boxed_local(),
        }
    }
}
