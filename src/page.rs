//! Host page contract.
//!
//! The tracking core never touches a DOM directly. A [`Page`] exposes the few structural facts the
//! core needs (navigation path, title, topic tags, indicator elements) and an [`Indicator`]
//! exposes the three mutually exclusive state regions of one progress widget. The browser
//! implementation lives in `crate::wasm`; [`crate::memory`] has an in-process one.
use futures::stream::LocalBoxStream;

/// The three mutually exclusive visual states of an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateRegion {
    NotStarted,
    InProgress,
    Completed,
}

impl StateRegion {
    pub const ALL: [StateRegion; 3] = [
        StateRegion::NotStarted,
        StateRegion::InProgress,
        StateRegion::Completed,
    ];
}

/// Transient, viewer-facing notices.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Playback jumped to a previously saved position (seconds).
    Resumed(f64),
    Completed,
    DownloadTracked,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Resumed(seconds) => format!("Resuming from {}", format_time(*seconds)),
            Notice::Completed => "Video completed! \u{2713}".to_string(),
            Notice::DownloadTracked => "Download tracked \u{2713}".to_string(),
        }
    }
}

/// `m:ss` rendering of a media position.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// One progress widget on the page, for an asset or for a topic.
///
/// Handles are cheap references into the host document, so every mutator takes `&self`.
pub trait Indicator {
    /// Asset id or topic id this widget is bound to, if the marker attribute is present.
    fn key(&self) -> Option<String>;

    fn set_region_visible(&self, region: StateRegion, visible: bool);

    /// Text of the percent label inside the in-progress region.
    fn set_percent_text(&self, text: &str);

    /// Width of the bar inside the in-progress region, in percent of its track.
    fn set_bar_width(&self, percent: u8);

    /// Whole-widget visibility. Widgets start hidden until the first render decides a state.
    fn set_visible(&self, visible: bool);
}

pub trait Page {
    type Indicator: Indicator + 'static;

    /// Path component of the current navigation location.
    fn location_path(&self) -> String;

    fn title(&self) -> String;

    /// Values of every topic-tag marker attribute, in document order, duplicates included.
    fn topic_tags(&self) -> Vec<String>;

    /// Reference to the hosted video for the player container, if the page has one.
    fn player_source(&self) -> Option<String>;

    fn asset_indicators(&self) -> Vec<Self::Indicator>;

    fn topic_indicators(&self) -> Vec<Self::Indicator>;

    /// Number of asset entries the listing currently renders for `topic`.
    fn rendered_asset_count(&self, topic: &str) -> usize;

    fn notify(&self, notice: &Notice);

    /// Stream yielding every asset indicator inserted after the call. Dropping the stream ends
    /// the watch.
    fn watch_asset_indicators(&self) -> LocalBoxStream<'static, Self::Indicator>;

    /// Same as [`Page::watch_asset_indicators`] for topic indicators.
    fn watch_topic_indicators(&self) -> LocalBoxStream<'static, Self::Indicator>;
}
