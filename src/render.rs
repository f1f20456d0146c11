//! Rendering sync loop.
//!
//! Keeps every on-page indicator consistent with the latest known progress document. Each
//! indicator shows exactly one of three states (not started, in progress with a percent label
//! and a proportional bar, completed). Passes are idempotent: rendering the same document twice
//! leaves the page exactly as one pass did.
//!
//! Indicators may not exist yet when the page view starts, since an external listing renders
//! them asynchronously. A refresh therefore polls for them with a bounded retry and then gives
//! up silently. A standing watch on inserted indicators re-runs the pass for every late arrival.
//! Refreshes triggered by page-level signals (readiness, page-show, focus, visibility) go
//! through a leading debounce so a burst of signals costs one store read.
use crate::{
    document::{AssetProgress, ProgressDocument},
    page::{Indicator, Page, StateRegion},
    schedule::{retry_until, Readiness, Scheduler},
    store::{DocumentStore, Member, MemberStore},
    topics,
};
use futures::{
    future::{self, Either},
    stream::{self, LocalBoxStream},
    StreamExt,
};
use std::{
    cell::{Cell, RefCell},
    pin::pin,
    rc::Rc,
    time::Duration,
};

/// What one indicator should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorView {
    NotStarted,
    InProgress { percent: u8, label: String },
    Completed,
}

impl IndicatorView {
    pub fn for_asset(record: Option<&AssetProgress>) -> Self {
        match record {
            Some(r) if r.completed => IndicatorView::Completed,
            Some(r) if r.started => IndicatorView::InProgress {
                percent: r.percent_watched,
                label: format!("{}%", r.percent_watched),
            },
            _ => IndicatorView::NotStarted,
        }
    }

    pub fn region(&self) -> StateRegion {
        match self {
            IndicatorView::NotStarted => StateRegion::NotStarted,
            IndicatorView::InProgress { .. } => StateRegion::InProgress,
            IndicatorView::Completed => StateRegion::Completed,
        }
    }

    pub fn apply<I: Indicator>(&self, indicator: &I) {
        let shown = self.region();
        for region in StateRegion::ALL {
            indicator.set_region_visible(region, region == shown);
        }
        if let IndicatorView::InProgress { percent, label } = self {
            indicator.set_percent_text(label);
            indicator.set_bar_width(*percent);
        }
        indicator.set_visible(true);
    }
}

/// Render `doc` onto the given asset indicators. Returns how many were updated.
pub fn render_assets<I: Indicator>(doc: &ProgressDocument, indicators: &[I]) -> usize {
    let mut rendered = 0;
    for indicator in indicators {
        let Some(id) = indicator.key().filter(|id| !id.is_empty()) else {
            continue;
        };
        IndicatorView::for_asset(doc.get(&id)).apply(indicator);
        rendered += 1;
    }
    rendered
}

/// Page-level signals that ask for a fresh read of the member document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Ready,
    PageShow,
    Focus,
    Visible,
}

enum Signal {
    Refresh(SyncTrigger),
    Inserted,
}

pub struct SyncLoop<S, X, P> {
    docs: DocumentStore<S, X>,
    page: Rc<P>,
    last_pass: Cell<Option<Duration>>,
    member: RefCell<Option<Member>>,
    document: RefCell<ProgressDocument>,
}

impl<S, X, P> SyncLoop<S, X, P>
where
    S: MemberStore,
    X: Scheduler,
    P: Page,
{
    pub fn new(docs: DocumentStore<S, X>, page: Rc<P>) -> Self {
        SyncLoop {
            docs,
            page,
            last_pass: Cell::new(None),
            member: RefCell::new(None),
            document: RefCell::new(ProgressDocument::default()),
        }
    }

    /// Latest document this loop rendered.
    pub fn document(&self) -> ProgressDocument {
        self.document.borrow().clone()
    }

    /// One full pass over the indicators currently on the page, using the cached document.
    ///
    /// Returns the number of indicators updated.
    pub fn render_now(&self) -> usize {
        let assets = self.page.asset_indicators();
        let topic_indicators = self.page.topic_indicators();
        let rendered = {
            let doc = self.document.borrow();
            render_assets(&doc, &assets)
        };
        let (topic_count, totals) = {
            let doc = self.document.borrow();
            topics::render_topics(&doc, &topic_indicators, |topic| {
                self.page.rendered_asset_count(topic)
            })
        };
        tracing::debug!(
            "[SyncLoop] rendered {rendered} asset and {topic_count} topic indicators"
        );
        if !totals.is_empty() && self.member.borrow().is_some() {
            let mut doc = self.document.borrow_mut();
            doc.topic_totals.extend(totals);
            tracing::debug!("[SyncLoop] topic totals changed: {:?}", doc.topic_totals);
            self.docs.persist_progress(&doc);
        }
        rendered + topic_count
    }

    /// Wait (bounded) for indicators to exist, then render. `false` if none ever appeared.
    pub async fn wait_and_render(&self) -> bool {
        let config = self.docs.config();
        let page = self.page.clone();
        let found = retry_until(
            self.docs.scheduler(),
            config.retry_attempts,
            config.retry_delay(),
            || {
                let count = page.asset_indicators().len() + page.topic_indicators().len();
                (count > 0).then_some(count)
            },
        )
        .await;
        match found.found() {
            Some(count) => {
                tracing::trace!("[SyncLoop] found {count} indicators");
                self.render_now();
                true
            }
            None => {
                tracing::debug!("[SyncLoop] no indicators appeared, giving up");
                false
            }
        }
    }

    /// Re-read the member document and render it, unless a pass ran within the debounce window.
    ///
    /// Returns whether the pass ran.
    pub async fn refresh(&self, trigger: SyncTrigger) -> bool {
        let now = self.docs.scheduler().now();
        if let Some(last) = self.last_pass.get() {
            if now.saturating_sub(last) < self.docs.config().debounce() {
                tracing::trace!("[SyncLoop] skipping {trigger:?}, too soon");
                return false;
            }
        }
        self.last_pass.set(Some(now));
        tracing::debug!("[SyncLoop] refresh on {trigger:?}");

        let member = match self.docs.current_member().await {
            Ok(member) => member,
            Err(e) if e.disables_tracking() => {
                tracing::warn!("[SyncLoop] member store unavailable, keeping last render: {e}");
                return false;
            }
            Err(e) => {
                tracing::debug!("[SyncLoop] could not read member, rendering defaults: {e}");
                None
            }
        };
        let document = match &member {
            Some(member) => self.docs.load_progress(member),
            None => {
                tracing::debug!("[SyncLoop] no member");
                ProgressDocument::default()
            }
        };
        *self.member.borrow_mut() = member;
        *self.document.borrow_mut() = document;
        self.wait_and_render().await;
        true
    }

    /// Drive the loop for the lifetime of the page view.
    ///
    /// Renders the empty document as soon as indicators exist (bounded wait), refreshes once
    /// `readiness` fires, then reacts to
    /// page-level `triggers` and to indicators inserted later. Returns when every input stream
    /// has ended.
    pub async fn run(&self, readiness: &Readiness, triggers: LocalBoxStream<'_, SyncTrigger>) {
        let inserted_assets = self.page.watch_asset_indicators().map(|_| Signal::Inserted);
        let inserted_topics = self.page.watch_topic_indicators().map(|_| Signal::Inserted);
        let mut signals = stream::select(
            triggers.map(Signal::Refresh),
            stream::select(inserted_assets, inserted_topics),
        );

        // Defaults go up once indicators exist; readiness cuts the wait short.
        let initial = pin!(self.wait_and_render());
        let ready = pin!(readiness.wait());
        match future::select(initial, ready).await {
            Either::Left((_, ready)) => ready.await,
            Either::Right(((), _)) => {
                tracing::trace!("[SyncLoop] ready before any indicator appeared");
            }
        }
        self.refresh(SyncTrigger::Ready).await;

        while let Some(signal) = signals.next().await {
            match signal {
                Signal::Refresh(trigger) => {
                    self.refresh(trigger).await;
                }
                Signal::Inserted => {
                    tracing::trace!("[SyncLoop] indicator inserted");
                    self.render_now();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_views_follow_record_state() {
        assert_eq!(IndicatorView::for_asset(None), IndicatorView::NotStarted);
        let mut record = AssetProgress::new("a", "A");
        record.percent_watched = 30;
        assert_eq!(IndicatorView::for_asset(Some(&record)), IndicatorView::NotStarted);
        record.started = true;
        assert_eq!(
            IndicatorView::for_asset(Some(&record)),
            IndicatorView::InProgress {
                percent: 30,
                label: "30%".to_string()
            }
        );
        record.completed = true;
        assert_eq!(IndicatorView::for_asset(Some(&record)), IndicatorView::Completed);
    }
}
