//! Browser bindings for lab-progress
//!
//! Binds the tracking core to a live page: the DOM (through `web-sys`), the member profile store
//! SDK exposed on `window`, and the hosted-video player SDK. Each script-tag integration calls
//! one entry point once per page view:
//!
//! ```javascript,ignore
//! import init, { startPlayback, startSync, startActivityTracking } from './lab_progress.js';
//!
//! await init();
//! // Video page: mounts the player frame and tracks progress.
//! startPlayback({ tracking: { completion_threshold: 90 } });
//! // Listing or topic page: keeps progress indicators in sync.
//! startSync();
//! // Any page with tracked downloads / outbound links.
//! startActivityTracking();
//! ```
//!
//! All three return immediately and do their work on the browser event loop. Nothing here ever
//! throws into the page: invalid options or a missing collaborator (no member, no SDK, no
//! markup) leave tracking off for the page view and are only logged.
//!
//! ## Markup contract
//!
//! | Element                              | Meaning                                      |
//! |--------------------------------------|----------------------------------------------|
//! | `.vimeo-player[data-vimeo-url]`      | Player container with the share link         |
//! | `[data-topic-slug]`                  | Topic tag (video page) or topic card key     |
//! | `[data-video-id]`                    | Asset card on a listing                      |
//! | `[data-topic-status]`                | Topic roll-up indicator                      |
//! | `.asset_progress-item`               | State region; `.is-in-progress`, `.is-complete` mark the other two |
//! | `[data-track='download']`            | Tracked download (`data-track-slug`, `data-track-name`) |
//! | `[data-track='external-link']`       | Tracked outbound link (`href` or `data-track-url`) |
//!
//! Thresholds and store keys go under the `tracking` key of the options object, selectors under
//! `selectors`, and the `window` property holding the member store SDK under `store_global`.
//!
//! # Rust→JavaScript objects
//!
//! `serde_wasm_bindgen::to_value` turns `BTreeMap`s into JavaScript `Map`s, which the member store
//! SDK does not accept. Field updates are therefore built as plain objects with `Reflect::set`.

use crate::{
    activity::{ActivityKind, ActivityTracker, TrackTarget},
    config::TrackingConfig,
    error::TrackingError,
    page::{Indicator, Notice, Page, StateRegion},
    playback::{PlaybackSession, Player, PlayerEvent},
    render::{SyncLoop, SyncTrigger},
    schedule::{retry_until, Readiness, Scheduler},
    source::PlayerSource,
    store::{DocumentStore, Member, MemberStore},
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    stream::{LocalBoxStream, Stream},
    StreamExt,
};
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    rc::Rc,
    sync::Once,
    task::{Context, Poll},
    time::Duration,
};
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, Element, EventTarget, HtmlElement, HtmlIFrameElement, MutationObserver,
    MutationObserverInit, MutationRecord, Window,
};

const TOAST_STYLE: &str = "position:fixed;bottom:20px;right:20px;background:#4A3AFF;color:white;\
padding:12px 24px;border-radius:8px;z-index:9999;font-family:sans-serif;font-size:14px;\
box-shadow:0 4px 12px rgba(0,0,0,0.15);";
const TOAST_MILLIS: i32 = 3000;
const FRAME_STYLE: &str = "position:absolute;top:0;left:0;width:100%;height:100%;";

static LOGGING: Once = Once::new();

/// Route `tracing` output to the browser console. Safe to call more than once.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging() {
    LOGGING.call_once(|| {
        let config = tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::DEBUG)
            .build();
        tracing_wasm::set_as_global_default_with_config(config);
    });
}

fn window() -> Result<Window, TrackingError> {
    web_sys::window().ok_or_else(|| TrackingError::Host("no window".to_string()))
}

fn document() -> Result<Document, TrackingError> {
    window()?
        .document()
        .ok_or_else(|| TrackingError::Host("no document".to_string()))
}

fn is_missing(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

/// Scheduler on the browser event loop: `Date.now()`, `setTimeout` and microtask spawning.
#[derive(Debug, Clone)]
pub struct BrowserScheduler {
    origin: f64,
}

impl Default for BrowserScheduler {
    fn default() -> Self {
        BrowserScheduler {
            origin: js_sys::Date::now(),
        }
    }
}

impl Scheduler for BrowserScheduler {
    fn now(&self) -> Duration {
        Duration::from_secs_f64((js_sys::Date::now() - self.origin).max(0.0) / 1000.0)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let promise = Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window().and_then(|w| {
                w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
                    .ok()
            });
            if scheduled.is_none() {
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        async move {
            let _ = JsFuture::from(promise).await;
        }
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        spawn_local(fut);
    }
}

/// CSS selectors and attribute names of the markup contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomSelectors {
    pub player: String,
    pub player_source_attr: String,
    pub topic_tag_attr: String,
    pub asset_card_attr: String,
    pub asset_status: String,
    pub topic_status_attr: String,
    pub topic_card: String,
    pub region: String,
    pub in_progress: String,
    pub completed: String,
    pub asset_bar: String,
    pub topic_bar: String,
    /// Elements inside the in-progress region that are never the percent label.
    pub label_exclude: String,
}

impl Default for DomSelectors {
    fn default() -> Self {
        DomSelectors {
            player: ".vimeo-player".to_string(),
            player_source_attr: "data-vimeo-url".to_string(),
            topic_tag_attr: "data-topic-slug".to_string(),
            asset_card_attr: "data-video-id".to_string(),
            asset_status: ".video-status".to_string(),
            topic_status_attr: "data-topic-status".to_string(),
            topic_card: ".w-dyn-item".to_string(),
            region: ".asset_progress-item".to_string(),
            in_progress: ".is-in-progress".to_string(),
            completed: ".is-complete".to_string(),
            asset_bar: ".div-block-4".to_string(),
            topic_bar: ".div-block-5".to_string(),
            label_exclude: ".asset_progress-icon-block, .asset_progress-bar".to_string(),
        }
    }
}

impl DomSelectors {
    fn not_started(&self) -> String {
        format!(
            "{}:not({}):not({})",
            self.region, self.in_progress, self.completed
        )
    }

    fn region(&self, region: StateRegion) -> String {
        match region {
            StateRegion::NotStarted => self.not_started(),
            StateRegion::InProgress => self.in_progress.clone(),
            StateRegion::Completed => self.completed.clone(),
        }
    }
}

/// Options accepted by every entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub tracking: TrackingConfig,
    pub selectors: DomSelectors,
    /// `window` property holding the member store SDK.
    pub store_global: Option<String>,
}

impl BrowserOptions {
    fn from_js(options: JsValue) -> Result<Self, TrackingError> {
        let options: BrowserOptions = if is_missing(&options) {
            BrowserOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options)?
        };
        options.tracking.validate()?;
        Ok(options)
    }

    fn store_global(&self) -> &str {
        self.store_global.as_deref().unwrap_or("$memberstackDom")
    }
}

fn select_all(root: &Element, selector: &str) -> Vec<Element> {
    root.query_selector_all(selector)
        .map(|list| {
            (0..list.length())
                .filter_map(|i| list.get(i))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn select_document(document: &Document, selector: &str) -> Vec<Element> {
    document
        .document_element()
        .map(|root| select_all(&root, selector))
        .unwrap_or_default()
}

fn set_style(element: &Element, property: &str, value: &str) {
    if let Some(element) = element.dyn_ref::<HtmlElement>() {
        let _ = element.style().set_property(property, value);
    }
}

fn display(visible: bool) -> &'static str {
    if visible {
        "flex"
    } else {
        "none"
    }
}

/// Text nodes that currently read as a number are the percent label.
fn is_percent_label(element: &Element) -> bool {
    element
        .text_content()
        .map(|text| text.trim_start().starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// One indicator in the DOM: the element whose state regions get toggled, plus its key.
#[derive(Debug, Clone)]
pub struct DomIndicator {
    root: Element,
    key: Option<String>,
    bar: String,
    selectors: Rc<DomSelectors>,
}

impl DomIndicator {
    /// `None` for a card without a status region; the card itself is never restyled.
    fn asset(card: &Element, selectors: &Rc<DomSelectors>) -> Option<Self> {
        let root = card.query_selector(&selectors.asset_status).ok().flatten()?;
        Some(DomIndicator {
            root,
            key: card.get_attribute(&selectors.asset_card_attr),
            bar: selectors.asset_bar.clone(),
            selectors: selectors.clone(),
        })
    }

    fn topic(wrapper: &Element, selectors: &Rc<DomSelectors>) -> Self {
        let card = wrapper
            .closest(&selectors.topic_card)
            .ok()
            .flatten()
            .or_else(|| wrapper.parent_element());
        let key = card.and_then(|card| {
            card.query_selector(&format!("[{}]", selectors.topic_tag_attr))
                .ok()
                .flatten()
                .and_then(|tag| tag.get_attribute(&selectors.topic_tag_attr))
                .or_else(|| card.get_attribute(&selectors.topic_tag_attr))
        });
        DomIndicator {
            root: wrapper.clone(),
            key,
            bar: selectors.topic_bar.clone(),
            selectors: selectors.clone(),
        }
    }

    fn in_progress(&self) -> Vec<Element> {
        select_all(&self.root, &self.selectors.in_progress)
    }
}

impl Indicator for DomIndicator {
    fn key(&self) -> Option<String> {
        self.key.clone()
    }

    fn set_region_visible(&self, region: StateRegion, visible: bool) {
        for element in select_all(&self.root, &self.selectors.region(region)) {
            set_style(&element, "display", display(visible));
        }
    }

    fn set_percent_text(&self, text: &str) {
        for region in self.in_progress() {
            let labels = select_all(&region, "div").into_iter().filter(|e| {
                !e.matches(&self.selectors.label_exclude).unwrap_or(false) && is_percent_label(e)
            });
            for label in labels {
                label.set_text_content(Some(text));
            }
        }
    }

    fn set_bar_width(&self, percent: u8) {
        for region in self.in_progress() {
            for bar in select_all(&region, &self.bar) {
                set_style(&bar, "width", &format!("{percent}%"));
            }
        }
    }

    fn set_visible(&self, visible: bool) {
        set_style(&self.root, "display", display(visible));
    }
}

#[derive(Debug, Clone, Copy)]
enum IndicatorKind {
    Asset,
    Topic,
}

/// Indicators inserted after the watch started. Disconnects its observer when dropped.
struct InsertionWatch {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
    rx: UnboundedReceiver<DomIndicator>,
}

impl Stream for InsertionWatch {
    type Item = DomIndicator;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<DomIndicator>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl Drop for InsertionWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

pub struct DomPage {
    document: Document,
    selectors: Rc<DomSelectors>,
}

impl DomPage {
    pub fn new(selectors: DomSelectors) -> Result<Self, TrackingError> {
        Ok(DomPage {
            document: document()?,
            selectors: Rc::new(selectors),
        })
    }

    fn attr_selector(attr: &str) -> String {
        format!("[{attr}]")
    }

    fn card_topics(&self, card: &Element) -> Vec<String> {
        let attr = &self.selectors.topic_tag_attr;
        select_all(card, &Self::attr_selector(attr))
            .iter()
            .filter_map(|tag| tag.get_attribute(attr))
            .chain(card.get_attribute(attr))
            .collect()
    }

    fn indicators_in(&self, element: &Element, kind: IndicatorKind) -> Vec<DomIndicator> {
        let attr = match kind {
            IndicatorKind::Asset => &self.selectors.asset_card_attr,
            IndicatorKind::Topic => &self.selectors.topic_status_attr,
        };
        let selector = Self::attr_selector(attr);
        let mut found: Vec<Element> = Vec::new();
        if element.matches(&selector).unwrap_or(false) {
            found.push(element.clone());
        }
        found.extend(select_all(element, &selector));
        found
            .iter()
            .filter_map(|el| match kind {
                IndicatorKind::Asset => DomIndicator::asset(el, &self.selectors),
                IndicatorKind::Topic => Some(DomIndicator::topic(el, &self.selectors)),
            })
            .collect()
    }

    fn watch(&self, kind: IndicatorKind) -> LocalBoxStream<'static, DomIndicator> {
        let (tx, rx) = unbounded::<DomIndicator>();
        let page = DomPage {
            document: self.document.clone(),
            selectors: self.selectors.clone(),
        };
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _observer: MutationObserver| {
                for record in records.iter() {
                    let Ok(record) = record.dyn_into::<MutationRecord>() else {
                        continue;
                    };
                    let added = record.added_nodes();
                    for node in (0..added.length()).filter_map(|i| added.get(i)) {
                        let Ok(element) = node.dyn_into::<Element>() else {
                            continue;
                        };
                        for indicator in page.indicators_in(&element, kind) {
                            let _ = tx.unbounded_send(indicator);
                        }
                    }
                }
            },
        );
        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                tracing::warn!("[DomPage] cannot create insertion watch: {e:?}");
                return futures::stream::empty().boxed_local();
            }
        };
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let target = self.document.body().map(Element::from);
        let observed = target.map(|body| observer.observe_with_options(&body, &init));
        if !matches!(observed, Some(Ok(()))) {
            tracing::warn!("[DomPage] cannot observe document body");
            return futures::stream::empty().boxed_local();
        }
        InsertionWatch {
            observer,
            _callback: callback,
            rx,
        }
        .boxed_local()
    }

    fn toast(&self, message: &str) -> Result<(), TrackingError> {
        let toast = self.document.create_element("div")?;
        toast.set_attribute("style", TOAST_STYLE)?;
        toast.set_text_content(Some(message));
        let body = self
            .document
            .body()
            .ok_or_else(|| TrackingError::Host("no body".to_string()))?;
        body.append_child(&toast)?;
        let dismiss = Closure::once_into_js(move || toast.remove());
        window()?.set_timeout_with_callback_and_timeout_and_arguments_0(
            dismiss.unchecked_ref(),
            TOAST_MILLIS,
        )?;
        Ok(())
    }

    /// Replace the player container's content with the embed frame for `source`.
    pub fn mount_player(&self, source: &PlayerSource) -> Result<HtmlIFrameElement, TrackingError> {
        let container = self
            .document
            .query_selector(&self.selectors.player)?
            .ok_or_else(|| TrackingError::NotFound(self.selectors.player.clone()))?;
        let frame: HtmlIFrameElement = self
            .document
            .create_element("iframe")?
            .dyn_into()
            .map_err(|_| TrackingError::Host("iframe element expected".to_string()))?;
        frame.set_src(&source.embed_url());
        frame.set_attribute("style", FRAME_STYLE)?;
        frame.set_attribute("frameborder", "0")?;
        frame.set_attribute("allow", "autoplay; fullscreen; picture-in-picture")?;
        frame.set_attribute("allowfullscreen", "")?;
        container.set_inner_html("");
        container.append_child(&frame)?;
        tracing::debug!("[DomPage] mounted player frame for {source}");
        Ok(frame)
    }
}

impl Page for DomPage {
    type Indicator = DomIndicator;

    fn location_path(&self) -> String {
        window()
            .ok()
            .and_then(|w| w.location().pathname().ok())
            .unwrap_or_default()
    }

    fn title(&self) -> String {
        self.document.title()
    }

    fn topic_tags(&self) -> Vec<String> {
        let attr = &self.selectors.topic_tag_attr;
        select_document(&self.document, &Self::attr_selector(attr))
            .iter()
            .filter_map(|tag| tag.get_attribute(attr))
            .collect()
    }

    fn player_source(&self) -> Option<String> {
        self.document
            .query_selector(&self.selectors.player)
            .ok()
            .flatten()?
            .get_attribute(&self.selectors.player_source_attr)
    }

    fn asset_indicators(&self) -> Vec<DomIndicator> {
        select_document(&self.document, &Self::attr_selector(&self.selectors.asset_card_attr))
            .iter()
            .filter_map(|card| DomIndicator::asset(card, &self.selectors))
            .collect()
    }

    fn topic_indicators(&self) -> Vec<DomIndicator> {
        select_document(&self.document, &Self::attr_selector(&self.selectors.topic_status_attr))
            .iter()
            .map(|wrapper| DomIndicator::topic(wrapper, &self.selectors))
            .collect()
    }

    fn rendered_asset_count(&self, topic: &str) -> usize {
        select_document(&self.document, &Self::attr_selector(&self.selectors.asset_card_attr))
            .iter()
            .filter(|card| self.card_topics(card).iter().any(|t| t == topic))
            .count()
    }

    fn notify(&self, notice: &Notice) {
        if let Err(e) = self.toast(&notice.message()) {
            tracing::debug!("[DomPage] toast not shown: {e}");
        }
    }

    fn watch_asset_indicators(&self) -> LocalBoxStream<'static, DomIndicator> {
        self.watch(IndicatorKind::Asset)
    }

    fn watch_topic_indicators(&self) -> LocalBoxStream<'static, DomIndicator> {
        self.watch(IndicatorKind::Topic)
    }
}

/// Member store backed by the profile SDK object on `window`.
///
/// The SDK object is looked up on every call: its script may run after ours, and it is only
/// guaranteed to exist once the store announced readiness.
#[derive(Debug, Clone)]
pub struct JsMemberStore {
    global: Rc<str>,
}

impl JsMemberStore {
    pub fn new(global: &str) -> Self {
        JsMemberStore {
            global: Rc::from(global),
        }
    }

    fn api(&self) -> Result<JsValue, TrackingError> {
        let api = Reflect::get(&window()?, &JsValue::from_str(&self.global))?;
        if is_missing(&api) {
            return Err(TrackingError::Store(format!(
                "window.{} is not available",
                self.global
            )));
        }
        Ok(api)
    }

    async fn call(&self, method: &str, args: &Array) -> Result<JsValue, TrackingError> {
        let api = self.api()?;
        let function: Function = Reflect::get(&api, &JsValue::from_str(method))?
            .dyn_into()
            .map_err(|_| TrackingError::Store(format!("{method} is not a function")))?;
        let returned = function
            .apply(&api, args)
            .map_err(|e| TrackingError::Store(format!("{method}: {e:?}")))?;
        JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| TrackingError::Store(format!("{method}: {e:?}")))
    }
}

/// Read the member record leniently: only string-valued custom fields are kept.
fn member_from_js(data: &JsValue) -> Result<Member, TrackingError> {
    let id = Reflect::get(data, &JsValue::from_str("id"))?
        .as_string()
        .ok_or_else(|| TrackingError::Store("member without id".to_string()))?;
    let fields = Reflect::get(data, &JsValue::from_str("customFields"))?;
    let mut custom_fields = BTreeMap::new();
    if let Some(fields) = fields.dyn_ref::<Object>() {
        for entry in Object::entries(fields).iter() {
            let entry = Array::from(&entry);
            if let (Some(key), Some(value)) = (entry.get(0).as_string(), entry.get(1).as_string()) {
                custom_fields.insert(key, value);
            }
        }
    }
    Ok(Member { id, custom_fields })
}

impl MemberStore for JsMemberStore {
    fn current_member(&self) -> impl Future<Output = Result<Option<Member>, TrackingError>> {
        let store = self.clone();
        async move {
            let response = store.call("getCurrentMember", &Array::new()).await?;
            let data = Reflect::get(&response, &JsValue::from_str("data"))?;
            if is_missing(&data) {
                return Ok(None);
            }
            member_from_js(&data).map(Some)
        }
    }

    fn update_member(
        &self,
        fields: BTreeMap<String, String>,
    ) -> impl Future<Output = Result<(), TrackingError>> {
        let store = self.clone();
        async move {
            let custom_fields = Object::new();
            for (key, value) in &fields {
                Reflect::set(&custom_fields, &JsValue::from_str(key), &JsValue::from_str(value))?;
            }
            let update = Object::new();
            Reflect::set(&update, &JsValue::from_str("customFields"), &custom_fields)?;
            store.call("updateMember", &Array::of1(&update)).await?;
            Ok(())
        }
    }
}

type EventListener = Closure<dyn FnMut(JsValue)>;

/// The hosted-video SDK player bound to a mounted frame.
pub struct JsPlayer {
    inner: JsValue,
    events: RefCell<Option<UnboundedReceiver<PlayerEvent>>>,
    _listeners: Vec<EventListener>,
}

fn sdk_loaded() -> bool {
    web_sys::window()
        .and_then(|w| Reflect::get(&w, &JsValue::from_str("Vimeo")).ok())
        .is_some_and(|sdk| !is_missing(&sdk))
}

fn event_position(data: &JsValue) -> (f64, f64) {
    let number = |key: &str| {
        Reflect::get(data, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    };
    (number("seconds"), number("percent"))
}

fn decode_event(name: &str, data: &JsValue) -> Option<PlayerEvent> {
    let (seconds, fraction) = event_position(data);
    match name {
        "play" => Some(PlayerEvent::Play),
        "timeupdate" => Some(PlayerEvent::TimeUpdate { seconds, fraction }),
        "pause" => Some(PlayerEvent::Pause { seconds, fraction }),
        "ended" => Some(PlayerEvent::Ended),
        _ => None,
    }
}

impl JsPlayer {
    pub fn connect(frame: &HtmlIFrameElement) -> Result<Self, TrackingError> {
        let sdk = Reflect::get(&window()?, &JsValue::from_str("Vimeo"))?;
        let constructor: Function = Reflect::get(&sdk, &JsValue::from_str("Player"))?
            .dyn_into()
            .map_err(|_| TrackingError::Player("player SDK not loaded".to_string()))?;
        let inner = Reflect::construct(&constructor, &Array::of1(frame))
            .map_err(|e| TrackingError::Player(format!("{e:?}")))?;
        let on: Function = Reflect::get(&inner, &JsValue::from_str("on"))?
            .dyn_into()
            .map_err(|_| TrackingError::Player("player has no event API".to_string()))?;

        let (tx, rx) = unbounded::<PlayerEvent>();
        let mut listeners = Vec::new();
        for name in ["play", "timeupdate", "pause", "ended"] {
            let listener = Self::listener(name, tx.clone());
            on.call2(&inner, &JsValue::from_str(name), listener.as_ref())
                .map_err(|e| TrackingError::Player(format!("{e:?}")))?;
            listeners.push(listener);
        }
        Ok(JsPlayer {
            inner,
            events: RefCell::new(Some(rx)),
            _listeners: listeners,
        })
    }

    fn listener(name: &'static str, tx: UnboundedSender<PlayerEvent>) -> EventListener {
        Closure::new(move |data: JsValue| {
            if let Some(event) = decode_event(name, &data) {
                let _ = tx.unbounded_send(event);
            }
        })
    }

    async fn call(&self, method: &str, args: &Array) -> Result<JsValue, TrackingError> {
        let function: Function = Reflect::get(&self.inner, &JsValue::from_str(method))?
            .dyn_into()
            .map_err(|_| TrackingError::Player(format!("{method} is not a function")))?;
        let returned = function
            .apply(&self.inner, args)
            .map_err(|e| TrackingError::Player(format!("{method}: {e:?}")))?;
        JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| TrackingError::Player(format!("{method}: {e:?}")))
    }
}

impl Player for JsPlayer {
    fn duration(&self) -> impl Future<Output = Result<f64, TrackingError>> {
        async move {
            self.call("getDuration", &Array::new())
                .await?
                .as_f64()
                .ok_or_else(|| TrackingError::Player("duration is not a number".to_string()))
        }
    }

    fn set_current_time(&self, seconds: f64) -> impl Future<Output = Result<(), TrackingError>> {
        async move {
            self.call("setCurrentTime", &Array::of1(&JsValue::from_f64(seconds)))
                .await
                .map(|_| ())
        }
    }

    fn events(&self) -> LocalBoxStream<'static, PlayerEvent> {
        match self.events.borrow_mut().take() {
            Some(rx) => rx.boxed_local(),
            None => futures::stream::empty().boxed_local(),
        }
    }
}

/// Fires once the member store SDK announced itself (`memberstack.ready`), or immediately if
/// it already did.
fn store_readiness(window: &Window, document: &Document) -> Readiness {
    let ready = Readiness::new();
    let announced = Reflect::get(window, &JsValue::from_str("$memberstackReady"))
        .map(|flag| flag.is_truthy())
        .unwrap_or(false);
    if announced {
        ready.fire();
        return ready;
    }
    let signal = ready.clone();
    let on_ready = Closure::<dyn FnMut(JsValue)>::new(move |_event: JsValue| signal.fire());
    if document
        .add_event_listener_with_callback("memberstack.ready", on_ready.as_ref().unchecked_ref())
        .is_err()
    {
        tracing::warn!("[Browser] cannot listen for store readiness");
    }
    // Lives for the page view.
    on_ready.forget();
    ready
}

fn listen(
    target: &EventTarget,
    name: &str,
    document: &Document,
    tx: &UnboundedSender<SyncTrigger>,
    trigger: SyncTrigger,
) {
    let tx = tx.clone();
    let document = document.clone();
    let callback = Closure::<dyn FnMut(JsValue)>::new(move |_event: JsValue| {
        if trigger != SyncTrigger::Visible || !document.hidden() {
            let _ = tx.unbounded_send(trigger);
        }
    });
    if target
        .add_event_listener_with_callback(name, callback.as_ref().unchecked_ref())
        .is_err()
    {
        tracing::warn!("[Browser] cannot listen for {name}");
    }
    // Lives for the page view.
    callback.forget();
}

/// Page-level refresh signals: page-show, window focus, and the document becoming visible.
fn refresh_triggers(window: &Window, document: &Document) -> LocalBoxStream<'static, SyncTrigger> {
    let (tx, rx) = unbounded::<SyncTrigger>();
    listen(window, "pageshow", document, &tx, SyncTrigger::PageShow);
    listen(window, "focus", document, &tx, SyncTrigger::Focus);
    listen(document, "visibilitychange", document, &tx, SyncTrigger::Visible);
    rx.boxed_local()
}

/// Everything one entry point needs for the page view.
struct BrowserHost {
    docs: DocumentStore<JsMemberStore, BrowserScheduler>,
    page: Rc<DomPage>,
    readiness: Readiness,
    window: Window,
}

impl BrowserHost {
    fn new(options: JsValue) -> Result<Self, TrackingError> {
        let options = BrowserOptions::from_js(options)?;
        let window = window()?;
        let page = Rc::new(DomPage::new(options.selectors.clone())?);
        let store = JsMemberStore::new(options.store_global());
        let readiness = store_readiness(&window, &page.document);
        Ok(BrowserHost {
            docs: DocumentStore::new(store, BrowserScheduler::default(), Rc::new(options.tracking)),
            page,
            readiness,
            window,
        })
    }

    /// `None` (logged) when the options are invalid or there is no page to work on.
    fn open(options: JsValue, entry: &str) -> Option<Self> {
        init_logging();
        match BrowserHost::new(options) {
            Ok(host) => Some(host),
            Err(e) => {
                tracing::warn!("[Browser] {entry} not started: {e}");
                None
            }
        }
    }
}

/// Track playback of the video on this page.
///
/// Mounts the player frame into `.vimeo-player`, waits (bounded) for the player SDK, and tracks
/// progress for a signed-in member. Anonymous viewers still get the player.
///
/// # JavaScript Example
/// ```javascript,ignore
/// startPlayback({ tracking: { completion_threshold: 95, save_interval_seconds: 15 } });
/// ```
#[wasm_bindgen(js_name = startPlayback)]
pub fn start_playback(options: JsValue) {
    let Some(host) = BrowserHost::open(options, "startPlayback") else {
        return;
    };
    spawn_local(async move {
        let config = host.docs.config().clone();
        let found = retry_until(
            host.docs.scheduler(),
            config.retry_attempts,
            config.retry_delay(),
            || sdk_loaded().then_some(()),
        )
        .await;
        if found.found().is_none() {
            tracing::warn!("[Browser] player SDK never loaded");
            return;
        }
        let Some(source) = host.page.player_source().and_then(|r| PlayerSource::parse(&r)) else {
            tracing::debug!("[Browser] no playable source on this page");
            return;
        };
        let frame = match host.page.mount_player(&source) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[Browser] cannot mount player: {e}");
                return;
            }
        };
        let session = PlaybackSession::start(host.docs, host.page, &host.readiness, |_| {
            match JsPlayer::connect(&frame) {
                Ok(player) => Some(player),
                Err(e) => {
                    tracing::warn!("[Browser] player failed to initialise: {e}");
                    None
                }
            }
        })
        .await;
        if let Some(session) = session {
            session.run().await;
        }
    });
}

/// Keep asset and topic progress indicators on this page in sync with the member's document.
///
/// # JavaScript Example
/// ```javascript,ignore
/// startSync();
/// ```
#[wasm_bindgen(js_name = startSync)]
pub fn start_sync(options: JsValue) {
    let Some(host) = BrowserHost::open(options, "startSync") else {
        return;
    };
    let triggers = refresh_triggers(&host.window, &host.page.document);
    spawn_local(async move {
        let sync = SyncLoop::new(host.docs, host.page);
        sync.run(&host.readiness, triggers).await;
    });
}

fn track_target(element: &Element, kind: ActivityKind) -> TrackTarget {
    let url = match kind {
        ActivityKind::Download => None,
        ActivityKind::Click => element
            .get_attribute("href")
            .or_else(|| element.get_attribute("data-track-url")),
    };
    TrackTarget {
        slug: element.get_attribute("data-track-slug"),
        name: element.get_attribute("data-track-name"),
        url,
    }
}

/// Count worksheet downloads and outbound publication clicks for a signed-in member.
///
/// # JavaScript Example
/// ```javascript,ignore
/// startActivityTracking();
/// ```
#[wasm_bindgen(js_name = startActivityTracking)]
pub fn start_activity_tracking(options: JsValue) {
    let Some(host) = BrowserHost::open(options, "startActivityTracking") else {
        return;
    };
    spawn_local(async move {
        let document = host.page.document.clone();
        let Some(tracker) = ActivityTracker::start(host.docs, host.page, &host.readiness).await
        else {
            return;
        };
        let tracker = Rc::new(RefCell::new(tracker));
        for (selector, kind) in [
            ("[data-track='download']", ActivityKind::Download),
            ("[data-track='external-link']", ActivityKind::Click),
        ] {
            let elements = select_document(&document, selector);
            tracing::debug!("[Browser] {} {kind:?} elements", elements.len());
            for element in elements {
                let tracker = tracker.clone();
                let target = element.clone();
                let on_click = Closure::<dyn FnMut(JsValue)>::new(move |_event: JsValue| {
                    tracker.borrow_mut().record(kind, &track_target(&target, kind));
                });
                if element
                    .add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
                    .is_err()
                {
                    tracing::warn!("[Browser] cannot listen for clicks on {selector}");
                }
                on_click.forget();
            }
        }
    });
}
