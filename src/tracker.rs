//! Tracker facade.
//!
//! Owns the configuration and wires the history bridge, the capture registry
//! and the reporter together at construction time.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::beacon::BeaconSender;
use crate::bus::{EventBus, ListenerId};
use crate::clock::{Clock, SystemClock};
use crate::config::{Extra, TrackerConfig, TrackerOptions};
use crate::history::{HistoryBridge, NavigationMutator};
use crate::registry;
use crate::reporter::Reporter;

/// Collector instance bound to one page.
#[derive(Debug)]
pub struct Tracker<N> {
    config: Arc<RwLock<TrackerConfig>>,
    bus: Arc<EventBus>,
    history: HistoryBridge<N>,
    reporter: Arc<Reporter>,
    listeners: Vec<ListenerId>,
}

/// Collects the capabilities a [`Tracker`] runs on.
pub struct TrackerBuilder {
    options: TrackerOptions,
    beacon: Arc<dyn BeaconSender>,
    bus: Option<Arc<EventBus>>,
    clock: Arc<dyn Clock>,
}

impl TrackerBuilder {
    /// Starts a tracker that transmits through `beacon`.
    pub fn new(options: TrackerOptions, beacon: Arc<dyn BeaconSender>) -> Self {
        Self {
            options,
            beacon,
            bus: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Event bus the tracker listens on. A private bus is created if unset.
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Timestamp source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the tracker around `navigator`, the page's history.
    pub fn build<N: NavigationMutator>(self, navigator: N) -> Tracker<N> {
        Tracker::new(
            self.options,
            self.bus.unwrap_or_else(EventBus::new),
            navigator,
            self.beacon,
            self.clock,
        )
    }
}

impl<N: NavigationMutator> Tracker<N> {
    /// Resolves `options`, bridges `navigator` onto `bus` and installs the
    /// enabled captures.
    pub fn new(
        options: TrackerOptions,
        bus: Arc<EventBus>,
        navigator: N,
        beacon: Arc<dyn BeaconSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolved = options.resolve();
        tracing::info!(
            endpoint = %resolved.request_url,
            history = resolved.history_tracker,
            hash = resolved.hash_tracker,
            dom = resolved.dom_tracker,
            js_error = resolved.js_error,
            "tracker starting"
        );
        if !resolved.captures_anything() {
            tracing::debug!("no capture enabled, only manual sends will be reported");
        }

        let config = Arc::new(RwLock::new(resolved.clone()));
        let reporter = Arc::new(Reporter::new(Arc::clone(&config), beacon, clock));
        let history = HistoryBridge::install(navigator, Arc::clone(&bus));
        let listeners = registry::install(&resolved, &bus, &reporter);

        Self {
            config,
            bus,
            history,
            reporter,
            listeners,
        }
    }

    /// Epoch milliseconds at construction. Records are never stamped earlier.
    pub fn started_at(&self) -> i64 {
        self.reporter.started_at()
    }

    /// Reports a caller-supplied event.
    pub fn send_tracker<T: Serialize + ?Sized>(&self, data: &T) {
        self.reporter.send(data);
    }

    /// Sets the identifier carried as `uuid` by later records.
    pub fn set_user_id(&self, uuid: impl Into<String>) {
        self.write_config().uuid = Some(uuid.into());
    }

    /// Replaces the `extra` context wholesale.
    pub fn set_extra(&self, extra: Extra) {
        self.write_config().extra = Some(extra);
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> TrackerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The bridged history. Navigate through this so mutations are observed.
    pub fn history(&self) -> &HistoryBridge<N> {
        &self.history
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Listener ids installed at construction.
    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }

    /// Removes every capture listener and hands back the unbridged history.
    pub fn shutdown(self) -> N {
        for id in &self.listeners {
            self.bus.remove_listener(*id);
        }
        tracing::info!(listeners = self.listeners.len(), "tracker shut down");
        self.history.into_inner()
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, TrackerConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::MemoryBeacon;
    use crate::event::{Element, EventType, PageEvent, RejectionReason, TARGET_KEY_ATTRIBUTE};
    use crate::history::SessionHistory;
    use crate::reporter::tests::ManualClock;
    use serde_json::{json, Value};

    fn extra(value: Value) -> Extra {
        match value {
            Value::Object(map) => map,
            _ => panic!("extra must be an object"),
        }
    }

    fn tracker(options: TrackerOptions) -> (Tracker<SessionHistory>, Arc<MemoryBeacon>) {
        let beacon = Arc::new(MemoryBeacon::new());
        let tracker = TrackerBuilder::new(options, beacon.clone())
            .build(SessionHistory::parse("https://shop.test/").unwrap());
        (tracker, beacon)
    }

    #[test]
    fn set_user_id_affects_only_later_records() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t"));

        tracker.send_tracker(&json!({"event": "before"}));
        tracker.set_user_id("abc");
        tracker.send_tracker(&json!({"event": "after"}));

        let records = beacon.records();
        assert!(records[0].get("uuid").is_none());
        assert_eq!(records[1]["uuid"], "abc");
        assert_eq!(tracker.config().uuid.as_deref(), Some("abc"));
    }

    #[test]
    fn set_extra_replaces_wholesale() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t"));

        tracker.set_extra(extra(json!({"a": 1})));
        tracker.set_extra(extra(json!({"b": 2})));
        tracker.send_tracker(&json!({"event": "x"}));

        let record = &beacon.records()[0];
        assert_eq!(record["extra"], json!({"b": 2}));
        assert!(record["extra"].get("a").is_none());
    }

    #[test]
    fn bridged_navigation_is_reported() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t").history_tracker(true));

        tracker.history().push_state(Value::Null, "", Some("/cart")).unwrap();
        tracker
            .history()
            .replace_state(Value::Null, "", Some("/cart?x=1"))
            .unwrap();

        assert_eq!(tracker.history().inner().current_url(), "https://shop.test/cart?x=1");
        let events: Vec<Value> = beacon.records().iter().map(|r| r["event"].clone()).collect();
        assert_eq!(events, vec![json!("pushState"), json!("replaceState")]);
    }

    #[test]
    fn navigation_untracked_when_toggle_off() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t").dom_tracker(true));

        tracker.history().push_state(Value::Null, "", Some("/cart")).unwrap();
        tracker.history().inner().back(tracker.bus());

        assert!(beacon.is_empty());
    }

    #[test]
    fn click_on_tracked_element_yields_one_record() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t").dom_tracker(true));
        let button = Element::new("button").with_attribute(TARGET_KEY_ATTRIBUTE, "submit-button");

        tracker.bus().dispatch(&PageEvent::pointer(EventType::Click, button));
        tracker
            .bus()
            .dispatch(&PageEvent::pointer(EventType::Click, Element::new("div")));

        let records = beacon.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["targetKey"], "submit-button");
    }

    #[test]
    fn timestamps_not_before_construction() {
        let beacon = Arc::new(MemoryBeacon::new());
        let clock = Arc::new(ManualClock::new(5_000));
        let options = TrackerOptions::new("/t").hash_tracker(true);
        let tracker = TrackerBuilder::new(options, beacon.clone())
            .clock(clock.clone())
            .build(SessionHistory::parse("https://a.test/").unwrap());

        // wall clock stepped back after construction
        clock.set(4_000);
        tracker.history().inner().set_hash("one", tracker.bus());
        clock.set(6_000);
        tracker.history().inner().set_hash("two", tracker.bus());
        clock.set(5_500);
        tracker.send_tracker(&json!({"event": "manual"}));

        let times: Vec<i64> = beacon
            .records()
            .iter()
            .map(|r| r["time"].as_i64().unwrap())
            .collect();
        assert_eq!(tracker.started_at(), 5_000);
        assert!(times.iter().all(|t| *t >= tracker.started_at()));
        assert_eq!(times, vec![5_000, 6_000, 6_000]);
    }

    #[tokio::test]
    async fn js_errors_reported_with_messages() {
        let (tracker, beacon) = tracker(TrackerOptions::new("/t").js_error(true));

        tracker
            .bus()
            .dispatch(&PageEvent::rejection(RejectionReason::ready("network fail")));
        tracker.bus().dispatch(&PageEvent::error("x is not defined"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let records = beacon.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["event"], "error");
        assert_eq!(records[0]["message"], "x is not defined");
        assert_eq!(records[1]["event"], "promise");
        assert_eq!(records[1]["message"], "network fail");
    }

    #[test]
    fn shutdown_removes_listeners_and_unwraps_history() {
        let bus = EventBus::new();
        let beacon = Arc::new(MemoryBeacon::new());
        let tracker = TrackerBuilder::new(
            TrackerOptions::new("/t").history_tracker(true).dom_tracker(true),
            beacon.clone(),
        )
        .bus(Arc::clone(&bus))
        .build(SessionHistory::parse("https://a.test/").unwrap());
        assert_eq!(tracker.listeners().len(), 11);

        let history = tracker.shutdown();
        assert!(bus.subscribed_types().is_empty());

        history.push_state(Value::Null, "", Some("/after")).unwrap();
        bus.dispatch(&PageEvent::Navigation(EventType::PopState));
        assert!(beacon.is_empty());
    }
}
