//! History-event bridge.
//!
//! Pages mutate their URL through `pushState` / `replaceState` without any
//! native event firing. [`HistoryBridge`] decorates a [`NavigationMutator`] so
//! each mutation is followed by a same-named synthetic event on the
//! [`EventBus`], which makes in-app navigation observable to listeners.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use url::Url;

use crate::bus::EventBus;
use crate::error::TrackerError;
use crate::event::{EventType, PageEvent};

/// The two URL-mutating operations of a page's history.
pub trait NavigationMutator: Send + Sync {
    /// Whatever the underlying implementation returns from a mutation.
    type Output;

    fn push_state(&self, state: Value, title: &str, url: Option<&str>) -> Self::Output;

    fn replace_state(&self, state: Value, title: &str, url: Option<&str>) -> Self::Output;
}

/// A [`NavigationMutator`] that announces every mutation on a bus.
///
/// The bridge owns the mutator it wraps, so a page can only ever have one
/// bridge per history and each call dispatches exactly one event.
#[derive(Debug)]
pub struct HistoryBridge<N> {
    inner: N,
    bus: Arc<EventBus>,
}

impl<N: NavigationMutator> HistoryBridge<N> {
    pub fn install(inner: N, bus: Arc<EventBus>) -> Self {
        tracing::debug!("history bridge installed");
        Self { inner, bus }
    }

    /// The wrapped mutator.
    pub fn inner(&self) -> &N {
        &self.inner
    }

    /// Removes the bridge, handing back the undecorated mutator.
    pub fn into_inner(self) -> N {
        self.inner
    }

    fn announce(&self, kind: EventType) {
        self.bus.dispatch(&PageEvent::Navigation(kind));
    }
}

impl<N: NavigationMutator> NavigationMutator for HistoryBridge<N> {
    type Output = N::Output;

    fn push_state(&self, state: Value, title: &str, url: Option<&str>) -> Self::Output {
        let out = self.inner.push_state(state, title, url);
        self.announce(EventType::PushState);
        out
    }

    fn replace_state(&self, state: Value, title: &str, url: Option<&str>) -> Self::Output {
        let out = self.inner.replace_state(state, title, url);
        self.announce(EventType::ReplaceState);
        out
    }
}

/// One entry of a session history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: Url,
    pub state: Value,
}

#[derive(Debug)]
struct Session {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl Session {
    fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    fn push(&mut self, url: Url, state: Value) {
        let keep = self.index + 1;
        self.entries.truncate(keep);
        self.entries.push(HistoryEntry { url, state });
        self.index = keep;
    }
}

/// In-memory session history behaving like a browser tab's.
///
/// URL arguments resolve against the current entry the way a document's base
/// URL does. Pushing truncates forward entries; traversal dispatches
/// `popstate`, plus `hashchange` when only the fragment differs.
#[derive(Debug)]
pub struct SessionHistory {
    session: Mutex<Session>,
}

impl SessionHistory {
    pub fn new(initial_url: Url) -> Self {
        Self {
            session: Mutex::new(Session {
                entries: vec![HistoryEntry {
                    url: initial_url,
                    state: Value::Null,
                }],
                index: 0,
            }),
        }
    }

    /// Starts a history at `initial_url`, which must be absolute.
    pub fn parse(initial_url: &str) -> Result<Self, TrackerError> {
        Ok(Self::new(Url::parse(initial_url)?))
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_url(&self) -> String {
        self.session().current().url.to_string()
    }

    /// State object of the current entry, like `history.state`.
    pub fn current_state(&self) -> Value {
        self.session().current().state.clone()
    }

    /// Number of entries, like `history.length`.
    pub fn len(&self) -> usize {
        self.session().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session().entries.is_empty()
    }

    pub fn back(&self, bus: &EventBus) -> bool {
        self.go(-1, bus)
    }

    pub fn forward(&self, bus: &EventBus) -> bool {
        self.go(1, bus)
    }

    /// Moves `delta` entries. Out-of-range moves are ignored and return false.
    pub fn go(&self, delta: isize, bus: &EventBus) -> bool {
        let (from, to) = {
            let mut session = self.session();
            let Some(target) = session.index.checked_add_signed(delta) else {
                return false;
            };
            if delta == 0 || target >= session.entries.len() {
                return false;
            }
            let from = session.current().url.clone();
            session.index = target;
            (from, session.current().url.clone())
        };

        bus.dispatch(&PageEvent::Navigation(EventType::PopState));
        if from.fragment() != to.fragment() && without_fragment(&from) == without_fragment(&to) {
            bus.dispatch(&PageEvent::Navigation(EventType::HashChange));
        }
        true
    }

    /// Navigates to a fragment of the current document, like assigning
    /// `location.hash`. Fires `popstate` then `hashchange` if the URL changed.
    pub fn set_hash(&self, fragment: &str, bus: &EventBus) -> bool {
        let changed = {
            let mut session = self.session();
            let mut to = session.current().url.clone();
            to.set_fragment(Some(fragment.trim_start_matches('#')));
            if to == session.current().url {
                false
            } else {
                session.push(to, Value::Null);
                true
            }
        };

        if changed {
            bus.dispatch(&PageEvent::Navigation(EventType::PopState));
            bus.dispatch(&PageEvent::Navigation(EventType::HashChange));
        }
        changed
    }
}

impl NavigationMutator for SessionHistory {
    /// Fails, leaving the history untouched, when `url` does not resolve.
    type Output = Result<(), url::ParseError>;

    fn push_state(&self, state: Value, _title: &str, url: Option<&str>) -> Self::Output {
        let mut session = self.session();
        let url = resolve(&session.current().url, url)?;
        session.push(url, state);
        Ok(())
    }

    fn replace_state(&self, state: Value, _title: &str, url: Option<&str>) -> Self::Output {
        let mut session = self.session();
        let url = resolve(&session.current().url, url)?;
        let index = session.index;
        session.entries[index] = HistoryEntry { url, state };
        Ok(())
    }
}

/// Resolves the `url` argument of a history call against the current URL.
/// `None` keeps the current URL.
fn resolve(current: &Url, url: Option<&str>) -> Result<Url, url::ParseError> {
    match url {
        Some(url) => current.join(url),
        None => Ok(current.clone()),
    }
}

fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record_types(bus: &Arc<EventBus>, types: &[EventType]) -> Arc<Mutex<Vec<EventType>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for ty in types {
            let seen = Arc::clone(&seen);
            bus.add_listener(*ty, move |ev| seen.lock().unwrap().push(ev.event_type()));
        }
        seen
    }

    /// Counts calls and returns the running count.
    #[derive(Default)]
    struct CountingMutator {
        calls: AtomicUsize,
    }

    impl NavigationMutator for CountingMutator {
        type Output = usize;

        fn push_state(&self, _: Value, _: &str, _: Option<&str>) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn replace_state(&self, _: Value, _: &str, _: Option<&str>) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    fn history(url: &str) -> SessionHistory {
        SessionHistory::parse(url).unwrap()
    }

    #[test]
    fn bridge_returns_inner_result_and_dispatches_once() {
        let bus = EventBus::new();
        let seen = record_types(&bus, &[EventType::PushState, EventType::ReplaceState]);
        let bridge = HistoryBridge::install(CountingMutator::default(), Arc::clone(&bus));

        assert_eq!(bridge.push_state(Value::Null, "", Some("/a")), 1);
        assert_eq!(bridge.replace_state(Value::Null, "", None), 2);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventType::PushState, EventType::ReplaceState]
        );
        assert_eq!(bridge.into_inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bridge_preserves_navigation_side_effect() {
        let bus = EventBus::new();
        let plain = history("https://shop.test/");
        let bridged = HistoryBridge::install(history("https://shop.test/"), bus);

        type Fallible = Result<(), url::ParseError>;
        for nav in [&plain as &dyn NavigationMutator<Output = Fallible>, &bridged] {
            nav.push_state(serde_json::json!({"page": 2}), "", Some("/cart?step=1"))
                .unwrap();
            nav.replace_state(Value::Null, "", Some("#summary")).unwrap();
        }

        assert_eq!(plain.current_url(), bridged.inner().current_url());
        assert_eq!(plain.len(), bridged.inner().len());
        assert_eq!(
            bridged.inner().current_url(),
            "https://shop.test/cart?step=1#summary"
        );
    }

    #[test]
    fn push_keeps_state_and_truncates_forward_entries() {
        let bus = EventBus::new();
        let history = history("https://a.test/");
        history.push_state(Value::Null, "", Some("/one")).unwrap();
        history.push_state(serde_json::json!({"n": 2}), "", Some("/two")).unwrap();
        assert_eq!(history.current_state()["n"], 2);
        assert!(history.back(&bus));
        assert_eq!(history.current_state(), Value::Null);

        history.push_state(Value::Null, "", Some("/three")).unwrap();
        assert_eq!(history.len(), 3);
        assert!(!history.forward(&bus));
        assert_eq!(history.current_url(), "https://a.test/three");
    }

    #[test]
    fn relative_urls_resolve_against_current_entry() {
        let history = history("https://shop.test/cart/");

        history.push_state(Value::Null, "", Some("step2")).unwrap();
        assert_eq!(history.current_url(), "https://shop.test/cart/step2");

        history.push_state(Value::Null, "", Some("../up")).unwrap();
        assert_eq!(history.current_url(), "https://shop.test/up");

        history.push_state(Value::Null, "", Some("//cdn.test/x")).unwrap();
        assert_eq!(history.current_url(), "https://cdn.test/x");

        history.push_state(Value::Null, "", Some("?q=2")).unwrap();
        assert_eq!(history.current_url(), "https://cdn.test/x?q=2");

        history.replace_state(Value::Null, "", None).unwrap();
        assert_eq!(history.current_url(), "https://cdn.test/x?q=2");
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn unresolvable_url_leaves_history_untouched() {
        let history = history("https://a.test/");

        assert!(history.push_state(Value::Null, "", Some("https://[bad")).is_err());
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_url(), "https://a.test/");
        assert!(SessionHistory::parse("not a url").is_err());
    }

    #[test]
    fn traversal_fires_popstate_and_hashchange() {
        let bus = EventBus::new();
        let seen = record_types(&bus, &[EventType::PopState, EventType::HashChange]);
        let history = history("https://a.test/docs");

        history.push_state(Value::Null, "", Some("/other")).unwrap();
        assert!(history.back(&bus));
        assert_eq!(*seen.lock().unwrap(), vec![EventType::PopState]);

        seen.lock().unwrap().clear();
        assert!(history.set_hash("intro", &bus));
        assert!(!history.set_hash("#intro", &bus));
        assert!(history.back(&bus));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventType::PopState,
                EventType::HashChange,
                EventType::PopState,
                EventType::HashChange,
            ]
        );
        assert_eq!(history.current_url(), "https://a.test/docs");
    }

    #[test]
    fn out_of_range_go_is_ignored() {
        let bus = EventBus::new();
        let seen = record_types(&bus, &[EventType::PopState]);
        let history = history("https://a.test/");

        assert!(!history.back(&bus));
        assert!(!history.go(0, &bus));
        assert!(seen.lock().unwrap().is_empty());
    }
}
