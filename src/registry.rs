//! Event capture registry.
//!
//! Turns the configuration toggles into bus subscriptions:
//!
//! | Toggle | Events | `targetKey` |
//! |--------|--------|-------------|
//! | `historyTracker` | `pushState`, `replaceState`, `popstate` | `history-pv` |
//! | `hashTracker` | `hashchange` | `hash-pv` |
//! | `domTracker` | the eight pointer events | element's `target-key` value |
//! | `jsError` | `error`, `unhandledrejection` | `error` |
//!
//! Subscriptions are decided once, from the config as it stands at install
//! time.

use std::sync::Arc;

use crate::bus::{EventBus, ListenerId};
use crate::config::TrackerConfig;
use crate::event::{EventType, PageEvent, MOUSE_EVENTS};
use crate::reporter::{Occurrence, Reporter};

pub const HISTORY_LABEL: &str = "history-pv";
pub const HASH_LABEL: &str = "hash-pv";
pub const ERROR_LABEL: &str = "error";

/// `event` value for unhandled rejections.
pub const PROMISE_EVENT: &str = "promise";

pub const HISTORY_EVENTS: [EventType; 3] = [
    EventType::PushState,
    EventType::ReplaceState,
    EventType::PopState,
];

/// Event types the given config subscribes to, in installation order.
pub fn planned_subscriptions(config: &TrackerConfig) -> Vec<EventType> {
    let mut types = Vec::new();
    if config.history_tracker {
        types.extend(HISTORY_EVENTS);
    }
    if config.hash_tracker {
        types.push(EventType::HashChange);
    }
    if config.dom_tracker {
        types.extend(MOUSE_EVENTS);
    }
    if config.js_error {
        types.push(EventType::Error);
        types.push(EventType::UnhandledRejection);
    }
    types
}

/// Installs every subscription enabled by `config`.
pub fn install(
    config: &TrackerConfig,
    bus: &EventBus,
    reporter: &Arc<Reporter>,
) -> Vec<ListenerId> {
    let mut ids = Vec::new();
    if config.history_tracker {
        ids.extend(capture_events(bus, reporter, &HISTORY_EVENTS, HISTORY_LABEL));
    }
    if config.hash_tracker {
        ids.extend(capture_events(bus, reporter, &[EventType::HashChange], HASH_LABEL));
    }
    if config.dom_tracker {
        ids.extend(capture_target_keys(bus, reporter));
    }
    if config.js_error {
        ids.push(capture_errors(bus, reporter));
        ids.push(capture_rejections(bus, reporter));
    }
    tracing::debug!(listeners = ids.len(), "capture registry installed");
    ids
}

/// Reports every firing of `types` under a fixed label.
pub fn capture_events(
    bus: &EventBus,
    reporter: &Arc<Reporter>,
    types: &[EventType],
    label: &'static str,
) -> Vec<ListenerId> {
    types
        .iter()
        .map(|&ty| {
            let reporter = Arc::clone(reporter);
            bus.add_listener(ty, move |_| {
                reporter.report(&Occurrence::new(ty.as_str()).with_target_key(label));
            })
        })
        .collect()
}

/// Reports pointer events whose target carries a non-empty `target-key`.
pub fn capture_target_keys(bus: &EventBus, reporter: &Arc<Reporter>) -> Vec<ListenerId> {
    MOUSE_EVENTS
        .iter()
        .map(|&ty| {
            let reporter = Arc::clone(reporter);
            bus.add_listener(ty, move |event| {
                let Some(key) = event.target().and_then(|el| el.target_key()) else {
                    return;
                };
                reporter.report(&Occurrence::new(ty.as_str()).with_target_key(key));
            })
        })
        .collect()
}

/// Reports uncaught errors with their message.
pub fn capture_errors(bus: &EventBus, reporter: &Arc<Reporter>) -> ListenerId {
    let reporter = Arc::clone(reporter);
    bus.add_listener(EventType::Error, move |event| {
        if let PageEvent::Error { message } = event {
            reporter.report(
                &Occurrence::new(ERROR_LABEL)
                    .with_target_key(ERROR_LABEL)
                    .with_message(message.as_str()),
            );
        }
    })
}

/// Reports unhandled rejections once their reason resolves.
///
/// The report is spawned on the current tokio runtime and lands after the
/// dispatch that carried the rejection has returned.
pub fn capture_rejections(bus: &EventBus, reporter: &Arc<Reporter>) -> ListenerId {
    let reporter = Arc::clone(reporter);
    bus.add_listener(EventType::UnhandledRejection, move |event| {
        let PageEvent::UnhandledRejection { reason } = event else {
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "no async runtime, dropping rejection report");
                return;
            }
        };

        let reason = reason.clone();
        let reporter = Arc::clone(&reporter);
        runtime.spawn(async move {
            let message = reason.resolve().await;
            reporter.report(
                &Occurrence::new(PROMISE_EVENT)
                    .with_target_key(ERROR_LABEL)
                    .with_message(message),
            );
        });
    })
}
