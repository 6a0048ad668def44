//! pagetrack - fire-and-forget page telemetry.
//!
//! Observes navigation, tagged DOM interactions, uncaught errors and unhandled
//! rejections on a page, and sends each one to a collection endpoint as a
//! single JSON beacon.
//!
//! # Components
//!
//! - [`EventBus`]: the page's event target, injected rather than global
//! - [`HistoryBridge`]: makes `pushState` / `replaceState` observable
//! - [`registry`]: turns config toggles into bus subscriptions
//! - [`Reporter`]: merges config + occurrence + timestamp and sends a beacon
//! - [`Tracker`]: wires everything up and exposes the public API
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pagetrack::{
//!     Element, EventType, MemoryBeacon, PageEvent, SessionHistory, TrackerBuilder,
//!     TrackerOptions, TARGET_KEY_ATTRIBUTE,
//! };
//!
//! let beacon = Arc::new(MemoryBeacon::new());
//! let tracker = TrackerBuilder::new(
//!     TrackerOptions::new("https://collect.example/track").dom_tracker(true),
//!     beacon.clone(),
//! )
//! .build(SessionHistory::parse("https://shop.example/")?);
//!
//! tracker.set_user_id("abc");
//! let button = Element::new("button").with_attribute(TARGET_KEY_ATTRIBUTE, "submit-button");
//! tracker.bus().dispatch(&PageEvent::pointer(EventType::Click, button));
//!
//! let record = &beacon.records()[0];
//! assert_eq!(record["targetKey"], "submit-button");
//! assert_eq!(record["uuid"], "abc");
//! # Ok::<(), pagetrack::TrackerError>(())
//! ```

pub mod beacon;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod registry;
pub mod reporter;
pub mod scenario;
pub mod tracker;

pub use beacon::{Beacon, BeaconSender, ChannelBeacon, MemoryBeacon, SentBeacon, FORM_URLENCODED};
pub use bus::{EventBus, ListenerId};
pub use clock::{Clock, SystemClock};
pub use config::{Extra, TrackerConfig, TrackerOptions, SDK_VERSION};
pub use error::TrackerError;
pub use event::{Element, EventType, PageEvent, RejectionReason, MOUSE_EVENTS, TARGET_KEY_ATTRIBUTE};
pub use history::{HistoryBridge, NavigationMutator, SessionHistory};
pub use reporter::{Occurrence, Reporter};
pub use scenario::{parse_script, replay, ScenarioStep};
pub use tracker::{Tracker, TrackerBuilder};
