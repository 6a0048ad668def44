//! Record assembly and delivery.
//!
//! Every captured [`Occurrence`] (and every manual `send_tracker` payload)
//! becomes one outbound record:
//!
//! ```text
//! record = config ⊕ occurrence ⊕ { "time": <epoch ms> }
//! ```
//!
//! where `⊕` is a shallow key merge with the right-hand side winning. The
//! record is serialized to JSON and handed to the [`BeaconSender`]. Nothing is
//! returned to the caller: failures are logged and the record is dropped.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::beacon::{Beacon, BeaconSender};
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;

/// Key holding the capture timestamp.
pub const TIME_KEY: &str = "time";

/// Key used for manual payloads that are not JSON objects.
pub const DATA_KEY: &str = "data";

/// One captured signal, before it is merged with the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Event name: `click`, `pushState`, `error`, `promise`, ...
    pub event: String,
    /// Label or DOM tracking value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Occurrence {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Builds outbound records and sends them as beacons.
pub struct Reporter {
    config: Arc<RwLock<TrackerConfig>>,
    beacon: Arc<dyn BeaconSender>,
    clock: Arc<dyn Clock>,
    started_at: i64,
    last_time: AtomicI64,
}

impl Reporter {
    pub fn new(
        config: Arc<RwLock<TrackerConfig>>,
        beacon: Arc<dyn BeaconSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now_millis();
        Self {
            config,
            beacon,
            clock,
            started_at,
            last_time: AtomicI64::new(started_at),
        }
    }

    /// Clock reading taken at construction. No record is stamped earlier.
    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    /// Reports an auto-captured occurrence.
    pub fn report(&self, occurrence: &Occurrence) {
        self.send(occurrence);
    }

    /// Merges `data` into a record and sends it. Never fails.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) {
        let (url, body) = match self.encode(data) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "dropping record");
                return;
            }
        };

        let size = body.len();
        if self.beacon.send_beacon(&url, Beacon::form(body)) {
            tracing::debug!(url = %url, size, "beacon queued");
        } else {
            tracing::warn!(url = %url, size, "beacon refused");
        }
    }

    /// Builds the merged record for `data` without sending it.
    ///
    /// Does not count as a send: the next real record may still carry an
    /// earlier time than this preview.
    pub fn build_record<T: Serialize + ?Sized>(
        &self,
        data: &T,
    ) -> Result<Map<String, Value>, TrackerError> {
        merge(&self.config_snapshot(), data, self.peek_time())
    }

    /// Destination is always the configured endpoint, whatever the payload
    /// carries under `requestUrl`.
    fn encode<T: Serialize + ?Sized>(&self, data: &T) -> Result<(String, Vec<u8>), TrackerError> {
        let config = self.config_snapshot();
        let record = merge(&config, data, self.stamp_time())?;
        Ok((config.request_url, serde_json::to_vec(&record)?))
    }

    fn config_snapshot(&self) -> TrackerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clock reading clamped to the last stamped time, leaving the clamp as is.
    fn peek_time(&self) -> i64 {
        self.clock
            .now_millis()
            .max(self.last_time.load(Ordering::SeqCst))
    }

    /// Clock reading clamped so successive records never go backwards.
    fn stamp_time(&self) -> i64 {
        let now = self.clock.now_millis();
        let prev = self.last_time.fetch_max(now, Ordering::SeqCst);
        now.max(prev)
    }
}

fn merge<T: Serialize + ?Sized>(
    config: &TrackerConfig,
    data: &T,
    time: i64,
) -> Result<Map<String, Value>, TrackerError> {
    let mut record = match serde_json::to_value(config)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match serde_json::to_value(data)? {
        Value::Object(fields) => record.extend(fields),
        Value::Null => {}
        other => {
            record.insert(DATA_KEY.to_string(), other);
        }
    }

    record.insert(TIME_KEY.to_string(), Value::from(time));
    Ok(record)
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config_snapshot())
            .finish_non_exhaustive()
    }
}
