//! Beacon delivery.
//!
//! A beacon is a fire-and-forget transmission: it is queued without blocking
//! the caller, survives the page going away, and yields no acknowledgement.
//! The only feedback is whether the sender accepted it for delivery.
//!
//! # Content type
//!
//! Records are JSON but are declared as form data:
//!
//! ```text
//! Content-Type: application/x-www-form-urlencoded
//! Body:         {"requestUrl":"...","event":"click",...,"time":1700000000000}
//! ```
//!
//! Collection endpoints in the wild accept this pairing, so it is kept as is.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

/// Content type declared on every beacon.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Largest body a sender will queue (64KB, the common browser beacon quota).
pub const MAX_BEACON_SIZE: usize = 64 * 1024;

/// One beacon body with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Beacon {
    /// A JSON body declared as form-urlencoded.
    pub fn form(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: FORM_URLENCODED,
            body: body.into(),
        }
    }

    /// Whether the body fits within [`MAX_BEACON_SIZE`].
    pub fn fits(&self) -> bool {
        self.body.len() <= MAX_BEACON_SIZE
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A beacon addressed to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBeacon {
    pub url: String,
    pub beacon: Beacon,
}

/// Non-blocking, unload-safe transmission primitive.
pub trait BeaconSender: Send + Sync {
    /// Queues `beacon` for `url`. Returns whether it was accepted; delivery
    /// itself is never confirmed. Must not block and must not panic.
    fn send_beacon(&self, url: &str, beacon: Beacon) -> bool;
}

/// Keeps every accepted beacon in memory.
#[derive(Debug, Default)]
pub struct MemoryBeacon {
    sent: Mutex<Vec<SentBeacon>>,
}

impl MemoryBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all accepted beacons, oldest first.
    pub fn sent(&self) -> Vec<SentBeacon> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Bodies of all accepted beacons parsed as JSON. Unparseable bodies are
    /// skipped.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|sent| sent.beacon.json().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BeaconSender for MemoryBeacon {
    fn send_beacon(&self, url: &str, beacon: Beacon) -> bool {
        if !beacon.fits() {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentBeacon {
                url: url.to_string(),
                beacon,
            });
        true
    }
}

/// Forwards beacons to an unbounded channel.
///
/// Sending never waits; a beacon is refused only once the receiving side has
/// been dropped.
#[derive(Debug, Clone)]
pub struct ChannelBeacon {
    tx: mpsc::UnboundedSender<SentBeacon>,
}

impl ChannelBeacon {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SentBeacon>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BeaconSender for ChannelBeacon {
    fn send_beacon(&self, url: &str, beacon: Beacon) -> bool {
        if !beacon.fits() {
            return false;
        }
        self.tx
            .send(SentBeacon {
                url: url.to_string(),
                beacon,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_beacon_declares_urlencoded() {
        let beacon = Beacon::form(r#"{"event":"click"}"#);

        assert_eq!(beacon.content_type, "application/x-www-form-urlencoded");
        assert_eq!(beacon.json().unwrap()["event"], "click");
    }

    #[test]
    fn oversized_beacons_are_refused() {
        let sender = MemoryBeacon::new();

        assert!(sender.send_beacon("/t", Beacon::form(vec![b'x'; MAX_BEACON_SIZE])));
        assert!(!sender.send_beacon("/t", Beacon::form(vec![b'x'; MAX_BEACON_SIZE + 1])));
        assert_eq!(sender.len(), 1);
    }

    #[test]
    fn memory_beacon_keeps_order_and_url() {
        let sender = MemoryBeacon::new();
        sender.send_beacon("/a", Beacon::form(r#"{"n":1}"#));
        sender.send_beacon("/b", Beacon::form(r#"{"n":2}"#));

        let sent = sender.sent();
        assert_eq!(sent[0].url, "/a");
        assert_eq!(sent[1].url, "/b");
        assert_eq!(sender.records()[1]["n"], 2);
    }

    #[tokio::test]
    async fn channel_beacon_forwards_until_receiver_dropped() {
        let (sender, mut rx) = ChannelBeacon::new();

        assert!(sender.send_beacon("/t", Beacon::form("{}")));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.url, "/t");

        drop(rx);
        assert!(!sender.send_beacon("/t", Beacon::form("{}")));
    }
}
