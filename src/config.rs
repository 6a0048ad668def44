//! Tracker configuration.
//!
//! [`TrackerOptions`] is what the host supplies; [`TrackerConfig`] is the
//! resolved configuration after merging those options over the defaults. The
//! resolved config is serialized verbatim into every outbound record, so its
//! field names are the wire names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TrackerError;

/// Protocol version tag carried in every record.
pub const SDK_VERSION: &str = "1.0.0";

/// Free-form context attached to every record.
pub type Extra = Map<String, Value>;

/// Resolved collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Session / user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Collection endpoint.
    pub request_url: String,

    /// Capture `pushState`, `replaceState` and `popstate`.
    #[serde(default)]
    pub history_tracker: bool,

    /// Capture `hashchange`.
    #[serde(default)]
    pub hash_tracker: bool,

    /// Capture pointer events on elements carrying `target-key`.
    #[serde(default)]
    pub dom_tracker: bool,

    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Extra>,

    /// Capture uncaught errors and unhandled rejections.
    #[serde(default)]
    pub js_error: bool,
}

fn default_sdk_version() -> String {
    SDK_VERSION.to_string()
}

impl TrackerConfig {
    /// Defaults for everything but the endpoint.
    pub fn with_endpoint(request_url: impl Into<String>) -> Self {
        Self {
            uuid: None,
            request_url: request_url.into(),
            history_tracker: false,
            hash_tracker: false,
            dom_tracker: false,
            sdk_version: default_sdk_version(),
            extra: None,
            js_error: false,
        }
    }

    /// True when at least one capture toggle is on.
    pub fn captures_anything(&self) -> bool {
        self.history_tracker || self.hash_tracker || self.dom_tracker || self.js_error
    }
}

/// Caller-supplied overrides. Only the endpoint is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOptions {
    pub request_url: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub history_tracker: Option<bool>,
    #[serde(default)]
    pub hash_tracker: Option<bool>,
    #[serde(default)]
    pub dom_tracker: Option<bool>,
    #[serde(default)]
    pub sdk_version: Option<String>,
    #[serde(default)]
    pub extra: Option<Extra>,
    #[serde(default)]
    pub js_error: Option<bool>,
}

impl TrackerOptions {
    pub fn new(request_url: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            ..Self::default()
        }
    }

    /// Parses options from a camelCase JSON object.
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        serde_json::from_str(json).map_err(TrackerError::InvalidOptions)
    }

    /// Like [`from_json`](Self::from_json), but `request_url`, when given,
    /// replaces the document's `requestUrl` and satisfies the requirement for
    /// one.
    pub fn from_json_with_endpoint(
        json: &str,
        request_url: Option<String>,
    ) -> Result<Self, TrackerError> {
        let mut value: Value = serde_json::from_str(json).map_err(TrackerError::InvalidOptions)?;
        if let (Some(url), Value::Object(fields)) = (request_url, &mut value) {
            fields.insert("requestUrl".to_string(), Value::String(url));
        }
        serde_json::from_value(value).map_err(TrackerError::InvalidOptions)
    }

    pub fn history_tracker(mut self, on: bool) -> Self {
        self.history_tracker = Some(on);
        self
    }

    pub fn hash_tracker(mut self, on: bool) -> Self {
        self.hash_tracker = Some(on);
        self
    }

    pub fn dom_tracker(mut self, on: bool) -> Self {
        self.dom_tracker = Some(on);
        self
    }

    pub fn js_error(mut self, on: bool) -> Self {
        self.js_error = Some(on);
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn extra(mut self, extra: Extra) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Merges these overrides over the defaults.
    pub fn resolve(self) -> TrackerConfig {
        let defaults = TrackerConfig::with_endpoint(self.request_url);
        TrackerConfig {
            uuid: self.uuid.or(defaults.uuid),
            history_tracker: self.history_tracker.unwrap_or(defaults.history_tracker),
            hash_tracker: self.hash_tracker.unwrap_or(defaults.hash_tracker),
            dom_tracker: self.dom_tracker.unwrap_or(defaults.dom_tracker),
            sdk_version: self.sdk_version.unwrap_or(defaults.sdk_version),
            extra: self.extra.or(defaults.extra),
            js_error: self.js_error.unwrap_or(defaults.js_error),
            request_url: defaults.request_url,
        }
    }
}

impl From<TrackerOptions> for TrackerConfig {
    fn from(options: TrackerOptions) -> Self {
        options.resolve()
    }
}
