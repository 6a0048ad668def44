//! Page event types.
//!
//! The vocabulary carried over the [`EventBus`](crate::bus::EventBus): the
//! native and synthetic event names a page emits, the DOM element an
//! interaction targets, and the payloads of error and rejection events.

use std::collections::HashMap;
use std::fmt;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// DOM attribute whose value opts an element into pointer capture.
pub const TARGET_KEY_ATTRIBUTE: &str = "target-key";

/// Event names as they appear on the page's event target.
///
/// Serialized as the name returned by [`EventType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Synthetic, dispatched after `history.pushState`.
    PushState,
    /// Synthetic, dispatched after `history.replaceState`.
    ReplaceState,
    PopState,
    HashChange,
    Click,
    DblClick,
    ContextMenu,
    MouseDown,
    MouseUp,
    MouseEnter,
    MouseOut,
    MouseOver,
    Error,
    UnhandledRejection,
}

/// The pointer-interaction events observed by DOM tracking.
pub const MOUSE_EVENTS: [EventType; 8] = [
    EventType::Click,
    EventType::DblClick,
    EventType::ContextMenu,
    EventType::MouseDown,
    EventType::MouseUp,
    EventType::MouseEnter,
    EventType::MouseOut,
    EventType::MouseOver,
];

impl EventType {
    pub const ALL: [EventType; 14] = [
        Self::PushState,
        Self::ReplaceState,
        Self::PopState,
        Self::HashChange,
        Self::Click,
        Self::DblClick,
        Self::ContextMenu,
        Self::MouseDown,
        Self::MouseUp,
        Self::MouseEnter,
        Self::MouseOut,
        Self::MouseOver,
        Self::Error,
        Self::UnhandledRejection,
    ];

    /// Returns the event name used on the wire and on the event target.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushState => "pushState",
            Self::ReplaceState => "replaceState",
            Self::PopState => "popstate",
            Self::HashChange => "hashchange",
            Self::Click => "click",
            Self::DblClick => "dblclick",
            Self::ContextMenu => "contextmenu",
            Self::MouseDown => "mousedown",
            Self::MouseUp => "mouseup",
            Self::MouseEnter => "mouseenter",
            Self::MouseOut => "mouseout",
            Self::MouseOver => "mouseover",
            Self::Error => "error",
            Self::UnhandledRejection => "unhandledrejection",
        }
    }

    /// Parses an event name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == name)
    }

    /// True for the pointer-interaction set in [`MOUSE_EVENTS`].
    pub fn is_pointer(&self) -> bool {
        MOUSE_EVENTS.contains(self)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name)
            .ok_or_else(|| de::Error::custom(format!("unknown event type `{name}`")))
    }
}

/// Minimal DOM element: a tag name plus its attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    attributes: HashMap<String, String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Value of the tracking attribute, if present and non-empty.
    pub fn target_key(&self) -> Option<&str> {
        self.get_attribute(TARGET_KEY_ATTRIBUTE)
            .filter(|value| !value.is_empty())
    }
}

/// Eventual reason of a rejected promise.
///
/// Cloneable so every listener on the bus can await the same reason.
#[derive(Clone)]
pub struct RejectionReason {
    inner: Shared<BoxFuture<'static, String>>,
}

impl RejectionReason {
    /// A reason that is already known.
    pub fn ready(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::from_future(async move { reason })
    }

    /// A reason that resolves when `fut` completes.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = String> + Send + 'static,
    {
        Self {
            inner: fut.boxed().shared(),
        }
    }

    /// Waits for the reason.
    pub async fn resolve(self) -> String {
        self.inner.await
    }
}

impl fmt::Debug for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peek() {
            Some(reason) => f.debug_tuple("RejectionReason").field(reason).finish(),
            None => f.write_str("RejectionReason(<pending>)"),
        }
    }
}

/// One event dispatched on the page.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Navigation signal with no payload: `pushState`, `replaceState`,
    /// `popstate` or `hashchange`.
    Navigation(EventType),
    /// Pointer interaction on a DOM element.
    Pointer { kind: EventType, target: Element },
    /// Uncaught exception.
    Error { message: String },
    /// Promise rejected with no handler attached.
    UnhandledRejection { reason: RejectionReason },
}

impl PageEvent {
    pub fn pointer(kind: EventType, target: Element) -> Self {
        Self::Pointer { kind, target }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn rejection(reason: RejectionReason) -> Self {
        Self::UnhandledRejection { reason }
    }

    /// The name listeners subscribe under.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Navigation(kind) | Self::Pointer { kind, .. } => *kind,
            Self::Error { .. } => EventType::Error,
            Self::UnhandledRejection { .. } => EventType::UnhandledRejection,
        }
    }

    /// Target element, for pointer events.
    pub fn target(&self) -> Option<&Element> {
        match self {
            Self::Pointer { target, .. } => Some(target),
            _ => None,
        }
    }
}
