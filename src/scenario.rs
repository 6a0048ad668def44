//! Scripted page activity.
//!
//! A scenario is line-delimited JSON, one step per line, tagged by `type`:
//!
//! ```text
//! # comments and blank lines are skipped
//! {"type":"pushState","url":"/cart"}
//! {"type":"pointer","event":"click","targetKey":"submit-button"}
//! {"type":"error","message":"x is not defined"}
//! {"type":"unhandledRejection","reason":"network fail"}
//! {"type":"setUserId","id":"abc"}
//! {"type":"send","data":{"event":"signup"}}
//! ```
//!
//! Replaying drives a [`Tracker`] over a [`SessionHistory`] exactly as a page
//! would: navigation goes through the bridged history, everything else is
//! dispatched on the tracker's bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Extra;
use crate::error::TrackerError;
use crate::event::{Element, EventType, PageEvent, RejectionReason, TARGET_KEY_ATTRIBUTE};
use crate::history::{NavigationMutator, SessionHistory};
use crate::tracker::Tracker;

/// One step of a scenario script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScenarioStep {
    PushState {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        state: Value,
    },
    ReplaceState {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        state: Value,
    },
    Back,
    Forward,
    SetHash {
        fragment: String,
    },
    Pointer {
        event: EventType,
        #[serde(default, rename = "targetKey")]
        target_key: Option<String>,
        #[serde(default)]
        tag: Option<String>,
    },
    Error {
        message: String,
    },
    UnhandledRejection {
        reason: String,
    },
    Send {
        data: Value,
    },
    SetUserId {
        id: String,
    },
    SetExtra {
        extra: Extra,
    },
}

impl ScenarioStep {
    /// Applies this step to `tracker`.
    pub fn apply(&self, tracker: &Tracker<SessionHistory>) {
        let history = tracker.history();
        let bus = tracker.bus();
        match self {
            Self::PushState { url, state } => {
                if let Err(e) = history.push_state(state.clone(), "", url.as_deref()) {
                    tracing::warn!(error = %e, ?url, "pushState rejected");
                }
            }
            Self::ReplaceState { url, state } => {
                if let Err(e) = history.replace_state(state.clone(), "", url.as_deref()) {
                    tracing::warn!(error = %e, ?url, "replaceState rejected");
                }
            }
            Self::Back => {
                history.inner().back(bus);
            }
            Self::Forward => {
                history.inner().forward(bus);
            }
            Self::SetHash { fragment } => {
                history.inner().set_hash(fragment, bus);
            }
            Self::Pointer {
                event,
                target_key,
                tag,
            } => {
                if !event.is_pointer() {
                    tracing::warn!(event = %event, "pointer step with non-pointer event, skipped");
                    return;
                }
                let mut element = Element::new(tag.as_deref().unwrap_or("div"));
                if let Some(key) = target_key {
                    element.set_attribute(TARGET_KEY_ATTRIBUTE, key.as_str());
                }
                bus.dispatch(&PageEvent::pointer(*event, element));
            }
            Self::Error { message } => {
                bus.dispatch(&PageEvent::error(message.as_str()));
            }
            Self::UnhandledRejection { reason } => {
                bus.dispatch(&PageEvent::rejection(RejectionReason::ready(reason.as_str())));
            }
            Self::Send { data } => tracker.send_tracker(data),
            Self::SetUserId { id } => tracker.set_user_id(id.as_str()),
            Self::SetExtra { extra } => tracker.set_extra(extra.clone()),
        }
    }
}

/// Parses a scenario script.
pub fn parse_script(script: &str) -> Result<Vec<ScenarioStep>, TrackerError> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line.trim()).map_err(|source| TrackerError::Scenario {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Applies every step in order. Returns the number of steps applied.
pub fn replay(steps: &[ScenarioStep], tracker: &Tracker<SessionHistory>) -> usize {
    for step in steps {
        tracing::debug!(?step, "replaying");
        step.apply(tracker);
    }
    steps.len()
}
