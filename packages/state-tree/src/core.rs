//! Core value types: actions, events and the constants that shape paths.
//!
//! # Overview
//!
//! An [`Action`] is a named, path-addressed request to transition a node's
//! state. Its `type` is the dot-joined chain of mount keys from the receiving
//! node down to the target, followed by the action name:
//!
//! ```text
//! messages.a.increment
//! ───────┬── ┬ ────┬────
//!  child key │  action name
//!        child key
//! ```
//!
//! An [`Event`] is what subscribers observe while an action travels along
//! that path. Each node on the path sees the action with the type made
//! relative to itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;

/// Separator between mount keys (and the final action name) in action types.
pub const PATH_DELIMITER: char = '.';

/// Action type of the synthetic event delivered to `init` subscribers.
pub const INIT_ACTION: &str = "@init";

// =============================================================================
// Action
// =============================================================================

/// A request to run a reducer somewhere in the tree.
///
/// Actions serialize as `{"type": ..., "payload": [...]}` so a host can record
/// them and replay them later through [`Node::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Dot-delimited path plus action name, relative to the receiving node.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Reducer arguments, in order.
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl Action {
    /// Create an action with the given type and payload.
    pub fn new(action_type: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }

    /// The synthetic `@init` action.
    pub fn init() -> Self {
        Self::new(INIT_ACTION, Vec::new())
    }

    /// Check if this is the synthetic `@init` action.
    pub fn is_init(&self) -> bool {
        self.action_type == INIT_ACTION
    }

    /// Split off the first path segment.
    ///
    /// Returns `Some((child_key, rest))` when the action is addressed to a
    /// descendant, `None` when it targets the receiving node itself.
    pub fn split_first(&self) -> Option<(&str, &str)> {
        self.action_type.split_once(PATH_DELIMITER)
    }

    /// The same action re-addressed relative to a child.
    pub(crate) fn forwarded(&self, rest: &str) -> Self {
        Self {
            action_type: rest.to_string(),
            payload: self.payload.clone(),
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// When, relative to the state change, an event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Delivered once on subscription to subscribers that asked for `init`.
    Init,
    /// Delivered before the reducer runs (on the way down the path).
    Before,
    /// Delivered after the reducer has replaced the state (on the way back up).
    After,
}

/// A notification delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Event {
    /// The node the subscriber is attached to.
    pub node: Node,
    /// The action, with its type relative to `node`.
    pub action: Action,
    /// Whether this is the before- or after-mutation notification.
    pub phase: Phase,
    /// `node`'s own state when the action reached it.
    pub before_state: Option<Value>,
    /// `node`'s own state once the action completed below it.
    pub after_state: Option<Value>,
    /// The subscriber's context value, if it declared one.
    pub context: Option<Value>,
}

/// Routing facts passed to a trigger pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerMeta {
    /// The action is addressed to a descendant, not the node itself.
    pub is_child: bool,
    /// Fire subscribers that listen before the mutation.
    pub before: bool,
    /// Fire subscribers that listen after the mutation.
    pub after: bool,
}

impl TriggerMeta {
    /// Meta for the before-mutation pass.
    pub fn before(is_child: bool) -> Self {
        Self {
            is_child,
            before: true,
            after: false,
        }
    }

    /// Meta for the after-mutation pass.
    pub fn after(is_child: bool) -> Self {
        Self {
            is_child,
            before: false,
            after: true,
        }
    }
}
