//! Testing utilities for state trees.
//!
//! # Feature Flag
//!
//! This module is compiled for the crate's own tests and, for downstream
//! crates, behind the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! state-tree = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use state_tree::testing::{fixtures, EventRecorder};
//!
//! let fx = fixtures::sample_app();
//! let recorder = EventRecorder::new();
//! fx.app.subscribe(recorder.subscriber().bubble(true))?;
//!
//! fx.increment.call(&fx.counter, vec![])?;
//!
//! assert_eq!(recorder.types(), vec!["messages.counter.increment"]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::core::{Event, Phase};
use crate::subscription::{Handler, Subscriber};

/// One event as seen by an [`EventRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Type name of the node the subscriber was attached to.
    pub store: String,
    /// Action type relative to that node.
    pub action_type: String,
    /// Action payload.
    pub payload: Vec<Value>,
    /// Delivery phase.
    pub phase: Phase,
    /// Subscriber context, if any.
    pub context: Option<Value>,
}

/// Records every event its handler receives, in delivery order.
///
/// All subscribers built from one recorder share one handler and one log, so
/// a single recorder attached at several nodes shows the global firing order.
#[derive(Clone)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<RecordedEvent>>>,
    handler: Handler,
}

impl EventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        let events: Rc<RefCell<Vec<RecordedEvent>>> = Rc::default();
        let sink = Rc::clone(&events);
        let handler = Handler::new(move |event: &Event| {
            sink.borrow_mut().push(RecordedEvent {
                store: event.node.type_name().to_string(),
                action_type: event.action.action_type.clone(),
                payload: event.action.payload.clone(),
                phase: event.phase,
                context: event.context.clone(),
            });
            Ok(())
        });
        Self { events, handler }
    }

    /// The shared handler.
    pub fn handler(&self) -> Handler {
        self.handler.clone()
    }

    /// A subscriber with default flags using the shared handler.
    pub fn subscriber(&self) -> Subscriber {
        Subscriber::with_handler(self.handler())
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    /// Recorded action types.
    pub fn types(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|e| e.action_type.clone())
            .collect()
    }

    /// Recorded `(store, phase)` pairs.
    pub fn trail(&self) -> Vec<(String, Phase)> {
        self.events
            .borrow()
            .iter()
            .map(|e| (e.store.clone(), e.phase))
            .collect()
    }

    /// Recorded phases.
    pub fn phases(&self) -> Vec<Phase> {
        self.events.borrow().iter().map(|e| e.phase).collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("event_count", &self.len())
            .finish()
    }
}

/// Ready-made trees.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::dispatch::ActionCreator;
    use crate::node::{Node, NodeType, Shape};

    /// `App { version, messages: Messages { all, counter: Counter { value } } }`
    /// with one action per level.
    #[derive(Debug, Clone)]
    pub struct SampleApp {
        /// Root: `{ version: 1 }`.
        pub app: Node,
        /// Mounted as `messages`: `{ all: ["A", "B"] }`.
        pub messages: Node,
        /// Mounted as `messages.counter`: `{ value: 1 }`.
        pub counter: Node,
        /// `App.bump()`: `version + 1`.
        pub bump: ActionCreator,
        /// `Messages.add(message)`: appends to `all`.
        pub add: ActionCreator,
        /// `Counter.increment()`: `value + 1`.
        pub increment: ActionCreator,
    }

    fn increment_field(node: &Node, key: &str) -> anyhow::Result<Value> {
        let mut state = node.state();
        let current = state[key]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("{key} is not an integer"))?;
        state[key] = json!(current + 1);
        Ok(state)
    }

    /// Build a fresh sample tree.
    pub fn sample_app() -> SampleApp {
        let counter_type = NodeType::new("Counter");
        let increment = counter_type
            .register_action("increment", |node, _| increment_field(node, "value"))
            .expect("valid action name");

        let messages_type = NodeType::new("Messages");
        let add = messages_type
            .register_action("add", |node, payload| {
                let mut state = node.state();
                let mut all = state["all"].as_array().cloned().unwrap_or_default();
                all.extend(payload.iter().cloned());
                state["all"] = Value::Array(all);
                Ok(state)
            })
            .expect("valid action name");

        let app_type = NodeType::new("App");
        let bump = app_type
            .register_action("bump", |node, _| increment_field(node, "version"))
            .expect("valid action name");

        let counter =
            Node::with_state(&counter_type, json!({ "value": 1 })).expect("fresh counter");
        let messages = Node::with_state(
            &messages_type,
            Shape::fields()
                .field("all", json!(["A", "B"]))
                .child("counter", &counter),
        )
        .expect("fresh messages");
        let app = Node::with_state(
            &app_type,
            Shape::fields()
                .field("version", 1)
                .child("messages", &messages),
        )
        .expect("fresh app");

        SampleApp {
            app,
            messages,
            counter,
            bump,
            add,
            increment,
        }
    }
}
