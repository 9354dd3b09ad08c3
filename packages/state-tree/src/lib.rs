//! # State Tree
//!
//! A hierarchical, immutable state container: a tree of state-holding nodes
//! where state changes only through named actions, every change is observable
//! through filtered, bubbling events, and the whole tree can be captured to and
//! restored from a plain value.
//!
//! ## Core Concepts
//!
//! - [`Node`] = one element of the tree: local state, children, subscribers
//! - [`NodeType`] = what nodes of one kind share: a name, reducers, snapshot hooks
//! - [`Action`] = a path-addressed request to run a reducer
//! - [`Event`] = what a subscriber observes while an action passes through
//!
//! The key principle: **every action is dispatched at the root**. Calling an
//! action on a deeply nested node computes that node's path and routes the
//! action down from the root, so every ancestor gets to observe it.
//!
//! ## Architecture
//!
//! ```text
//! ActionCreator.call(node)
//!     │
//!     ▼ path_from_root()
//! root.dispatch("messages.add")
//!     │
//!     ├─► App      before-subscribers
//!     ├─► Messages before-subscribers
//!     │       │
//!     │       ▼
//!     │   reducer(node, payload) ─► state replaced
//!     │       │
//!     ├─◄ Messages after-subscribers
//!     └─◄ App      after-subscribers (bubble only)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **State is assigned once** - `initialize` succeeds exactly once per node
//! 2. **Parents are assigned once** - children are mounted at initialization, never re-parented
//! 3. **Reducers replace** - a reducer returns the whole next state, nothing is mutated in place
//! 4. **Before descends, after unwinds** - events fire root→target before, target→root after
//! 5. **Snapshots are strict** - unknown keys fail instead of being dropped
//!
//! ## Example
//!
//! ```ignore
//! use serde_json::json;
//! use state_tree::{Node, NodeType, Shape};
//!
//! // 1. Define node types and their actions
//! let messages_type = NodeType::new("Messages");
//! let add = messages_type.register_action("add", |node, payload| {
//!     let mut state = node.state();
//!     let mut all = state["all"].as_array().cloned().unwrap_or_default();
//!     all.extend(payload.iter().cloned());
//!     state["all"] = all.into();
//!     Ok(state)
//! })?;
//!
//! // 2. Build the tree
//! let messages = Node::with_state(&messages_type, json!({ "all": [] }))?;
//! let app = Node::with_state(
//!     &NodeType::new("App"),
//!     Shape::fields().field("version", 1).child("messages", &messages),
//! )?;
//!
//! // 3. Observe the whole subtree
//! app.subscribe_all(|event| {
//!     println!("{}", event.action.action_type);
//!     Ok(())
//! })?;
//!
//! // 4. Act on a nested node; dispatched at the root as "messages.add"
//! add.call(&messages, vec![json!("hi")])?;
//!
//! assert_eq!(app.snapshot()?, json!({ "version": 1, "messages": { "all": ["hi"] } }));
//! ```
//!
//! ## What This Is Not
//!
//! - Thread-safe: nodes are `Rc`-based and dispatch is synchronous
//! - Persistent: snapshots are plain values, storing them is up to the host
//! - Transactional: a failing dispatch or restore is not rolled back

// Core modules
mod core;
mod dispatch;
mod error;
mod node;
mod path;
mod subscription;

// Snapshot service (free functions `create` / `apply`)
pub mod snapshot;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core types
pub use crate::core::{Action, Event, Phase, TriggerMeta, INIT_ACTION, PATH_DELIMITER};

// Re-export error types
pub use crate::error::{Result, StoreError};

// Re-export node types
pub use node::{Deserializer, Entry, Node, NodeType, Prop, Reducer, Serializer, Shape};

// Re-export path types
pub use path::{qualify, RootPath};

// Re-export dispatcher types
pub use dispatch::ActionCreator;

// Re-export subscription types
pub use subscription::{Handler, Subscriber, SubscriberFilter, Subscription, Unsubscribe};
