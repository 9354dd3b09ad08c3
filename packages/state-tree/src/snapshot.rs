//! Snapshots of a whole subtree as one plain value.
//!
//! # The Contract
//!
//! 1. **Create merges.** A mapping node's snapshot is its local fields plus one
//!    entry per child, holding that child's snapshot. An opaque node's snapshot
//!    is its value.
//!
//! 2. **Apply splits.** Each snapshot key overwrites the local field of that
//!    name, or is applied recursively to the child of that name.
//!
//! 3. **Unknown keys are fatal.** A key that is neither a field nor a child
//!    fails with [`StoreError::ShapeMismatch`]; nothing is silently dropped.
//!
//! 4. **Hooks replace representation.** A node type may register a serializer
//!    (used instead of the local state when creating) and a deserializer
//!    (transforming the incoming value before applying).
//!
//! # What This Does NOT Guarantee
//!
//! - No atomicity. Keys handled before a failing key stay written.
//! - No events. Restoring is not an action; subscribers are not notified.
//!
//! Without hooks, `apply(node, create(node)?)` leaves `create(node)` unchanged.

use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::error::{Result, StoreError};
use crate::node::{Deserializer, Node, NodeType, Serializer};

impl NodeType {
    /// Use `serializer`'s output in place of the local state in snapshots.
    pub fn set_serializer<F>(&self, serializer: F)
    where
        F: Fn(&Node) -> anyhow::Result<Value> + 'static,
    {
        let serializer: Serializer = Rc::new(serializer);
        *self.inner.serializer.borrow_mut() = Some(serializer);
    }

    /// Transform incoming snapshot values with `deserializer` before applying.
    pub fn set_deserializer<F>(&self, deserializer: F)
    where
        F: Fn(&Node, Value) -> anyhow::Result<Value> + 'static,
    {
        let deserializer: Deserializer = Rc::new(deserializer);
        *self.inner.deserializer.borrow_mut() = Some(deserializer);
    }

    /// Check if either snapshot hook is registered.
    pub fn has_snapshot_hooks(&self) -> bool {
        self.inner.serializer.borrow().is_some() || self.inner.deserializer.borrow().is_some()
    }

    fn serializer(&self) -> Option<Serializer> {
        self.inner.serializer.borrow().clone()
    }

    fn deserializer(&self) -> Option<Deserializer> {
        self.inner.deserializer.borrow().clone()
    }
}

/// Capture `node` and its whole subtree as a plain value.
pub fn create(node: &Node) -> Result<Value> {
    let local = match node.node_type().serializer() {
        Some(serializer) => serializer(node).map_err(|source| StoreError::Serializer {
            store: node.type_name().to_string(),
            source,
        })?,
        None => node.state(),
    };

    let mut merged = match local {
        Value::Object(fields) => fields,
        opaque => {
            trace!(store = node.type_name(), "snapshot of opaque state");
            return Ok(opaque);
        }
    };

    for (key, child) in node.children() {
        merged.insert(key.to_string(), create(child)?);
    }

    trace!(
        store = node.type_name(),
        keys = merged.len(),
        "snapshot created"
    );
    Ok(Value::Object(merged))
}

/// Overwrite `node`'s state and its descendants' from a snapshot value.
pub fn apply(node: &Node, snapshot: Value) -> Result<()> {
    let snapshot = match node.node_type().deserializer() {
        Some(deserializer) => {
            deserializer(node, snapshot).map_err(|source| StoreError::Deserializer {
                store: node.type_name().to_string(),
                source,
            })?
        }
        None => snapshot,
    };

    let entries = match snapshot {
        Value::Object(entries) => entries,
        opaque => {
            trace!(store = node.type_name(), "snapshot replaced opaque state");
            node.replace_state(opaque);
            return Ok(());
        }
    };

    for (key, value) in entries {
        if has_local_field(node, &key) {
            node.overwrite_field(&key, value);
        } else if let Some(child) = node.child(&key) {
            apply(&child, value)?;
        } else {
            return Err(StoreError::ShapeMismatch {
                store: node.type_name().to_string(),
                key,
            });
        }
    }

    trace!(store = node.type_name(), "snapshot applied");
    Ok(())
}

fn has_local_field(node: &Node, key: &str) -> bool {
    matches!(&*node.inner.state.borrow(), Value::Object(fields) if fields.contains_key(key))
}

impl Node {
    /// Shortcut for [`create`].
    pub fn snapshot(&self) -> Result<Value> {
        create(self)
    }

    /// Shortcut for [`apply`].
    pub fn restore(&self, snapshot: Value) -> Result<()> {
        apply(self, snapshot)
    }
}
