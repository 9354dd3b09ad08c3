//! Nodes, node types, initialization and the read-only accessor layer.
//!
//! A [`Node`] is a cheap, clonable handle to one element of the tree. It owns
//! its local state, its children and its subscribers; it points back to its
//! parent weakly, so dropping a root drops the whole subtree.
//!
//! A [`NodeType`] plays the role of a class: every node created from it shares
//! its name, its reducer table and its snapshot hooks.
//!
//! # Key Properties
//!
//! - **Initialized once**: [`Node::initialize`] succeeds exactly once
//! - **Mounted once**: a child gets its parent and mount key at initialization
//!   and keeps them for life (no re-parenting)
//! - **Read-only from outside**: accessors only read; state changes through
//!   dispatch

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::PATH_DELIMITER;
use crate::error::{Result, StoreError};
use crate::subscription::Subscriber;

/// A reducer: receives the node it runs on and the action payload, returns
/// the node's next local state.
pub type Reducer = Rc<dyn Fn(&Node, &[Value]) -> anyhow::Result<Value>>;

/// Custom snapshot serializer: produces the value stored in place of the
/// node's local state.
pub type Serializer = Rc<dyn Fn(&Node) -> anyhow::Result<Value>>;

/// Custom snapshot deserializer: transforms an incoming snapshot value before
/// it is applied.
pub type Deserializer = Rc<dyn Fn(&Node, Value) -> anyhow::Result<Value>>;

// =============================================================================
// Node Type
// =============================================================================

/// Shared definition of a kind of node.
///
/// Registration (actions, snapshot hooks) can happen at any time and is
/// visible to every node of the type, including nodes created earlier.
#[derive(Clone)]
pub struct NodeType {
    pub(crate) inner: Rc<NodeTypeInner>,
}

pub(crate) struct NodeTypeInner {
    pub(crate) name: String,
    pub(crate) reducers: RefCell<BTreeMap<String, Reducer>>,
    pub(crate) serializer: RefCell<Option<Serializer>>,
    pub(crate) deserializer: RefCell<Option<Deserializer>>,
}

impl NodeType {
    /// Create a new node type with no actions and no snapshot hooks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(NodeTypeInner {
                name: name.into(),
                reducers: RefCell::new(BTreeMap::new()),
                serializer: RefCell::new(None),
                deserializer: RefCell::new(None),
            }),
        }
    }

    /// The type name used in error messages and logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Create an uninitialized node of this type.
    pub fn create(&self) -> Node {
        Node::new(self)
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NodeType {}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.inner.name)
            .field(
                "actions",
                &self.inner.reducers.borrow().keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Shape
// =============================================================================

/// One declared key of a field-mapping initial state.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A local state field.
    Field(Value),
    /// A child node, mounted under the key.
    Child(Node),
}

/// The argument of [`Node::initialize`].
///
/// `Shape::from(value)` turns a JSON object into a field mapping and anything
/// else into an opaque value. Use [`Shape::fields`] to declare children.
#[derive(Debug, Clone)]
pub enum Shape {
    /// A scalar or array stored as-is. The node has no fields and no children.
    Opaque(Value),
    /// Declared keys, in declaration order.
    Fields(Vec<(String, Entry)>),
}

impl Shape {
    /// Start an empty field mapping.
    pub fn fields() -> Self {
        Shape::Fields(Vec::new())
    }

    /// Declare a local state field.
    pub fn field(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entry(key.into(), Entry::Field(value.into()))
    }

    /// Declare a child node.
    pub fn child(self, key: impl Into<String>, node: &Node) -> Self {
        self.entry(key.into(), Entry::Child(node.clone()))
    }

    fn entry(self, key: String, entry: Entry) -> Self {
        let mut entries = match self {
            Shape::Fields(entries) => entries,
            Shape::Opaque(value) => Self::split_object(value),
        };
        entries.push((key, entry));
        Shape::Fields(entries)
    }

    fn split_object(value: Value) -> Vec<(String, Entry)> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (key, Entry::Field(value)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Value> for Shape {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) => Shape::Fields(Self::split_object(value)),
            other => Shape::Opaque(other),
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// A handle to one element of the state tree.
///
/// Cloning a `Node` clones the handle, not the element: clones compare equal
/// and observe the same state.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Rc<NodeInner>,
}

pub(crate) struct NodeInner {
    pub(crate) node_type: NodeType,
    pub(crate) state: RefCell<Value>,
    pub(crate) layout: OnceCell<Layout>,
    pub(crate) mount: OnceCell<Mount>,
    pub(crate) subscribers: RefCell<Vec<Rc<Subscriber>>>,
}

/// Keys declared at initialization.
#[derive(Default)]
pub(crate) struct Layout {
    pub(crate) keys: Vec<String>,
    pub(crate) children: BTreeMap<String, Node>,
}

/// Where a child hangs in its parent.
pub(crate) struct Mount {
    pub(crate) parent: Weak<NodeInner>,
    pub(crate) key: String,
}

/// The value behind a declared key.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// The key names a child node.
    Child(Node),
    /// The key names a local state field; holds its current value.
    Field(Value),
}

impl Node {
    /// Create an uninitialized node of the given type.
    pub fn new(node_type: &NodeType) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                node_type: node_type.clone(),
                state: RefCell::new(Value::Null),
                layout: OnceCell::new(),
                mount: OnceCell::new(),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a node and initialize it in one step.
    pub fn with_state(node_type: &NodeType, shape: impl Into<Shape>) -> Result<Self> {
        let node = Self::new(node_type);
        node.initialize(shape)?;
        Ok(node)
    }

    /// The node's type.
    pub fn node_type(&self) -> &NodeType {
        &self.inner.node_type
    }

    /// The node's type name.
    pub fn type_name(&self) -> &str {
        self.inner.node_type.name()
    }

    /// Check whether [`Node::initialize`] has run.
    pub fn is_initialized(&self) -> bool {
        self.inner.layout.get().is_some()
    }

    /// Set the node's initial state. Succeeds exactly once.
    ///
    /// Opaque values (scalars, strings, arrays) become the whole local state.
    /// A field mapping stores each [`Entry::Field`] under its key and mounts
    /// each [`Entry::Child`] as a child.
    ///
    /// All keys and children are validated before anything is written, so a
    /// failed call leaves the node uninitialized.
    pub fn initialize(&self, shape: impl Into<Shape>) -> Result<()> {
        if self.is_initialized() {
            return Err(StoreError::Reinitialized {
                store: self.type_name().to_string(),
            });
        }

        let entries = match shape.into() {
            Shape::Opaque(Value::Object(map)) => Shape::split_object(Value::Object(map)),
            Shape::Opaque(value) => {
                *self.inner.state.borrow_mut() = value;
                let _ = self.inner.layout.set(Layout::default());
                debug!(store = self.type_name(), "store initialized with opaque state");
                return Ok(());
            }
            Shape::Fields(entries) => entries,
        };

        self.validate_entries(&entries)?;

        let mut layout = Layout::default();
        let mut fields = Map::new();
        for (key, entry) in entries {
            match entry {
                Entry::Field(value) => {
                    fields.insert(key.clone(), value);
                }
                Entry::Child(child) => {
                    child.mount_under(self, &key)?;
                    layout.children.insert(key.clone(), child);
                }
            }
            layout.keys.push(key);
        }

        *self.inner.state.borrow_mut() = Value::Object(fields);
        debug!(
            store = self.type_name(),
            keys = layout.keys.len(),
            children = layout.children.len(),
            "store initialized"
        );
        let _ = self.inner.layout.set(layout);
        Ok(())
    }

    fn validate_entries(&self, entries: &[(String, Entry)]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut mounted: Vec<&Node> = Vec::new();

        for (key, entry) in entries {
            if !seen.insert(key.as_str()) {
                return Err(StoreError::DuplicateKey {
                    store: self.type_name().to_string(),
                    key: key.clone(),
                });
            }

            let Entry::Child(child) = entry else {
                continue;
            };

            if key.is_empty() || key.contains(PATH_DELIMITER) {
                return Err(StoreError::InvalidMountKey {
                    store: self.type_name().to_string(),
                    key: key.clone(),
                });
            }
            if child.inner.mount.get().is_some() || mounted.contains(&child) {
                return Err(StoreError::AlreadyMounted {
                    child: child.type_name().to_string(),
                    key: key.clone(),
                });
            }
            if child == self || self.ancestors().any(|ancestor| &ancestor == child) {
                return Err(StoreError::CyclicMount {
                    store: self.type_name().to_string(),
                    key: key.clone(),
                });
            }
            mounted.push(child);
        }

        Ok(())
    }

    fn mount_under(&self, parent: &Node, key: &str) -> Result<()> {
        let mount = Mount {
            parent: Rc::downgrade(&parent.inner),
            key: key.to_string(),
        };
        self.inner
            .mount
            .set(mount)
            .map_err(|_| StoreError::AlreadyMounted {
                child: self.type_name().to_string(),
                key: key.to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Accessor layer
    // -------------------------------------------------------------------------

    /// The node's own local state. Excludes children; `Null` before
    /// initialization.
    pub fn state(&self) -> Value {
        self.inner.state.borrow().clone()
    }

    /// Declared keys, in declaration order.
    ///
    /// These are exactly the keys passed to [`Node::initialize`]; they never
    /// include `state` or any internal bookkeeping.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .layout
            .get()
            .map(|layout| layout.keys.clone())
            .unwrap_or_default()
    }

    /// Read a declared key.
    pub fn get(&self, key: &str) -> Option<Prop> {
        if let Some(child) = self.child(key) {
            return Some(Prop::Child(child));
        }
        self.field(key).map(Prop::Field)
    }

    /// The child mounted under `key`.
    pub fn child(&self, key: &str) -> Option<Node> {
        self.inner.layout.get()?.children.get(key).cloned()
    }

    /// The current value of the declared local field `key`.
    pub fn field(&self, key: &str) -> Option<Value> {
        let layout = self.inner.layout.get()?;
        if layout.children.contains_key(key) || !layout.keys.iter().any(|k| k == key) {
            return None;
        }
        match &*self.inner.state.borrow() {
            Value::Object(fields) => fields.get(key).cloned(),
            _ => None,
        }
    }

    /// Children in mount-key order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> + '_ {
        self.inner
            .layout
            .get()
            .into_iter()
            .flat_map(|layout| layout.children.iter())
            .map(|(key, node)| (key.as_str(), node))
    }

    /// External write to `state` or a declared key.
    ///
    /// Always fails: state only changes through dispatch.
    pub fn assign(&self, key: &str, _value: Value) -> Result<()> {
        Err(StoreError::ReadOnly {
            store: self.type_name().to_string(),
            key: key.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // Tree links
    // -------------------------------------------------------------------------

    /// The owning node, or `None` for a root.
    pub fn parent(&self) -> Option<Node> {
        let mount = self.inner.mount.get()?;
        mount.parent.upgrade().map(|inner| Node { inner })
    }

    /// The key this node is mounted under in its parent.
    pub fn mount_key(&self) -> Option<&str> {
        self.inner.mount.get().map(|mount| mount.key.as_str())
    }

    /// Parent, grandparent, ... up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Node> {
        std::iter::successors(self.parent(), Node::parent)
    }

    // -------------------------------------------------------------------------
    // Internal writes
    // -------------------------------------------------------------------------

    pub(crate) fn replace_state(&self, value: Value) {
        *self.inner.state.borrow_mut() = value;
    }

    /// Overwrite one field of a mapping state. Returns false if the state has
    /// no such field.
    pub(crate) fn overwrite_field(&self, key: &str, value: Value) -> bool {
        match &mut *self.inner.state.borrow_mut() {
            Value::Object(fields) => match fields.get_mut(key) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub(crate) fn child_keys(&self) -> BTreeSet<String> {
        self.children().map(|(key, _)| key.to_string()).collect()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.type_name())
            .field("mount_key", &self.mount_key())
            .field("state", &*self.inner.state.borrow())
            .field("children", &self.child_keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app_type() -> NodeType {
        NodeType::new("App")
    }

    #[test]
    fn test_initialize_mapping() {
        let app = Node::with_state(
            &app_type(),
            json!({
                "version": 1,
                "a": { "b": { "c": "nested" } },
                "messages": ["A", "B", "C"],
            }),
        )
        .unwrap();

        assert_eq!(app.state()["version"], json!(1));
        assert_eq!(app.state()["a"]["b"]["c"], json!("nested"));
        assert_eq!(app.field("messages"), Some(json!(["A", "B", "C"])));
        assert_eq!(app.get("version"), Some(Prop::Field(json!(1))));
    }

    #[test]
    fn test_initialize_opaque() {
        let ty = NodeType::new("A");
        for value in [json!("test"), json!(100), json!(["a", "b"]), json!(true)] {
            let node = Node::with_state(&ty, value.clone()).unwrap();
            assert_eq!(node.state(), value);
            assert!(node.keys().is_empty());
            assert_eq!(node.children().count(), 0);
        }
    }

    #[test]
    fn test_reinitialize_fails_and_keeps_state() {
        let app = Node::with_state(&app_type(), json!({ "version": 1 })).unwrap();

        let err = app.initialize(json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Reinitialized { ref store } if store == "App"));
        assert_eq!(app.state(), json!({ "version": 1 }));
        assert_eq!(app.keys(), vec!["version"]);
    }

    #[test]
    fn test_keys_are_declared_keys_only() {
        let messages = Node::with_state(&NodeType::new("Messages"), json!({ "all": [] })).unwrap();
        let app = Node::new(&app_type());
        app.initialize(
            Shape::fields()
                .field("version", 1)
                .child("messages", &messages)
                .field("title", "inbox"),
        )
        .unwrap();

        assert_eq!(app.keys(), vec!["version", "messages", "title"]);
        assert!(!app.keys().iter().any(|k| k == "state"));
        // Children are not part of the local state.
        assert_eq!(app.state(), json!({ "version": 1, "title": "inbox" }));
    }

    #[test]
    fn test_child_is_mounted() {
        let messages = Node::with_state(&NodeType::new("Messages"), json!({ "all": [] })).unwrap();
        let app = Node::new(&app_type());
        app.initialize(Shape::fields().child("messages", &messages))
            .unwrap();

        assert_eq!(app.child("messages"), Some(messages.clone()));
        assert_eq!(app.get("messages"), Some(Prop::Child(messages.clone())));
        assert_eq!(messages.parent(), Some(app.clone()));
        assert_eq!(messages.mount_key(), Some("messages"));
        assert_eq!(app.parent(), None);
        assert_eq!(app.mount_key(), None);
        assert_eq!(app.field("messages"), None);
    }

    #[test]
    fn test_assign_is_read_only() {
        let app = Node::with_state(&app_type(), json!({ "version": 1 })).unwrap();

        for key in ["version", "state", "anything"] {
            let err = app.assign(key, json!(2)).unwrap_err();
            assert!(matches!(err, StoreError::ReadOnly { .. }));
        }
        assert_eq!(app.field("version"), Some(json!(1)));
    }

    #[test]
    fn test_child_cannot_be_mounted_twice() {
        let shared = Node::with_state(&NodeType::new("Shared"), json!(0)).unwrap();
        let first = Node::new(&app_type());
        first.initialize(Shape::fields().child("shared", &shared)).unwrap();

        let second = Node::new(&app_type());
        let err = second
            .initialize(Shape::fields().field("x", 1).child("shared", &shared))
            .unwrap_err();

        assert!(matches!(err, StoreError::AlreadyMounted { .. }));
        assert!(!second.is_initialized());
        assert_eq!(shared.parent(), Some(first));
    }

    #[test]
    fn test_same_child_under_two_keys() {
        let shared = Node::new(&NodeType::new("Shared"));
        let app = Node::new(&app_type());
        let err = app
            .initialize(Shape::fields().child("a", &shared).child("b", &shared))
            .unwrap_err();

        assert!(matches!(err, StoreError::AlreadyMounted { ref key, .. } if key == "b"));
        assert!(shared.parent().is_none());
    }

    #[test]
    fn test_duplicate_and_invalid_keys() {
        let app = Node::new(&app_type());
        let err = app
            .initialize(Shape::fields().field("a", 1).field("a", 2))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        let child = Node::new(&NodeType::new("Child"));
        let err = app
            .initialize(Shape::fields().child("a.b", &child))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidMountKey { .. }));
        assert!(!app.is_initialized());
    }

    #[test]
    fn test_cyclic_mount_rejected() {
        let root = Node::new(&app_type());
        let leaf = Node::new(&NodeType::new("Leaf"));
        root.initialize(Shape::fields().child("leaf", &leaf)).unwrap();

        let err = leaf
            .initialize(Shape::fields().child("root", &root))
            .unwrap_err();
        assert!(matches!(err, StoreError::CyclicMount { .. }));

        let lonely = Node::new(&NodeType::new("Lonely"));
        let err = lonely
            .initialize(Shape::fields().child("me", &lonely))
            .unwrap_err();
        assert!(matches!(err, StoreError::CyclicMount { .. }));
    }

    #[test]
    fn test_dropping_root_releases_children() {
        let child = Node::new(&NodeType::new("Child"));
        let weak = Rc::downgrade(&child.inner);
        {
            let root = Node::new(&app_type());
            root.initialize(Shape::fields().child("child", &child)).unwrap();
            drop(child);
            assert!(weak.upgrade().is_some());
        }
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_node_identity() {
        let ty = app_type();
        let a = ty.create();
        let b = ty.create();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.node_type(), b.node_type());
        assert_eq!(a.state(), Value::Null);
    }
}
