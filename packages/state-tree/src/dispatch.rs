//! Action registration and the dispatcher.
//!
//! The dispatcher is responsible for:
//! 1. Routing an action down the child chain, one path segment per node
//! 2. Running the target node's reducer and replacing its state
//! 3. Firing before-events on the way down and after-events on the way up
//!
//! # Ordering
//!
//! Dispatching `messages.a.increment` at the root behaves like a pre-order /
//! post-order walk along the single path to the target:
//!
//! ```text
//! App.before ─► Messages.before ─► A.before ─► reducer
//!                                                 │
//! App.after  ◄─ Messages.after  ◄─ A.after   ◄────┘
//! ```
//!
//! Execution is synchronous. A subscriber may dispatch again from inside its
//! handler; the nested dispatch runs to completion before the outer one
//! resumes. No borrow of tree state is held while reducers or handlers run.

use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::core::{Action, TriggerMeta, PATH_DELIMITER};
use crate::error::{Result, StoreError};
use crate::node::{Node, NodeType, Reducer};

// =============================================================================
// Action Registration
// =============================================================================

/// Invokes a registered action on nodes of the type it was registered on.
///
/// Calling the creator computes the node's path from its root and dispatches
/// the qualified action at that root, so the action is always routed through
/// the root dispatcher and every ancestor observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCreator {
    name: Rc<str>,
    node_type: NodeType,
}

impl ActionCreator {
    /// The unqualified action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node type the action was registered on.
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// Dispatch the action addressed to `node` through its root.
    ///
    /// Fails with [`StoreError::ActionNotFound`] when `node` is of another
    /// type, even if that type registered a reducer of the same name.
    /// Returns `node`'s state after the dispatch.
    pub fn call(&self, node: &Node, payload: Vec<Value>) -> Result<Value> {
        if node.node_type() != &self.node_type {
            return Err(StoreError::ActionNotFound {
                store: node.type_name().to_string(),
                action: self.name.to_string(),
            });
        }
        node.act(&self.name, payload)
    }
}

impl NodeType {
    /// Register `reducer` under `name` and return a creator for the action.
    ///
    /// Registering an existing name replaces its reducer.
    pub fn register_action<F>(&self, name: &str, reducer: F) -> Result<ActionCreator>
    where
        F: Fn(&Node, &[Value]) -> anyhow::Result<Value> + 'static,
    {
        if name.is_empty() || name.contains(PATH_DELIMITER) {
            return Err(StoreError::InvalidActionName {
                store: self.name().to_string(),
                action: name.to_string(),
            });
        }

        let reducer: Reducer = Rc::new(reducer);
        self.inner
            .reducers
            .borrow_mut()
            .insert(name.to_string(), reducer);

        Ok(ActionCreator {
            name: name.into(),
            node_type: self.clone(),
        })
    }

    /// Check if an action is registered under `name`.
    pub fn has_action(&self, name: &str) -> bool {
        self.inner.reducers.borrow().contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn action_names(&self) -> Vec<String> {
        self.inner.reducers.borrow().keys().cloned().collect()
    }

    fn reducer(&self, name: &str) -> Option<Reducer> {
        self.inner.reducers.borrow().get(name).cloned()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

impl Node {
    /// Invoke the action `name` on this node, routed through the root.
    ///
    /// Returns this node's state after the dispatch.
    pub fn act(&self, name: &str, payload: Vec<Value>) -> Result<Value> {
        let found = self.path_from_root();
        let action = Action::new(found.action_type(name), payload);
        found.root.dispatch(action)?;
        Ok(self.state())
    }

    /// Route `action` from this node to its target and apply the reducer.
    ///
    /// The action type is relative to this node: a bare name targets this
    /// node, `child.name` targets the child mounted as `child`, and so on.
    /// Returns this node's (possibly new) local state.
    pub fn dispatch(&self, action: Action) -> Result<Value> {
        let route = action
            .split_first()
            .map(|(child, rest)| (child.to_string(), rest.to_string()));
        let is_child = route.is_some();
        let before_state = self.state();

        self.fire(
            &action,
            TriggerMeta::before(is_child),
            Some(&before_state),
            None,
        )?;

        match &route {
            Some((key, rest)) => {
                let child = self.child(key).ok_or_else(|| StoreError::ChildNotFound {
                    store: self.type_name().to_string(),
                    key: key.clone(),
                })?;
                debug!(
                    store = self.type_name(),
                    action = %action.action_type,
                    child = %key,
                    "forwarding action to child store"
                );
                child.dispatch(action.forwarded(rest))?;
            }
            None => self.reduce(&action)?,
        }

        let after_state = self.state();
        self.fire(
            &action,
            TriggerMeta::after(is_child),
            Some(&before_state),
            Some(&after_state),
        )?;

        Ok(after_state)
    }

    fn reduce(&self, action: &Action) -> Result<()> {
        let reducer = self
            .node_type()
            .reducer(&action.action_type)
            .ok_or_else(|| StoreError::ActionNotFound {
                store: self.type_name().to_string(),
                action: action.action_type.clone(),
            })?;

        let next = reducer(self, &action.payload).map_err(|source| StoreError::Reducer {
            store: self.type_name().to_string(),
            action: action.action_type.clone(),
            source,
        })?;

        debug!(
            store = self.type_name(),
            action = %action.action_type,
            "reducer replaced store state"
        );
        self.replace_state(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Shape;
    use crate::testing::fixtures;
    use serde_json::json;

    #[test]
    fn test_dispatch_bump() {
        let ty = NodeType::new("App");
        ty.register_action("bump", |node, _| {
            let version = node.field("version").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!({ "version": version + 1 }))
        })
        .unwrap();

        let app = Node::with_state(&ty, json!({ "version": 1 })).unwrap();
        let state = app.dispatch(Action::new("bump", vec![])).unwrap();

        assert_eq!(state, json!({ "version": 2 }));
        assert_eq!(app.state()["version"], json!(2));
        assert_eq!(app.field("version"), Some(json!(2)));
    }

    #[test]
    fn test_opaque_state_actions() {
        let ty = NodeType::new("A");
        let bump = ty
            .register_action("bump", |node, _| {
                Ok(json!(format!("{}!", node.state().as_str().unwrap_or_default())))
            })
            .unwrap();

        let a = Node::with_state(&ty, json!("test")).unwrap();
        assert_eq!(bump.call(&a, vec![]).unwrap(), json!("test!"));
        assert_eq!(a.state(), json!("test!"));
    }

    #[test]
    fn test_action_creator_routes_through_root() {
        let fx = fixtures::sample_app();

        let state = fx.add.call(&fx.messages, vec![json!("C")]).unwrap();

        assert_eq!(state["all"], json!(["A", "B", "C"]));
        assert_eq!(fx.messages.field("all"), Some(json!(["A", "B", "C"])));
        assert_eq!(fx.app.field("version"), Some(json!(1)));
    }

    #[test]
    fn test_creator_is_bound_to_its_node_type() {
        let hits = Rc::new(std::cell::Cell::new(0));
        let a_ty = NodeType::new("A");
        let b_ty = NodeType::new("B");
        let a_reset = a_ty
            .register_action("reset", |_, _| Ok(json!("A-reset")))
            .unwrap();
        let counted = Rc::clone(&hits);
        let b_reset = b_ty
            .register_action("reset", move |_, _| {
                counted.set(counted.get() + 1);
                Ok(json!("B-wiped"))
            })
            .unwrap();
        let b = Node::with_state(&b_ty, json!("B")).unwrap();

        let err = a_reset.call(&b, vec![]).unwrap_err();

        assert!(matches!(
            err,
            StoreError::ActionNotFound { ref store, ref action } if store == "B" && action == "reset"
        ));
        assert_eq!(hits.get(), 0);
        assert_eq!(b.state(), json!("B"));
        assert_eq!(a_reset.node_type(), &a_ty);

        assert_eq!(b_reset.call(&b, vec![]).unwrap(), json!("B-wiped"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dispatch_at_root_with_path() {
        let fx = fixtures::sample_app();

        fx.app
            .dispatch(Action::new("messages.counter.increment", vec![]))
            .unwrap();
        fx.app
            .dispatch(Action::new("messages.counter.increment", vec![]))
            .unwrap();

        assert_eq!(fx.counter.field("value"), Some(json!(3)));
    }

    #[test]
    fn test_dispatch_from_middle_of_tree_is_relative() {
        let fx = fixtures::sample_app();

        fx.messages
            .dispatch(Action::new("counter.increment", vec![]))
            .unwrap();

        assert_eq!(fx.counter.field("value"), Some(json!(2)));
    }

    #[test]
    fn test_action_not_found() {
        let fx = fixtures::sample_app();

        let err = fx
            .app
            .dispatch(Action::new("messages.remove", vec![]))
            .unwrap_err();

        match err {
            StoreError::ActionNotFound { store, action } => {
                assert_eq!(store, "Messages");
                assert_eq!(action, "remove");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_child_not_found() {
        let fx = fixtures::sample_app();

        let err = fx
            .app
            .dispatch(Action::new("inbox.add", vec![json!("x")]))
            .unwrap_err();

        assert!(matches!(err, StoreError::ChildNotFound { ref key, .. } if key == "inbox"));
    }

    #[test]
    fn test_reducer_error_leaves_state() {
        let ty = NodeType::new("Strict");
        ty.register_action("set", |_, payload| match payload.first() {
            Some(value) => Ok(value.clone()),
            None => Err(anyhow::anyhow!("set requires a value")),
        })
        .unwrap();

        let node = Node::with_state(&ty, json!(5)).unwrap();
        let err = node.act("set", vec![]).unwrap_err();

        assert!(matches!(err, StoreError::Reducer { .. }));
        assert_eq!(node.state(), json!(5));

        assert_eq!(node.act("set", vec![json!(7)]).unwrap(), json!(7));
    }

    #[test]
    fn test_invalid_action_names() {
        let ty = NodeType::new("App");

        assert!(matches!(
            ty.register_action("a.b", |_, _| Ok(Value::Null)),
            Err(StoreError::InvalidActionName { .. })
        ));
        assert!(matches!(
            ty.register_action("", |_, _| Ok(Value::Null)),
            Err(StoreError::InvalidActionName { .. })
        ));
        assert!(ty.action_names().is_empty());
    }

    #[test]
    fn test_reducer_replaces_state_value() {
        let ty = NodeType::new("App");
        ty.register_action("touch", |node, _| Ok(node.state())).unwrap();
        let app = Node::with_state(&ty, json!({ "version": 1 })).unwrap();

        let before = app.state();
        app.act("touch", vec![]).unwrap();

        assert_eq!(app.state(), before);
        assert!(ty.has_action("touch"));
    }

    #[test]
    fn test_registration_after_creation_is_visible() {
        let ty = NodeType::new("Late");
        let node = Node::with_state(&ty, json!(0)).unwrap();
        assert!(node.act("inc", vec![]).is_err());

        ty.register_action("inc", |node, _| {
            Ok(json!(node.state().as_i64().unwrap_or(0) + 1))
        })
        .unwrap();
        assert_eq!(node.act("inc", vec![]).unwrap(), json!(1));
    }

    #[test]
    fn test_reducer_may_read_children() {
        let leaf_ty = NodeType::new("Leaf");
        let leaf = Node::with_state(&leaf_ty, json!(10)).unwrap();

        let ty = NodeType::new("Parent");
        ty.register_action("copy_leaf", |node, _| {
            let leaf = node.child("leaf").map(|c| c.state()).unwrap_or(Value::Null);
            Ok(json!({ "copy": leaf }))
        })
        .unwrap();

        let parent = Node::with_state(
            &ty,
            Shape::fields().field("copy", Value::Null).child("leaf", &leaf),
        )
        .unwrap();
        parent.act("copy_leaf", vec![]).unwrap();

        assert_eq!(parent.field("copy"), Some(json!(10)));
    }
}
