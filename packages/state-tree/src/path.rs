//! Path resolution: from a node up to its root, and from a name down to an
//! action type.

use crate::core::PATH_DELIMITER;
use crate::node::Node;

/// A node's root and the dotted path leading from that root back to the node.
#[derive(Debug, Clone, PartialEq)]
pub struct RootPath {
    /// The topmost ancestor (the node itself if it has no parent).
    pub root: Node,
    /// Mount keys from `root` down to the node, joined by `.`; empty for a root.
    pub path: String,
}

impl RootPath {
    /// The full action type for `name` dispatched at `root`.
    pub fn action_type(&self, name: &str) -> String {
        qualify(&self.path, name)
    }
}

/// Join a path and an action name.
pub fn qualify(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}{PATH_DELIMITER}{name}")
    }
}

impl Node {
    /// Walk parent links up to the root, collecting mount keys.
    pub fn path_from_root(&self) -> RootPath {
        let mut segments = Vec::new();
        let mut current = self.clone();

        loop {
            if let Some(key) = current.mount_key() {
                segments.push(key.to_string());
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        let path = segments
            .iter()
            .rev()
            .fold(String::new(), |path, key| qualify(&path, key));
        RootPath {
            root: current,
            path,
        }
    }

    /// The topmost ancestor.
    pub fn root(&self) -> Node {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    /// Dotted path from the root to this node.
    pub fn path(&self) -> String {
        self.path_from_root().path
    }

    /// Follow a dotted path of mount keys downwards.
    ///
    /// An empty path resolves to the node itself.
    pub fn resolve(&self, path: &str) -> Option<Node> {
        if path.is_empty() {
            return Some(self.clone());
        }
        path.split(PATH_DELIMITER)
            .try_fold(self.clone(), |node, key| node.child(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeType, Shape};
    use serde_json::json;

    fn tree() -> (Node, Node, Node) {
        let a = Node::with_state(&NodeType::new("A"), json!({ "value": 1 })).unwrap();
        let messages = Node::with_state(
            &NodeType::new("Messages"),
            Shape::fields().field("all", json!([])).child("a", &a),
        )
        .unwrap();
        let app = Node::with_state(
            &NodeType::new("App"),
            Shape::fields().field("version", 1).child("messages", &messages),
        )
        .unwrap();
        (app, messages, a)
    }

    #[test]
    fn test_root_has_empty_path() {
        let (app, _, _) = tree();
        let found = app.path_from_root();

        assert_eq!(found.root, app);
        assert_eq!(found.path, "");
        assert_eq!(found.action_type("bump"), "bump");
    }

    #[test]
    fn test_nested_path() {
        let (app, messages, a) = tree();

        assert_eq!(messages.path(), "messages");
        assert_eq!(a.path(), "messages.a");
        assert_eq!(a.root(), app);
        assert_eq!(
            a.path_from_root().action_type("increment"),
            "messages.a.increment"
        );
    }

    #[test]
    fn test_resolve() {
        let (app, messages, a) = tree();

        assert_eq!(app.resolve(""), Some(app.clone()));
        assert_eq!(app.resolve("messages"), Some(messages.clone()));
        assert_eq!(app.resolve("messages.a"), Some(a));
        assert_eq!(app.resolve("messages.b"), None);
        assert_eq!(messages.resolve("a").map(|n| n.path()), Some("messages.a".into()));
    }

    #[test]
    fn test_unmounted_node_is_own_root() {
        let lone = NodeType::new("Lone").create();
        assert_eq!(lone.root(), lone);
        assert_eq!(lone.path(), "");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("", "add"), "add");
        assert_eq!(qualify("messages", "add"), "messages.add");
    }
}
