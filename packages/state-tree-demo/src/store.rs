//! The demo application tree.
//!
//! ```text
//! App { version, started }
//! └── messages: Messages { all }
//!     └── unread: Unread (opaque count)
//! ```

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use state_tree::{ActionCreator, Node, NodeType, Shape};

pub struct DemoStore {
    pub app: Node,
    pub messages: Node,
    pub unread: Node,
    pub post: ActionCreator,
    pub mark_unread: ActionCreator,
    pub read_all: ActionCreator,
    pub bump: ActionCreator,
}

fn int_field(node: &Node, key: &str) -> Result<i64> {
    node.field(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("{key} is not an integer"))
}

/// Build a fresh tree whose `started` field is `started` unix seconds.
pub fn build(started: i64) -> Result<DemoStore> {
    let unread_type = NodeType::new("Unread");
    let mark_unread = unread_type.register_action("add", |node, payload| {
        let by = payload.first().and_then(Value::as_i64).unwrap_or(1);
        Ok(json!(node.state().as_i64().unwrap_or(0) + by))
    })?;
    let read_all = unread_type.register_action("clear", |_, _| Ok(json!(0)))?;

    let messages_type = NodeType::new("Messages");
    let post = messages_type.register_action("post", |node, payload| {
        let mut state = node.state();
        let mut all = state["all"].as_array().cloned().unwrap_or_default();
        all.extend(payload.iter().cloned());
        state["all"] = Value::Array(all);
        Ok(state)
    })?;

    let app_type = NodeType::new("App");
    let bump = app_type.register_action("bump", |node, _| {
        let mut state = node.state();
        state["version"] = json!(int_field(node, "version")? + 1);
        Ok(state)
    })?;
    // `started` is kept as unix seconds and snapshotted as "unix:<seconds>".
    app_type.set_serializer(|node| {
        let mut state = node.state();
        state["started"] = json!(format!("unix:{}", int_field(node, "started")?));
        Ok(state)
    });
    app_type.set_deserializer(|_, mut snapshot| {
        if let Some(raw) = snapshot.get("started").and_then(Value::as_str) {
            let seconds: i64 = raw.trim_start_matches("unix:").parse()?;
            snapshot["started"] = json!(seconds);
        }
        Ok(snapshot)
    });

    let unread = Node::with_state(&unread_type, json!(0))?;
    let messages = Node::with_state(
        &messages_type,
        Shape::fields()
            .field("all", json!([]))
            .child("unread", &unread),
    )?;
    let app = Node::with_state(
        &app_type,
        Shape::fields()
            .field("version", 1)
            .field("started", started)
            .child("messages", &messages),
    )?;

    Ok(DemoStore {
        app,
        messages,
        unread,
        post,
        mark_unread,
        read_all,
        bump,
    })
}
