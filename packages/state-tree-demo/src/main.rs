// Entry point for the state tree demo host

mod config;
mod store;

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use state_tree::{Action, Event, Phase};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// The phase name and the node state that goes with it, if any.
fn phase_state(event: &Event) -> (&'static str, Option<&Value>) {
    match event.phase {
        Phase::Init => ("init", None),
        Phase::Before => ("before", event.before_state.as_ref()),
        Phase::After => ("after", event.after_state.as_ref()),
    }
}

fn log_event(event: &Event) -> anyhow::Result<()> {
    let (phase, state) = phase_state(event);
    tracing::info!(
        store = event.node.type_name(),
        action = %event.action.action_type,
        phase,
        state = state.map(tracing::field::display),
        "event"
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,state_tree=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting state tree demo");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(?config, "Configuration loaded");

    // Build the tree
    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs();
    let demo = store::build(i64::try_from(started).context("Start time out of range")?)?;

    // Restore a saved snapshot
    if let Some(path) = &config.snapshot_path {
        tracing::info!(path = %path.display(), "Restoring snapshot");
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot = serde_json::from_str(&raw).context("Snapshot is not valid JSON")?;
        demo.app
            .restore(snapshot)
            .context("Failed to restore snapshot")?;
    }

    if config.print_events {
        demo.app.subscribe_all(log_event)?;
    }

    // Replay recorded actions, or run a short session
    match &config.actions_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read actions {}", path.display()))?;
            let actions: Vec<Action> =
                serde_json::from_str(&raw).context("Actions must be a JSON array of actions")?;
            tracing::info!(count = actions.len(), "Replaying recorded actions");
            for action in actions {
                let action_type = action.action_type.clone();
                demo.app
                    .dispatch(action)
                    .with_context(|| format!("Replay failed at '{action_type}'"))?;
            }
        }
        None => {
            demo.post.call(&demo.messages, vec![json!("hello")])?;
            demo.mark_unread.call(&demo.unread, vec![json!(1)])?;
            demo.post.call(&demo.messages, vec![json!("world")])?;
            demo.mark_unread.call(&demo.unread, vec![json!(1)])?;
            demo.read_all.call(&demo.unread, vec![])?;
            demo.bump.call(&demo.app, vec![])?;
        }
    }

    let snapshot = demo.app.snapshot().context("Failed to create snapshot")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
