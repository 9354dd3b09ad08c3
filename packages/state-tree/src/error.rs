//! Structured error type for state tree operations.
//!
//! `StoreError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//! Every variant names the store type involved so a failure can be traced back
//! to the node that raised it.
//!
//! # The Error Boundary Rule
//!
//! > **No bare `anyhow::Error` ever leaves the crate.**
//!
//! - `anyhow` is the error type of user code (reducers, handlers, snapshot hooks)
//! - `StoreError` is the only error returned by the public API; closure failures
//!   are wrapped with the store type and action that produced them
//!
//! # Example
//!
//! ```ignore
//! use state_tree::StoreError;
//!
//! match app.dispatch(Action::new("missing", vec![])) {
//!     Ok(state) => println!("new state: {state}"),
//!     Err(StoreError::ActionNotFound { store, action }) => {
//!         eprintln!("{store} has no action named {action}");
//!     }
//!     Err(e) => eprintln!("dispatch failed: {e}"),
//! }
//! ```
//!
//! None of these errors are logged or retried internally. They describe
//! programmer-contract violations, so they propagate synchronously to whoever
//! made the call.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

// =============================================================================
// Store Error
// =============================================================================

/// Structured error type for state tree operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `initialize` was called on a node that already has its state.
    #[error("cannot re-initialize state on store '{store}'")]
    Reinitialized {
        /// Type name of the node.
        store: String,
    },

    /// The addressed node has no reducer for the final path segment.
    #[error("action not found '{store}:{action}'")]
    ActionNotFound {
        /// Type name of the node the action was routed to.
        store: String,
        /// The unresolved action name.
        action: String,
    },

    /// A snapshot key matches neither a local field nor a child.
    ///
    /// Keys processed before the failing one may already have been written;
    /// restoring is not atomic.
    #[error("snapshot does not match shape of '{store}': unknown key '{key}'")]
    ShapeMismatch {
        /// Type name of the node being restored.
        store: String,
        /// The offending snapshot key.
        key: String,
    },

    /// An external write to `state` or to a declared accessor.
    #[error("cannot assign '{key}' on store '{store}': state is read-only")]
    ReadOnly {
        /// Type name of the node.
        store: String,
        /// The key the caller tried to write.
        key: String,
    },

    /// A dotted action path names a child that does not exist.
    #[error("store '{store}' has no child named '{key}'")]
    ChildNotFound {
        /// Type name of the node that was asked to forward the action.
        store: String,
        /// The missing mount key.
        key: String,
    },

    /// Action names must be non-empty and must not contain the path delimiter.
    #[error("invalid action name '{action}' on store '{store}'")]
    InvalidActionName {
        /// Type name the action was registered on.
        store: String,
        /// The rejected name.
        action: String,
    },

    /// Child mount keys must be non-empty and must not contain the path delimiter.
    #[error("invalid mount key '{key}' on store '{store}'")]
    InvalidMountKey {
        /// Type name of the parent node.
        store: String,
        /// The rejected key.
        key: String,
    },

    /// The same key was declared twice in one initial state.
    #[error("duplicate key '{key}' in initial state of store '{store}'")]
    DuplicateKey {
        /// Type name of the node being initialized.
        store: String,
        /// The repeated key.
        key: String,
    },

    /// A child node already has a parent. Nodes are never re-parented.
    #[error("store '{child}' is already mounted and cannot be mounted again as '{key}'")]
    AlreadyMounted {
        /// Type name of the child node.
        child: String,
        /// The key it was about to be mounted under.
        key: String,
    },

    /// Mounting the child would make a node its own ancestor.
    #[error("mounting '{key}' on store '{store}' would create a cycle")]
    CyclicMount {
        /// Type name of the parent node.
        store: String,
        /// The key the child was about to be mounted under.
        key: String,
    },

    /// A reducer returned an error. The node's state is unchanged.
    #[error("reducer '{store}:{action}' failed: {source}")]
    Reducer {
        /// Type name of the node.
        store: String,
        /// The action name.
        action: String,
        /// The reducer's error.
        #[source]
        source: anyhow::Error,
    },

    /// A subscriber handler returned an error.
    #[error("subscriber on store '{store}' failed while handling '{action}': {source}")]
    Handler {
        /// Type name of the node the subscriber is attached to.
        store: String,
        /// The action type as seen by that node.
        action: String,
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },

    /// A custom snapshot serializer returned an error.
    #[error("snapshot serializer for store '{store}' failed: {source}")]
    Serializer {
        /// Type name of the node.
        store: String,
        /// The hook's error.
        #[source]
        source: anyhow::Error,
    },

    /// A custom snapshot deserializer returned an error.
    #[error("snapshot deserializer for store '{store}' failed: {source}")]
    Deserializer {
        /// Type name of the node.
        store: String,
        /// The hook's error.
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    /// Returns the type name of the store the error is about.
    pub fn store(&self) -> &str {
        match self {
            StoreError::Reinitialized { store }
            | StoreError::ActionNotFound { store, .. }
            | StoreError::ShapeMismatch { store, .. }
            | StoreError::ReadOnly { store, .. }
            | StoreError::ChildNotFound { store, .. }
            | StoreError::InvalidActionName { store, .. }
            | StoreError::InvalidMountKey { store, .. }
            | StoreError::DuplicateKey { store, .. }
            | StoreError::CyclicMount { store, .. }
            | StoreError::Reducer { store, .. }
            | StoreError::Handler { store, .. }
            | StoreError::Serializer { store, .. }
            | StoreError::Deserializer { store, .. } => store,
            StoreError::AlreadyMounted { child, .. } => child,
        }
    }

    /// Returns true if the error originated in user code rather than in the tree.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StoreError::Reducer { .. }
                | StoreError::Handler { .. }
                | StoreError::Serializer { .. }
                | StoreError::Deserializer { .. }
        )
    }
}
