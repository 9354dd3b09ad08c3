//! Subscribers - observe actions on a node and, optionally, its subtree.
//!
//! Each node keeps its own ordered list of subscribers. Insertion order is
//! firing order.
//!
//! # Filtering
//!
//! | Field         | Default | Effect                                              |
//! |---------------|---------|-----------------------------------------------------|
//! | `action_type` | none    | only actions whose (relative) type is equal         |
//! | `before`      | false   | fire before the reducer runs                        |
//! | `after`       | true    | fire after the reducer ran                          |
//! | `bubble`      | false   | also fire for actions addressed to descendants      |
//! | `init`        | false   | fire once with `@init` when subscribing             |
//!
//! A subscriber with both `before` and `after` fires twice per dispatch, once
//! on each side of the mutation, which makes symmetric wrapping (audit logs,
//! timing) a single subscription.
//!
//! # Example
//!
//! ```ignore
//! use state_tree::{Subscriber, SubscriberFilter};
//!
//! app.subscribe(
//!     Subscriber::new(|event| {
//!         tracing::info!(action = %event.action.action_type, "state changed");
//!         Ok(())
//!     })
//!     .tag("audit")
//!     .bubble(true),
//! )?;
//!
//! // Later
//! app.unsubscribe(SubscriberFilter::new().tag("audit"));
//! ```

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::core::{Action, Event, Phase, TriggerMeta};
use crate::error::{Result, StoreError};
use crate::node::Node;

// =============================================================================
// Handler
// =============================================================================

/// A clonable event handler, comparable by reference.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&Event) -> anyhow::Result<()>>);

impl Handler {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Check if both handles wrap the same closure.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Subscriber descriptor. Built with chained setters, registered with
/// [`Node::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscriber {
    tag: Option<String>,
    action_type: Option<String>,
    before: bool,
    after: bool,
    bubble: bool,
    init: bool,
    context: Option<Value>,
    handler: Handler,
}

impl Subscriber {
    /// A subscriber with the default flags: after-only, non-bubbling, no init.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        Self::with_handler(Handler::new(handler))
    }

    /// Same as [`Subscriber::new`] for an existing handler, so the handler can
    /// later be used to unsubscribe.
    pub fn with_handler(handler: Handler) -> Self {
        Self {
            tag: None,
            action_type: None,
            before: false,
            after: true,
            bubble: false,
            init: false,
            context: None,
            handler,
        }
    }

    /// Label used for bulk removal.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Only observe actions with exactly this type (relative to the node).
    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    /// Fire before the reducer runs.
    pub fn before(mut self, before: bool) -> Self {
        self.before = before;
        self
    }

    /// Fire after the reducer ran.
    pub fn after(mut self, after: bool) -> Self {
        self.after = after;
        self
    }

    /// Also observe actions addressed to descendants.
    pub fn bubble(mut self, bubble: bool) -> Self {
        self.bubble = bubble;
        self
    }

    /// Receive a synthetic `@init` event as soon as the subscription is made.
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    /// Value passed back in every event's `context`.
    pub fn context(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn accepts(&self, action: &Action, meta: TriggerMeta) -> bool {
        if let Some(filter) = &self.action_type {
            if filter != &action.action_type {
                return false;
            }
        }
        self.bubble || !meta.is_child
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Reference to a registered subscriber. Pass it to [`Node::unsubscribe`] to
/// remove exactly that subscriber.
#[derive(Debug, Clone)]
pub struct Subscription(Rc<Subscriber>);

impl Subscription {
    /// The subscriber's tag.
    pub fn tag(&self) -> Option<&str> {
        self.0.tag.as_deref()
    }

    /// The subscriber's action type filter.
    pub fn action_type(&self) -> Option<&str> {
        self.0.action_type.as_deref()
    }

    /// The subscriber's context value.
    pub fn context(&self) -> Option<&Value> {
        self.0.context.as_ref()
    }

    /// The subscriber's handler.
    pub fn handler(&self) -> &Handler {
        &self.0.handler
    }

    /// Whether the subscriber observes descendants.
    pub fn is_bubbling(&self) -> bool {
        self.0.bubble
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// =============================================================================
// Removal
// =============================================================================

/// Partial descriptor: every field that is set must match for a subscriber to
/// be removed. A filter with no fields set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct SubscriberFilter {
    tag: Option<String>,
    action_type: Option<String>,
    before: Option<bool>,
    after: Option<bool>,
    bubble: Option<bool>,
    context: Option<Value>,
    handler: Option<Handler>,
}

impl SubscriberFilter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match subscribers with this tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Match subscribers with this action type filter.
    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    /// Match on the `before` flag.
    pub fn before(mut self, before: bool) -> Self {
        self.before = Some(before);
        self
    }

    /// Match on the `after` flag.
    pub fn after(mut self, after: bool) -> Self {
        self.after = Some(after);
        self
    }

    /// Match on the `bubble` flag.
    pub fn bubble(mut self, bubble: bool) -> Self {
        self.bubble = Some(bubble);
        self
    }

    /// Match subscribers with an equal context value.
    pub fn context(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Match subscribers using this handler.
    pub fn handler(mut self, handler: &Handler) -> Self {
        self.handler = Some(handler.clone());
        self
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.action_type.is_none()
            && self.before.is_none()
            && self.after.is_none()
            && self.bubble.is_none()
            && self.context.is_none()
            && self.handler.is_none()
    }

    fn matches(&self, subscriber: &Subscriber) -> bool {
        if self.is_empty() {
            return false;
        }
        fn field<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            want.is_none() || want == have
        }
        fn flag(want: Option<bool>, have: bool) -> bool {
            want.map_or(true, |want| want == have)
        }

        field(&self.tag, &subscriber.tag)
            && field(&self.action_type, &subscriber.action_type)
            && field(&self.context, &subscriber.context)
            && flag(self.before, subscriber.before)
            && flag(self.after, subscriber.after)
            && flag(self.bubble, subscriber.bubble)
            && self
                .handler
                .as_ref()
                .map_or(true, |h| h.ptr_eq(&subscriber.handler))
    }
}

/// What [`Node::unsubscribe`] removes.
#[derive(Debug, Clone)]
pub enum Unsubscribe {
    /// Exactly the referenced subscriber.
    Subscription(Subscription),
    /// Every subscriber matching the partial descriptor.
    Matching(SubscriberFilter),
}

impl From<Subscription> for Unsubscribe {
    fn from(subscription: Subscription) -> Self {
        Unsubscribe::Subscription(subscription)
    }
}

impl From<&Subscription> for Unsubscribe {
    fn from(subscription: &Subscription) -> Self {
        Unsubscribe::Subscription(subscription.clone())
    }
}

impl From<SubscriberFilter> for Unsubscribe {
    fn from(filter: SubscriberFilter) -> Self {
        Unsubscribe::Matching(filter)
    }
}

impl From<&Handler> for Unsubscribe {
    fn from(handler: &Handler) -> Self {
        Unsubscribe::Matching(SubscriberFilter::new().handler(handler))
    }
}

// =============================================================================
// Node API
// =============================================================================

impl Node {
    /// Register a subscriber.
    ///
    /// If the subscriber asked for `init`, its handler runs immediately with an
    /// `@init` event. Should that handler fail, the subscriber is removed again
    /// and the error returned.
    ///
    /// A handler that captures a handle to this node (or an ancestor) keeps the
    /// tree alive forever; use [`Event::node`] instead.
    pub fn subscribe(&self, subscriber: Subscriber) -> Result<Subscription> {
        let subscription = self.add_subscriber(subscriber);

        if subscription.0.init {
            let event = Event {
                node: self.clone(),
                action: Action::init(),
                phase: Phase::Init,
                before_state: None,
                after_state: None,
                context: subscription.0.context.clone(),
            };
            if let Err(e) = self.call_handler(&subscription.0, &event) {
                self.unsubscribe(&subscription);
                return Err(e);
            }
        }

        Ok(subscription)
    }

    /// Register a bare handler with the default flags.
    pub fn on<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.add_subscriber(Subscriber::new(handler))
    }

    /// Observe every action in this subtree, starting with an `@init` event.
    pub fn subscribe_all<F>(&self, handler: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(Subscriber::new(handler).bubble(true).init(true))
    }

    /// Remove subscribers. Returns how many were removed.
    pub fn unsubscribe(&self, target: impl Into<Unsubscribe>) -> usize {
        let target = target.into();
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();

        subscribers.retain(|subscriber| match &target {
            Unsubscribe::Subscription(subscription) => !Rc::ptr_eq(subscriber, &subscription.0),
            Unsubscribe::Matching(filter) => !filter.matches(subscriber),
        });

        let removed = before - subscribers.len();
        debug!(store = self.type_name(), removed, "subscribers removed");
        removed
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Fire this node's subscribers for `action` without dispatching it.
    ///
    /// Events raised this way carry no before/after state.
    pub fn trigger(&self, action: &Action, meta: TriggerMeta) -> Result<()> {
        self.fire(action, meta, None, None)
    }

    fn add_subscriber(&self, subscriber: Subscriber) -> Subscription {
        let subscriber = Rc::new(subscriber);
        self.inner
            .subscribers
            .borrow_mut()
            .push(Rc::clone(&subscriber));
        debug!(
            store = self.type_name(),
            tag = subscriber.tag.as_deref(),
            bubble = subscriber.bubble,
            "subscriber added"
        );
        Subscription(subscriber)
    }

    /// One trigger pass over a snapshot of the subscriber list.
    ///
    /// Subscribers added or removed by a handler during the pass take effect
    /// from the next pass on.
    pub(crate) fn fire(
        &self,
        action: &Action,
        meta: TriggerMeta,
        before_state: Option<&Value>,
        after_state: Option<&Value>,
    ) -> Result<()> {
        let subscribers: Vec<Rc<Subscriber>> = self.inner.subscribers.borrow().clone();

        for subscriber in subscribers {
            if !subscriber.accepts(action, meta) {
                continue;
            }

            let event = |phase| Event {
                node: self.clone(),
                action: action.clone(),
                phase,
                before_state: before_state.cloned(),
                after_state: after_state.cloned(),
                context: subscriber.context.clone(),
            };

            if subscriber.before && meta.before {
                self.call_handler(&subscriber, &event(Phase::Before))?;
            }
            if subscriber.after && meta.after {
                self.call_handler(&subscriber, &event(Phase::After))?;
            }
        }

        Ok(())
    }

    fn call_handler(&self, subscriber: &Subscriber, event: &Event) -> Result<()> {
        trace!(
            store = self.type_name(),
            action = %event.action.action_type,
            phase = ?event.phase,
            tag = subscriber.tag.as_deref(),
            "notifying subscriber"
        );
        subscriber
            .handler
            .call(event)
            .map_err(|source| StoreError::Handler {
                store: self.type_name().to_string(),
                action: event.action.action_type.clone(),
                source,
            })
    }
}
