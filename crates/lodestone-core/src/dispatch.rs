//! State-tagged packet dispatch table.
//!
//! Handlers are keyed by `(ProtocolState, packet id)`. A persistent route
//! (`on`) fires for every matching packet; a one-shot route (`once`) fires for
//! the next matching packet only and is removed as it is taken.
//!
//! Handlers are plain tags (usually a `Copy` enum) rather than closures. The
//! owning state machine calls [`DispatchTable::take`] and matches on the
//! returned tags, which keeps all mutable state inside the machine.
//!
//! # Invariants
//!
//! - A one-shot route is returned by `take` at most once.
//! - Handlers for one key come back in registration order.

use std::collections::HashMap;

use lodestone_proto::ProtocolState;

/// Whether a route survives being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Fires for every matching packet
    Persistent,
    /// Fires for the next matching packet, then is removed
    Once,
}

#[derive(Debug, Clone)]
struct Route<H> {
    handler: H,
    subscription: Subscription,
}

/// Routing key: protocol state and packet id.
pub type RouteKey = (ProtocolState, u8);

/// Table mapping `(state, packet id)` to handlers.
#[derive(Debug, Clone)]
pub struct DispatchTable<H> {
    routes: HashMap<RouteKey, Vec<Route<H>>>,
}

impl<H> Default for DispatchTable<H> {
    fn default() -> Self {
        Self { routes: HashMap::new() }
    }
}

impl<H: Clone> DispatchTable<H> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent handler.
    pub fn on(&mut self, state: ProtocolState, id: u8, handler: H) {
        self.insert(state, id, handler, Subscription::Persistent);
    }

    /// Register a handler for the next matching packet only.
    pub fn once(&mut self, state: ProtocolState, id: u8, handler: H) {
        self.insert(state, id, handler, Subscription::Once);
    }

    fn insert(&mut self, state: ProtocolState, id: u8, handler: H, subscription: Subscription) {
        self.routes.entry((state, id)).or_default().push(Route { handler, subscription });
    }

    /// Handlers for a received packet, in registration order.
    ///
    /// One-shot routes are removed from the table by this call. An empty
    /// result means nothing is subscribed to `(state, id)`.
    pub fn take(&mut self, state: ProtocolState, id: u8) -> Vec<H> {
        let Some(routes) = self.routes.get_mut(&(state, id)) else {
            return Vec::new();
        };

        let handlers = routes.iter().map(|route| route.handler.clone()).collect();
        routes.retain(|route| route.subscription == Subscription::Persistent);

        if routes.is_empty() {
            self.routes.remove(&(state, id));
        }

        handlers
    }

    /// Whether anything is subscribed to `(state, id)`.
    pub fn is_routed(&self, state: ProtocolState, id: u8) -> bool {
        self.routes.contains_key(&(state, id))
    }

    /// Total number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Drop every route, e.g. when the connection ends.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}
