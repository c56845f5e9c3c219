//! Observer fan-out.
//!
//! A small handle-based subscriber registry used by the engine for both
//! the navigation-update and the display-relevant notification streams.
//! Delivery is synchronous and in registration order; a faulting
//! observer is isolated from the others and from engine state.

use std::panic::{catch_unwind, AssertUnwindSafe};

use log::error;
use uuid::Uuid;

/// Subscription handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

type Callback<T> = Box<dyn FnMut(&T)>;

/// Ordered list of subscribers for one notification stream.
pub struct Subscribers<T> {
    slots: Vec<(SubscriptionId, Option<Callback<T>>)>,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register an observer; returns the handle that removes exactly
    /// this registration.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T) + 'static,
    {
        let id = SubscriptionId::new();
        self.slots.push((id, Some(Box::new(callback))));
        id
    }

    /// Remove a registration. Returns false for an unknown or already
    /// removed handle.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.slots.iter_mut().find(|(slot_id, cb)| *slot_id == id && cb.is_some()) {
            Some((_, cb)) => {
                // Tombstone rather than swap-remove, so removal can never
                // re-order or skip entries of an in-flight delivery.
                *cb = None;
                true
            }
            None => false,
        }
    }

    /// Deliver a value to every live observer, in registration order.
    ///
    /// A panicking observer is caught and logged; delivery continues
    /// with the remaining observers.
    pub fn notify(&mut self, value: &T) {
        let mut index = 0;
        while index < self.slots.len() {
            if let (id, Some(callback)) = &mut self.slots[index] {
                let id = *id;
                if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                    error!("observer {id} panicked during delivery; event dropped for it");
                }
            }
            index += 1;
        }
        self.slots.retain(|(_, cb)| cb.is_some());
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|(_, cb)| cb.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}
