//! Route storage.
//!
//! The engine only ever talks to the [`RouteStore`] trait; the backing
//! technology is an appliance concern. [`MemoryRouteStore`] is the
//! in-crate reference implementation and keeps routes in their
//! serialized form, so every load exercises the persisted
//! representation round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::route::Route;

/// Storage error type.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no stored route with id {0}")]
    NotFound(String),

    #[error("storage I/O failed")]
    Io(#[from] std::io::Error),

    #[error("route serialization failed")]
    Serialize(#[from] serde_json::Error),
}

/// Listing entry for a stored route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub id: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for planned routes.
pub trait RouteStore {
    /// Prepare the backing location. Idempotent.
    fn initialize(&mut self) -> Result<(), StoreError>;

    /// Persist a route, assigning an id when the route has none.
    /// Returns the stored route's id.
    fn save(&mut self, route: &Route) -> Result<String, StoreError>;

    fn load(&self, id: &str) -> Result<Route, StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;

    /// Stored route summaries, newest first.
    fn list(&self) -> Result<Vec<RouteSummary>, StoreError>;
}

/// In-memory route store.
#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    records: HashMap<String, String>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RouteStore for MemoryRouteStore {
    fn initialize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn save(&mut self, route: &Route) -> Result<String, StoreError> {
        let mut stored = route.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        let json = serde_json::to_string(&stored)?;
        self.records.insert(stored.id.clone(), json);
        Ok(stored.id)
    }

    fn load(&self, id: &str) -> Result<Route, StoreError> {
        let json = self
            .records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(json)?)
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<RouteSummary>, StoreError> {
        let mut summaries = Vec::with_capacity(self.records.len());
        for json in self.records.values() {
            let route: Route = serde_json::from_str(json)?;
            summaries.push(RouteSummary {
                id: route.id,
                destination: route.destination,
                created_at: route.created_at,
            });
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}
