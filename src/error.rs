//! Error types for the navigation engine.

use thiserror::Error;

use crate::store::StoreError;

/// Navigation engine error type.
///
/// Every engine operation reports failure through this enum; none of
/// the error kinds is used for normal control flow.
#[derive(Error, Debug)]
pub enum NavError {
    /// An operation that needs the route store ran before `initialize`.
    #[error("navigation service is not initialized")]
    ServiceNotInitialized,

    /// The route has neither usable waypoints nor usable geometry.
    #[error("invalid route: {reason}")]
    InvalidRoute { reason: String },

    /// `start_navigation` was called while a route is being navigated.
    #[error("navigation is already active")]
    NavigationAlreadyActive,

    /// The route store has no route with this id.
    #[error("route {id} not found")]
    RouteNotFound { id: String },

    /// The route store failed to persist a route.
    #[error("failed to save route {id}")]
    SaveFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    /// The route store failed to read a route.
    #[error("failed to load route {id}")]
    LoadFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    /// The route store could not prepare its backing location.
    #[error("route store unavailable")]
    StoreUnavailable(#[source] StoreError),
}

pub type Result<T> = std::result::Result<T, NavError>;
