// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.

use topo_lite_geometry::{Envelope, GeometryType};

use crate::keys::{ErrorKey, ObjectId, RuleId};

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
///
/// Input errors abort the call without side effects. Graph budget, deadline
/// and cancellation errors name the extent so the caller can retry with a
/// smaller one; they never affect the topology itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested extent is empty or has non-finite corners.
    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    /// A feature class name that the geometry store does not know.
    #[error("unknown feature class: {0}")]
    UnknownFeatureClass(String),

    /// A feature class with this name is already registered.
    #[error("feature class already exists: {0}")]
    DuplicateFeatureClass(String),

    /// No feature with the given object id in the class.
    #[error("feature not found: {class}/{object_id}")]
    FeatureNotFound { class: String, object_id: ObjectId },

    /// A shape does not match the geometry type of its feature class.
    #[error("feature class {class} stores {expected} shapes, got {actual}")]
    GeometryTypeMismatch {
        class: String,
        expected: GeometryType,
        actual: GeometryType,
    },

    /// A rule definition is inconsistent with its rule type.
    #[error("malformed rule {rule}: {reason}")]
    MalformedRule { rule: RuleId, reason: String },

    /// Cluster tolerance must be positive and finite.
    #[error("invalid cluster tolerance: {0}")]
    InvalidTolerance(f64),

    /// Two rule definitions share an id.
    #[error("duplicate rule id: {0}")]
    DuplicateRule(RuleId),

    /// The error was removed by a later validation.
    #[error("topology error no longer exists: {0:?}")]
    ErrorNotFound(ErrorKey),

    /// Shape failed validation.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] topo_lite_geometry::Error),

    /// Too many features intersect the graph extent.
    #[error("graph build over {extent:?} needs {features} features, limit is {limit}")]
    GraphBudgetExceeded {
        extent: Envelope,
        features: usize,
        limit: usize,
    },

    /// Graph construction ran past its deadline.
    #[error("graph build over {extent:?} exceeded its deadline")]
    GraphDeadlineExceeded { extent: Envelope },

    /// Graph construction was cancelled by the caller.
    #[error("graph build over {extent:?} was cancelled")]
    Cancelled { extent: Envelope },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl Error {
    /// `true` for failures a caller can retry with a smaller extent.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::GraphBudgetExceeded { .. }
                | Error::GraphDeadlineExceeded { .. }
                | Error::Cancelled { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
