// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or checking shapes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Non-finite coordinate: ({0}, {1})")]
    NonFiniteCoordinate(f64, f64),

    #[error("Polyline needs at least 2 vertices, got {0}")]
    DegeneratePolyline(usize),

    #[error("Polygon ring needs at least 3 vertices, got {0}")]
    DegenerateRing(usize),

    #[error("Multipoint has no points")]
    EmptyMultiPoint,

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}
