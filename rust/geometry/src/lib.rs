// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topo-Lite Geometry
//!
//! Planar shapes and spatial predicates used by the topology engine:
//! axis-aligned envelopes, point/polyline/polygon shapes, segment
//! intersection, distance and containment tests, and polygon overlay through
//! i_overlay.

pub mod algorithms;
pub mod bool2d;
pub mod envelope;
pub mod error;
pub mod shape;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Vector2};

pub use algorithms::{
    distance_point_polyline, distance_point_segment, point_in_ring, polyline_length,
    segment_intersection, SegmentIntersection,
};
pub use bool2d::{compute_signed_area, ensure_ccw, ensure_cw, polygon_intersection};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use shape::{Geometry, GeometryType, Location, Polygon};
