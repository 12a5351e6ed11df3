// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feature shapes: points, polylines and polygons with holes.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::algorithms::{distance_point_polyline, distance_point_ring, point_in_ring, polyline_length};
use crate::bool2d::{compute_signed_area, ensure_ccw, ensure_cw};
use crate::envelope::Envelope;
use crate::error::{Error, Result};

/// Shape category of a feature class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Polyline,
    Polygon,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::Polyline => "Polyline",
            GeometryType::Polygon => "Polygon",
        }
    }
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a point lies relative to an areal shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Interior,
    Boundary,
    Exterior,
}

/// A polygon with one outer ring and any number of holes.
///
/// Rings are stored open (the closing vertex is implicit). The exterior winds
/// counter-clockwise and holes wind clockwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point2<f64>>,
    pub interiors: Vec<Vec<Point2<f64>>>,
}

impl Polygon {
    /// Builds a polygon, dropping explicit closing vertices and normalizing
    /// ring winding.
    pub fn new(exterior: Vec<Point2<f64>>, interiors: Vec<Vec<Point2<f64>>>) -> Self {
        Self {
            exterior: ensure_ccw(&open_ring(exterior)),
            interiors: interiors
                .into_iter()
                .map(|ring| ensure_cw(&open_ring(ring)))
                .collect(),
        }
    }

    /// Iterates the exterior ring followed by every hole.
    pub fn rings(&self) -> impl Iterator<Item = &[Point2<f64>]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(|r| r.as_slice()))
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self
            .interiors
            .iter()
            .map(|r| compute_signed_area(r).abs())
            .sum();
        (compute_signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    pub fn perimeter(&self) -> f64 {
        self.rings()
            .map(|ring| {
                let mut closed = ring.to_vec();
                if let Some(first) = ring.first() {
                    closed.push(*first);
                }
                polyline_length(&closed)
            })
            .sum()
    }

    /// Distance from `p` to the nearest ring.
    pub fn boundary_distance(&self, p: &Point2<f64>) -> f64 {
        self.rings()
            .map(|ring| distance_point_ring(p, ring))
            .fold(f64::INFINITY, f64::min)
    }

    /// Classifies a point; anything within `tolerance` of a ring is boundary.
    pub fn locate(&self, p: &Point2<f64>, tolerance: f64) -> Location {
        if self.boundary_distance(p) <= tolerance {
            return Location::Boundary;
        }
        if !point_in_ring(p, &self.exterior) {
            return Location::Exterior;
        }
        if self.interiors.iter().any(|hole| point_in_ring(p, hole)) {
            return Location::Exterior;
        }
        Location::Interior
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::from_points(self.exterior.iter())
    }
}

fn open_ring(mut ring: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// A feature or error shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point2<f64>),
    /// Only produced for error shapes (e.g. several crossing locations).
    MultiPoint(Vec<Point2<f64>>),
    Polyline(Vec<Point2<f64>>),
    Polygon(Polygon),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point2::new(x, y))
    }

    /// Polyline from `(x, y)` pairs.
    pub fn polyline(coords: &[(f64, f64)]) -> Self {
        Geometry::Polyline(coords.iter().map(|&(x, y)| Point2::new(x, y)).collect())
    }

    /// Polygon without holes from `(x, y)` pairs.
    pub fn polygon(exterior: &[(f64, f64)]) -> Self {
        Geometry::Polygon(Polygon::new(
            exterior.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
            Vec::new(),
        ))
    }

    /// Shape category; multipoints count as points.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryType::Point,
            Geometry::Polyline(_) => GeometryType::Polyline,
            Geometry::Polygon(_) => GeometryType::Polygon,
        }
    }

    pub fn envelope(&self) -> Envelope {
        match self {
            Geometry::Point(p) => Envelope::from_point(p),
            Geometry::MultiPoint(points) | Geometry::Polyline(points) => {
                Envelope::from_points(points.iter())
            }
            Geometry::Polygon(poly) => poly.envelope(),
        }
    }

    /// Every vertex of the shape, rings included.
    pub fn vertices(&self) -> Box<dyn Iterator<Item = &Point2<f64>> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::MultiPoint(points) | Geometry::Polyline(points) => Box::new(points.iter()),
            Geometry::Polygon(poly) => Box::new(poly.rings().flat_map(|r| r.iter())),
        }
    }

    /// Checks coordinates are finite and parts have enough vertices.
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.vertices().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::NonFiniteCoordinate(p.x, p.y));
        }
        match self {
            Geometry::Point(_) => Ok(()),
            Geometry::MultiPoint(points) if points.is_empty() => Err(Error::EmptyMultiPoint),
            Geometry::MultiPoint(_) => Ok(()),
            Geometry::Polyline(points) if points.len() < 2 => {
                Err(Error::DegeneratePolyline(points.len()))
            }
            Geometry::Polyline(_) => Ok(()),
            Geometry::Polygon(poly) => {
                for ring in poly.rings() {
                    if ring.len() < 3 {
                        return Err(Error::DegenerateRing(ring.len()));
                    }
                }
                Ok(())
            }
        }
    }

    /// Length of a polyline or perimeter of a polygon; 0 for points.
    pub fn length(&self) -> f64 {
        match self {
            Geometry::Polyline(points) => polyline_length(points),
            Geometry::Polygon(poly) => poly.perimeter(),
            _ => 0.0,
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(poly) => poly.area(),
            _ => 0.0,
        }
    }

    /// Distance from `p` to the shape; 0 inside polygons.
    pub fn distance_to_point(&self, p: &Point2<f64>) -> f64 {
        match self {
            Geometry::Point(q) => (p - q).norm(),
            Geometry::MultiPoint(points) => points
                .iter()
                .map(|q| (p - q).norm())
                .fold(f64::INFINITY, f64::min),
            Geometry::Polyline(points) => distance_point_polyline(p, points),
            Geometry::Polygon(poly) => match poly.locate(p, 0.0) {
                Location::Interior | Location::Boundary => 0.0,
                Location::Exterior => poly.boundary_distance(p),
            },
        }
    }
}
