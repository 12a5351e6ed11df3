// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounding rectangles.
//!
//! Envelopes are closed: two envelopes sharing only an edge or a corner
//! intersect. The empty envelope has `min > max` and behaves as the identity
//! for [`Envelope::union`].

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// An axis-aligned rectangle in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Envelope {
    /// Creates an envelope from two corners in any order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min: Point2::new(x0.min(x1), y0.min(y1)),
            max: Point2::new(x0.max(x1), y0.max(y1)),
        }
    }

    /// Creates an envelope and rejects NaN or infinite corners.
    pub fn try_new(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self> {
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidEnvelope(format!(
                "non-finite corner ({x0}, {y0}) - ({x1}, {y1})"
            )));
        }
        Ok(Self::new(x0, y0, x1, y1))
    }

    /// The empty envelope.
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::INFINITY, f64::INFINITY),
            max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Degenerate envelope around a single point.
    pub fn from_point(p: &Point2<f64>) -> Self {
        Self { min: *p, max: *p }
    }

    /// Smallest envelope covering all points; empty for no points.
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point2<f64>>,
    {
        let mut env = Self::empty();
        for p in points {
            env.expand_to_include(p);
        }
        env
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// `true` for non-empty envelopes with finite corners.
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
            && self.min.x.is_finite()
            && self.min.y.is_finite()
            && self.max.x.is_finite()
            && self.max.y.is_finite()
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max.x - self.min.x
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max.y - self.min.y
        }
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn expand_to_include(&mut self, p: &Point2<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Returns a copy grown by `d` on every side.
    pub fn expanded_by(&self, d: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            min: Point2::new(self.min.x - d, self.min.y - d),
            max: Point2::new(self.max.x + d, self.max.y + d),
        }
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Envelope {
            min: Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Common part of two envelopes; empty if they are disjoint.
    pub fn intersection(&self, other: &Envelope) -> Envelope {
        if !self.intersects(other) {
            return Envelope::empty();
        }
        Envelope {
            min: Point2::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Point2::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        }
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn contains_point(&self, p: &Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Distance from a point to the envelope (0 inside).
    pub fn distance_to_point(&self, p: &Point2<f64>) -> f64 {
        if self.is_empty() {
            return f64::INFINITY;
        }
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        (dx * dx + dy * dy).sqrt()
    }

    /// Parts of `self` not covered by `other`.
    ///
    /// Returns at most four rectangles: full-height slabs left and right of
    /// `other`, then the remaining pieces below and above it. A piece is only
    /// produced where `self` actually extends past `other`, so degenerate
    /// envelopes (points, axis-parallel lines) split correctly too.
    pub fn difference(&self, other: &Envelope) -> SmallVec<[Envelope; 4]> {
        let mut pieces = SmallVec::new();
        if self.is_empty() {
            return pieces;
        }
        if !self.intersects(other) {
            pieces.push(*self);
            return pieces;
        }

        let cut = self.intersection(other);
        if cut.min.x > self.min.x {
            pieces.push(Envelope::new(self.min.x, self.min.y, cut.min.x, self.max.y));
        }
        if cut.max.x < self.max.x {
            pieces.push(Envelope::new(cut.max.x, self.min.y, self.max.x, self.max.y));
        }
        if cut.min.y > self.min.y {
            pieces.push(Envelope::new(cut.min.x, self.min.y, cut.max.x, cut.min.y));
        }
        if cut.max.y < self.max.y {
            pieces.push(Envelope::new(cut.min.x, cut.max.y, cut.max.x, self.max.y));
        }

        pieces
    }

    /// Intersection with `other` when it has positive extent in every
    /// dimension where `self` does. Envelopes that merely share an edge give
    /// `None`; degenerate envelopes (points, axis-parallel lines) still
    /// overlap whatever covers them.
    pub fn overlap(&self, other: &Envelope) -> Option<Envelope> {
        let cut = self.intersection(other);
        if cut.is_empty() {
            return None;
        }
        if (cut.width() == 0.0 && self.width() > 0.0) || (cut.height() == 0.0 && self.height() > 0.0)
        {
            return None;
        }
        Some(cut)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::empty()
    }
}
