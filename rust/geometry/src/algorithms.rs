// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment-level computational geometry.
//!
//! All predicates take an explicit tolerance: two points closer than the
//! tolerance are treated as the same location, matching the cluster tolerance
//! semantics of the topology engine.

use nalgebra::{Point2, Vector2};

/// Result of intersecting two segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentIntersection {
    None,
    /// Segments meet in a single point (crossing or touching).
    Point(Point2<f64>),
    /// Collinear segments share a stretch between two points.
    Overlap(Point2<f64>, Point2<f64>),
}

/// 2D cross product of `b - a` and `c - a`.
///
/// Positive when `a, b, c` turn counter-clockwise.
#[inline]
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

#[inline]
fn cross(u: &Vector2<f64>, v: &Vector2<f64>) -> f64 {
    u.x * v.y - u.y * v.x
}

/// Parameter of the projection of `p` onto the line through `a` and `b`.
///
/// 0 at `a`, 1 at `b`; unclamped. Degenerate segments return 0.
pub fn segment_param(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> f64 {
    let d = b - a;
    let len_sq = d.norm_squared();
    if len_sq == 0.0 {
        return 0.0;
    }
    (p - a).dot(&d) / len_sq
}

/// Closest point to `p` on segment `a`-`b`.
pub fn closest_point_on_segment(
    a: &Point2<f64>,
    b: &Point2<f64>,
    p: &Point2<f64>,
) -> Point2<f64> {
    let t = segment_param(a, b, p).clamp(0.0, 1.0);
    a + (b - a) * t
}

/// Euclidean distance from `p` to segment `a`-`b`.
pub fn distance_point_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (p - closest_point_on_segment(a, b, p)).norm()
}

/// Distance from `p` to an open polyline. Infinite for empty input.
pub fn distance_point_polyline(p: &Point2<f64>, vertices: &[Point2<f64>]) -> f64 {
    match vertices.len() {
        0 => f64::INFINITY,
        1 => (p - vertices[0]).norm(),
        _ => vertices
            .windows(2)
            .map(|w| distance_point_segment(p, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Distance from `p` to the boundary of a closed ring.
pub fn distance_point_ring(p: &Point2<f64>, ring: &[Point2<f64>]) -> f64 {
    ring_segments(ring)
        .map(|(a, b)| distance_point_segment(p, a, b))
        .fold(f64::INFINITY, f64::min)
}

/// Total length of an open polyline.
pub fn polyline_length(vertices: &[Point2<f64>]) -> f64 {
    vertices.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// Iterates the segments of a closed ring, including the closing segment.
pub fn ring_segments(ring: &[Point2<f64>]) -> impl Iterator<Item = (&Point2<f64>, &Point2<f64>)> {
    let n = ring.len();
    let count = if n >= 2 { n } else { 0 };
    (0..count).map(move |i| (&ring[i], &ring[(i + 1) % n]))
}

/// Check if a point is inside a ring using ray casting.
///
/// Points exactly on the boundary may land on either side; callers that care
/// test the boundary distance first.
pub fn point_in_ring(point: &Point2<f64>, ring: &[Point2<f64>]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = ring.len();

    let mut j = n - 1;
    for i in 0..n {
        let pi = &ring[i];
        let pj = &ring[j];

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Intersects segment `a1`-`a2` with segment `b1`-`b2`.
///
/// Endpoints within `tolerance` of the other segment count as touching, so
/// nearly-meeting linework is reported the same way as exactly-meeting
/// linework.
pub fn segment_intersection(
    a1: &Point2<f64>,
    a2: &Point2<f64>,
    b1: &Point2<f64>,
    b2: &Point2<f64>,
    tolerance: f64,
) -> SegmentIntersection {
    let da = a2 - a1;
    let db = b2 - b1;
    let len_a = da.norm();
    let len_b = db.norm();

    if len_a == 0.0 || len_b == 0.0 {
        return degenerate_intersection(a1, a2, b1, b2, tolerance);
    }

    let denom = cross(&da, &db);
    let parallel = denom.abs() <= 1e-12 * len_a * len_b;

    if parallel {
        if distance_point_segment(b1, a1, a2).min(distance_point_segment(b2, a1, a2)) > tolerance
            && distance_point_segment(a1, b1, b2).min(distance_point_segment(a2, b1, b2))
                > tolerance
        {
            return SegmentIntersection::None;
        }
        // Collinear within tolerance: clip b's parameter range against a.
        let tb1 = segment_param(a1, a2, b1);
        let tb2 = segment_param(a1, a2, b2);
        let lo = tb1.min(tb2).max(0.0);
        let hi = tb1.max(tb2).min(1.0);
        let slack = tolerance / len_a;
        if hi < lo - slack {
            return SegmentIntersection::None;
        }
        let p = a1 + da * lo.min(hi);
        let q = a1 + da * hi.max(lo);
        if (q - p).norm() <= tolerance {
            return SegmentIntersection::Point(p);
        }
        return SegmentIntersection::Overlap(p, q);
    }

    let w = b1 - a1;
    let t = cross(&w, &db) / denom;
    let u = cross(&w, &da) / denom;
    let ta = tolerance / len_a;
    let tb = tolerance / len_b;

    if t >= -ta && t <= 1.0 + ta && u >= -tb && u <= 1.0 + tb {
        return SegmentIntersection::Point(a1 + da * t.clamp(0.0, 1.0));
    }

    // Nearly parallel segments can touch at an endpoint while the line
    // intersection lies far away.
    for (p, s1, s2) in [(a1, b1, b2), (a2, b1, b2)] {
        if distance_point_segment(p, s1, s2) <= tolerance {
            return SegmentIntersection::Point(*p);
        }
    }
    for (p, s1, s2) in [(b1, a1, a2), (b2, a1, a2)] {
        if distance_point_segment(p, s1, s2) <= tolerance {
            return SegmentIntersection::Point(closest_point_on_segment(s1, s2, p));
        }
    }

    SegmentIntersection::None
}

fn degenerate_intersection(
    a1: &Point2<f64>,
    a2: &Point2<f64>,
    b1: &Point2<f64>,
    b2: &Point2<f64>,
    tolerance: f64,
) -> SegmentIntersection {
    if a1 == a2 {
        if distance_point_segment(a1, b1, b2) <= tolerance {
            return SegmentIntersection::Point(*a1);
        }
        return SegmentIntersection::None;
    }
    if distance_point_segment(b1, a1, a2) <= tolerance {
        return SegmentIntersection::Point(closest_point_on_segment(a1, a2, b1));
    }
    SegmentIntersection::None
}
