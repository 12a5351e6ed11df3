// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring winding and polygon overlay.
//!
//! Winding helpers plus polygon intersection through the i_overlay
//! crate. The topology validator uses the intersection result as the shape of
//! overlap errors.

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use nalgebra::Point2;

use crate::shape::Polygon;

/// Rings with less area than this are treated as collapsed.
const MIN_AREA_THRESHOLD: f64 = 1e-10;

/// `true` for rings with at least three vertices and non-negligible area.
pub fn is_valid_contour(contour: &[Point2<f64>]) -> bool {
    contour.len() >= 3 && compute_signed_area(contour).abs() > MIN_AREA_THRESHOLD
}

/// Shoelace area of an open ring; positive when counter-clockwise.
pub fn compute_signed_area(contour: &[Point2<f64>]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    let twice: f64 = contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(p, q)| p.x * q.y - q.x * p.y)
        .sum();
    twice * 0.5
}

/// Copy of the ring wound counter-clockwise (exterior rings).
pub fn ensure_ccw(contour: &[Point2<f64>]) -> Vec<Point2<f64>> {
    wound(contour, true)
}

/// Copy of the ring wound clockwise (holes).
pub fn ensure_cw(contour: &[Point2<f64>]) -> Vec<Point2<f64>> {
    wound(contour, false)
}

fn wound(contour: &[Point2<f64>], ccw: bool) -> Vec<Point2<f64>> {
    let area = compute_signed_area(contour);
    let flip = if ccw { area < 0.0 } else { area > 0.0 };
    let mut ring = contour.to_vec();
    if flip {
        ring.reverse();
    }
    ring
}

/// Intersect two polygons.
///
/// Returns every piece of the common area, each with its holes. An empty
/// result means the interiors do not overlap (shared edges or corners alone
/// produce nothing).
pub fn polygon_intersection(a: &Polygon, b: &Polygon) -> Vec<Polygon> {
    let subject = polygon_to_paths(a);
    let clip = polygon_to_paths(b);

    let result = subject.overlay(&clip, OverlayRule::Intersect, FillRule::EvenOdd);

    shapes_to_polygons(&result)
}

/// Rings as i_overlay paths.
fn polygon_to_paths(polygon: &Polygon) -> Vec<Vec<[f64; 2]>> {
    polygon
        .rings()
        .map(|ring| ring.iter().map(|p| [p.x, p.y]).collect())
        .collect()
}

/// i_overlay shapes (outer contour first, then holes) back to polygons,
/// dropping collapsed contours.
fn shapes_to_polygons(shapes: &[Vec<Vec<[f64; 2]>>]) -> Vec<Polygon> {
    let to_points = |contour: &Vec<[f64; 2]>| -> Vec<Point2<f64>> {
        contour.iter().map(|p| Point2::new(p[0], p[1])).collect()
    };

    shapes
        .iter()
        .filter_map(|shape| {
            let outer = to_points(shape.first()?);
            if !is_valid_contour(&outer) {
                return None;
            }
            let holes = shape
                .iter()
                .skip(1)
                .map(|contour| to_points(contour))
                .filter(|hole| is_valid_contour(hole))
                .collect();
            Some(Polygon::new(outer, holes))
        })
        .collect()
}
