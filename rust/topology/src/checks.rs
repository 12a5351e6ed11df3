// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule predicates.
//!
//! [`evaluate`] runs one rule against a geometry snapshot and returns the
//! violations whose shapes touch the given area. Candidates are origin
//! features whose envelope intersects the area; partners are looked up
//! through the store's spatial index.

use std::collections::{BTreeMap, BTreeSet};

use topo_lite_geometry::algorithms::distance_point_polyline;
use topo_lite_geometry::{
    polygon_intersection, polyline_length, segment_intersection, Envelope, Geometry, Location,
    Point2, Polygon, SegmentIntersection,
};

use crate::error::Result;
use crate::errors::Violation;
use crate::feature::{Feature, FeatureInfo};
use crate::keys::ObjectId;
use crate::rules::{RuleEndpoint, RuleType, TopologyRule};
use crate::store::{GeometryStore, SearchFilter};

/// Everything a predicate reads.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub store: &'a GeometryStore,
    pub rule: &'a TopologyRule,
    pub area: &'a [Envelope],
    pub tolerance: f64,
}

impl<'a> CheckContext<'a> {
    fn touches_area(&self, env: &Envelope) -> bool {
        self.area.iter().any(|a| a.intersects(env))
    }

    /// Origin features intersecting the area, ordered by object id.
    fn candidates(&self) -> Result<Vec<&'a Feature>> {
        let mut found: BTreeMap<ObjectId, &'a Feature> = BTreeMap::new();
        for piece in self.area {
            for feature in self
                .store
                .search(&self.rule.origin.class, &endpoint_filter(&self.rule.origin, *piece))?
            {
                found.insert(feature.object_id(), feature);
            }
        }
        Ok(found.into_values().collect())
    }

    /// Features of `endpoint` whose envelope intersects `env`.
    fn partners(&self, endpoint: &RuleEndpoint, env: Envelope) -> Result<Vec<&'a Feature>> {
        Ok(self
            .store
            .search(&endpoint.class, &endpoint_filter(endpoint, env))?
            .collect())
    }

    fn violation(
        &self,
        origin: &FeatureInfo,
        destination: Option<&FeatureInfo>,
        shape: Geometry,
    ) -> Violation {
        Violation {
            rule_id: self.rule.id,
            rule_type: self.rule.rule_type,
            origin: origin.clone(),
            destination: destination.cloned(),
            shape,
        }
    }
}

fn endpoint_filter(endpoint: &RuleEndpoint, env: Envelope) -> SearchFilter {
    let filter = SearchFilter::intersecting(env);
    match endpoint.subtype {
        Some(subtype) => filter.with_subtype(subtype),
        None => filter,
    }
}

/// Runs the rule's predicate and keeps violations that touch the area.
pub fn evaluate(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let violations = match ctx.rule.rule_type {
        RuleType::MustBeLargerThanClusterTolerance => too_small(ctx)?,
        RuleType::MustNotOverlap => overlaps(ctx, None)?,
        RuleType::MustNotOverlapWith => overlaps(ctx, ctx.rule.destination.as_ref())?,
        RuleType::PointProperlyInsideArea => points_outside_areas(ctx)?,
        RuleType::PointMustBeCoveredByLine => points_off_lines(ctx)?,
        RuleType::MustNotHaveDangles => dangles(ctx)?,
        RuleType::MustNotIntersect => line_intersections(ctx)?,
        RuleType::MustNotSelfIntersect => self_intersections(ctx)?,
    };
    Ok(violations
        .into_iter()
        .filter(|v| ctx.touches_area(&v.shape.envelope()))
        .collect())
}

fn too_small(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let tol = ctx.tolerance;
    let mut out = Vec::new();
    for feature in ctx.candidates()? {
        let collapsed = match &feature.geometry {
            Geometry::Polyline(points) => polyline_length(points) <= tol,
            Geometry::Polygon(poly) => {
                poly.area() <= tol * tol
                    || poly.rings().any(|ring| {
                        let env = Envelope::from_points(ring.iter());
                        env.width().min(env.height()) <= tol
                    })
            }
            _ => false,
        };
        if collapsed {
            out.push(ctx.violation(&feature.info, None, feature.geometry.clone()));
        }
    }
    Ok(out)
}

/// Overlapping polygon pairs. With no destination the origin class is
/// checked against itself and each pair is reported once.
fn overlaps(ctx: &CheckContext<'_>, destination: Option<&RuleEndpoint>) -> Result<Vec<Violation>> {
    let min_area = ctx.tolerance * ctx.tolerance;
    let same_class = destination.is_none();
    let partner_endpoint = destination.unwrap_or(&ctx.rule.origin);

    let mut seen: BTreeSet<(FeatureInfo, FeatureInfo)> = BTreeSet::new();
    let mut out = Vec::new();

    for a in ctx.candidates()? {
        let Geometry::Polygon(pa) = &a.geometry else {
            continue;
        };
        let env_a = pa.envelope();
        for b in ctx.partners(partner_endpoint, env_a)? {
            if b.info == a.info {
                continue;
            }
            let Geometry::Polygon(pb) = &b.geometry else {
                continue;
            };
            if env_a.intersection(&pb.envelope()).area() <= 0.0 {
                continue;
            }

            let (origin, dest) = if same_class && b.info < a.info {
                (&b.info, &a.info)
            } else {
                (&a.info, &b.info)
            };
            if !seen.insert((origin.clone(), dest.clone())) {
                continue;
            }
            let (first, second): (&Polygon, &Polygon) = if origin == &a.info {
                (pa, pb)
            } else {
                (pb, pa)
            };

            for piece in polygon_intersection(first, second) {
                if piece.area() > min_area {
                    out.push(ctx.violation(origin, Some(dest), Geometry::Polygon(piece)));
                }
            }
        }
    }
    Ok(out)
}

fn points_outside_areas(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let Some(dest) = ctx.rule.destination.as_ref() else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for feature in ctx.candidates()? {
        for p in feature.geometry.vertices() {
            let inside = ctx
                .partners(dest, Envelope::from_point(p))?
                .into_iter()
                .any(|area| match &area.geometry {
                    Geometry::Polygon(poly) => poly.locate(p, ctx.tolerance) == Location::Interior,
                    _ => false,
                });
            if !inside {
                out.push(ctx.violation(&feature.info, None, Geometry::Point(*p)));
            }
        }
    }
    Ok(out)
}

fn points_off_lines(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let Some(dest) = ctx.rule.destination.as_ref() else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for feature in ctx.candidates()? {
        for p in feature.geometry.vertices() {
            let search = Envelope::from_point(p).expanded_by(ctx.tolerance);
            let covered = ctx
                .partners(dest, search)?
                .into_iter()
                .any(|line| match &line.geometry {
                    Geometry::Polyline(points) => {
                        distance_point_polyline(p, points) <= ctx.tolerance
                    }
                    _ => false,
                });
            if !covered {
                out.push(ctx.violation(&feature.info, None, Geometry::Point(*p)));
            }
        }
    }
    Ok(out)
}

fn dangles(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let tol = ctx.tolerance;
    let class_lines = RuleEndpoint::new(ctx.rule.origin.class.clone());
    let mut out = Vec::new();

    for feature in ctx.candidates()? {
        let Geometry::Polyline(raw) = &feature.geometry else {
            continue;
        };
        let points = distinct_vertices(raw, tol);
        let n = points.len();
        if n < 2 || (points[0] - points[n - 1]).norm() <= tol {
            continue;
        }

        let ends = [(points[0], &points[1..]), (points[n - 1], &points[..n - 1])];
        for (end, rest) in ends {
            if distance_point_polyline(&end, rest) <= tol {
                continue;
            }
            let search = Envelope::from_point(&end).expanded_by(tol);
            let connected = ctx
                .partners(&class_lines, search)?
                .into_iter()
                .filter(|other| other.info != feature.info)
                .any(|other| match &other.geometry {
                    Geometry::Polyline(o) => distance_point_polyline(&end, o) <= tol,
                    _ => false,
                });
            if !connected {
                out.push(ctx.violation(&feature.info, None, Geometry::Point(end)));
            }
        }
    }
    Ok(out)
}

fn line_intersections(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let tol = ctx.tolerance;
    let mut seen: BTreeSet<(FeatureInfo, FeatureInfo)> = BTreeSet::new();
    let mut out = Vec::new();

    for a in ctx.candidates()? {
        let Geometry::Polyline(la) = &a.geometry else {
            continue;
        };
        for b in ctx.partners(&ctx.rule.origin, a.geometry.envelope())? {
            if b.info == a.info {
                continue;
            }
            let Geometry::Polyline(lb) = &b.geometry else {
                continue;
            };
            let (origin, dest, first, second) = if b.info < a.info {
                (&b.info, &a.info, lb, la)
            } else {
                (&a.info, &b.info, la, lb)
            };
            if !seen.insert((origin.clone(), dest.clone())) {
                continue;
            }

            let mut hits = Vec::new();
            for sa in first.windows(2) {
                for sb in second.windows(2) {
                    match segment_intersection(&sa[0], &sa[1], &sb[0], &sb[1], tol) {
                        SegmentIntersection::None => {}
                        SegmentIntersection::Point(p) => {
                            if !(is_endpoint(first, &p, tol) && is_endpoint(second, &p, tol)) {
                                push_unique(&mut hits, p, tol);
                            }
                        }
                        SegmentIntersection::Overlap(p, q) => {
                            push_unique(&mut hits, p, tol);
                            push_unique(&mut hits, q, tol);
                        }
                    }
                }
            }
            if let Some(shape) = points_shape(hits) {
                out.push(ctx.violation(origin, Some(dest), shape));
            }
        }
    }
    Ok(out)
}

fn self_intersections(ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
    let tol = ctx.tolerance;
    let mut out = Vec::new();

    for feature in ctx.candidates()? {
        let Geometry::Polyline(raw) = &feature.geometry else {
            continue;
        };
        let points = distinct_vertices(raw, tol);
        let segments: Vec<(&Point2<f64>, &Point2<f64>)> =
            points.windows(2).map(|w| (&w[0], &w[1])).collect();
        let closed = points.len() > 3 && (points[0] - points[points.len() - 1]).norm() <= tol;

        let mut hits = Vec::new();
        for i in 0..segments.len() {
            for j in (i + 1)..segments.len() {
                let (a1, a2) = segments[i];
                let (b1, b2) = segments[j];
                let adjacent = j == i + 1;
                let closing = closed && i == 0 && j == segments.len() - 1;
                match segment_intersection(a1, a2, b1, b2, tol) {
                    SegmentIntersection::None => {}
                    SegmentIntersection::Point(p) => {
                        if adjacent && (p - a2).norm() <= tol {
                            continue;
                        }
                        if closing && (p - a1).norm() <= tol {
                            continue;
                        }
                        push_unique(&mut hits, p, tol);
                    }
                    SegmentIntersection::Overlap(p, q) => {
                        push_unique(&mut hits, p, tol);
                        push_unique(&mut hits, q, tol);
                    }
                }
            }
        }
        if let Some(shape) = points_shape(hits) {
            out.push(ctx.violation(&feature.info, None, shape));
        }
    }
    Ok(out)
}

/// Drops vertices within `tol` of the previous kept one. The last vertex
/// replaces its near duplicate so the line keeps its real end.
fn distinct_vertices(points: &[Point2<f64>], tol: f64) -> Vec<Point2<f64>> {
    let mut kept: Vec<Point2<f64>> = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let Some(last) = kept.last() else {
            kept.push(*p);
            continue;
        };
        if (p - last).norm() > tol {
            kept.push(*p);
        } else if i == points.len() - 1 && kept.len() > 1 {
            let end = kept.len() - 1;
            kept[end] = *p;
        }
    }
    kept
}

fn is_endpoint(line: &[Point2<f64>], p: &Point2<f64>, tol: f64) -> bool {
    match (line.first(), line.last()) {
        (Some(first), Some(last)) => (p - first).norm() <= tol || (p - last).norm() <= tol,
        _ => false,
    }
}

fn push_unique(points: &mut Vec<Point2<f64>>, p: Point2<f64>, tol: f64) {
    if !points.iter().any(|q| (q - p).norm() <= tol) {
        points.push(p);
    }
}

fn points_shape(mut points: Vec<Point2<f64>>) -> Option<Geometry> {
    match points.len() {
        0 => None,
        1 => points.pop().map(Geometry::Point),
        _ => Some(Geometry::MultiPoint(points)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::RuleId;
    use crate::store::EditBatch;
    use topo_lite_geometry::GeometryType;

    const TOL: f64 = 0.001;

    fn run(store: &GeometryStore, rule: TopologyRule) -> Vec<Violation> {
        let area = [Envelope::new(-1000.0, -1000.0, 1000.0, 1000.0)];
        evaluate(&CheckContext {
            store,
            rule: &rule,
            area: &area,
            tolerance: TOL,
        })
        .unwrap()
    }

    fn rule(rule_type: RuleType, origin: &str, destination: Option<&str>) -> TopologyRule {
        TopologyRule {
            id: RuleId(1),
            rule_type,
            origin: RuleEndpoint::new(origin),
            destination: destination.map(RuleEndpoint::new),
        }
    }

    fn square(x: f64, y: f64, size: f64) -> Geometry {
        Geometry::polygon(&[(x, y), (x + size, y), (x + size, y + size), (x, y + size)])
    }

    fn store_with(classes: &[(&str, GeometryType)], batch: EditBatch) -> GeometryStore {
        let mut store = GeometryStore::new(10.0);
        for (name, ty) in classes {
            store.create_feature_class(*name, *ty).unwrap();
        }
        store.apply_edits(batch).unwrap();
        store
    }

    #[test]
    fn overlapping_parcels_reported_once() {
        let store = store_with(
            &[("Parcels", GeometryType::Polygon)],
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Parcels", square(5.0, 5.0, 10.0))
                .insert("Parcels", square(10.0, 0.0, 6.0)),
        );
        let found = run(&store, rule(RuleType::MustNotOverlap, "Parcels", None));

        // Parcel 3 only shares an edge with parcel 1 but overlaps parcel 2.
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].origin, FeatureInfo::new("Parcels", 1));
        assert_eq!(found[0].destination, Some(FeatureInfo::new("Parcels", 2)));
        assert!((found[0].shape.area() - 25.0).abs() < 1e-9);
        assert_eq!(found[1].origin, FeatureInfo::new("Parcels", 2));
        assert_eq!(found[1].destination, Some(FeatureInfo::new("Parcels", 3)));
    }

    #[test]
    fn overlap_with_other_class() {
        let store = store_with(
            &[("Parcels", GeometryType::Polygon), ("Lakes", GeometryType::Polygon)],
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Lakes", square(8.0, 0.0, 10.0))
                .insert("Lakes", square(50.0, 50.0, 1.0)),
        );
        let found = run(&store, rule(RuleType::MustNotOverlapWith, "Parcels", Some("Lakes")));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].destination, Some(FeatureInfo::new("Lakes", 1)));
        assert!((found[0].shape.area() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn points_on_boundary_are_not_properly_inside() {
        let store = store_with(
            &[("Parcels", GeometryType::Polygon), ("Hydrants", GeometryType::Point)],
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Hydrants", Geometry::point(5.0, 5.0))
                .insert("Hydrants", Geometry::point(10.0, 5.0))
                .insert("Hydrants", Geometry::point(20.0, 5.0)),
        );
        let found = run(
            &store,
            rule(RuleType::PointProperlyInsideArea, "Hydrants", Some("Parcels")),
        );
        let ids: Vec<ObjectId> = found.iter().map(|v| v.origin.object_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(found[1].shape, Geometry::point(20.0, 5.0));
    }

    #[test]
    fn points_must_touch_lines() {
        let store = store_with(
            &[("Pipes", GeometryType::Polyline), ("Valves", GeometryType::Point)],
            EditBatch::new()
                .insert("Pipes", Geometry::polyline(&[(0.0, 0.0), (10.0, 0.0)]))
                .insert("Valves", Geometry::point(5.0, 0.0005))
                .insert("Valves", Geometry::point(5.0, 1.0)),
        );
        let found = run(
            &store,
            rule(RuleType::PointMustBeCoveredByLine, "Valves", Some("Pipes")),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.object_id, 2);
    }

    #[test]
    fn dangling_ends_are_found() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new()
                .insert("Roads", Geometry::polyline(&[(0.0, 0.0), (10.0, 0.0)]))
                .insert("Roads", Geometry::polyline(&[(10.0, 0.0), (10.0, 10.0)]))
                .insert("Roads", Geometry::polyline(&[(5.0, 0.0), (5.0, -5.0)])),
        );
        let found = run(&store, rule(RuleType::MustNotHaveDangles, "Roads", None));
        let shapes: Vec<&Geometry> = found.iter().map(|v| &v.shape).collect();
        assert_eq!(
            shapes,
            vec![
                &Geometry::point(0.0, 0.0),
                &Geometry::point(10.0, 10.0),
                &Geometry::point(5.0, -5.0)
            ]
        );
    }

    #[test]
    fn closed_lines_have_no_dangles() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new().insert(
                "Roads",
                Geometry::polyline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]),
            ),
        );
        assert!(run(&store, rule(RuleType::MustNotHaveDangles, "Roads", None)).is_empty());
    }

    #[test]
    fn crossing_lines_intersect_but_shared_ends_do_not() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new()
                .insert("Roads", Geometry::polyline(&[(0.0, 0.0), (10.0, 0.0)]))
                .insert("Roads", Geometry::polyline(&[(5.0, -5.0), (5.0, 5.0)]))
                .insert("Roads", Geometry::polyline(&[(10.0, 0.0), (20.0, 0.0)])),
        );
        let found = run(&store, rule(RuleType::MustNotIntersect, "Roads", None));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.object_id, 1);
        assert_eq!(found[0].destination.as_ref().map(|d| d.object_id), Some(2));
        assert_eq!(found[0].shape, Geometry::point(5.0, 0.0));
    }

    #[test]
    fn figure_eight_self_intersects() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new()
                .insert(
                    "Roads",
                    Geometry::polyline(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]),
                )
                .insert(
                    "Roads",
                    Geometry::polyline(&[(20.0, 0.0), (30.0, 0.0), (30.0, 10.0), (20.0, 0.0)]),
                ),
        );
        let found = run(&store, rule(RuleType::MustNotSelfIntersect, "Roads", None));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.object_id, 1);
        assert_eq!(found[0].shape, Geometry::point(5.0, 5.0));
    }

    #[test]
    fn repeated_vertices_do_not_self_intersect() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new()
                .insert(
                    "Roads",
                    Geometry::polyline(&[(0.0, 0.0), (5.0, 0.0), (5.0, 0.0), (10.0, 0.0)]),
                )
                .insert(
                    "Roads",
                    Geometry::polyline(&[(20.0, 0.0), (25.0, 0.0), (25.0005, 0.0), (30.0, 0.0)]),
                )
                .insert(
                    "Roads",
                    Geometry::polyline(&[(40.0, 0.0), (40.0, 0.0), (50.0, 0.0), (50.0, 0.0)]),
                ),
        );
        assert!(run(&store, rule(RuleType::MustNotSelfIntersect, "Roads", None)).is_empty());
    }

    #[test]
    fn repeated_end_vertex_still_dangles() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new().insert(
                "Roads",
                Geometry::polyline(&[(0.0, 0.0), (0.0, 0.0), (10.0, 0.0), (10.0005, 0.0)]),
            ),
        );
        let found = run(&store, rule(RuleType::MustNotHaveDangles, "Roads", None));
        let shapes: Vec<&Geometry> = found.iter().map(|v| &v.shape).collect();
        assert_eq!(
            shapes,
            vec![&Geometry::point(0.0, 0.0), &Geometry::point(10.0005, 0.0)]
        );
    }

    #[test]
    fn distinct_vertices_keeps_the_real_end() {
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(0.0005, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0002, 0.0),
        ];
        assert_eq!(
            distinct_vertices(&points, TOL),
            vec![Point2::new(0.0, 0.0), Point2::new(3.0002, 0.0)]
        );
        assert_eq!(
            distinct_vertices(&[Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)], TOL),
            vec![Point2::new(1.0, 1.0)]
        );
    }

    #[test]
    fn tiny_features_are_flagged() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new()
                .insert("Roads", Geometry::polyline(&[(0.0, 0.0), (0.0005, 0.0)]))
                .insert("Roads", Geometry::polyline(&[(0.0, 0.0), (1.0, 0.0)])),
        );
        let found = run(
            &store,
            rule(RuleType::MustBeLargerThanClusterTolerance, "Roads", None),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.object_id, 1);
    }

    #[test]
    fn violations_outside_area_are_dropped() {
        let store = store_with(
            &[("Roads", GeometryType::Polyline)],
            EditBatch::new().insert("Roads", Geometry::polyline(&[(0.0, 0.0), (10.0, 0.0)])),
        );
        let rule = rule(RuleType::MustNotHaveDangles, "Roads", None);
        let area = [Envelope::new(8.0, -1.0, 12.0, 1.0)];
        let found = evaluate(&CheckContext {
            store: &store,
            rule: &rule,
            area: &area,
            tolerance: TOL,
        })
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].shape, Geometry::point(10.0, 0.0));
    }
}
