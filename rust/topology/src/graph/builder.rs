// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar graph construction.
//!
//! 1. Collect features of the participating classes intersecting the extent
//!    (budget and cancellation checked per feature).
//! 2. Snap every vertex to a tolerance grid so coordinates closer than the
//!    cluster tolerance share one vertex id.
//! 3. Split segments where they cross or touch (sweep over x).
//! 4. Merge duplicate segments, uniting their parent features.
//! 5. Pick nodes and walk the chains between them into edges.
//! 6. Trace faces from half-edges and nest holes into enclosing faces.

use std::f64::consts::TAU;

use nalgebra::{Point2, Vector2};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use topo_lite_geometry::algorithms::{ring_segments, segment_param};
use topo_lite_geometry::{
    compute_signed_area, point_in_ring, segment_intersection, Envelope, Geometry, Location,
    Polygon, SegmentIntersection,
};
use tracing::debug;

use super::{Edge, EdgeEnd, Face, Node, TopologyGraph};
use crate::budget::Budget;
use crate::error::Result;
use crate::feature::{Feature, FeatureInfo};
use crate::keys::{EdgeId, FaceId, NodeId};
use crate::spatial::{GridIndex, PointIndex};
use crate::store::{GeometryStore, SearchFilter};

/// Sweep steps between budget checks.
const SWEEP_CHECK_INTERVAL: usize = 1024;

/// Builds the planar graph of `classes` over `extent`.
pub(crate) fn build_graph(
    store: &GeometryStore,
    classes: &[&str],
    extent: Envelope,
    tolerance: f64,
    cell_size: f64,
    budget: &mut Budget,
) -> Result<TopologyGraph> {
    let mut features: Vec<&Feature> = Vec::new();
    for class in classes {
        if !store.has_feature_class(class) {
            debug!(class, "skipping missing feature class in graph build");
            continue;
        }
        for feature in store.search(class, &SearchFilter::intersecting(extent))? {
            budget.take_feature()?;
            features.push(feature);
        }
    }

    let mut planar = Planarizer::new(tolerance);
    for (idx, feature) in features.iter().enumerate() {
        planar.add_feature(idx, &feature.geometry);
    }
    budget.check()?;

    let segments = planar.split(budget)?;
    budget.check()?;

    let mut assembly = Assembly::new(&planar, &segments, &features);
    assembly.walk_edges();
    assembly.orient_ends();
    assembly.assign_sides(cell_size);
    budget.check()?;

    let faces = assembly.trace_faces();
    let Assembly { nodes, edges, .. } = assembly;

    debug!(
        features = features.len(),
        nodes = nodes.len(),
        edges = edges.len(),
        faces = faces.len(),
        "planar graph built"
    );

    Ok(TopologyGraph {
        nodes,
        edges,
        faces,
        extent,
        tolerance,
    })
}

/// A deduplicated segment between two snapped vertices, `a < b`.
#[derive(Debug, Clone)]
struct Segment {
    a: u32,
    b: u32,
    /// Sorted feature indices.
    parents: SmallVec<[usize; 2]>,
}

impl Segment {
    fn other(&self, v: u32) -> u32 {
        if self.a == v {
            self.b
        } else {
            self.a
        }
    }
}

struct Planarizer {
    tolerance: f64,
    vertices: PointIndex,
    /// Raw segments as (from, to, feature index).
    raw: Vec<(u32, u32, usize)>,
    /// Point features as (vertex, feature index).
    points: Vec<(u32, usize)>,
}

impl Planarizer {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            vertices: PointIndex::new(tolerance),
            raw: Vec::new(),
            points: Vec::new(),
        }
    }

    fn add_feature(&mut self, idx: usize, geometry: &Geometry) {
        match geometry {
            Geometry::Point(p) => self.add_point(idx, *p),
            Geometry::MultiPoint(points) => {
                for p in points {
                    self.add_point(idx, *p);
                }
            }
            Geometry::Polyline(points) => {
                for w in points.windows(2) {
                    self.add_segment(idx, w[0], w[1]);
                }
            }
            Geometry::Polygon(poly) => {
                for ring in poly.rings() {
                    for (p, q) in ring_segments(ring) {
                        self.add_segment(idx, *p, *q);
                    }
                }
            }
        }
    }

    fn add_point(&mut self, idx: usize, p: Point2<f64>) {
        let v = self.vertices.find_or_insert(p, self.tolerance);
        self.points.push((v, idx));
    }

    fn add_segment(&mut self, idx: usize, p: Point2<f64>, q: Point2<f64>) {
        let a = self.vertices.find_or_insert(p, self.tolerance);
        let b = self.vertices.find_or_insert(q, self.tolerance);
        if a != b {
            self.raw.push((a, b, idx));
        }
    }

    /// Splits raw segments at every crossing and touching point, then merges
    /// duplicates.
    fn split(&mut self, budget: &Budget) -> Result<Vec<Segment>> {
        let tol = self.tolerance;

        #[derive(Clone, Copy)]
        struct Item {
            env: Envelope,
            seg: Option<usize>,
            a: u32,
            b: u32,
        }

        let mut items: Vec<Item> = self
            .raw
            .iter()
            .enumerate()
            .map(|(i, &(a, b, _))| Item {
                env: Envelope::from_points(
                    [self.vertices.point(a), self.vertices.point(b)].iter(),
                ),
                seg: Some(i),
                a,
                b,
            })
            .collect();
        // Point features split the lines they sit on.
        items.extend(self.points.iter().map(|&(v, _)| Item {
            env: Envelope::from_point(&self.vertices.point(v)),
            seg: None,
            a: v,
            b: v,
        }));
        items.sort_by(|x, y| x.env.min.x.total_cmp(&y.env.min.x));

        let mut splits: Vec<SmallVec<[u32; 2]>> = vec![SmallVec::new(); self.raw.len()];
        for i in 0..items.len() {
            if i % SWEEP_CHECK_INTERVAL == 0 {
                budget.check()?;
            }
            let it = items[i];
            for jt in &items[i + 1..] {
                if jt.env.min.x > it.env.max.x + tol {
                    break;
                }
                if it.seg.is_none() && jt.seg.is_none() {
                    continue;
                }
                if jt.env.min.y > it.env.max.y + tol || jt.env.max.y < it.env.min.y - tol {
                    continue;
                }

                let (pa, pb) = (self.vertices.point(it.a), self.vertices.point(it.b));
                let (qa, qb) = (self.vertices.point(jt.a), self.vertices.point(jt.b));
                let hits: [Option<Point2<f64>>; 2] =
                    match segment_intersection(&pa, &pb, &qa, &qb, tol) {
                        SegmentIntersection::None => continue,
                        SegmentIntersection::Point(x) => [Some(x), None],
                        SegmentIntersection::Overlap(x, y) => [Some(x), Some(y)],
                    };
                for x in hits.into_iter().flatten() {
                    let v = self.vertices.find_or_insert(x, tol);
                    for seg in [it.seg, jt.seg].into_iter().flatten() {
                        splits[seg].push(v);
                    }
                }
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        let mut by_key: FxHashMap<(u32, u32), usize> = FxHashMap::default();
        for (i, &(a, b, parent)) in self.raw.iter().enumerate() {
            let pa = self.vertices.point(a);
            let pb = self.vertices.point(b);
            let mut inner: Vec<(f64, u32)> = splits[i]
                .iter()
                .filter(|&&v| v != a && v != b)
                .map(|&v| (segment_param(&pa, &pb, &self.vertices.point(v)), v))
                .collect();
            inner.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            inner.dedup_by_key(|x| x.1);

            let mut chain: Vec<u32> = Vec::with_capacity(inner.len() + 2);
            chain.push(a);
            chain.extend(inner.into_iter().map(|(_, v)| v));
            chain.push(b);

            for w in chain.windows(2) {
                if w[0] == w[1] {
                    continue;
                }
                let key = (w[0].min(w[1]), w[0].max(w[1]));
                let slot = *by_key.entry(key).or_insert_with(|| {
                    segments.push(Segment {
                        a: key.0,
                        b: key.1,
                        parents: SmallVec::new(),
                    });
                    segments.len() - 1
                });
                let parents = &mut segments[slot].parents;
                if let Err(pos) = parents.binary_search(&parent) {
                    parents.insert(pos, parent);
                }
            }
        }
        Ok(segments)
    }
}

/// Node, edge and face assembly over merged segments.
struct Assembly<'p, 'f> {
    planar: &'p Planarizer,
    segments: &'p [Segment],
    features: &'p [&'f Feature],
    incident: Vec<SmallVec<[usize; 4]>>,
    point_features: FxHashMap<u32, Vec<usize>>,
    node_of: Vec<Option<NodeId>>,
    used: Vec<bool>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl<'p, 'f> Assembly<'p, 'f> {
    fn new(planar: &'p Planarizer, segments: &'p [Segment], features: &'p [&'f Feature]) -> Self {
        let nv = planar.vertices.len();
        let mut incident: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); nv];
        for (s, seg) in segments.iter().enumerate() {
            incident[seg.a as usize].push(s);
            incident[seg.b as usize].push(s);
        }
        let mut point_features: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
        for &(v, idx) in &planar.points {
            point_features.entry(v).or_default().push(idx);
        }

        let mut assembly = Self {
            planar,
            segments,
            features,
            incident,
            point_features,
            node_of: vec![None; nv],
            used: vec![false; segments.len()],
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        for v in 0..nv as u32 {
            if assembly.is_node(v) {
                assembly.add_node(v);
            }
        }
        assembly
    }

    fn is_node(&self, v: u32) -> bool {
        if self.point_features.contains_key(&v) {
            return true;
        }
        let inc = &self.incident[v as usize];
        match inc.len() {
            0 => false,
            2 => self.segments[inc[0]].parents != self.segments[inc[1]].parents,
            _ => true,
        }
    }

    fn add_node(&mut self, v: u32) -> NodeId {
        if let Some(id) = self.node_of[v as usize] {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            point: self.planar.vertices.point(v),
            ends: SmallVec::new(),
            parents: Vec::new(),
        });
        self.node_of[v as usize] = Some(id);
        id
    }

    fn infos(&self, indices: impl IntoIterator<Item = usize>) -> Vec<FeatureInfo> {
        let mut infos: Vec<FeatureInfo> = indices
            .into_iter()
            .map(|i| self.features[i].info.clone())
            .collect();
        infos.sort();
        infos.dedup();
        infos
    }

    fn walk_edges(&mut self) {
        let starts: Vec<u32> = (0..self.node_of.len() as u32)
            .filter(|&v| self.node_of[v as usize].is_some())
            .collect();
        for v in starts {
            let incident = self.incident[v as usize].clone();
            for s in incident {
                if !self.used[s] {
                    self.walk(v, s);
                }
            }
        }

        // What is left are rings with no node on them.
        for s in 0..self.segments.len() {
            if self.used[s] {
                continue;
            }
            let start = self.ring_min_vertex(s);
            self.add_node(start);
            if let Some(&first) = self.incident[start as usize].first() {
                self.walk(start, first);
            }
        }
    }

    /// Lowest vertex id on the ring through segment `s`.
    fn ring_min_vertex(&self, s: usize) -> u32 {
        let seg = &self.segments[s];
        let (start, mut cur, mut prev_seg) = (seg.a, seg.b, s);
        let mut lowest = start.min(cur);
        while cur != start {
            let next_seg = self.incident[cur as usize]
                .iter()
                .copied()
                .find(|&t| t != prev_seg);
            let Some(next_seg) = next_seg else {
                break;
            };
            cur = self.segments[next_seg].other(cur);
            prev_seg = next_seg;
            lowest = lowest.min(cur);
        }
        lowest
    }

    /// Follows degree-2 vertices from node vertex `start` along `first`.
    fn walk(&mut self, start: u32, first: usize) {
        let mut chain = vec![start];
        let mut cur = start;
        let mut seg = first;
        loop {
            self.used[seg] = true;
            let next = self.segments[seg].other(cur);
            chain.push(next);
            if self.node_of[next as usize].is_some() {
                break;
            }
            let following = self.incident[next as usize]
                .iter()
                .copied()
                .find(|&t| t != seg && !self.used[t]);
            match following {
                Some(t) => {
                    cur = next;
                    seg = t;
                }
                None => {
                    // Closed back onto itself without meeting a node.
                    self.add_node(next);
                    break;
                }
            }
        }

        let (Some(from), Some(to)) = (
            chain.first().and_then(|&v| self.node_of[v as usize]),
            chain.last().and_then(|&v| self.node_of[v as usize]),
        ) else {
            return;
        };
        let parents = self.infos(self.segments[first].parents.iter().copied());
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            from_node: from,
            to_node: to,
            vertices: chain
                .iter()
                .map(|&v| self.planar.vertices.point(v))
                .collect(),
            parents,
            left_features: Vec::new(),
            right_features: Vec::new(),
            left_face: None,
            right_face: None,
        });
    }

    /// Fills node incidence lists (counter-clockwise) and node parents.
    fn orient_ends(&mut self) {
        let mut node_parents: Vec<Vec<FeatureInfo>> = vec![Vec::new(); self.nodes.len()];

        for edge in &self.edges {
            let n = edge.vertices.len();
            self.nodes[edge.from_node.index()].ends.push(EdgeEnd {
                edge: edge.id,
                angle: angle_of(&edge.vertices[0], &edge.vertices[1]),
                outgoing: true,
            });
            self.nodes[edge.to_node.index()].ends.push(EdgeEnd {
                edge: edge.id,
                angle: angle_of(&edge.vertices[n - 1], &edge.vertices[n - 2]),
                outgoing: false,
            });
            node_parents[edge.from_node.index()].extend(edge.parents.iter().cloned());
            node_parents[edge.to_node.index()].extend(edge.parents.iter().cloned());
        }

        for (&v, indices) in &self.point_features {
            if let Some(id) = self.node_of[v as usize] {
                node_parents[id.index()]
                    .extend(indices.iter().map(|&i| self.features[i].info.clone()));
            }
        }

        for (node, mut parents) in self.nodes.iter_mut().zip(node_parents) {
            node.ends.sort_by(|x, y| {
                x.angle
                    .total_cmp(&y.angle)
                    .then(x.edge.cmp(&y.edge))
                    .then(x.outgoing.cmp(&y.outgoing))
            });
            parents.sort();
            parents.dedup();
            node.parents = parents;
        }
    }

    /// Polygon features left and right of every edge, sampled just beside
    /// the edge midpoint.
    fn assign_sides(&mut self, cell_size: f64) {
        let mut polygons: GridIndex<usize> = GridIndex::new(cell_size);
        for (i, feature) in self.features.iter().enumerate() {
            if let Geometry::Polygon(poly) = &feature.geometry {
                polygons.insert(i, poly.envelope());
            }
        }
        if polygons.is_empty() {
            return;
        }

        let offset = self.planar.tolerance;
        let covering = |sample: &Point2<f64>| -> Vec<usize> {
            polygons
                .query(&Envelope::from_point(sample))
                .into_iter()
                .filter(|&i| match &self.features[i].geometry {
                    Geometry::Polygon(poly) => poly.locate(sample, 0.0) == Location::Interior,
                    _ => false,
                })
                .collect()
        };

        let mut sides = Vec::with_capacity(self.edges.len());
        for edge in &self.edges {
            sides.push(match side_samples(&edge.vertices, offset) {
                Some((left, right)) => (self.infos(covering(&left)), self.infos(covering(&right))),
                None => (Vec::new(), Vec::new()),
            });
        }
        for (edge, (left, right)) in self.edges.iter_mut().zip(sides) {
            edge.left_features = left;
            edge.right_features = right;
        }
    }

    /// Traces half-edge cycles into faces and sets edge face references.
    fn trace_faces(&mut self) -> Vec<Face> {
        let half_count = self.edges.len() * 2;
        if half_count == 0 {
            return Vec::new();
        }

        // Half-edge h runs along edge h / 2, forward when h is even.
        let origin = |h: usize| -> NodeId {
            let edge = &self.edges[h / 2];
            if h % 2 == 0 {
                edge.from_node
            } else {
                edge.to_node
            }
        };
        let mut position = vec![0usize; half_count];
        for node in &self.nodes {
            for (i, end) in node.ends.iter().enumerate() {
                position[half_of(end)] = i;
            }
        }
        let next = |h: usize| -> usize {
            let twin = h ^ 1;
            let ends = &self.nodes[origin(twin).index()].ends;
            let k = ends.len();
            half_of(&ends[(position[twin] + k - 1) % k])
        };

        let mut cycle_of = vec![usize::MAX; half_count];
        let mut cycles: Vec<Vec<usize>> = Vec::new();
        for start in 0..half_count {
            if cycle_of[start] != usize::MAX {
                continue;
            }
            let id = cycles.len();
            let mut cycle = Vec::new();
            let mut h = start;
            while cycle_of[h] == usize::MAX && cycle.len() <= half_count {
                cycle_of[h] = id;
                cycle.push(h);
                h = next(h);
            }
            cycles.push(cycle);
        }

        let rings: Vec<Vec<Point2<f64>>> = cycles.iter().map(|c| self.cycle_ring(c)).collect();
        let areas: Vec<f64> = rings.iter().map(|r| compute_signed_area(r)).collect();
        let component = self.components();

        // Bounded faces first, in discovery order.
        let mut cycle_face: Vec<Option<FaceId>> = vec![None; cycles.len()];
        let mut bounded: Vec<usize> = Vec::new();
        for (c, &area) in areas.iter().enumerate() {
            if area > 0.0 {
                cycle_face[c] = Some(FaceId(bounded.len() as u32));
                bounded.push(c);
            }
        }

        // Each outer boundary sits in the smallest face of another component
        // that contains it.
        let mut holes: Vec<Vec<usize>> = vec![Vec::new(); bounded.len()];
        for (c, &area) in areas.iter().enumerate() {
            if area > 0.0 {
                continue;
            }
            let own = component[origin(cycles[c][0]).index()];
            let sample = self.nodes[origin(cycles[c][0]).index()].point;
            let enclosing = bounded
                .iter()
                .enumerate()
                .filter(|&(_, &b)| component[origin(cycles[b][0]).index()] != own)
                .filter(|&(_, &b)| point_in_ring(&sample, &rings[b]))
                .min_by(|x, y| areas[*x.1].total_cmp(&areas[*y.1]).then(x.0.cmp(&y.0)))
                .map(|(f, _)| f);
            if let Some(f) = enclosing {
                cycle_face[c] = Some(FaceId(f as u32));
                holes[f].push(c);
            }
        }

        let faces: Vec<Face> = bounded
            .iter()
            .enumerate()
            .map(|(f, &c)| {
                let shape = Polygon::new(
                    rings[c].clone(),
                    holes[f].iter().map(|&hc| rings[hc].clone()).collect(),
                );
                let first = cycles[c][0];
                let edge = &self.edges[first / 2];
                let parents = if first % 2 == 0 {
                    edge.left_features.clone()
                } else {
                    edge.right_features.clone()
                };
                Face {
                    id: FaceId(f as u32),
                    boundary: cycle_edges(&cycles[c]),
                    holes: holes[f].iter().map(|&hc| cycle_edges(&cycles[hc])).collect(),
                    area: shape.area(),
                    shape,
                    parents,
                }
            })
            .collect();

        for edge in &mut self.edges {
            let i = edge.id.index();
            edge.left_face = cycle_face[cycle_of[2 * i]];
            edge.right_face = cycle_face[cycle_of[2 * i + 1]];
        }
        faces
    }

    /// Open ring of vertices traversed by a half-edge cycle.
    fn cycle_ring(&self, cycle: &[usize]) -> Vec<Point2<f64>> {
        let mut ring = Vec::new();
        for &h in cycle {
            let vertices = &self.edges[h / 2].vertices;
            let n = vertices.len();
            if h % 2 == 0 {
                ring.extend_from_slice(&vertices[..n - 1]);
            } else {
                ring.extend(vertices[1..].iter().rev());
            }
        }
        ring
    }

    /// Connected component index of every node.
    fn components(&self) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for edge in &self.edges {
            let a = find(&mut parent, edge.from_node.index());
            let b = find(&mut parent, edge.to_node.index());
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }
        (0..self.nodes.len()).map(|x| find(&mut parent, x)).collect()
    }
}

fn half_of(end: &EdgeEnd) -> usize {
    end.edge.index() * 2 + usize::from(!end.outgoing)
}

fn cycle_edges(cycle: &[usize]) -> Vec<EdgeId> {
    cycle.iter().map(|&h| EdgeId((h / 2) as u32)).collect()
}

/// Direction from `from` towards `to`, in `[0, 2π)`.
fn angle_of(from: &Point2<f64>, to: &Point2<f64>) -> f64 {
    let d = to - from;
    let a = d.y.atan2(d.x);
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}

/// Points `offset` to the left and right of the midpoint of the longest
/// segment of a chain. Vertices are avoided so samples never land on the
/// boundary of a neighbouring segment.
fn side_samples(vertices: &[Point2<f64>], offset: f64) -> Option<(Point2<f64>, Point2<f64>)> {
    let mut longest: Option<(Point2<f64>, Vector2<f64>, f64)> = None;
    for w in vertices.windows(2) {
        let d = w[1] - w[0];
        let len = d.norm();
        if len > longest.map_or(0.0, |(_, _, l)| l) {
            longest = Some((w[0], d, len));
        }
    }
    let (start, d, len) = longest?;
    let mid = start + d * 0.5;
    let normal = Vector2::new(-d.y, d.x) * (offset / len);
    Some((mid + normal, mid - normal))
}
