// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial and adjacency queries over a built graph.

use std::f64::consts::TAU;

use nalgebra::Point2;
use topo_lite_geometry::algorithms::distance_point_polyline;
use topo_lite_geometry::Location;

use super::{Edge, Face, Node, TopologyGraph};
use crate::feature::FeatureInfo;
use crate::keys::{EdgeId, ElementKind, FaceId, NodeId};

/// Node, edge or face; lets [`TopologyGraph::find_closest_element`] be
/// generic over the element kind.
pub trait GraphElement: Sized {
    const KIND: ElementKind;

    /// All elements of this kind, ordered by id.
    fn all(graph: &TopologyGraph) -> &[Self];

    /// Distance from `p` to the element; 0 inside a face.
    fn distance_to(&self, p: &Point2<f64>) -> f64;
}

impl GraphElement for Node {
    const KIND: ElementKind = ElementKind::Node;

    fn all(graph: &TopologyGraph) -> &[Self] {
        graph.nodes()
    }

    fn distance_to(&self, p: &Point2<f64>) -> f64 {
        (self.point - p).norm()
    }
}

impl GraphElement for Edge {
    const KIND: ElementKind = ElementKind::Edge;

    fn all(graph: &TopologyGraph) -> &[Self] {
        graph.edges()
    }

    fn distance_to(&self, p: &Point2<f64>) -> f64 {
        distance_point_polyline(p, &self.vertices)
    }
}

impl GraphElement for Face {
    const KIND: ElementKind = ElementKind::Face;

    fn all(graph: &TopologyGraph) -> &[Self] {
        graph.faces()
    }

    fn distance_to(&self, p: &Point2<f64>) -> f64 {
        match self.shape.locate(p, 0.0) {
            Location::Interior | Location::Boundary => 0.0,
            Location::Exterior => self.shape.boundary_distance(p),
        }
    }
}

impl TopologyGraph {
    /// Nearest element of kind `T` within `radius` of `point`. Equal
    /// distances go to the lowest id.
    pub fn find_closest_element<T: GraphElement>(
        &self,
        point: &Point2<f64>,
        radius: f64,
    ) -> Option<&T> {
        let mut best: Option<(&T, f64)> = None;
        for element in T::all(self) {
            let d = element.distance_to(point);
            if d > radius {
                continue;
            }
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((element, d));
            }
        }
        let distance = best.map(|(_, d)| d);
        tracing::trace!(kind = %T::KIND, radius, ?distance, "Closest element query");
        best.map(|(element, _)| element)
    }

    /// Edges around a node ordered by angle, starting at +x. Loop edges are
    /// listed once per end.
    pub fn node_edges(&self, node: NodeId, clockwise: bool) -> Vec<&Edge> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        let mut ends: Vec<_> = node.ends.iter().collect();
        if clockwise {
            // Clockwise angle from +x, so +x itself stays first.
            let cw = |a: f64| if a == 0.0 { 0.0 } else { TAU - a };
            ends.sort_by(|x, y| {
                cw(x.angle)
                    .total_cmp(&cw(y.angle))
                    .then(x.edge.cmp(&y.edge))
                    .then(x.outgoing.cmp(&y.outgoing))
            });
        }
        ends.into_iter()
            .filter_map(|end| self.edge(end.edge))
            .collect()
    }

    /// Features an edge belongs to. With `only_boundary` these are the
    /// features whose linework contains the edge; otherwise polygons covering
    /// either side are added.
    pub fn edge_parent_features(&self, edge: EdgeId, only_boundary: bool) -> Vec<FeatureInfo> {
        let Some(edge) = self.edge(edge) else {
            return Vec::new();
        };
        let mut parents = edge.parents.clone();
        if !only_boundary {
            parents.extend(edge.left_features.iter().cloned());
            parents.extend(edge.right_features.iter().cloned());
            parents.sort();
            parents.dedup();
        }
        parents
    }

    /// Polygon features covering a face.
    pub fn face_parent_features(&self, face: FaceId) -> Vec<FeatureInfo> {
        self.face(face).map(|f| f.parents.clone()).unwrap_or_default()
    }

    /// Features passing through or located at a node.
    pub fn node_parent_features(&self, node: NodeId) -> Vec<FeatureInfo> {
        self.node(node).map(|n| n.parents.clone()).unwrap_or_default()
    }

    /// Nodes joined to `node` by an edge, sorted, without duplicates. A
    /// node on a loop edge is adjacent to itself.
    pub fn adjacent_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let Some(n) = self.node(node) else {
            return Vec::new();
        };
        let mut adjacent: Vec<NodeId> = n
            .ends
            .iter()
            .filter_map(|end| self.edge(end.edge))
            .map(|edge| {
                if edge.from_node == node {
                    edge.to_node
                } else {
                    edge.from_node
                }
            })
            .collect();
        adjacent.sort();
        adjacent.dedup();
        adjacent
    }

    /// Faces on either side of an edge; `None` is the unbounded outside.
    pub fn edge_faces(&self, edge: EdgeId) -> Option<(Option<FaceId>, Option<FaceId>)> {
        self.edge(edge).map(|e| (e.left_face, e.right_face))
    }
}

#[cfg(test)]
mod tests {
    use crate::budget::{Budget, BuildOptions};
    use crate::config::EngineConfig;
    use crate::graph::builder::build_graph;
    use crate::graph::{Edge, Face, GraphElement, Node, TopologyGraph};
    use crate::keys::{ElementKind, NodeId};
    use crate::store::{EditBatch, GeometryStore};
    use nalgebra::Point2;
    use topo_lite_geometry::{Envelope, Geometry, GeometryType};

    fn graph_of(lines: &[&[(f64, f64)]]) -> TopologyGraph {
        let mut store = GeometryStore::new(10.0);
        store
            .create_feature_class("Roads", GeometryType::Polyline)
            .unwrap();
        let mut batch = EditBatch::new();
        for line in lines {
            batch = batch.insert("Roads", Geometry::polyline(line));
        }
        store.apply_edits(batch).unwrap();

        let extent = Envelope::new(-100.0, -100.0, 100.0, 100.0);
        let mut budget = Budget::start(extent, &BuildOptions::new(), &EngineConfig::default());
        build_graph(&store, &["Roads"], extent, 0.001, 10.0, &mut budget).unwrap()
    }

    /// A plus sign centred on the origin.
    fn plus() -> TopologyGraph {
        graph_of(&[&[(-5.0, 0.0), (5.0, 0.0)], &[(0.0, -5.0), (0.0, 5.0)]])
    }

    fn center(graph: &TopologyGraph) -> NodeId {
        graph
            .find_closest_element::<Node>(&Point2::origin(), 0.1)
            .map(|n| n.id)
            .unwrap()
    }

    #[test]
    fn closest_node_respects_radius() {
        let graph = plus();
        assert!(graph
            .find_closest_element::<Node>(&Point2::new(2.0, 2.0), 1.0)
            .is_none());
        let node = graph
            .find_closest_element::<Node>(&Point2::new(4.5, 0.2), 1.0)
            .unwrap();
        assert_eq!(node.point, Point2::new(5.0, 0.0));
    }

    #[test]
    fn element_kinds() {
        assert_eq!(<Node as GraphElement>::KIND, ElementKind::Node);
        assert_eq!(<Edge as GraphElement>::KIND, ElementKind::Edge);
        assert_eq!(<Face as GraphElement>::KIND.as_str(), "Face");
    }

    #[test]
    fn closest_ties_go_to_lowest_id() {
        let graph = graph_of(&[&[(0.0, 0.0), (10.0, 0.0)]]);
        // Midway between both end nodes.
        let node = graph
            .find_closest_element::<Node>(&Point2::new(5.0, 0.0), 10.0)
            .unwrap();
        assert_eq!(node.id, NodeId(0));
    }

    #[test]
    fn closest_edge_and_missing_face() {
        let graph = plus();
        let edge = graph
            .find_closest_element::<Edge>(&Point2::new(3.0, 0.5), 1.0)
            .unwrap();
        assert!(edge.vertices.iter().any(|v| v.x == 5.0));
        assert!(graph
            .find_closest_element::<Face>(&Point2::new(3.0, 0.5), 1.0)
            .is_none());
    }

    #[test]
    fn node_edges_counter_clockwise_and_clockwise() {
        let graph = plus();
        let node = center(&graph);

        let direction = |e: &Edge| {
            let far = if e.from_node == node {
                e.vertices[e.vertices.len() - 1]
            } else {
                e.vertices[0]
            };
            (far.x.round() as i64, far.y.round() as i64)
        };

        let ccw: Vec<(i64, i64)> = graph.node_edges(node, false).into_iter().map(direction).collect();
        assert_eq!(ccw, vec![(5, 0), (0, 5), (-5, 0), (0, -5)]);

        let cw: Vec<(i64, i64)> = graph.node_edges(node, true).into_iter().map(direction).collect();
        assert_eq!(cw, vec![(5, 0), (0, -5), (-5, 0), (0, 5)]);
    }

    #[test]
    fn adjacency_of_the_center() {
        let graph = plus();
        let node = center(&graph);
        assert_eq!(graph.adjacent_nodes(node).len(), 4);
        assert_eq!(graph.node_parent_features(node).len(), 2);
    }

    #[test]
    fn edge_parents_without_polygons() {
        let graph = plus();
        let edge = graph.edges()[0].id;
        assert_eq!(graph.edge_parent_features(edge, true).len(), 1);
        assert_eq!(graph.edge_parent_features(edge, false).len(), 1);
        assert_eq!(graph.edge_faces(edge), Some((None, None)));
    }
}
