// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar topology graph.
//!
//! A [`TopologyGraph`] is the node/edge/face decomposition of the linework of
//! every participating feature over an extent:
//! - **Nodes** sit where three or more edge ends meet, where a line ends,
//!   where the set of parent features changes, at point features, and at one
//!   vertex of every isolated ring.
//! - **Edges** are maximal chains between nodes with no interior crossings.
//! - **Faces** are the bounded regions enclosed by edges. The unbounded
//!   region outside all linework is not a face; edges bordering it report
//!   `None` on that side.
//!
//! Graphs are built on demand from a geometry snapshot (see
//! [`Topology::build_graph`](crate::Topology::build_graph)) and are only
//! lent to the caller for the duration of a callback.

pub(crate) mod builder;
mod query;
mod traversal;

pub use query::GraphElement;

use nalgebra::Point2;
use smallvec::SmallVec;
use topo_lite_geometry::{Envelope, Polygon};

use crate::feature::FeatureInfo;
use crate::keys::{EdgeId, FaceId, NodeId};

/// One end of an edge as seen from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEnd {
    pub edge: EdgeId,
    /// Direction the edge leaves the node, radians counter-clockwise from +x
    /// in `[0, 2π)`.
    pub angle: f64,
    /// `true` at the edge's from-node end.
    pub outgoing: bool,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub point: Point2<f64>,
    /// Incident edge ends ordered counter-clockwise from +x. A loop edge
    /// appears twice.
    pub ends: SmallVec<[EdgeEnd; 4]>,
    /// Features whose linework passes through the node, plus point features
    /// located at it.
    pub parents: Vec<FeatureInfo>,
}

impl Node {
    /// Number of incident edge ends.
    pub fn degree(&self) -> usize {
        self.ends.len()
    }

    pub fn is_isolated(&self) -> bool {
        self.ends.is_empty()
    }
}

/// A graph edge, directed from `from_node` to `to_node`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub to_node: NodeId,
    /// Vertex chain from the from-node to the to-node.
    pub vertices: Vec<Point2<f64>>,
    /// Features whose lines or polygon boundaries contain the edge.
    pub parents: Vec<FeatureInfo>,
    /// Polygon features covering the area left of the edge.
    pub left_features: Vec<FeatureInfo>,
    /// Polygon features covering the area right of the edge.
    pub right_features: Vec<FeatureInfo>,
    pub left_face: Option<FaceId>,
    pub right_face: Option<FaceId>,
}

impl Edge {
    pub fn is_loop(&self) -> bool {
        self.from_node == self.to_node
    }

    pub fn length(&self) -> f64 {
        topo_lite_geometry::polyline_length(&self.vertices)
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::from_points(self.vertices.iter())
    }
}

/// A bounded face.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub id: FaceId,
    /// Outer boundary, counter-clockwise, as edge ids in traversal order.
    pub boundary: Vec<EdgeId>,
    /// Boundaries of the components nested directly inside the face.
    pub holes: Vec<Vec<EdgeId>>,
    /// Face region: outer ring plus hole rings.
    pub shape: Polygon,
    pub area: f64,
    /// Polygon features covering the face.
    pub parents: Vec<FeatureInfo>,
}

/// Nodes, edges and faces over an extent.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    faces: Vec<Face>,
    extent: Envelope,
    tolerance: f64,
}

impl TopologyGraph {
    /// Extent the graph was requested for. Features crossing its border are
    /// included whole.
    pub fn extent(&self) -> Envelope {
        self.extent
    }

    /// Cluster tolerance used for vertex snapping.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
