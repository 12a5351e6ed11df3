// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Degenerate inputs: world and point extents, repeated and zero-length
//! vertices.

mod common;

use common::{city, init_tracing, square};
use topo_lite_geometry::{Envelope, Geometry, GeometryType};
use topo_lite_topology::{
    EditBatch, EngineConfig, ErrorQuery, RuleEndpoint, RuleType, SearchFilter, Topology,
    TopologyDefinition, TopologyState,
};

fn world() -> Envelope {
    Envelope::new(-f64::MAX, -f64::MAX, f64::MAX, f64::MAX)
}

/// Roads must not cross themselves.
fn roads() -> Topology {
    init_tracing();
    let definition = TopologyDefinition::new("roads").with_rule(
        RuleType::MustNotSelfIntersect,
        RuleEndpoint::new("Roads"),
        None,
    );
    let topology = Topology::new(EngineConfig::default(), &definition).unwrap();
    topology
        .create_feature_class("Roads", GeometryType::Polyline)
        .unwrap();
    topology
}

#[test]
fn world_sized_extent() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Hydrants", Geometry::point(1e300, -1e300)),
        )
        .unwrap();

    let found = topology
        .search("Hydrants", &SearchFilter::intersecting(world()))
        .unwrap();
    assert_eq!(found.len(), 1);

    topology
        .build_graph(world(), |graph| {
            assert_eq!(graph.node_count(), 2);
            assert_eq!(graph.face_count(), 1);
        })
        .unwrap();

    // The far hydrant is outside every parcel.
    let result = topology.validate(world()).unwrap();
    assert_eq!(result.new_error_count, 1);
    assert!(result.warnings.is_empty());
    assert!(topology.dirty_regions().unwrap().is_empty());
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedWithErrors);
}

#[test]
fn point_sized_extent() {
    let topology = city();
    topology
        .apply_edits(EditBatch::new().insert("Parcels", square(0.0, 0.0, 10.0)))
        .unwrap();
    let point = Envelope::new(5.0, 5.0, 5.0, 5.0);

    // A point has no area to validate; the parcel stays dirty.
    let result = topology.validate(point).unwrap();
    assert!(result.affected_area.is_empty());
    assert_eq!(result.new_error_count, 0);
    assert_eq!(topology.state().unwrap(), TopologyState::Unanalyzed);

    topology
        .build_graph(point, |graph| {
            assert_eq!(graph.node_count(), 1);
            assert_eq!(graph.face_count(), 1);
        })
        .unwrap();
}

#[test]
fn repeated_vertices_are_not_self_intersections() {
    let topology = roads();
    topology
        .apply_edits(
            EditBatch::new()
                .insert(
                    "Roads",
                    Geometry::polyline(&[(0.0, 0.0), (5.0, 0.0), (5.0, 0.0), (10.0, 0.0)]),
                )
                .insert(
                    "Roads",
                    Geometry::polyline(&[(0.0, 20.0), (0.0, 20.0), (5.0, 20.0), (5.0005, 20.0)]),
                ),
        )
        .unwrap();

    topology.validate_all().unwrap();
    assert!(topology.get_errors(&ErrorQuery::default()).unwrap().is_empty());
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedClean);
}

#[test]
fn zero_length_segments_leave_no_trace_in_the_graph() {
    let topology = roads();
    topology
        .apply_edits(
            EditBatch::new()
                .insert(
                    "Roads",
                    Geometry::polyline(&[(0.0, 0.0), (5.0, 0.0), (5.0, 0.0), (10.0, 0.0)]),
                )
                .insert("Roads", Geometry::polyline(&[(30.0, 30.0), (30.0, 30.0)])),
        )
        .unwrap();

    topology
        .build_graph(Envelope::new(-100.0, -100.0, 100.0, 100.0), |graph| {
            assert_eq!(graph.node_count(), 2);
            assert_eq!(graph.edge_count(), 1);
            assert_eq!(graph.face_count(), 0);
            assert!(graph.edges().iter().all(|edge| !edge.is_loop()));
        })
        .unwrap();

    topology.validate_all().unwrap();
    assert!(topology.get_errors(&ErrorQuery::default()).unwrap().is_empty());
}
