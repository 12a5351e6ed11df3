// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validation, error tracking and exceptions through the public API.

mod common;

use common::{city, everywhere, square};
use nalgebra::Point2;
use topo_lite_geometry::{Envelope, Geometry};
use topo_lite_topology::{
    EditBatch, ErrorKind, ErrorQuery, FeatureInfo, RuleType, TopologyState,
};

#[test]
fn unedited_topology_validates_to_an_empty_area() {
    let topology = city();
    for extent in [
        everywhere(),
        Envelope::new(0.0, 0.0, 1.0, 1.0),
        Envelope::new(-5.0, 3.0, 2.0, 3.0),
    ] {
        let result = topology.validate(extent).unwrap();
        assert!(result.affected_area.is_empty());
        assert_eq!(result.new_error_count, 0);
    }

    topology
        .apply_edits(EditBatch::new().insert("Parcels", square(0.0, 0.0, 10.0)))
        .unwrap();
    topology.validate(everywhere()).unwrap();

    for extent in [everywhere(), Envelope::new(0.0, 0.0, 10.0, 10.0)] {
        assert!(topology.validate(extent).unwrap().affected_area.is_empty());
    }
}

#[test]
fn a_violation_is_reported_once() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Hydrants", Geometry::point(50.0, 50.0)),
        )
        .unwrap();

    let result = topology.validate(everywhere()).unwrap();
    assert!(result.affected_area.contains_point(&Point2::new(50.0, 50.0)));
    assert_eq!(result.new_error_count, 1);

    let errors = topology.get_errors(&ErrorQuery::default()).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule_type, RuleType::PointProperlyInsideArea);
    assert_eq!(errors[0].origin, FeatureInfo::new("Hydrants", 1));

    // Again, with nothing dirty.
    assert_eq!(topology.validate(everywhere()).unwrap().new_error_count, 0);

    // Again, after an edit that dirties the hydrant without fixing it.
    topology
        .apply_edits(EditBatch::new().update("Hydrants", 1, Geometry::point(50.0, 50.0)))
        .unwrap();
    let result = topology.validate(everywhere()).unwrap();
    assert_eq!(result.new_error_count, 0);
    assert_eq!(result.resolved_error_count, 0);
    assert_eq!(topology.get_errors(&ErrorQuery::default()).unwrap(), errors);
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedWithErrors);
}

#[test]
fn fixing_the_geometry_resolves_the_error() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Hydrants", Geometry::point(50.0, 50.0)),
        )
        .unwrap();
    topology.validate(everywhere()).unwrap();

    topology
        .apply_edits(EditBatch::new().update("Parcels", 1, square(45.0, 45.0, 10.0)))
        .unwrap();
    let result = topology.validate(everywhere()).unwrap();
    assert_eq!(result.resolved_error_count, 1);
    assert!(topology.get_errors(&ErrorQuery::default()).unwrap().is_empty());
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedClean);
}

#[test]
fn mark_and_unmark_toggle_the_error_filters() {
    let topology = city();
    topology
        .apply_edits(EditBatch::new().insert("Hydrants", Geometry::point(5.0, 5.0)))
        .unwrap();
    topology.validate(everywhere()).unwrap();

    let errors_only = ErrorQuery::new(ErrorKind::ErrorsOnly).within(everywhere());
    let exceptions_only = ErrorQuery::new(ErrorKind::ExceptionsOnly).within(everywhere());

    let error = topology.get_errors(&errors_only).unwrap().remove(0);
    assert!(topology.mark_as_exception(&error).unwrap());
    assert!(topology.get_errors(&errors_only).unwrap().is_empty());
    let exceptions = topology.get_errors(&exceptions_only).unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].key, error.key);
    assert!(exceptions[0].is_exception);

    assert!(topology.unmark_as_exception(&error).unwrap());
    assert_eq!(topology.get_errors(&errors_only).unwrap().len(), 1);
    assert!(topology.get_errors(&exceptions_only).unwrap().is_empty());
}

#[test]
fn exceptions_survive_deleting_their_feature() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Hydrants", Geometry::point(50.0, 50.0))
                .insert("Hydrants", Geometry::point(60.0, 60.0)),
        )
        .unwrap();
    topology.validate(everywhere()).unwrap();

    let errors = topology.get_errors(&ErrorQuery::default()).unwrap();
    assert_eq!(errors.len(), 2);
    let accepted = errors
        .iter()
        .find(|e| e.origin.object_id == 1)
        .unwrap();
    topology.mark_as_exception(accepted).unwrap();

    topology
        .apply_edits(
            EditBatch::new()
                .delete("Hydrants", 1)
                .delete("Hydrants", 2),
        )
        .unwrap();
    let result = topology.validate(everywhere()).unwrap();
    assert_eq!(result.resolved_error_count, 1);

    assert!(topology
        .get_errors(&ErrorQuery::new(ErrorKind::ErrorsOnly))
        .unwrap()
        .is_empty());
    let exceptions = topology
        .get_errors(&ErrorQuery::new(ErrorKind::ExceptionsOnly))
        .unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].origin, FeatureInfo::new("Hydrants", 1));
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedClean);
}

#[test]
fn stale_errors_cannot_be_marked() {
    let topology = city();
    topology
        .apply_edits(EditBatch::new().insert("Hydrants", Geometry::point(50.0, 50.0)))
        .unwrap();
    topology.validate(everywhere()).unwrap();
    let error = topology.get_errors(&ErrorQuery::default()).unwrap().remove(0);

    topology
        .apply_edits(EditBatch::new().delete("Hydrants", 1))
        .unwrap();
    topology.validate(everywhere()).unwrap();

    let err = topology.mark_as_exception(&error).unwrap_err();
    assert!(matches!(err, topo_lite_topology::Error::ErrorNotFound(_)));
}

#[test]
fn only_the_dirty_part_of_the_extent_is_validated() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Hydrants", Geometry::point(5.0, 5.0))
                .insert("Hydrants", Geometry::point(500.0, 500.0)),
        )
        .unwrap();

    let result = topology
        .validate(Envelope::new(0.0, 0.0, 100.0, 100.0))
        .unwrap();
    assert_eq!(result.new_error_count, 1);
    assert_eq!(topology.state().unwrap(), TopologyState::Unanalyzed);
    assert_eq!(topology.dirty_regions().unwrap().len(), 1);

    let result = topology.validate_all().unwrap();
    assert_eq!(result.new_error_count, 1);
    assert_eq!(topology.state().unwrap(), TopologyState::AnalyzedWithErrors);
}

#[test]
fn overlaps_are_summarized_and_exported() {
    let topology = city();
    topology
        .apply_edits(
            EditBatch::new()
                .insert("Parcels", square(0.0, 0.0, 10.0))
                .insert("Parcels", square(5.0, 5.0, 10.0))
                .insert("Hydrants", Geometry::point(7.0, 7.0)),
        )
        .unwrap();
    let result = topology.validate(everywhere()).unwrap();
    assert_eq!(result.new_error_count, 1);

    let summary = topology.error_summary().unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].rule_type, RuleType::MustNotOverlap);
    assert_eq!(summary[0].errors, 1);

    let overlap = &topology.get_errors(&ErrorQuery::default()).unwrap()[0];
    approx::assert_relative_eq!(overlap.shape.area(), 25.0, epsilon = 1e-9);

    let json: serde_json::Value =
        serde_json::from_str(&topology.errors_to_json().unwrap()).unwrap();
    assert_eq!(json.as_array().map(Vec::len), Some(1));
}
