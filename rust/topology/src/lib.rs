// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Topo-Lite Topology
//!
//! Planar topology validation and error tracking.
//!
//! A [`Topology`] groups point, line and polygon feature classes under a set
//! of spatial rules ("parcels must not overlap", "hydrants must lie inside a
//! parcel", ...). Edits mark the touched area dirty; [`Topology::validate`]
//! re-evaluates the rules over the dirty part of an extent only, diffs the
//! result against the stored errors and clears what it validated. Errors can
//! be flagged as exceptions, which later validations leave alone.
//!
//! On demand, [`Topology::build_graph`] decomposes the linework of all
//! participating features into a planar [`TopologyGraph`] of nodes, edges and
//! faces for adjacency and nearest-element queries.
//!
//! ```no_run
//! use topo_lite_topology::{
//!     EditBatch, EngineConfig, ErrorQuery, RuleEndpoint, RuleType, Topology,
//!     TopologyDefinition,
//! };
//! use topo_lite_geometry::{Envelope, Geometry, GeometryType};
//!
//! # fn main() -> topo_lite_topology::Result<()> {
//! let definition = TopologyDefinition::new("city").with_rule(
//!     RuleType::MustNotOverlap,
//!     RuleEndpoint::new("Parcels"),
//!     None,
//! );
//! let topology = Topology::new(EngineConfig::from_env(), &definition)?;
//! topology.create_feature_class("Parcels", GeometryType::Polygon)?;
//! topology.apply_edits(EditBatch::new().insert(
//!     "Parcels",
//!     Geometry::polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
//! ))?;
//!
//! let result = topology.validate(Envelope::new(-100.0, -100.0, 100.0, 100.0))?;
//! println!("{} new errors", result.new_error_count);
//! for error in topology.get_errors(&ErrorQuery::default())? {
//!     println!("{} on {}", error.rule_type, error.origin);
//! }
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod checks;
pub mod config;
pub mod dirty;
pub mod error;
pub mod errors;
pub mod feature;
pub mod graph;
pub mod keys;
pub mod rules;
pub mod spatial;
pub mod store;
pub mod topology;
pub mod validator;

pub use budget::{BuildOptions, CancellationToken};
pub use config::EngineConfig;
pub use dirty::{DirtyRegion, DirtyTracker};
pub use error::{Error, Result};
pub use errors::{ErrorKind, ErrorQuery, ErrorStore, ErrorSummary, TopologyError, Violation};
pub use feature::{AttributeValue, Attributes, Feature, FeatureDraft, FeatureInfo};
pub use graph::{Edge, EdgeEnd, Face, GraphElement, Node, TopologyGraph};
pub use keys::{EdgeId, ElementKind, ErrorKey, FaceId, NodeId, ObjectId, RuleId};
pub use rules::{RuleCatalog, RuleEndpoint, RuleType, TopologyDefinition, TopologyRule};
pub use store::{
    EditBatch, EditOp, EditOutcome, FeatureClassHandle, FeatureStorage, GeometryStore,
    SearchFilter,
};
pub use topology::{Topology, TopologyState};
pub use validator::{SkipReason, ValidationResult, ValidationWarning};
