// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use topo_lite_geometry::{Envelope, Geometry, GeometryType};
use topo_lite_topology::{
    EngineConfig, RuleEndpoint, RuleType, Topology, TopologyDefinition,
};

/// Installs a test subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn everywhere() -> Envelope {
    Envelope::new(-1000.0, -1000.0, 1000.0, 1000.0)
}

pub fn square(x: f64, y: f64, size: f64) -> Geometry {
    Geometry::polygon(&[(x, y), (x + size, y), (x + size, y + size), (x, y + size)])
}

/// Hydrants must lie inside parcels; parcels must not overlap.
pub fn city() -> Topology {
    init_tracing();
    let definition = TopologyDefinition::new("city")
        .with_rule(
            RuleType::PointProperlyInsideArea,
            RuleEndpoint::new("Hydrants"),
            Some(RuleEndpoint::new("Parcels")),
        )
        .with_rule(RuleType::MustNotOverlap, RuleEndpoint::new("Parcels"), None);
    let topology = Topology::new(EngineConfig::default(), &definition).unwrap();
    topology
        .create_feature_class("Hydrants", GeometryType::Point)
        .unwrap();
    topology
        .create_feature_class("Parcels", GeometryType::Polygon)
        .unwrap();
    topology
}
