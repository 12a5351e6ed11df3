// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology rules and the catalog that holds them.
//!
//! A [`TopologyDefinition`] is the serializable description of a topology
//! (name, optional cluster tolerance, rules). Loading it into a
//! [`RuleCatalog`] checks every rule against the shape requirements of its
//! [`RuleType`]; a single malformed rule rejects the whole definition.

use serde::{Deserialize, Serialize};
use topo_lite_geometry::GeometryType;

use crate::error::{Error, Result};
use crate::keys::RuleId;

/// The closed set of supported rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleType {
    /// Lines shorter and polygons smaller than the cluster tolerance.
    MustBeLargerThanClusterTolerance,
    /// Polygons of one class must not overlap each other.
    MustNotOverlap,
    /// Polygons of the origin class must not overlap polygons of the
    /// destination class.
    MustNotOverlapWith,
    /// Points must lie strictly inside a destination polygon.
    PointProperlyInsideArea,
    /// Points must lie on a destination line.
    PointMustBeCoveredByLine,
    /// Line ends must touch another line (or the line itself).
    MustNotHaveDangles,
    /// Lines of one class must not cross or overlap each other.
    MustNotIntersect,
    /// A line must not cross or overlap itself.
    MustNotSelfIntersect,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::MustBeLargerThanClusterTolerance => "MustBeLargerThanClusterTolerance",
            RuleType::MustNotOverlap => "MustNotOverlap",
            RuleType::MustNotOverlapWith => "MustNotOverlapWith",
            RuleType::PointProperlyInsideArea => "PointProperlyInsideArea",
            RuleType::PointMustBeCoveredByLine => "PointMustBeCoveredByLine",
            RuleType::MustNotHaveDangles => "MustNotHaveDangles",
            RuleType::MustNotIntersect => "MustNotIntersect",
            RuleType::MustNotSelfIntersect => "MustNotSelfIntersect",
        }
    }

    /// Whether the origin class may hold shapes of this type.
    pub fn accepts_origin(&self, geometry_type: GeometryType) -> bool {
        match self {
            RuleType::MustBeLargerThanClusterTolerance => {
                matches!(geometry_type, GeometryType::Polyline | GeometryType::Polygon)
            }
            RuleType::MustNotOverlap | RuleType::MustNotOverlapWith => {
                geometry_type == GeometryType::Polygon
            }
            RuleType::PointProperlyInsideArea | RuleType::PointMustBeCoveredByLine => {
                geometry_type == GeometryType::Point
            }
            RuleType::MustNotHaveDangles
            | RuleType::MustNotIntersect
            | RuleType::MustNotSelfIntersect => geometry_type == GeometryType::Polyline,
        }
    }

    /// Shape type the destination class must hold, or `None` for rules that
    /// only involve the origin class.
    pub fn destination_type(&self) -> Option<GeometryType> {
        match self {
            RuleType::MustNotOverlapWith | RuleType::PointProperlyInsideArea => {
                Some(GeometryType::Polygon)
            }
            RuleType::PointMustBeCoveredByLine => Some(GeometryType::Polyline),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature class, optionally narrowed to one subtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleEndpoint {
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<i32>,
}

impl RuleEndpoint {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: i32) -> Self {
        self.subtype = Some(subtype);
        self
    }

    /// Whether a feature of `class` with `subtype` falls under this endpoint.
    pub fn matches(&self, class: &str, subtype: Option<i32>) -> bool {
        self.class == class && self.subtype.map_or(true, |s| subtype == Some(s))
    }
}

/// A loaded, immutable rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopologyRule {
    pub id: RuleId,
    pub rule_type: RuleType,
    pub origin: RuleEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RuleEndpoint>,
}

impl TopologyRule {
    /// Feature classes the rule reads, origin first.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.origin.class.as_str())
            .chain(self.destination.iter().map(|d| d.class.as_str()))
    }

    pub fn involves(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

/// Serializable topology description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_tolerance: Option<f64>,
    #[serde(default)]
    pub rules: Vec<TopologyRule>,
}

impl TopologyDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster_tolerance: None,
            rules: Vec::new(),
        }
    }

    pub fn with_cluster_tolerance(mut self, tolerance: f64) -> Self {
        self.cluster_tolerance = Some(tolerance);
        self
    }

    /// Appends a rule; ids are assigned sequentially from 1.
    pub fn with_rule(
        mut self,
        rule_type: RuleType,
        origin: RuleEndpoint,
        destination: Option<RuleEndpoint>,
    ) -> Self {
        let id = RuleId(self.rules.len() as u32 + 1);
        self.rules.push(TopologyRule {
            id,
            rule_type,
            origin,
            destination,
        });
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The validated set of rules of one topology.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCatalog {
    name: String,
    cluster_tolerance: Option<f64>,
    rules: Vec<TopologyRule>,
}

impl RuleCatalog {
    /// Checks every rule and builds the catalog; nothing is loaded if any
    /// rule is malformed.
    pub fn load(definition: &TopologyDefinition) -> Result<Self> {
        if let Some(tol) = definition.cluster_tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(Error::InvalidTolerance(tol));
            }
        }

        let mut rules = definition.rules.clone();
        rules.sort_by_key(|r| r.id);
        for pair in rules.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(Error::DuplicateRule(pair[0].id));
            }
        }
        for rule in &rules {
            check_rule(rule)?;
        }

        Ok(Self {
            name: definition.name.clone(),
            cluster_tolerance: definition.cluster_tolerance,
            rules,
        })
    }

    /// Parses a JSON [`TopologyDefinition`] and loads it.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::load(&TopologyDefinition::from_json(json)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_tolerance(&self) -> Option<f64> {
        self.cluster_tolerance
    }

    /// All rules ordered by id.
    pub fn rules(&self) -> &[TopologyRule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&TopologyRule> {
        self.rules
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.rules[i])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that read `class` as origin or destination. Lazy; call again to
    /// restart.
    pub fn rules_for_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a TopologyRule> {
        self.rules.iter().filter(move |r| r.involves(class))
    }

    /// Sorted, de-duplicated names of every class any rule reads.
    pub fn participating_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.rules.iter().flat_map(|r| r.classes()).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Back to a serializable definition.
    pub fn to_definition(&self) -> TopologyDefinition {
        TopologyDefinition {
            name: self.name.clone(),
            cluster_tolerance: self.cluster_tolerance,
            rules: self.rules.clone(),
        }
    }
}

fn check_rule(rule: &TopologyRule) -> Result<()> {
    let malformed = |reason: String| Error::MalformedRule {
        rule: rule.id,
        reason,
    };

    if rule.origin.class.trim().is_empty() {
        return Err(malformed("origin class name is empty".into()));
    }

    match (rule.rule_type.destination_type(), &rule.destination) {
        (Some(_), None) => Err(malformed(format!(
            "{} needs a destination class",
            rule.rule_type
        ))),
        (None, Some(dest)) => Err(malformed(format!(
            "{} takes no destination, got {}",
            rule.rule_type, dest.class
        ))),
        (Some(_), Some(dest)) if dest.class.trim().is_empty() => {
            Err(malformed("destination class name is empty".into()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> TopologyDefinition {
        TopologyDefinition::new("Cadastre")
            .with_rule(RuleType::MustNotOverlap, RuleEndpoint::new("Parcels"), None)
            .with_rule(
                RuleType::PointProperlyInsideArea,
                RuleEndpoint::new("Hydrants"),
                Some(RuleEndpoint::new("Parcels").with_subtype(2)),
            )
            .with_rule(RuleType::MustNotHaveDangles, RuleEndpoint::new("Roads"), None)
    }

    #[test]
    fn load_orders_rules_and_lists_classes() {
        let catalog = RuleCatalog::load(&definition()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.participating_classes(), vec!["Hydrants", "Parcels", "Roads"]);
        assert_eq!(
            catalog.rule(RuleId(2)).map(|r| r.rule_type),
            Some(RuleType::PointProperlyInsideArea)
        );
    }

    #[test]
    fn rules_for_class_is_restartable() {
        let catalog = RuleCatalog::load(&definition()).unwrap();
        let first: Vec<RuleId> = catalog.rules_for_class("Parcels").map(|r| r.id).collect();
        let second: Vec<RuleId> = catalog.rules_for_class("Parcels").map(|r| r.id).collect();
        assert_eq!(first, vec![RuleId(1), RuleId(2)]);
        assert_eq!(first, second);
        assert_eq!(catalog.rules_for_class("Lakes").count(), 0);
    }

    #[test]
    fn missing_destination_is_malformed() {
        let def = TopologyDefinition::new("Bad").with_rule(
            RuleType::PointProperlyInsideArea,
            RuleEndpoint::new("Hydrants"),
            None,
        );
        assert!(matches!(
            RuleCatalog::load(&def),
            Err(Error::MalformedRule { rule: RuleId(1), .. })
        ));
    }

    #[test]
    fn unexpected_destination_is_malformed() {
        let def = TopologyDefinition::new("Bad").with_rule(
            RuleType::MustNotOverlap,
            RuleEndpoint::new("Parcels"),
            Some(RuleEndpoint::new("Lakes")),
        );
        assert!(matches!(RuleCatalog::load(&def), Err(Error::MalformedRule { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut def = definition();
        def.rules[2].id = RuleId(1);
        assert!(matches!(RuleCatalog::load(&def), Err(Error::DuplicateRule(RuleId(1)))));
    }

    #[test]
    fn bad_tolerance_is_rejected() {
        let def = definition().with_cluster_tolerance(-1.0);
        assert!(matches!(RuleCatalog::load(&def), Err(Error::InvalidTolerance(_))));
    }

    #[test]
    fn loads_from_json() {
        let json = r#"{
            "name": "Network",
            "cluster_tolerance": 0.01,
            "rules": [
                { "id": 7, "rule_type": "MustNotIntersect", "origin": { "class": "Pipes" } },
                {
                    "id": 3,
                    "rule_type": "PointMustBeCoveredByLine",
                    "origin": { "class": "Valves", "subtype": 1 },
                    "destination": { "class": "Pipes" }
                }
            ]
        }"#;
        let catalog = RuleCatalog::from_json(json).unwrap();
        assert_eq!(catalog.cluster_tolerance(), Some(0.01));
        let ids: Vec<RuleId> = catalog.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RuleId(3), RuleId(7)]);
        assert_eq!(catalog.rule(RuleId(3)).unwrap().origin.subtype, Some(1));

        let round_trip = RuleCatalog::load(
            &TopologyDefinition::from_json(&catalog.to_definition().to_json().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(round_trip, catalog);
    }

    #[test]
    fn invalid_json_is_a_serialization_error() {
        assert!(matches!(
            RuleCatalog::from_json("{ not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn endpoint_subtype_matching() {
        let any = RuleEndpoint::new("Parcels");
        let narrowed = RuleEndpoint::new("Parcels").with_subtype(2);
        assert!(any.matches("Parcels", None));
        assert!(any.matches("Parcels", Some(5)));
        assert!(narrowed.matches("Parcels", Some(2)));
        assert!(!narrowed.matches("Parcels", None));
        assert!(!narrowed.matches("Lakes", Some(2)));
    }
}
