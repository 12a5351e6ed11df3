// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule evaluation over a validated area.
//!
//! [`run_rules`] evaluates every rule of a catalog against one geometry
//! snapshot. Rules are independent, so with `parallel` set they are spread
//! over the rayon pool; results are gathered back in rule-id order either
//! way. Rules that cannot run are reported as [`ValidationWarning`]s instead
//! of failing the whole validation.

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;
use topo_lite_geometry::{Envelope, GeometryType};

use crate::checks::{evaluate, CheckContext};
use crate::errors::Violation;
use crate::keys::RuleId;
use crate::rules::{RuleCatalog, RuleEndpoint, RuleType, TopologyRule};
use crate::store::GeometryStore;

/// Outcome of [`Topology::validate`](crate::Topology::validate).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Union of the dirty pieces that were validated; empty when nothing
    /// inside the requested extent was dirty.
    pub affected_area: Envelope,
    pub new_error_count: usize,
    pub resolved_error_count: usize,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub(crate) fn empty() -> Self {
        Self {
            affected_area: Envelope::empty(),
            new_error_count: 0,
            resolved_error_count: 0,
            warnings: Vec::new(),
        }
    }
}

/// A rule that was skipped or failed during validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationWarning {
    pub rule: RuleId,
    pub rule_type: RuleType,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    /// A class the rule names is not in the geometry store.
    MissingClass(String),
    /// A class the rule names stores the wrong kind of shape.
    WrongGeometryType { class: String, found: GeometryType },
    /// The predicate itself returned an error.
    Failed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingClass(class) => write!(f, "feature class {class} does not exist"),
            SkipReason::WrongGeometryType { class, found } => {
                write!(f, "feature class {class} stores {found} shapes")
            }
            SkipReason::Failed(message) => write!(f, "evaluation failed: {message}"),
        }
    }
}

/// Violations and bookkeeping from one pass over the rules.
#[derive(Debug, Default)]
pub(crate) struct RuleRun {
    pub violations: Vec<Violation>,
    /// Rules that ran; only their previous errors inside the area may be
    /// resolved.
    pub evaluated: FxHashSet<RuleId>,
    pub warnings: Vec<ValidationWarning>,
}

/// Evaluates every rule of `catalog` over `area`.
pub(crate) fn run_rules(
    store: &GeometryStore,
    catalog: &RuleCatalog,
    area: &[Envelope],
    tolerance: f64,
    parallel: bool,
) -> RuleRun {
    let eval = |rule: &TopologyRule| -> Result<Vec<Violation>, SkipReason> {
        if let Some(reason) = preflight(store, rule) {
            return Err(reason);
        }
        let ctx = CheckContext {
            store,
            rule,
            area,
            tolerance,
        };
        evaluate(&ctx).map_err(|e| SkipReason::Failed(e.to_string()))
    };

    let outcomes: Vec<(&TopologyRule, Result<Vec<Violation>, SkipReason>)> = if parallel {
        catalog
            .rules()
            .par_iter()
            .map(|rule| (rule, eval(rule)))
            .collect()
    } else {
        catalog.rules().iter().map(|rule| (rule, eval(rule))).collect()
    };

    let mut run = RuleRun::default();
    for (rule, outcome) in outcomes {
        match outcome {
            Ok(violations) => {
                tracing::debug!(
                    rule = %rule.id,
                    rule_type = %rule.rule_type,
                    violations = violations.len(),
                    "Rule evaluated"
                );
                run.evaluated.insert(rule.id);
                run.violations.extend(violations);
            }
            Err(reason) => {
                tracing::warn!(
                    rule = %rule.id,
                    rule_type = %rule.rule_type,
                    reason = %reason,
                    "Skipping rule"
                );
                run.warnings.push(ValidationWarning {
                    rule: rule.id,
                    rule_type: rule.rule_type,
                    reason,
                });
            }
        }
    }
    run
}

/// Checks that the classes a rule names exist and hold the shapes it needs.
fn preflight(store: &GeometryStore, rule: &TopologyRule) -> Option<SkipReason> {
    let class_type = |endpoint: &RuleEndpoint| -> Result<GeometryType, SkipReason> {
        store
            .open_feature_class(&endpoint.class)
            .map(|handle| handle.geometry_type)
            .map_err(|_| SkipReason::MissingClass(endpoint.class.clone()))
    };

    let origin_type = match class_type(&rule.origin) {
        Ok(t) => t,
        Err(reason) => return Some(reason),
    };
    if !rule.rule_type.accepts_origin(origin_type) {
        return Some(SkipReason::WrongGeometryType {
            class: rule.origin.class.clone(),
            found: origin_type,
        });
    }

    if let (Some(destination), Some(expected)) =
        (&rule.destination, rule.rule_type.destination_type())
    {
        let found = match class_type(destination) {
            Ok(t) => t,
            Err(reason) => return Some(reason),
        };
        if found != expected {
            return Some(SkipReason::WrongGeometryType {
                class: destination.class.clone(),
                found,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::TopologyDefinition;
    use crate::store::EditBatch;
    use topo_lite_geometry::Geometry;

    fn store() -> GeometryStore {
        let mut store = GeometryStore::new(10.0);
        store
            .create_feature_class("Parcels", GeometryType::Polygon)
            .unwrap();
        store
            .create_feature_class("Hydrants", GeometryType::Point)
            .unwrap();
        store
            .apply_edits(
                EditBatch::new()
                    .insert(
                        "Parcels",
                        Geometry::polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
                    )
                    .insert(
                        "Parcels",
                        Geometry::polygon(&[(5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0)]),
                    )
                    .insert("Hydrants", Geometry::point(2.0, 2.0))
                    .insert("Hydrants", Geometry::point(20.0, 20.0)),
            )
            .unwrap();
        store
    }

    fn catalog() -> RuleCatalog {
        let def = TopologyDefinition::new("city")
            .with_rule(RuleType::MustNotOverlap, RuleEndpoint::new("Parcels"), None)
            .with_rule(
                RuleType::PointProperlyInsideArea,
                RuleEndpoint::new("Hydrants"),
                Some(RuleEndpoint::new("Parcels")),
            )
            .with_rule(
                RuleType::MustNotHaveDangles,
                RuleEndpoint::new("Roads"),
                None,
            )
            .with_rule(
                RuleType::MustNotIntersect,
                RuleEndpoint::new("Parcels"),
                None,
            );
        RuleCatalog::load(&def).unwrap()
    }

    fn area() -> Vec<Envelope> {
        vec![Envelope::new(-100.0, -100.0, 100.0, 100.0)]
    }

    #[test]
    fn violations_come_from_runnable_rules() {
        let run = run_rules(&store(), &catalog(), &area(), 0.001, false);
        let mut types: Vec<RuleType> = run.violations.iter().map(|v| v.rule_type).collect();
        types.sort();
        assert_eq!(
            types,
            vec![RuleType::MustNotOverlap, RuleType::PointProperlyInsideArea]
        );
    }

    #[test]
    fn unrunnable_rules_become_warnings() {
        let run = run_rules(&store(), &catalog(), &area(), 0.001, false);
        assert_eq!(run.warnings.len(), 2);
        assert_eq!(
            run.warnings[0].reason,
            SkipReason::MissingClass("Roads".into())
        );
        assert_eq!(
            run.warnings[1].reason,
            SkipReason::WrongGeometryType {
                class: "Parcels".into(),
                found: GeometryType::Polygon,
            }
        );
        assert_eq!(run.evaluated.len(), 2);
        assert!(!run.evaluated.contains(&RuleId(3)));
    }

    #[test]
    fn parallel_matches_sequential() {
        let store = store();
        let catalog = catalog();
        let sequential = run_rules(&store, &catalog, &area(), 0.001, false);
        let parallel = run_rules(&store, &catalog, &area(), 0.001, true);
        assert_eq!(sequential.violations, parallel.violations);
        assert_eq!(sequential.warnings, parallel.warnings);
    }

    #[test]
    fn area_limits_candidates() {
        let far = vec![Envelope::new(50.0, 50.0, 60.0, 60.0)];
        let run = run_rules(&store(), &catalog(), &far, 0.001, false);
        assert!(run.violations.is_empty());
    }
}
