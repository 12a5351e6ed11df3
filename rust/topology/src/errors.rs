// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology errors and exceptions.
//!
//! Errors live in a generational slot map so a handle to an error that a later
//! validation removed is reported as stale instead of resolving to a
//! different entry. A second index keyed by violation identity lets a
//! validation pass recognise errors it has already recorded.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use topo_lite_geometry::{Envelope, Geometry};

use crate::error::{Error, Result};
use crate::feature::FeatureInfo;
use crate::keys::{ErrorKey, RuleId};
use crate::rules::RuleType;

/// A rule violation found by a predicate, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule_id: RuleId,
    pub rule_type: RuleType,
    pub origin: FeatureInfo,
    pub destination: Option<FeatureInfo>,
    pub shape: Geometry,
}

/// Identity used to match recomputed violations against stored errors.
///
/// The shape is reduced to its envelope's lower corner snapped to a grid of
/// the cluster tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViolationId {
    rule_id: RuleId,
    origin: FeatureInfo,
    destination: Option<FeatureInfo>,
    anchor: (i64, i64),
}

impl ViolationId {
    fn new(
        rule_id: RuleId,
        origin: &FeatureInfo,
        destination: Option<&FeatureInfo>,
        shape: &Geometry,
        tolerance: f64,
    ) -> Self {
        let env = shape.envelope();
        let q = |v: f64| (v / tolerance).round() as i64;
        Self {
            rule_id,
            origin: origin.clone(),
            destination: destination.cloned(),
            anchor: (q(env.min.x), q(env.min.y)),
        }
    }
}

impl Violation {
    pub fn identity(&self, tolerance: f64) -> ViolationId {
        ViolationId::new(
            self.rule_id,
            &self.origin,
            self.destination.as_ref(),
            &self.shape,
            tolerance,
        )
    }
}

/// A stored topology error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyError {
    pub key: ErrorKey,
    pub rule_id: RuleId,
    pub rule_type: RuleType,
    pub origin: FeatureInfo,
    pub destination: Option<FeatureInfo>,
    pub shape: Geometry,
    pub is_exception: bool,
}

impl TopologyError {
    fn identity(&self, tolerance: f64) -> ViolationId {
        ViolationId::new(
            self.rule_id,
            &self.origin,
            self.destination.as_ref(),
            &self.shape,
            tolerance,
        )
    }
}

/// Which entries an error query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ErrorsOnly,
    ExceptionsOnly,
    #[default]
    Both,
}

impl ErrorKind {
    fn admits(self, is_exception: bool) -> bool {
        match self {
            ErrorKind::ErrorsOnly => !is_exception,
            ErrorKind::ExceptionsOnly => is_exception,
            ErrorKind::Both => true,
        }
    }
}

/// Filter for [`ErrorStore::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorQuery {
    pub extent: Option<Envelope>,
    pub rule: Option<RuleId>,
    pub rule_type: Option<RuleType>,
    pub kind: ErrorKind,
}

impl ErrorQuery {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn within(mut self, extent: Envelope) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn for_rule(mut self, rule: RuleId) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn of_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = Some(rule_type);
        self
    }

    fn matches(&self, error: &TopologyError) -> bool {
        self.kind.admits(error.is_exception)
            && self.rule.map_or(true, |r| r == error.rule_id)
            && self.rule_type.map_or(true, |t| t == error.rule_type)
            && self
                .extent
                .map_or(true, |e| e.intersects(&error.shape.envelope()))
    }
}

/// Error and exception counts of one rule type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub rule_type: RuleType,
    pub errors: usize,
    pub exceptions: usize,
}

/// Counts produced by [`ErrorStore::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone)]
pub struct ErrorStore {
    tolerance: f64,
    errors: SlotMap<ErrorKey, TopologyError>,
    by_identity: FxHashMap<ViolationId, ErrorKey>,
}

impl ErrorStore {
    /// Creates an empty store; `tolerance` sets the identity grid.
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            errors: SlotMap::with_key(),
            by_identity: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, key: ErrorKey) -> Option<&TopologyError> {
        self.errors.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopologyError> {
        self.errors.values()
    }

    /// `true` if any entry is not an exception.
    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|e| !e.is_exception)
    }

    /// Stores a violation unless an entry with the same identity exists.
    /// Returns the key of the new or existing entry and whether it was new.
    pub fn insert(&mut self, violation: Violation) -> (ErrorKey, bool) {
        let id = violation.identity(self.tolerance);
        if let Some(&key) = self.by_identity.get(&id) {
            return (key, false);
        }
        let key = self.errors.insert_with_key(|key| TopologyError {
            key,
            rule_id: violation.rule_id,
            rule_type: violation.rule_type,
            origin: violation.origin,
            destination: violation.destination,
            shape: violation.shape,
            is_exception: false,
        });
        self.by_identity.insert(id, key);
        (key, true)
    }

    pub fn remove(&mut self, key: ErrorKey) -> Option<TopologyError> {
        let error = self.errors.remove(key)?;
        self.by_identity.remove(&error.identity(self.tolerance));
        Some(error)
    }

    /// Matching entries ordered by rule id, origin and destination.
    pub fn query(&self, query: &ErrorQuery) -> Vec<TopologyError> {
        let mut hits: Vec<(ViolationId, &TopologyError)> = self
            .errors
            .values()
            .filter(|e| query.matches(e))
            .map(|e| (e.identity(self.tolerance), e))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.into_iter().map(|(_, e)| e.clone()).collect()
    }

    /// Flags an error as exception. Returns whether the flag changed.
    pub fn mark_exception(&mut self, key: ErrorKey) -> Result<bool> {
        self.set_exception(key, true)
    }

    /// Clears the exception flag. Returns whether the flag changed.
    pub fn unmark_exception(&mut self, key: ErrorKey) -> Result<bool> {
        self.set_exception(key, false)
    }

    fn set_exception(&mut self, key: ErrorKey, value: bool) -> Result<bool> {
        let error = self.errors.get_mut(key).ok_or(Error::ErrorNotFound(key))?;
        let changed = error.is_exception != value;
        error.is_exception = value;
        Ok(changed)
    }

    /// Merges freshly computed violations of `rules` over `area`.
    ///
    /// Non-exception errors of those rules touching `area` that were not
    /// reproduced are removed; reproduced ones are kept as they are; new ones
    /// are inserted. Exceptions are never removed, and a violation matching
    /// an exception is not inserted again.
    pub fn reconcile(
        &mut self,
        rules: &FxHashSet<RuleId>,
        area: &[Envelope],
        violations: Vec<Violation>,
    ) -> ReconcileCounts {
        let touches = |env: &Envelope| area.iter().any(|a| a.intersects(env));

        let found: FxHashSet<ViolationId> = violations
            .iter()
            .map(|v| v.identity(self.tolerance))
            .collect();

        let stale: Vec<ErrorKey> = self
            .errors
            .iter()
            .filter(|(_, e)| {
                !e.is_exception
                    && rules.contains(&e.rule_id)
                    && touches(&e.shape.envelope())
                    && !found.contains(&e.identity(self.tolerance))
            })
            .map(|(k, _)| k)
            .collect();

        let mut counts = ReconcileCounts::default();
        for key in stale {
            if self.remove(key).is_some() {
                counts.resolved += 1;
            }
        }
        for violation in violations {
            if self.insert(violation).1 {
                counts.inserted += 1;
            }
        }
        counts
    }

    /// Drops every entry whose rule is not kept.
    pub fn retain_rules(&mut self, keep: impl Fn(RuleId) -> bool) -> usize {
        let dropped: Vec<ErrorKey> = self
            .errors
            .iter()
            .filter(|(_, e)| !keep(e.rule_id))
            .map(|(k, _)| k)
            .collect();
        for key in &dropped {
            self.remove(*key);
        }
        dropped.len()
    }

    /// Drops every entry, exceptions included, whose origin or destination
    /// belongs to `class`.
    pub fn remove_class(&mut self, class: &str) -> usize {
        let dropped: Vec<ErrorKey> = self
            .errors
            .iter()
            .filter(|(_, e)| {
                e.origin.class == class
                    || e.destination.as_ref().is_some_and(|d| d.class == class)
            })
            .map(|(k, _)| k)
            .collect();
        for key in &dropped {
            self.remove(*key);
        }
        dropped.len()
    }

    /// Per rule type counts, ordered by rule type.
    pub fn summary(&self) -> Vec<ErrorSummary> {
        let mut counts: FxHashMap<RuleType, ErrorSummary> = FxHashMap::default();
        for error in self.errors.values() {
            let entry = counts.entry(error.rule_type).or_insert(ErrorSummary {
                rule_type: error.rule_type,
                errors: 0,
                exceptions: 0,
            });
            if error.is_exception {
                entry.exceptions += 1;
            } else {
                entry.errors += 1;
            }
        }
        let mut summary: Vec<ErrorSummary> = counts.into_values().collect();
        summary.sort_by_key(|s| s.rule_type);
        summary
    }

    /// All entries as a JSON array, in query order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.query(&ErrorQuery::default()))?)
    }
}
