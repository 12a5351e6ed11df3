// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The topology context object.
//!
//! A [`Topology`] owns one geometry store, one rule catalog, the dirty-region
//! tracker and the error store, and sequences every operation against them.
//! Geometry and rules are held as `Arc` snapshots behind `RwLock`s: writers
//! clone on write, so validation and graph builds work on an immutable
//! snapshot taken when they start while edits keep committing. Validations
//! are serialized by their own mutex.
//!
//! Lock order, where more than one is held: `validating`, `geometry`,
//! `rules`, `errors`, `dirty`, `state`.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use topo_lite_geometry::{Envelope, GeometryType};

use crate::budget::{Budget, BuildOptions};
use crate::config::EngineConfig;
use crate::dirty::{DirtyRegion, DirtyTracker};
use crate::error::{Error, Result};
use crate::errors::{ErrorQuery, ErrorStore, ErrorSummary, TopologyError};
use crate::feature::Feature;
use crate::graph::{builder, TopologyGraph};
use crate::keys::ObjectId;
use crate::rules::{RuleCatalog, TopologyDefinition};
use crate::store::{EditBatch, EditOutcome, FeatureClassHandle, GeometryStore, SearchFilter};
use crate::validator::{run_rules, ValidationResult};

/// Validation status of a topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyState {
    /// Edited since the last validation, or never validated.
    #[default]
    Unanalyzed,
    /// Fully validated; at least one error that is not an exception remains.
    AnalyzedWithErrors,
    /// Fully validated; no errors apart from exceptions.
    AnalyzedClean,
}

/// A validated planar topology over a set of feature classes.
#[derive(Debug)]
pub struct Topology {
    config: EngineConfig,
    tolerance: f64,
    geometry: RwLock<Arc<GeometryStore>>,
    rules: RwLock<Arc<RuleCatalog>>,
    errors: RwLock<ErrorStore>,
    dirty: Mutex<DirtyTracker>,
    state: Mutex<TopologyState>,
    validating: Mutex<()>,
}

impl Topology {
    /// Creates an empty topology. The definition's cluster tolerance, when
    /// set, overrides the configured one.
    pub fn new(config: EngineConfig, definition: &TopologyDefinition) -> Result<Self> {
        let catalog = RuleCatalog::load(definition)?;
        let tolerance = catalog
            .cluster_tolerance()
            .unwrap_or(config.cluster_tolerance);
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(Error::InvalidTolerance(tolerance));
        }

        tracing::info!(
            name = catalog.name(),
            rules = catalog.len(),
            tolerance,
            "Created topology"
        );

        Ok(Self {
            geometry: RwLock::new(Arc::new(GeometryStore::new(config.index_cell_size))),
            rules: RwLock::new(Arc::new(catalog)),
            errors: RwLock::new(ErrorStore::new(tolerance)),
            dirty: Mutex::new(DirtyTracker::new(config.max_dirty_regions)),
            state: Mutex::new(TopologyState::Unanalyzed),
            validating: Mutex::new(()),
            tolerance,
            config,
        })
    }

    /// Creates a topology from a JSON topology definition.
    pub fn from_json(config: EngineConfig, json: &str) -> Result<Self> {
        Self::new(config, &TopologyDefinition::from_json(json)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Distance within which coordinates are treated as one point.
    pub fn cluster_tolerance(&self) -> f64 {
        self.tolerance
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Immutable snapshot of the geometry store.
    pub fn geometry(&self) -> Result<Arc<GeometryStore>> {
        Ok(Arc::clone(&*read(&self.geometry, "geometry")?))
    }

    pub fn create_feature_class(
        &self,
        name: impl Into<String>,
        geometry_type: GeometryType,
    ) -> Result<()> {
        let name = name.into();
        {
            let mut geometry = write(&self.geometry, "geometry")?;
            Arc::make_mut(&mut *geometry).create_feature_class(name.clone(), geometry_type)?;
        }
        tracing::debug!(class = %name, %geometry_type, "Created feature class");
        Ok(())
    }

    /// Removes a feature class with its features. Errors that reference the
    /// class are dropped and the area it covered becomes dirty.
    pub fn drop_feature_class(&self, name: &str) -> Result<()> {
        let extent = {
            let mut geometry = write(&self.geometry, "geometry")?;
            Arc::make_mut(&mut *geometry).drop_feature_class(name)?
        };
        let dropped = write(&self.errors, "errors")?.remove_class(name);
        self.mark_dirty(std::iter::once(extent))?;

        tracing::debug!(class = name, dropped_errors = dropped, "Dropped feature class");
        Ok(())
    }

    pub fn open_feature_class(&self, name: &str) -> Result<FeatureClassHandle> {
        read(&self.geometry, "geometry")?.open_feature_class(name)
    }

    pub fn get(&self, class: &str, object_id: ObjectId) -> Result<Feature> {
        read(&self.geometry, "geometry")?
            .get(class, object_id)
            .cloned()
    }

    /// Features of `class` matching `filter`, ordered by object id.
    pub fn search(&self, class: &str, filter: &SearchFilter) -> Result<Vec<Feature>> {
        let geometry = read(&self.geometry, "geometry")?;
        let found = geometry.search(class, filter)?.cloned().collect();
        Ok(found)
    }

    /// Commits a batch atomically and marks the old and new extent of every
    /// touched feature dirty.
    ///
    /// Edits never wait for a running validation: it keeps its snapshot, and
    /// the regions marked here are newer than anything it clears.
    pub fn apply_edits(&self, batch: EditBatch) -> Result<EditOutcome> {
        if batch.is_empty() {
            return Ok(EditOutcome::default());
        }
        let ops = batch.len();
        let outcome = {
            let mut geometry = write(&self.geometry, "geometry")?;
            Arc::make_mut(&mut *geometry).apply_edits(batch)?
        };
        self.mark_dirty(outcome.touched.iter().copied())?;

        tracing::debug!(
            ops,
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            "Committed edit batch"
        );
        Ok(outcome)
    }

    /// Marks envelopes dirty, grown by the cluster tolerance so features
    /// that merely touch an edited one are revalidated too.
    fn mark_dirty(&self, envelopes: impl IntoIterator<Item = Envelope>) -> Result<()> {
        let mut dirty = lock(&self.dirty, "dirty")?;
        for env in envelopes {
            if !env.is_empty() {
                dirty.mark_dirty(env.expanded_by(self.tolerance));
            }
        }
        // Written under `dirty`; a refresh never sees the mark without it.
        *lock(&self.state, "state")? = TopologyState::Unanalyzed;
        Ok(())
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Immutable snapshot of the rule catalog.
    pub fn rules(&self) -> Result<Arc<RuleCatalog>> {
        Ok(Arc::clone(&*read(&self.rules, "rules")?))
    }

    /// Replaces the rule catalog.
    ///
    /// Errors of rules that were removed or changed are dropped, and the
    /// extent of every participating class is marked dirty. The cluster
    /// tolerance is fixed when the topology is created; a different one in
    /// `definition` is ignored.
    pub fn reload_rules(&self, definition: &TopologyDefinition) -> Result<()> {
        let catalog = RuleCatalog::load(definition)?;
        if catalog
            .cluster_tolerance()
            .is_some_and(|t| t != self.tolerance)
        {
            tracing::warn!(
                requested = ?catalog.cluster_tolerance(),
                kept = self.tolerance,
                "Cluster tolerance cannot change on reload"
            );
        }

        let geometry = self.geometry()?;
        let extents: Vec<Envelope> = catalog
            .participating_classes()
            .into_iter()
            .filter_map(|class| geometry.open_feature_class(class).ok())
            .map(|handle| handle.extent)
            .collect();

        let old = {
            let mut rules = write(&self.rules, "rules")?;
            std::mem::replace(&mut *rules, Arc::new(catalog))
        };
        let current = self.rules()?;
        let dropped = write(&self.errors, "errors")?
            .retain_rules(|id| matches!((old.rule(id), current.rule(id)), (Some(a), Some(b)) if a == b));
        self.mark_dirty(extents)?;

        tracing::info!(
            rules = current.len(),
            dropped_errors = dropped,
            "Reloaded rules"
        );
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Revalidates the dirty part of `extent`.
    ///
    /// Returns immediately with an empty affected area when nothing inside
    /// `extent` is dirty. Rules that cannot run are reported in
    /// [`ValidationResult::warnings`]; they do not fail the call.
    pub fn validate(&self, extent: Envelope) -> Result<ValidationResult> {
        if !extent.is_valid() {
            return Err(Error::InvalidExtent(format!("{extent:?}")));
        }
        let _validating = lock(&self.validating, "validating")?;

        let (area, generation) = {
            let dirty = lock(&self.dirty, "dirty")?;
            (dirty.dirty_within(&extent), dirty.generation())
        };
        if area.is_empty() {
            tracing::debug!(?extent, "Nothing dirty in extent");
            self.refresh_state()?;
            return Ok(ValidationResult::empty());
        }

        let geometry = self.geometry()?;
        let catalog = self.rules()?;
        let affected_area = area
            .iter()
            .fold(Envelope::empty(), |acc, piece| acc.union(piece));

        tracing::info!(
            ?affected_area,
            pieces = area.len(),
            rules = catalog.len(),
            "Starting validation"
        );

        let run = run_rules(
            &geometry,
            &catalog,
            &area,
            self.tolerance,
            self.config.parallel_validation,
        );
        let counts = write(&self.errors, "errors")?.reconcile(&run.evaluated, &area, run.violations);
        lock(&self.dirty, "dirty")?.clear_within(&extent, generation);
        let state = self.refresh_state()?;

        tracing::info!(
            new_errors = counts.inserted,
            resolved_errors = counts.resolved,
            warnings = run.warnings.len(),
            ?state,
            "Validation complete"
        );

        Ok(ValidationResult {
            affected_area,
            new_error_count: counts.inserted,
            resolved_error_count: counts.resolved,
            warnings: run.warnings,
        })
    }

    /// Validates everything that is dirty.
    pub fn validate_all(&self) -> Result<ValidationResult> {
        let extent = lock(&self.dirty, "dirty")?.extent();
        if extent.is_empty() {
            self.refresh_state()?;
            return Ok(ValidationResult::empty());
        }
        self.validate(extent)
    }

    /// Recomputes the state: any dirty region left means `Unanalyzed`.
    fn refresh_state(&self) -> Result<TopologyState> {
        let has_errors = read(&self.errors, "errors")?.has_errors();
        let dirty = lock(&self.dirty, "dirty")?;
        let next = match (dirty.is_empty(), has_errors) {
            (false, _) => TopologyState::Unanalyzed,
            (true, true) => TopologyState::AnalyzedWithErrors,
            (true, false) => TopologyState::AnalyzedClean,
        };
        *lock(&self.state, "state")? = next;
        Ok(next)
    }

    pub fn state(&self) -> Result<TopologyState> {
        Ok(*lock(&self.state, "state")?)
    }

    /// Current dirty regions.
    pub fn dirty_regions(&self) -> Result<Vec<DirtyRegion>> {
        Ok(lock(&self.dirty, "dirty")?.regions().to_vec())
    }

    // =========================================================================
    // Errors and exceptions
    // =========================================================================

    /// Copies of the stored errors matching `query`.
    pub fn get_errors(&self, query: &ErrorQuery) -> Result<Vec<TopologyError>> {
        Ok(read(&self.errors, "errors")?.query(query))
    }

    /// Flags an error as an accepted exception. Returns whether the flag
    /// changed; fails with [`Error::ErrorNotFound`] once the error is gone.
    pub fn mark_as_exception(&self, error: &TopologyError) -> Result<bool> {
        let changed = write(&self.errors, "errors")?.mark_exception(error.key)?;
        if changed {
            self.update_state_after_marking()?;
        }
        Ok(changed)
    }

    /// Turns an exception back into an error.
    pub fn unmark_as_exception(&self, error: &TopologyError) -> Result<bool> {
        let changed = write(&self.errors, "errors")?.unmark_exception(error.key)?;
        if changed {
            self.update_state_after_marking()?;
        }
        Ok(changed)
    }

    /// Marking only moves between the analyzed states.
    fn update_state_after_marking(&self) -> Result<()> {
        if self.state()? != TopologyState::Unanalyzed {
            self.refresh_state()?;
        }
        Ok(())
    }

    pub fn error_summary(&self) -> Result<Vec<ErrorSummary>> {
        Ok(read(&self.errors, "errors")?.summary())
    }

    /// All errors and exceptions as JSON.
    pub fn errors_to_json(&self) -> Result<String> {
        read(&self.errors, "errors")?.to_json()
    }

    // =========================================================================
    // Graph
    // =========================================================================

    /// Builds the planar graph over `extent` and lends it to `f`.
    ///
    /// The graph is built from a geometry snapshot, so it never blocks or
    /// waits for validation, and it is dropped when `f` returns.
    pub fn build_graph<R>(&self, extent: Envelope, f: impl FnOnce(&TopologyGraph) -> R) -> Result<R> {
        self.build_graph_with(extent, &BuildOptions::default(), f)
    }

    /// [`Topology::build_graph`] with a cancellation token, deadline or
    /// feature limit.
    pub fn build_graph_with<R>(
        &self,
        extent: Envelope,
        options: &BuildOptions,
        f: impl FnOnce(&TopologyGraph) -> R,
    ) -> Result<R> {
        if !extent.is_valid() {
            return Err(Error::InvalidExtent(format!("{extent:?}")));
        }
        let geometry = self.geometry()?;
        let catalog = self.rules()?;
        let classes = catalog.participating_classes();

        let mut budget = Budget::start(extent, options, &self.config);
        let graph = builder::build_graph(
            &geometry,
            &classes,
            extent,
            self.tolerance,
            self.config.index_cell_size,
            &mut budget,
        )
        .map_err(|e| {
            if e.is_recoverable() {
                tracing::warn!(?extent, error = %e, "Graph build aborted");
            }
            e
        })?;

        tracing::info!(
            ?extent,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            faces = graph.face_count(),
            "Built topology graph"
        );
        Ok(f(&graph))
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| Error::LockPoisoned(name))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| Error::LockPoisoned(name))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned(name))
}
