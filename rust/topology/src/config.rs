// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration, with optional overrides from environment variables.

use std::time::Duration;

/// Default distance within which coordinates snap together.
pub const DEFAULT_CLUSTER_TOLERANCE: f64 = 0.001;

/// Tuning knobs for one topology instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Distance within which two coordinates are the same point.
    pub cluster_tolerance: f64,
    /// Cell size of the per-class spatial grid index.
    pub index_cell_size: f64,
    /// Upper bound on the number of coalesced dirty rectangles.
    pub max_dirty_regions: usize,
    /// Maximum number of features a single graph build may consume.
    pub graph_feature_limit: usize,
    /// Wall-clock budget for a graph build, if any.
    pub graph_timeout: Option<Duration>,
    /// Evaluate independent rules on the rayon thread pool.
    pub parallel_validation: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cluster_tolerance: env_or("TOPO_CLUSTER_TOLERANCE", defaults.cluster_tolerance),
            index_cell_size: env_or("TOPO_INDEX_CELL_SIZE", defaults.index_cell_size),
            max_dirty_regions: env_or("TOPO_MAX_DIRTY_REGIONS", defaults.max_dirty_regions),
            graph_feature_limit: env_or("TOPO_GRAPH_FEATURE_LIMIT", defaults.graph_feature_limit),
            graph_timeout: std::env::var("TOPO_GRAPH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .or(defaults.graph_timeout),
            parallel_validation: env_or("TOPO_PARALLEL_VALIDATION", defaults.parallel_validation),
        }
    }

    /// Returns a copy with a different cluster tolerance.
    pub fn with_cluster_tolerance(mut self, tolerance: f64) -> Self {
        self.cluster_tolerance = tolerance;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_tolerance: DEFAULT_CLUSTER_TOLERANCE,
            index_cell_size: 100.0,
            max_dirty_regions: 64,
            graph_feature_limit: 250_000,
            graph_timeout: None,
            parallel_validation: true,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
