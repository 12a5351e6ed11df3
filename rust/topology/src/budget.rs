// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cancellation and resource limits for graph builds.
//!
//! The caller holds a [`CancellationToken`] and may cancel from any thread;
//! the builder checks it, together with the deadline and feature limit,
//! between per-feature steps. Work already done is simply discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use topo_lite_geometry::Envelope;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// A cooperative cancellation token. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Limits for one graph build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub cancel: Option<CancellationToken>,
    /// Wall-clock budget, measured from the start of the build.
    pub timeout: Option<Duration>,
    /// Maximum number of features collected; `None` uses the engine setting.
    pub feature_limit: Option<usize>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_feature_limit(mut self, limit: usize) -> Self {
        self.feature_limit = Some(limit);
        self
    }
}

/// Running check of a build against its options.
#[derive(Debug)]
pub(crate) struct Budget {
    extent: Envelope,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    feature_limit: usize,
    features: usize,
}

impl Budget {
    pub(crate) fn start(extent: Envelope, options: &BuildOptions, config: &EngineConfig) -> Self {
        let timeout = options.timeout.or(config.graph_timeout);
        Self {
            extent,
            cancel: options.cancel.clone(),
            deadline: timeout.map(|t| Instant::now() + t),
            feature_limit: options.feature_limit.unwrap_or(config.graph_feature_limit),
            features: 0,
        }
    }

    /// Fails if the build was cancelled or ran out of time.
    pub(crate) fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(Error::Cancelled {
                extent: self.extent,
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::GraphDeadlineExceeded {
                extent: self.extent,
            });
        }
        Ok(())
    }

    /// Counts one more collected feature, then runs [`Budget::check`].
    pub(crate) fn take_feature(&mut self) -> Result<()> {
        self.features += 1;
        if self.features > self.feature_limit {
            return Err(Error::GraphBudgetExceeded {
                extent: self.extent,
                features: self.features,
                limit: self.feature_limit,
            });
        }
        self.check()
    }
}
