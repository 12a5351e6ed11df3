// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dirty-region tracking.
//!
//! Edits report the envelopes they touched; the tracker keeps them as a short
//! list of coalesced rectangles. Touching or overlapping regions are unioned,
//! and once the list grows past its bound the pair whose union adds the least
//! area is merged. Every mark bumps a generation counter so a validation pass
//! only clears regions that existed when it started.

use serde::{Deserialize, Serialize};
use topo_lite_geometry::Envelope;

/// An area that needs re-validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirtyRegion {
    pub envelope: Envelope,
    /// Generation of the most recent mark merged into this region.
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct DirtyTracker {
    regions: Vec<DirtyRegion>,
    generation: u64,
    max_regions: usize,
}

impl DirtyTracker {
    pub fn new(max_regions: usize) -> Self {
        Self {
            regions: Vec::new(),
            generation: 0,
            max_regions: max_regions.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[DirtyRegion] {
        &self.regions
    }

    /// Generation of the latest mark.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Union of all outstanding regions.
    pub fn extent(&self) -> Envelope {
        self.regions
            .iter()
            .fold(Envelope::empty(), |acc, r| acc.union(&r.envelope))
    }

    /// Adds `envelope` to the dirty set. Empty envelopes are ignored.
    pub fn mark_dirty(&mut self, envelope: Envelope) {
        if envelope.is_empty() {
            return;
        }
        self.generation += 1;
        self.insert(DirtyRegion {
            envelope,
            generation: self.generation,
        });

        while self.regions.len() > self.max_regions {
            let Some((i, j)) = self.cheapest_pair() else {
                break;
            };
            // j > i, so removing j first keeps i valid.
            let b = self.regions.swap_remove(j);
            let a = self.regions.swap_remove(i);
            self.insert(merge(&a, &b));
        }
    }

    /// Returns the union of all regions and clears the tracker.
    pub fn take_dirty_extent(&mut self) -> Envelope {
        let extent = self.extent();
        self.regions.clear();
        extent
    }

    /// Parts of the dirty regions that overlap `extent`.
    pub fn dirty_within(&self, extent: &Envelope) -> Vec<Envelope> {
        self.regions
            .iter()
            .filter_map(|r| r.envelope.overlap(extent))
            .collect()
    }

    /// Removes `extent` from every region marked at or before
    /// `up_to_generation`. Newer regions stay whole.
    pub fn clear_within(&mut self, extent: &Envelope, up_to_generation: u64) {
        let mut kept = Vec::with_capacity(self.regions.len());
        for region in self.regions.drain(..) {
            if region.generation > up_to_generation || region.envelope.overlap(extent).is_none() {
                kept.push(region);
                continue;
            }
            kept.extend(region.envelope.difference(extent).into_iter().map(|envelope| {
                DirtyRegion {
                    envelope,
                    generation: region.generation,
                }
            }));
        }
        self.regions = kept;
    }

    /// Unions `region` with every region it touches, then stores it.
    fn insert(&mut self, mut region: DirtyRegion) {
        loop {
            let Some(pos) = self
                .regions
                .iter()
                .position(|r| r.envelope.intersects(&region.envelope))
            else {
                break;
            };
            let other = self.regions.swap_remove(pos);
            region = merge(&region, &other);
        }
        self.regions.push(region);
    }

    fn cheapest_pair(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..self.regions.len() {
            for j in (i + 1)..self.regions.len() {
                let a = &self.regions[i].envelope;
                let b = &self.regions[j].envelope;
                let growth = a.union(b).area() - a.area() - b.area();
                if best.map_or(true, |(_, _, g)| growth < g) {
                    best = Some((i, j, growth));
                }
            }
        }
        best.map(|(i, j, _)| (i, j))
    }
}

fn merge(a: &DirtyRegion, b: &DirtyRegion) -> DirtyRegion {
    DirtyRegion {
        envelope: a.envelope.union(&b.envelope),
        generation: a.generation.max(b.generation),
    }
}
