// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid-based spatial hashes.
//!
//! [`GridIndex`] buckets envelopes into square cells for candidate lookup in
//! the geometry store. [`PointIndex`] is the tolerance-based "merge-or-create"
//! index the graph builder uses to snap vertices within the cluster tolerance.

use std::hash::Hash;

use nalgebra::Point2;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use topo_lite_geometry::Envelope;

/// Items spanning more cells than this are kept in a side list instead of
/// being copied into every cell.
const MAX_CELLS_PER_ITEM: i64 = 1024;

type Cell = (i64, i64);

fn cell_of(cell_size: f64, x: f64, y: f64) -> Cell {
    ((x / cell_size).floor() as i64, (y / cell_size).floor() as i64)
}

fn cell_range(cell_size: f64, env: &Envelope) -> (Cell, Cell) {
    (
        cell_of(cell_size, env.min.x, env.min.y),
        cell_of(cell_size, env.max.x, env.max.y),
    )
}

/// Cells covered by a range; saturates for ranges spanning the whole `i64`
/// grid.
fn cell_count((lo, hi): (Cell, Cell)) -> i64 {
    let span = |a: i64, b: i64| b.saturating_sub(a).saturating_add(1);
    span(lo.0, hi.0).saturating_mul(span(lo.1, hi.1))
}

/// A spatial hash grid mapping envelopes to keys.
#[derive(Debug, Clone)]
pub struct GridIndex<K> {
    cell_size: f64,
    grid: FxHashMap<Cell, SmallVec<[K; 4]>>,
    oversized: FxHashSet<K>,
    items: FxHashMap<K, Envelope>,
}

impl<K: Copy + Eq + Hash + Ord> GridIndex<K> {
    /// Creates a new index with the given cell size.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(f64::EPSILON),
            grid: FxHashMap::default(),
            oversized: FxHashSet::default(),
            items: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts or replaces the envelope of `key`.
    pub fn insert(&mut self, key: K, env: Envelope) {
        self.remove(key);
        if env.is_empty() {
            return;
        }
        let range = cell_range(self.cell_size, &env);
        if cell_count(range) > MAX_CELLS_PER_ITEM {
            self.oversized.insert(key);
        } else {
            let ((x0, y0), (x1, y1)) = range;
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    self.grid.entry((cx, cy)).or_default().push(key);
                }
            }
        }
        self.items.insert(key, env);
    }

    /// Removes `key`; returns its envelope if it was present.
    pub fn remove(&mut self, key: K) -> Option<Envelope> {
        let env = self.items.remove(&key)?;
        if !self.oversized.remove(&key) {
            let ((x0, y0), (x1, y1)) = cell_range(self.cell_size, &env);
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    if let Some(keys) = self.grid.get_mut(&(cx, cy)) {
                        keys.retain(|k| *k != key);
                        if keys.is_empty() {
                            self.grid.remove(&(cx, cy));
                        }
                    }
                }
            }
        }
        Some(env)
    }

    /// Keys whose envelope intersects `env`, sorted ascending.
    pub fn query(&self, env: &Envelope) -> Vec<K> {
        if env.is_empty() || self.items.is_empty() {
            return Vec::new();
        }

        let range = cell_range(self.cell_size, env);
        let mut hits: Vec<K> = if cell_count(range) as usize > self.grid.len() {
            // Cheaper to scan every item than to walk mostly-empty cells.
            self.items
                .iter()
                .filter(|(_, e)| e.intersects(env))
                .map(|(k, _)| *k)
                .collect()
        } else {
            let mut seen = FxHashSet::default();
            let ((x0, y0), (x1, y1)) = range;
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    if let Some(keys) = self.grid.get(&(cx, cy)) {
                        seen.extend(keys.iter().copied());
                    }
                }
            }
            seen.extend(self.oversized.iter().copied());
            seen.into_iter()
                .filter(|k| self.items.get(k).is_some_and(|e| e.intersects(env)))
                .collect()
        };
        hits.sort_unstable();
        hits
    }

    /// Envelope covering every indexed item.
    pub fn extent(&self) -> Envelope {
        self.items
            .values()
            .fold(Envelope::empty(), |acc, e| acc.union(e))
    }
}

/// Tolerance-based point index used for vertex snapping.
///
/// Point lookups check the 3x3 neighborhood of cells, so the cell size must be
/// at least the tolerance used for queries.
#[derive(Debug)]
pub struct PointIndex {
    cell_size: f64,
    grid: FxHashMap<Cell, SmallVec<[u32; 4]>>,
    points: Vec<Point2<f64>>,
}

impl PointIndex {
    /// Creates a new point index for snapping at `tolerance`.
    pub fn new(tolerance: f64) -> Self {
        Self {
            cell_size: tolerance.max(1e-9),
            grid: FxHashMap::default(),
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, id: u32) -> Point2<f64> {
        self.points[id as usize]
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Nearest indexed point within `tolerance` of `p`; lowest id on ties.
    pub fn find_near(&self, p: &Point2<f64>, tolerance: f64) -> Option<u32> {
        let (cx, cy) = cell_of(self.cell_size, p.x, p.y);
        let tol_sq = tolerance * tolerance;
        let mut best: Option<(u32, f64)> = None;

        // Search 3x3 neighborhood
        for dx in -1..=1 {
            for dy in -1..=1 {
                let cell = (cx.saturating_add(dx), cy.saturating_add(dy));
                if (dx != 0 && cell.0 == cx) || (dy != 0 && cell.1 == cy) {
                    // Clamped at the edge of the grid; already visited.
                    continue;
                }
                if let Some(ids) = self.grid.get(&cell) {
                    for &id in ids {
                        let dist_sq = (self.points[id as usize] - p).norm_squared();
                        if dist_sq > tol_sq {
                            continue;
                        }
                        let better = match best {
                            None => true,
                            Some((bid, bd)) => dist_sq < bd || (dist_sq == bd && id < bid),
                        };
                        if better {
                            best = Some((id, dist_sq));
                        }
                    }
                }
            }
        }

        best.map(|(id, _)| id)
    }

    /// Returns an existing point within `tolerance` of `p`, or adds a new one.
    /// This is the fundamental "merge-or-create" operation used during
    /// vertex snapping.
    pub fn find_or_insert(&mut self, p: Point2<f64>, tolerance: f64) -> u32 {
        if let Some(existing) = self.find_near(&p, tolerance) {
            return existing;
        }
        let id = self.points.len() as u32;
        self.points.push(p);
        let cell = cell_of(self.cell_size, p.x, p.y);
        self.grid.entry(cell).or_default().push(id);
        id
    }
}
