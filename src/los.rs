//! Line-of-sight engine: cached tile-pair visibility over the grid terrain.
//!
//! Grounded in `original_source/core/los_manager.py`'s `LineOfSightManager`:
//! `has_los` samples each tile's corners (plus `granularity` interior points)
//! and reports sight as soon as any corner-pair ray is unobstructed; a ray is
//! a Bresenham/DDA walk that excludes only the stepped cell it starts and
//! ends in, not the whole anchor tile (SPEC_FULL.md §9 records this as the
//! resolved reading of the reference's exemption).
//!
//! Unlike the reference, which clears its whole cache on every `wall_added`/
//! `entity_moved` event (requiring the LOS manager to subscribe to the bus),
//! this cache is invalidated lazily: each entry is stamped with the terrain's
//! `terrain_version`/`blocker_version` at the time it was computed, and is
//! recomputed if either counter has since advanced. This avoids giving the
//! LOS engine a reference to the event bus at all.
//!
//! **Grazing is intentional and matches the reference.** Corner sampling
//! checks every `(sample_of(a), sample_of(b))` pair and reports sight the
//! moment *any one* pair's ray is clear. For a single-tile-tall footprint,
//! each tile contributes corner samples on both its `y` and `y + 1` edges, so
//! a single wall tile interposed on only one of those two rows leaves the
//! other row's ray clear and `has_los` still reports true - the reference's
//! `_is_ray_clear`/`_get_los_points` have the exact same property. A wall
//! only reliably blocks a straight 1-tall corridor when it spans every row
//! the two tiles' corners sample, i.e. both `y` and `y + 1`.

use std::collections::HashMap;

use crate::config::LosSamplingMode;
use crate::terrain::GridTerrain;

type Tile = (i32, i32);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    has_los: bool,
    terrain_version_seen: u64,
    blocker_version_seen: u64,
}

pub struct LosEngine {
    granularity: u32,
    mode: LosSamplingMode,
    cache: HashMap<(Tile, Tile), CacheEntry>,
}

impl LosEngine {
    pub fn new(granularity: u32, mode: LosSamplingMode) -> Self {
        Self { granularity, mode, cache: HashMap::new() }
    }

    /// Drops every cached entry. Exposed for callers (e.g. a save/load
    /// boundary) that want a hard reset; ordinary staleness is handled
    /// automatically by the version stamps.
    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Reports whether `from` has line of sight to `to`, using (and
    /// refreshing) the symmetric cache.
    pub fn has_los(&mut self, terrain: &GridTerrain, from: Tile, to: Tile) -> bool {
        let _span = tracing::trace_span!("los::has_los", ?from, ?to).entered();
        if from == to {
            return true;
        }
        let key = if from <= to { (from, to) } else { (to, from) };
        let tv = terrain.terrain_version();
        let bv = terrain.blocker_version();

        if let Some(entry) = self.cache.get(&key) {
            if entry.terrain_version_seen == tv && entry.blocker_version_seen == bv {
                tracing::trace!(hit = true, "los cache lookup");
                return entry.has_los;
            }
        }

        let has_los = self.check_los(terrain, from, to);
        self.cache.insert(key, CacheEntry { has_los, terrain_version_seen: tv, blocker_version_seen: bv });
        tracing::debug!(hit = false, has_los, "los cache miss, recomputed");
        has_los
    }

    /// All-pairs check over each tile's sample points: sight exists if any
    /// single pair of sample points has a clear ray between them.
    fn check_los(&self, terrain: &GridTerrain, from: Tile, to: Tile) -> bool {
        let from_points = self.sample_points(from);
        let to_points = self.sample_points(to);
        for a in &from_points {
            for b in &to_points {
                if is_ray_clear(terrain, *a, *b) {
                    return true;
                }
            }
        }
        false
    }

    /// Corner points of `tile`, plus `granularity` evenly spaced interior
    /// points along the tile's diagonal. `Full` sampling doubles the
    /// interior point count relative to `Sparse` for the same granularity.
    fn sample_points(&self, tile: Tile) -> Vec<(f64, f64)> {
        let (x, y) = (tile.0 as f64, tile.1 as f64);
        let mut points = vec![(x, y), (x + 1.0, y), (x, y + 1.0), (x + 1.0, y + 1.0)];

        let interior_count = match self.mode {
            LosSamplingMode::Sparse => self.granularity,
            LosSamplingMode::Full => self.granularity * 2,
        };
        for i in 1..=interior_count {
            let t = i as f64 / (interior_count + 1) as f64;
            points.push((x + t, y + t));
        }
        points
    }
}

/// Walks the segment `a -> b` in fixed small steps, truncating each sampled
/// point to its grid cell, and reports whether any *interior* cell (i.e.
/// excluding the first and last distinct cell visited by this specific ray)
/// is a wall.
fn is_ray_clear(terrain: &GridTerrain, a: (f64, f64), b: (f64, f64)) -> bool {
    let cells = sampled_cells(a, b);
    if cells.len() <= 2 {
        return true;
    }
    cells[1..cells.len() - 1].iter().all(|(cx, cy)| !terrain.is_wall(*cx, *cy))
}

fn sampled_cells(a: (f64, f64), b: (f64, f64)) -> Vec<Tile> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let dist = (dx * dx + dy * dy).sqrt();
    let steps = ((dist / 0.1).ceil() as i32).max(1);

    let mut cells = Vec::new();
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let cell = ((a.0 + dx * t).floor() as i32, (a.1 + dy * t).floor() as i32);
        if cells.last() != Some(&cell) {
            cells.push(cell);
        }
    }
    cells
}
