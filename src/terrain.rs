//! Grid terrain: walls, occupancy, dynamic per-tile effects, and the version
//! counters that gate LOS and path caches.
//!
//! Grounded in the reference `core/terrain_manager.py`, restructured in the
//! teacher's style (a single owning struct with small query/mutation methods
//! plus a `#[cfg(test)] mod tests` block). Unlike the reference, which reads
//! entity footprints back through a `game_state` back-reference, this terrain
//! never holds a reference to the ECS store or the game facade: operations
//! that need an entity's footprint take it as an explicit argument (on
//! `add_entity`) or reuse the footprint recorded at placement time (on
//! `move_entity`/`handle_entity_enter`). This is the safe-Rust realization of
//! the design note's `EntitySizeProvider` capability - a stored back-pointer
//! from `Terrain` to `Game` would be a genuine ownership cycle, so the
//! capability is passed at the call site instead of stored.

use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ecs_store::EntityId;
use crate::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Difficult,
    VeryDifficult,
    Dangerous,
    VeryDangerous,
    DangerousAura,
    ImpassableSolid,
    ImpassableVoid,
    Current,
    DarkLow,
    DarkTotal,
}

impl EffectKind {
    fn blocks_walkability(self) -> bool {
        matches!(self, EffectKind::ImpassableSolid | EffectKind::ImpassableVoid)
    }
}

/// A single effect entry on a tile: a kind plus free-form data (difficulty,
/// damage, radius, aura parameters, current vector, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub name: EffectKind,
    pub data: Value,
}

impl Effect {
    pub fn new(name: EffectKind, data: Value) -> Self {
        Self { name, data }
    }

    fn field_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    fn field_bool(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Per-tile movement cost contributed by a single effect, evaluated at tile
/// `at` (needed for gradient auras, which are distance-dependent).
fn per_effect_cost(effect: &Effect, at: (i32, i32)) -> i32 {
    match effect.name {
        EffectKind::Difficult => effect.field_i64("cost").unwrap_or(2).max(2) as i32,
        EffectKind::VeryDifficult => effect.field_i64("cost").unwrap_or(3).max(3) as i32,
        EffectKind::Dangerous => effect.field_i64("cost").unwrap_or(4).max(4) as i32,
        EffectKind::VeryDangerous => effect.field_i64("cost").unwrap_or(12).max(12) as i32,
        EffectKind::DangerousAura => aura_cost(effect, at),
        EffectKind::ImpassableSolid | EffectKind::ImpassableVoid => 0,
        EffectKind::Current | EffectKind::DarkLow | EffectKind::DarkTotal => 1,
    }
}

fn aura_cost(effect: &Effect, at: (i32, i32)) -> i32 {
    let gradient = effect.field_bool("gradient");
    if gradient {
        let radius = effect.field_i64("radius").unwrap_or(0) as i32;
        let source = effect
            .data
            .get("source")
            .and_then(|v| v.as_array())
            .and_then(|a| Some((a.first()?.as_i64()? as i32, a.get(1)?.as_i64()? as i32)))
            .unwrap_or((at.0, at.1));
        let manhattan = (at.0 - source.0).abs() + (at.1 - source.1).abs();
        (4 + (radius - manhattan).max(0)).min(6)
    } else {
        let intensity = effect.field_i64("intensity").unwrap_or(0) as i32;
        (3 + intensity).min(6)
    }
}

/// Aggregated strongest hazard data for a category, used both on-enter and
/// at turn-start. See SPEC_FULL.md §4.6 for the unification rationale: both
/// call sites in this crate use this one comparison rule.
#[derive(Debug, Clone)]
pub struct HazardTrigger {
    pub effect: EffectKind,
    pub data: Value,
    pub auto_fail: bool,
}

/// A cached single-source Dijkstra tree over single-tile footprints, used to
/// serve both `precompute_paths`'s `(start, end)` queries and
/// `precompute_reachable_tiles`'s `(start, budget)` queries from the one
/// underlying computation. Stamped with the `terrain_version` it was built
/// against, mirroring the LOS engine's lazy version-stamped invalidation
/// (see `los.rs`) rather than an eager clear-on-event approach.
struct PathTree {
    cost: HashMap<(i32, i32), i32>,
    parent: HashMap<(i32, i32), (i32, i32)>,
    terrain_version_seen: u64,
}

const STEPS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// Min-heap entry ordered by ascending cost, mirroring `movement::HeapEntry`.
#[derive(PartialEq, Eq)]
struct PathHeapEntry {
    cost: i32,
    tile: (i32, i32),
}

impl Ord for PathHeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.cost.cmp(&self.cost).then_with(|| other.tile.cmp(&self.tile))
    }
}

impl PartialOrd for PathHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct GridTerrain {
    width: i32,
    height: i32,
    cell_size: f32,
    walls: HashSet<(i32, i32)>,
    occupants: HashMap<(i32, i32), EntityId>,
    anchor: HashMap<EntityId, (i32, i32)>,
    /// Footprint tiles recorded at placement time, used by `move_entity`,
    /// `remove_entity`, and hazard aggregation so those operations never need
    /// to ask the ECS store for an entity's size again.
    footprint_tiles: HashMap<EntityId, Vec<(i32, i32)>>,
    effects_by_tile: HashMap<(i32, i32), Vec<Effect>>,
    terrain_version: u64,
    blocker_version: u64,
    /// Per-source path trees for the entity-agnostic (single-tile-footprint)
    /// precomputed path/reach caches. Keyed by source tile.
    path_trees: HashMap<(i32, i32), PathTree>,
    /// Consulted by `move_entity`/`move_entity_jump` before any move commits,
    /// letting a caller veto a destination for reasons outside plain
    /// walkability (e.g. a reserved staging tile). `None` (the default)
    /// never forbids anything.
    forbid_landing: Option<Box<dyn Fn((i32, i32)) -> bool + Send + Sync>>,
}

impl GridTerrain {
    pub fn new(width: i32, height: i32, cell_size: f32) -> Self {
        Self {
            width,
            height,
            cell_size,
            walls: HashSet::new(),
            occupants: HashMap::new(),
            anchor: HashMap::new(),
            footprint_tiles: HashMap::new(),
            effects_by_tile: HashMap::new(),
            terrain_version: 0,
            blocker_version: 0,
            path_trees: HashMap::new(),
            forbid_landing: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn terrain_version(&self) -> u64 {
        self.terrain_version
    }

    pub fn blocker_version(&self) -> u64 {
        self.blocker_version
    }

    // -- bounds / walkability --------------------------------------------

    pub fn is_valid_position(&self, x: i32, y: i32, w: i32, h: i32) -> bool {
        x >= 0 && y >= 0 && x + w <= self.width && y + h <= self.height
    }

    fn is_valid_footprint(&self, tiles: &[(i32, i32)]) -> bool {
        tiles.iter().all(|&(x, y)| x >= 0 && y >= 0 && x < self.width && y < self.height)
    }

    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.walls.contains(&(x, y))
    }

    pub fn is_walkable(&self, x: i32, y: i32, w: i32, h: i32) -> bool {
        if !self.is_valid_position(x, y, w, h) {
            return false;
        }
        rect_tiles(x, y, w, h).iter().all(|t| self.tile_walkable(*t))
    }

    fn is_walkable_footprint(&self, tiles: &[(i32, i32)]) -> bool {
        if !self.is_valid_footprint(tiles) {
            return false;
        }
        tiles.iter().all(|t| self.tile_walkable(*t))
    }

    fn tile_walkable(&self, tile: (i32, i32)) -> bool {
        if self.walls.contains(&tile) {
            return false;
        }
        !self
            .effects_by_tile
            .get(&tile)
            .map(|effects| effects.iter().any(|e| e.name.blocks_walkability()))
            .unwrap_or(false)
    }

    /// True if the tile carries an `impassable_void` effect - a bottomless
    /// gap that ordinary pathfinding must never route through, but that a
    /// single jump-style move may still land on (and die from).
    pub fn is_void(&self, x: i32, y: i32) -> bool {
        self.has_effect(x, y, EffectKind::ImpassableVoid)
    }

    /// Like `tile_walkable`, but treats a lone `impassable_void` effect as
    /// passable. Used only by jump-style moves; ordinary movement and
    /// reachability must keep using `tile_walkable`/`is_walkable_footprint`.
    fn tile_walkable_allowing_void(&self, tile: (i32, i32)) -> bool {
        if self.walls.contains(&tile) {
            return false;
        }
        !self
            .effects_by_tile
            .get(&tile)
            .map(|effects| effects.iter().any(|e| e.name == EffectKind::ImpassableSolid))
            .unwrap_or(false)
    }

    pub fn is_occupied(&self, x: i32, y: i32, w: i32, h: i32, ignore: Option<&EntityId>, check_walls: bool) -> bool {
        self.is_occupied_footprint(&rect_tiles(x, y, w, h), ignore, check_walls)
    }

    fn is_occupied_footprint(&self, tiles: &[(i32, i32)], ignore: Option<&EntityId>, check_walls: bool) -> bool {
        tiles.iter().any(|t| {
            let occupied_by_other = self.occupants.get(t).map_or(false, |occ| Some(occ) != ignore);
            occupied_by_other || (check_walls && self.walls.contains(t))
        })
    }

    pub fn has_effect(&self, x: i32, y: i32, kind: EffectKind) -> bool {
        self.effects_by_tile.get(&(x, y)).map_or(false, |effects| effects.iter().any(|e| e.name == kind))
    }

    pub fn get_effects(&self, x: i32, y: i32) -> &[Effect] {
        self.effects_by_tile.get(&(x, y)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_movement_cost(&self, x: i32, y: i32) -> i32 {
        let effects = self.get_effects(x, y);
        effects.iter().map(|e| per_effect_cost(e, (x, y))).max().unwrap_or(1).max(1)
    }

    // -- occupancy ---------------------------------------------------------

    pub fn anchor_of(&self, id: &EntityId) -> Option<(i32, i32)> {
        self.anchor.get(id).copied()
    }

    /// All currently-placed entity IDs with their anchors, in an unspecified
    /// order. Used by the terrain-effect engine's round-start sweep.
    pub fn entities_with_anchor(&self) -> Vec<(EntityId, (i32, i32))> {
        self.anchor.iter().map(|(id, pos)| (id.clone(), *pos)).collect()
    }

    pub fn footprint_of(&self, id: &EntityId) -> Option<&[(i32, i32)]> {
        self.footprint_tiles.get(id).map(Vec::as_slice)
    }

    /// Places a new entity at `(x, y)` with the given relative footprint
    /// offsets (use `&[(0, 0)]` for a single-tile entity). Returns `false`
    /// without mutation if the footprint is out of bounds or overlaps an
    /// existing occupant. Walls do not block placement, symmetric with
    /// adding a wall under an existing occupant.
    pub fn add_entity(&mut self, id: EntityId, x: i32, y: i32, footprint_offsets: &[(i32, i32)]) -> bool {
        let tiles: Vec<(i32, i32)> = footprint_offsets.iter().map(|(dx, dy)| (x + dx, y + dy)).collect();
        if !self.is_valid_footprint(&tiles) {
            return false;
        }
        if self.is_occupied_footprint(&tiles, None, false) {
            return false;
        }
        for t in &tiles {
            self.occupants.insert(*t, id.clone());
        }
        self.anchor.insert(id.clone(), (x, y));
        self.footprint_tiles.insert(id, tiles);
        true
    }

    /// Removes an entity's occupancy. No-op (returns `false`) if not present.
    pub fn remove_entity(&mut self, id: &EntityId) -> bool {
        let Some(tiles) = self.footprint_tiles.remove(id) else {
            return false;
        };
        for t in &tiles {
            self.occupants.remove(t);
        }
        self.anchor.remove(id);
        true
    }

    /// Moves `id` to `(x, y)`, reusing the footprint offsets recorded at
    /// placement time. Publishes `entity_moved` then runs
    /// [`Self::handle_entity_enter`] before returning, per the spec's
    /// ordering `movement_started -> entity_moved -> terrain_effect_trigger*
    /// -> movement_ended` (the movement engine publishes the surrounding
    /// `movement_started`/`movement_ended` pair). Rejects a destination that
    /// is not walkable, including one with only an `impassable_void` effect;
    /// use [`Self::move_entity_jump`] for a move that may land on a void.
    pub fn move_entity(&mut self, id: &EntityId, x: i32, y: i32, bus: &mut EventBus) -> bool {
        self.move_entity_ex(id, x, y, false, bus).is_some()
    }

    /// Moves `id` to `(x, y)` allowing a destination whose only obstruction
    /// is an `impassable_void` effect. Returns `None` if rejected outright
    /// (out of bounds, occupied, or a genuinely solid obstruction), otherwise
    /// `Some(landed_on_void)` - the caller (the movement engine) is
    /// responsible for killing the entity when `landed_on_void` is `true`.
    pub fn move_entity_jump(&mut self, id: &EntityId, x: i32, y: i32, bus: &mut EventBus) -> Option<bool> {
        self.move_entity_ex(id, x, y, true, bus)
    }

    fn move_entity_ex(&mut self, id: &EntityId, x: i32, y: i32, allow_void: bool, bus: &mut EventBus) -> Option<bool> {
        let old_tiles = self.footprint_tiles.get(id).cloned()?;
        let old_anchor = self.anchor.get(id).copied()?;
        let offsets: Vec<(i32, i32)> = old_tiles.iter().map(|(tx, ty)| (tx - old_anchor.0, ty - old_anchor.1)).collect();
        let new_tiles: Vec<(i32, i32)> = offsets.iter().map(|(dx, dy)| (x + dx, y + dy)).collect();

        if !self.is_valid_footprint(&new_tiles) {
            return None;
        }
        if self.is_occupied_footprint(&new_tiles, Some(id), false) {
            return None;
        }
        let walkable = if allow_void {
            new_tiles.iter().all(|t| self.tile_walkable_allowing_void(*t))
        } else {
            self.is_walkable_footprint(&new_tiles)
        };
        if old_anchor != (x, y) {
            if !walkable {
                return None;
            }
            if self.forbid_landing.as_ref().is_some_and(|forbid| forbid((x, y))) {
                return None;
            }
        }
        let landed_on_void = allow_void && new_tiles.iter().any(|t| self.is_void(t.0, t.1));

        for t in &old_tiles {
            self.occupants.remove(t);
        }
        for t in &new_tiles {
            self.occupants.insert(*t, id.clone());
        }
        self.anchor.insert(id.clone(), (x, y));
        self.footprint_tiles.insert(id.clone(), new_tiles);

        bus.publish(
            "entity_moved",
            serde_json::json!({
                "entity_id": id.as_str(),
                "old_position": old_anchor,
                "new_position": (x, y),
                "footprint_size": offsets.len(),
            }),
        );

        self.handle_entity_enter(id, x, y, bus);
        Some(landed_on_void)
    }

    // -- walls ---------------------------------------------------------------

    pub fn add_wall(&mut self, x: i32, y: i32, bus: &mut EventBus) -> bool {
        if !self.is_valid_position(x, y, 1, 1) {
            return false;
        }
        let inserted = self.walls.insert((x, y));
        if inserted {
            self.terrain_version += 1;
            bus.publish("wall_added", serde_json::json!({"x": x, "y": y}));
        }
        inserted
    }

    pub fn remove_wall(&mut self, x: i32, y: i32, bus: &mut EventBus) -> bool {
        let removed = self.walls.remove(&(x, y));
        if removed {
            self.terrain_version += 1;
            bus.publish("wall_removed", serde_json::json!({"x": x, "y": y}));
        }
        removed
    }

    // -- effects ---------------------------------------------------------------

    pub fn add_effect(&mut self, name: EffectKind, positions: &[(i32, i32)], data: Value, bus: &mut EventBus) {
        for pos in positions {
            self.effects_by_tile.entry(*pos).or_default().push(Effect::new(name, data.clone()));
        }
        self.terrain_version += 1;
        bus.publish(
            "terrain_effect_added",
            serde_json::json!({"effect": effect_kind_name(name), "positions": positions}),
        );
    }

    /// Removes effects matching `predicate`, restricted to `positions` if
    /// given (otherwise the whole grid). Returns the number removed.
    pub fn remove_effect(
        &mut self,
        predicate: impl Fn(&Effect) -> bool,
        positions: Option<&[(i32, i32)]>,
        bus: &mut EventBus,
    ) -> usize {
        let mut removed = 0;
        let tiles: Vec<(i32, i32)> = match positions {
            Some(p) => p.to_vec(),
            None => self.effects_by_tile.keys().copied().collect(),
        };
        for tile in tiles {
            if let Some(list) = self.effects_by_tile.get_mut(&tile) {
                let before = list.len();
                list.retain(|e| !predicate(e));
                removed += before - list.len();
                if list.is_empty() {
                    self.effects_by_tile.remove(&tile);
                }
            }
        }
        if removed > 0 {
            self.terrain_version += 1;
            bus.publish("terrain_effect_removed", serde_json::json!({"count": removed}));
        }
        removed
    }

    /// Bumps `blocker_version`; called by the movement engine when a blocking
    /// entity (one with a `CharacterRef` or `Cover`) moves, and by cover/state
    /// changes outside this module.
    pub fn bump_blocker_version(&mut self) {
        self.blocker_version += 1;
    }

    /// Aggregates the strongest `very_dangerous`, `dangerous`, and
    /// `dangerous_aura` effects across the entity's footprint and publishes
    /// at most one `terrain_effect_trigger` per category. Used both by
    /// `move_entity` (on enter) and by the terrain-effect engine (at
    /// turn-start); see SPEC_FULL.md §4.6 for the single comparison rule used
    /// at both call sites.
    pub fn handle_entity_enter(&self, id: &EntityId, x: i32, y: i32, bus: &mut EventBus) {
        for trigger in self.aggregate_hazards(id) {
            bus.publish(
                "terrain_effect_trigger",
                serde_json::json!({
                    "entity_id": id.as_str(),
                    "position": (x, y),
                    "effect": effect_kind_name(trigger.effect),
                    "auto_fail": trigger.auto_fail,
                    "data": trigger.data,
                }),
            );
        }
    }

    /// Computes the strongest hazard per category across `id`'s recorded
    /// footprint, without publishing. Exposed so the terrain-effect engine's
    /// turn-start handler can reuse the exact same aggregation.
    pub fn aggregate_hazards(&self, id: &EntityId) -> Vec<HazardTrigger> {
        let Some(tiles) = self.footprint_tiles.get(id) else {
            return Vec::new();
        };
        let mut best_vd: Option<&Effect> = None;
        let mut best_dangerous: Option<&Effect> = None;
        let mut best_aura: Option<(&Effect, i32)> = None;

        for tile in tiles {
            for effect in self.get_effects(tile.0, tile.1) {
                match effect.name {
                    EffectKind::VeryDangerous => {
                        if better_hazard(best_vd, effect) {
                            best_vd = Some(effect);
                        }
                    }
                    EffectKind::Dangerous => {
                        if better_hazard(best_dangerous, effect) {
                            best_dangerous = Some(effect);
                        }
                    }
                    EffectKind::DangerousAura => {
                        let cost = aura_cost(effect, *tile);
                        if best_aura.map_or(true, |(_, best_cost)| cost > best_cost) {
                            best_aura = Some((effect, cost));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut triggers = Vec::new();
        if let Some(e) = best_vd {
            triggers.push(HazardTrigger { effect: EffectKind::VeryDangerous, data: e.data.clone(), auto_fail: true });
        }
        if let Some(e) = best_dangerous {
            triggers.push(HazardTrigger { effect: EffectKind::Dangerous, data: e.data.clone(), auto_fail: false });
        }
        if let Some((e, _)) = best_aura {
            triggers.push(HazardTrigger { effect: EffectKind::DangerousAura, data: e.data.clone(), auto_fail: false });
        }
        triggers
    }

    // -- precomputed path/reach caches ---------------------------------------

    /// Installs a veto consulted before any move or path-move commits to a
    /// new tile, on top of ordinary walkability/occupancy checks. Reserved
    /// for callers outside this crate (e.g. a reservation system for
    /// in-progress multi-entity maneuvers); always consulted, never set by
    /// anything in this crate itself.
    pub fn set_forbid_landing(&mut self, forbid: impl Fn((i32, i32)) -> bool + Send + Sync + 'static) {
        self.forbid_landing = Some(Box::new(forbid));
    }

    pub fn clear_forbid_landing(&mut self) {
        self.forbid_landing = None;
    }

    /// Eagerly builds (or refreshes, if stale) a single-tile Dijkstra tree
    /// for every currently-walkable tile, so later `cached_path`/
    /// `cached_reachable_tiles` calls are pure cache hits rather than paying
    /// for the walk on first use. Entity-agnostic and occupancy-blind (see
    /// `cached_path`), which is what makes sharing one tree across every
    /// footprint-1 entity valid.
    pub fn precompute_paths(&mut self) {
        let tiles: Vec<(i32, i32)> = (0..self.width)
            .flat_map(|x| (0..self.height).map(move |y| (x, y)))
            .filter(|&t| self.tile_walkable(t))
            .collect();
        for tile in tiles {
            self.refresh_path_tree(tile);
        }
    }

    /// Eagerly precomputes reachability for every walkable tile. `budgets`
    /// names the movement budgets callers intend to query; since a full path
    /// tree already holds every tile's cost, no separate per-budget work is
    /// needed beyond what `precompute_paths` already does - `cached_reachable_tiles`
    /// filters the shared tree at query time.
    pub fn precompute_reachable_tiles(&mut self, budgets: &[i32]) {
        let _ = budgets;
        self.precompute_paths();
    }

    fn refresh_path_tree(&mut self, start: (i32, i32)) {
        let stale = self.path_trees.get(&start).map_or(true, |t| t.terrain_version_seen != self.terrain_version);
        if !stale {
            return;
        }
        let mut cost: HashMap<(i32, i32), i32> = HashMap::new();
        let mut parent: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut heap = BinaryHeap::new();
        cost.insert(start, 0);
        heap.push(PathHeapEntry { cost: 0, tile: start });

        while let Some(PathHeapEntry { cost: c, tile }) = heap.pop() {
            if c > cost.get(&tile).copied().unwrap_or(i32::MAX) {
                continue;
            }
            for (dx, dy) in STEPS {
                let next = (tile.0 + dx, tile.1 + dy);
                if !self.tile_walkable(next) {
                    continue;
                }
                let next_cost = c + self.get_movement_cost(next.0, next.1);
                if next_cost < cost.get(&next).copied().unwrap_or(i32::MAX) {
                    cost.insert(next, next_cost);
                    parent.insert(next, tile);
                    heap.push(PathHeapEntry { cost: next_cost, tile: next });
                }
            }
        }
        self.path_trees.insert(start, PathTree { cost, parent, terrain_version_seen: self.terrain_version });
    }

    /// Cached cost-weighted path from `start` to `end`, inclusive of both
    /// endpoints, computing (or refreshing a stale) tree on demand if
    /// `precompute_paths` was never called. Unlike `movement::find_path`,
    /// this is entity-agnostic (single-tile footprint) and occupancy-blind -
    /// intended for planning queries (AI lookahead, UI move-range overlays)
    /// where an approximate static-terrain path is good enough and repeat
    /// queries from the same source matter more than occupancy precision.
    pub fn cached_path(&mut self, start: (i32, i32), end: (i32, i32)) -> Vec<(i32, i32)> {
        if start == end {
            return vec![start];
        }
        self.refresh_path_tree(start);
        let Some(tree) = self.path_trees.get(&start) else {
            return Vec::new();
        };
        if !tree.cost.contains_key(&end) {
            return Vec::new();
        }
        let mut path = vec![end];
        let mut cur = end;
        while cur != start {
            let Some(&prev) = tree.parent.get(&cur) else {
                return Vec::new();
            };
            cur = prev;
            path.push(cur);
        }
        path.reverse();
        path
    }

    /// Cached reachable tiles from `start` within `budget` total cost, as
    /// `(x, y, cost)` triples including the origin at cost `0`. See
    /// `cached_path` for the entity-agnostic/occupancy-blind caveat.
    pub fn cached_reachable_tiles(&mut self, start: (i32, i32), budget: i32) -> Vec<(i32, i32, i32)> {
        self.refresh_path_tree(start);
        let Some(tree) = self.path_trees.get(&start) else {
            return Vec::new();
        };
        tree.cost.iter().filter(|&(_, &c)| c <= budget).map(|(&(x, y), &c)| (x, y, c)).collect()
    }
}

/// Compares a candidate hazard effect against the current best by
/// `(difficulty, damage)`, both defaulting to 0. Unifies the
/// `very_dangerous`/`dangerous` aggregation rule across call sites.
fn better_hazard(current: Option<&Effect>, candidate: &Effect) -> bool {
    match current {
        None => true,
        Some(best) => {
            let cand = (candidate.field_i64("difficulty").unwrap_or(0), candidate.field_i64("damage").unwrap_or(0));
            let best = (best.field_i64("difficulty").unwrap_or(0), best.field_i64("damage").unwrap_or(0));
            cand >= best
        }
    }
}

fn effect_kind_name(kind: EffectKind) -> &'static str {
    match kind {
        EffectKind::Difficult => "difficult",
        EffectKind::VeryDifficult => "very_difficult",
        EffectKind::Dangerous => "dangerous",
        EffectKind::VeryDangerous => "very_dangerous",
        EffectKind::DangerousAura => "dangerous_aura",
        EffectKind::ImpassableSolid => "impassable_solid",
        EffectKind::ImpassableVoid => "impassable_void",
        EffectKind::Current => "current",
        EffectKind::DarkLow => "dark_low",
        EffectKind::DarkTotal => "dark_total",
    }
}

fn rect_tiles(x: i32, y: i32, w: i32, h: i32) -> Vec<(i32, i32)> {
    let mut tiles = Vec::with_capacity((w * h) as usize);
    for dx in 0..w {
        for dy in 0..h {
            tiles.push((x + dx, y + dy));
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_bus() -> EventBus {
        EventBus::new(256)
    }

    #[test]
    fn scenario_a_cost_precedence() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = fresh_bus();
        terrain.add_effect(EffectKind::Difficult, &[(3, 3)], json!({}), &mut bus);
        assert_eq!(terrain.get_movement_cost(3, 3), 2);

        terrain.add_effect(EffectKind::Dangerous, &[(3, 3)], json!({}), &mut bus);
        assert_eq!(terrain.get_movement_cost(3, 3), 4);

        terrain.remove_effect(|e| e.name == EffectKind::Dangerous, Some(&[(3, 3)]), &mut bus);
        assert_eq!(terrain.get_movement_cost(3, 3), 2);

        terrain.remove_effect(|e| e.name == EffectKind::Difficult, Some(&[(3, 3)]), &mut bus);
        assert_eq!(terrain.get_movement_cost(3, 3), 1);
    }

    #[test]
    fn add_wall_bumps_terrain_version_once_per_new_wall() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        assert!(terrain.add_wall(1, 1, &mut bus));
        assert_eq!(terrain.terrain_version(), 1);
        assert!(!terrain.add_wall(1, 1, &mut bus));
        assert_eq!(terrain.terrain_version(), 1);
    }

    #[test]
    fn wall_add_remove_round_trip_is_observationally_a_no_op() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        let before_walkable = terrain.is_walkable(2, 2, 1, 1);
        let before_cost = terrain.get_movement_cost(2, 2);

        terrain.add_wall(2, 2, &mut bus);
        terrain.remove_wall(2, 2, &mut bus);

        assert_eq!(terrain.is_walkable(2, 2, 1, 1), before_walkable);
        assert_eq!(terrain.get_movement_cost(2, 2), before_cost);
    }

    #[test]
    fn boundary_footprint_validity() {
        let terrain = GridTerrain::new(10, 10, 1.0);
        assert!(terrain.is_valid_position(0, 0, 10, 10));
        assert!(!terrain.is_valid_position(0, 0, 11, 10));
        assert!(!terrain.is_valid_position(0, 0, 10, 11));
    }

    #[test]
    fn very_dangerous_radius_zero_triggers_once_with_auto_fail() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        terrain.add_effect(
            EffectKind::VeryDangerous,
            &[(2, 2)],
            json!({"difficulty": 6, "damage": 3, "aggravated": false, "radius": 0}),
            &mut bus,
        );
        let id: EntityId = "victim".into();
        terrain.add_entity(id.clone(), 2, 2, &[(0, 0)]);
        let triggers = terrain.aggregate_hazards(&id);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].effect, EffectKind::VeryDangerous);
        assert!(triggers[0].auto_fail);
    }

    #[test]
    fn scenario_f_wall_under_occupant_persists_occupancy_but_blocks_walkability() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = fresh_bus();
        let id: EntityId = "big".into();
        let offsets = [(0, 0), (1, 0), (0, 1)];
        assert!(terrain.add_entity(id.clone(), 2, 3, &offsets));

        assert!(terrain.add_wall(3, 3, &mut bus));
        // occupancy persists
        assert_eq!(terrain.anchor_of(&id), Some((2, 3)));
        // but the footprint is no longer fully walkable
        let tiles: Vec<(i32, i32)> = offsets.iter().map(|(dx, dy)| (2 + dx, 3 + dy)).collect();
        assert!(!tiles.iter().all(|t| terrain.tile_walkable(*t)));

        // moving this entity onto a destination overlapping the wall fails with no state change.
        let before = terrain.anchor_of(&id);
        assert!(!terrain.move_entity(&id, 3, 3, &mut bus));
        assert_eq!(terrain.anchor_of(&id), before);
    }

    #[test]
    fn moving_to_current_anchor_on_walkable_tile_is_a_no_op_success() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        let id: EntityId = "a".into();
        terrain.add_entity(id.clone(), 1, 1, &[(0, 0)]);
        assert!(terrain.move_entity(&id, 1, 1, &mut bus));
        assert_eq!(terrain.anchor_of(&id), Some((1, 1)));
    }

    #[test]
    fn remove_nonexistent_entity_is_a_no_op() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        assert!(!terrain.remove_entity(&"ghost".into()));
    }

    #[test]
    fn jump_onto_void_succeeds_and_reports_landed_on_void_but_normal_move_rejects_it() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        terrain.add_effect(EffectKind::ImpassableVoid, &[(4, 4)], json!({}), &mut bus);
        let id: EntityId = "jumper".into();
        terrain.add_entity(id.clone(), 0, 0, &[(0, 0)]);

        assert!(!terrain.move_entity(&id, 4, 4, &mut bus));
        assert_eq!(terrain.move_entity_jump(&id, 4, 4, &mut bus), Some(true));
        assert_eq!(terrain.anchor_of(&id), Some((4, 4)));
    }

    #[test]
    fn gradient_aura_cost_decreases_with_distance() {
        let mut terrain = GridTerrain::new(10, 10, 1.0);
        let mut bus = fresh_bus();
        terrain.add_effect(
            EffectKind::DangerousAura,
            &[(5, 5), (6, 5), (7, 5)],
            json!({"source": [5, 5], "radius": 3, "gradient": true, "difficulty": 5, "damage": 2, "aggravated": false}),
            &mut bus,
        );
        assert_eq!(terrain.get_movement_cost(5, 5), 4 + 3);
        assert_eq!(terrain.get_movement_cost(6, 5), 4 + 2);
        assert_eq!(terrain.get_movement_cost(7, 5), 4 + 1);
    }

    #[test]
    fn cached_path_matches_an_unobstructed_straight_line() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let path = terrain.cached_path((0, 0), (3, 0));
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(3, 0)));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn precompute_paths_primes_the_cache_so_a_later_query_is_a_hit() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        terrain.precompute_paths();
        let path = terrain.cached_path((0, 0), (2, 2));
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(2, 2)));
    }

    #[test]
    fn cached_path_is_invalidated_after_a_wall_is_added() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        assert!(!terrain.cached_path((0, 0), (2, 0)).is_empty());
        terrain.add_wall(1, 0, &mut bus);
        let path = terrain.cached_path((0, 0), (2, 0));
        assert!(path.iter().all(|&t| t != (1, 0)));
    }

    #[test]
    fn cached_reachable_tiles_respects_the_budget() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let tiles = terrain.cached_reachable_tiles((2, 2), 1);
        assert!(tiles.iter().any(|&(x, y, c)| (x, y) == (2, 2) && c == 0));
        assert!(tiles.iter().all(|&(_, _, c)| c <= 1));
        assert!(tiles.iter().any(|&(x, y, _)| (x, y) == (3, 2)));
    }

    #[test]
    fn forbid_landing_hook_vetoes_a_move_that_is_otherwise_legal() {
        let mut terrain = GridTerrain::new(5, 5, 1.0);
        let mut bus = fresh_bus();
        let id: EntityId = "scout".into();
        terrain.add_entity(id.clone(), 0, 0, &[(0, 0)]);
        terrain.set_forbid_landing(|(x, y)| (x, y) == (1, 0));

        assert!(!terrain.move_entity(&id, 1, 0, &mut bus));
        assert_eq!(terrain.anchor_of(&id), Some((0, 0)));

        assert!(terrain.move_entity(&id, 0, 1, &mut bus));
        assert_eq!(terrain.anchor_of(&id), Some((0, 1)));
    }
}
