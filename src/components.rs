//! ECS components for the tactical combat core.
//!
//! Shaped after the teacher's `components.rs` (small, mostly-pure structs
//! with a handful of behavior methods and `Default`/constructor helpers), but
//! replacing its continuous-space war-sim domain (velocity, squads, morale,
//! destructibles) with the grid-combat domain from the specification.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bevy_ecs::component::Component;
use serde::{Deserialize, Serialize};

/// Anchor `(x, y)` plus rectangular extent. An entity occupies
/// `{(x+dx, y+dy) | 0 <= dx < width, 0 <= dy < height}` unless overridden by
/// a [`BodyFootprint`].
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn point(x: i32, y: i32) -> Self {
        Self::new(x, y, 1, 1)
    }

    /// Default rectangular footprint tiles, ignoring any `BodyFootprint`.
    pub fn rect_tiles(&self) -> Vec<(i32, i32)> {
        let mut tiles = Vec::with_capacity((self.width * self.height) as usize);
        for dx in 0..self.width {
            for dy in 0..self.height {
                tiles.push((self.x + dx, self.y + dy));
            }
        }
        tiles
    }
}

/// Explicit footprint offsets that override [`Position`]'s rectangle. Must be
/// non-empty; each offset is `(dx, dy)` relative to the anchor.
#[derive(Component, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFootprint {
    offsets: Vec<(i32, i32)>,
}

impl BodyFootprint {
    pub fn new(offsets: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let offsets: Vec<(i32, i32)> = offsets.into_iter().collect();
        assert!(!offsets.is_empty(), "BodyFootprint offsets must be non-empty");
        Self { offsets }
    }

    pub fn from_size(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "footprint dimensions must be positive");
        let mut offsets = Vec::with_capacity((width * height) as usize);
        for dx in 0..width {
            for dy in 0..height {
                offsets.push((dx, dy));
            }
        }
        Self { offsets }
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    pub fn expand(&self, anchor_x: i32, anchor_y: i32) -> Vec<(i32, i32)> {
        self.offsets.iter().map(|(dx, dy)| (anchor_x + dx, anchor_y + dy)).collect()
    }
}

/// Compass-style facing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Orientation {
    fn from_delta(dx: i32, dy: i32) -> Self {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Orientation::North,
            (1, -1) => Orientation::NorthEast,
            (1, 0) => Orientation::East,
            (1, 1) => Orientation::SouthEast,
            (0, 1) => Orientation::South,
            (-1, 1) => Orientation::SouthWest,
            (-1, 0) => Orientation::West,
            (-1, -1) => Orientation::NorthWest,
            _ => Orientation::South,
        }
    }
}

/// Current orientation; mutable unless `fixed`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facing {
    pub orientation: Orientation,
    fixed: bool,
}

impl Facing {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation, fixed: false }
    }

    pub fn fixed(orientation: Orientation) -> Self {
        Self { orientation, fixed: true }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Re-orients towards the vector from `origin` to `destination`, a no-op
    /// if fixed or if the positions coincide.
    pub fn face_towards_position(&mut self, origin: (i32, i32), destination: (i32, i32)) {
        if self.fixed || origin == destination {
            return;
        }
        let dx = destination.0 - origin.0;
        let dy = destination.1 - origin.1;
        self.orientation = Orientation::from_delta(dx, dy);
    }
}

/// Minimal read surface onto the (out-of-scope) character-sheet domain: the
/// traits feeding initiative, the states feeding night vision / conditions,
/// and life status. The core never owns or mutates a character sheet; it
/// only reads through this trait.
pub trait CharacterSheet: Send + Sync {
    fn self_control(&self) -> i32;
    fn instinct(&self) -> i32;
    fn wits(&self) -> i32;
    fn is_dead(&self) -> bool;
    fn states(&self) -> HashSet<String>;
    /// Narrow write surface used by the movement engine to keep a character
    /// sheet's presentation-facing orientation in sync with [`Facing`].
    /// Default no-op: most test fixtures do not need this.
    fn set_orientation(&self, _orientation: Orientation) {}
}

/// Link to a character-sheet domain object.
#[derive(Component, Clone)]
pub struct CharacterRef(pub Arc<dyn CharacterSheet>);

impl CharacterRef {
    pub fn new(character: Arc<dyn CharacterSheet>) -> Self {
        Self(character)
    }
}

/// Optional team affiliation.
#[derive(Component, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    team_id: Option<String>,
}

impl Team {
    pub fn new(team_id: Option<impl Into<String>>) -> Self {
        Self { team_id: team_id.map(Into::into) }
    }

    pub fn none() -> Self {
        Self { team_id: None }
    }

    pub fn id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn set_team(&mut self, team_id: Option<impl Into<String>>) {
        self.team_id = team_id.map(Into::into);
    }
}

/// Per-entity tuning data for initiative resolution (see [`crate::turn_order`]).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiative {
    pub bonus: i32,
    pub override_value: Option<i32>,
    pub enabled: bool,
}

impl Default for Initiative {
    fn default() -> Self {
        Self { bonus: 0, override_value: None, enabled: true }
    }
}

impl Initiative {
    /// Resolves the final initiative from `base` (trait-derived) and
    /// `character_modifier` (any additional modifier from the character
    /// sheet), per the spec's resolution order.
    pub fn resolve(&self, base: i32, character_modifier: i32) -> i32 {
        if !self.enabled {
            return base + character_modifier;
        }
        if let Some(value) = self.override_value {
            return value + character_modifier;
        }
        base + character_modifier + self.bonus
    }
}

/// Per-turn movement distance budget spent so far; reset at turn start.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementUsage {
    pub distance: i32,
}

impl MovementUsage {
    pub fn reset(&mut self) {
        self.distance = 0;
    }

    pub fn add(&mut self, amount: i32) {
        self.distance += amount;
    }
}

/// A single tracked timed condition; duration semantics are owned by callers
/// outside the core (combat rules), this just records presence and an
/// optional remaining-turns counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub remaining_turns: Option<u32>,
}

/// Active conditions plus dynamic (threshold-derived) states.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionTracker {
    conditions: HashMap<String, ConditionEntry>,
    dynamic_states: HashSet<String>,
}

impl ConditionTracker {
    pub fn add_condition(&mut self, name: impl Into<String>, remaining_turns: Option<u32>) {
        self.conditions.insert(name.into(), ConditionEntry { remaining_turns });
    }

    pub fn remove_condition(&mut self, name: &str) {
        self.conditions.remove(name);
    }

    pub fn set_dynamic_state(&mut self, name: impl Into<String>, active: bool) {
        let name = name.into();
        if active {
            self.dynamic_states.insert(name);
        } else {
            self.dynamic_states.remove(&name);
        }
    }

    /// Union of timed conditions and dynamic states tracked for the entity.
    pub fn active_states(&self) -> HashSet<String> {
        self.conditions.keys().cloned().collect::<HashSet<_>>().union(&self.dynamic_states).cloned().collect()
    }
}

/// Cover kind, with the standard defense-dice bonuses from the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverKind {
    Light,
    Heavy,
    Retrenchment,
}

impl CoverKind {
    pub fn standard_bonus(self) -> i32 {
        match self {
            CoverKind::Light => -1,
            CoverKind::Heavy => 0,
            CoverKind::Retrenchment => 1,
        }
    }
}

/// A cover object occupying (typically) one tile.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    pub kind: CoverKind,
    pub bonus: i32,
    pub destructible: bool,
}

impl Cover {
    /// Builds a cover component with the standard bonus for `kind`.
    pub fn standard(kind: CoverKind) -> Self {
        Self { kind, bonus: kind.standard_bonus(), destructible: true }
    }
}

/// Generic static-structure durability (decor, barricades, destructible cover).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub vigor: i32,
    pub vigor_max: i32,
    pub armor_level: i32,
}

/// Whether a unit of damage is superficial (halved by armor) or aggravated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    Superficial,
    Aggravated,
}

impl Structure {
    pub fn new(vigor_max: i32, armor_level: i32) -> Self {
        Self { vigor: vigor_max, vigor_max, armor_level }
    }

    /// Applies `amount` damage, halving (rounded up, minimum 1) if
    /// superficial. Returns the effective damage actually subtracted.
    pub fn apply_damage(&mut self, amount: i32, kind: DamageKind) -> i32 {
        if amount <= 0 {
            return 0;
        }
        let mut effective = amount;
        if matches!(kind, DamageKind::Superficial) {
            effective = (amount + 1) / 2;
        }
        if effective <= 0 {
            effective = 1;
        }
        effective = effective.min(self.vigor);
        self.vigor -= effective;
        effective
    }

    pub fn destroyed(&self) -> bool {
        self.vigor <= 0
    }
}
