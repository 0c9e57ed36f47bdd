//! Typed component storage keyed by internal entity ID, fronted by stable
//! string IDs.
//!
//! The reference implementation (`ecs/ecs_manager.py`) wraps the `esper`
//! library and leaks raw integer entity IDs to every caller. The teacher
//! crate does the same with raw `bevy_ecs::Entity` values. Per the design
//! notes this store closes that gap: every external API accepts and returns
//! [`EntityId`] (a stable string), and the `bevy_ecs::Entity` backing it is
//! never observable outside this module.

use std::collections::HashMap;
use std::fmt;

use bevy_ecs::component::Component;
use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;

use crate::error::{TacticsError, TacticsResult};

/// A stable, externally visible entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId(value)
    }
}

/// Entity → typed-component map with stable string IDs and iteration over
/// type tuples.
pub struct EcsStore {
    world: World,
    id_to_entity: HashMap<EntityId, Entity>,
    entity_to_id: HashMap<Entity, EntityId>,
    next_ordinal: u64,
}

impl EcsStore {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            id_to_entity: HashMap::new(),
            entity_to_id: HashMap::new(),
            next_ordinal: 0,
        }
    }

    fn mint_id(&mut self) -> EntityId {
        loop {
            let candidate = EntityId(format!("entity-{}", self.next_ordinal));
            self.next_ordinal += 1;
            if !self.id_to_entity.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Creates a new entity with an auto-generated string ID.
    pub fn spawn(&mut self) -> EntityId {
        let id = self.mint_id();
        let entity = self.world.spawn_empty().id();
        self.id_to_entity.insert(id.clone(), entity);
        self.entity_to_id.insert(entity, id.clone());
        id
    }

    /// Creates a new entity under a caller-chosen string ID.
    ///
    /// # Errors
    /// Returns [`TacticsError::DuplicateEntity`] if `id` is already in use.
    pub fn spawn_with_id(&mut self, id: impl Into<EntityId>) -> TacticsResult<EntityId> {
        let id = id.into();
        if self.id_to_entity.contains_key(&id) {
            return Err(TacticsError::DuplicateEntity(id));
        }
        let entity = self.world.spawn_empty().id();
        self.id_to_entity.insert(id.clone(), entity);
        self.entity_to_id.insert(entity, id.clone());
        Ok(id)
    }

    /// Removes an entity and all of its components.
    ///
    /// # Errors
    /// Returns [`TacticsError::EntityNotFound`] if `id` is unknown.
    pub fn delete_entity(&mut self, id: &EntityId) -> TacticsResult<()> {
        let entity = self.resolve_entity(id).ok_or_else(|| TacticsError::EntityNotFound(id.clone()))?;
        self.world.despawn(entity);
        self.id_to_entity.remove(id);
        self.entity_to_id.remove(&entity);
        Ok(())
    }

    pub fn entity_exists(&self, id: &EntityId) -> bool {
        self.id_to_entity.contains_key(id)
    }

    pub fn resolve_entity(&self, id: &EntityId) -> Option<Entity> {
        self.id_to_entity.get(id).copied()
    }

    pub fn id_for(&self, entity: Entity) -> Option<&EntityId> {
        self.entity_to_id.get(&entity)
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.id_to_entity.keys()
    }

    /// Inserts (or replaces) a component of type `T` on `id`.
    pub fn add_component<T: Component>(&mut self, id: &EntityId, component: T) -> TacticsResult<()> {
        let entity = self.resolve_entity(id).ok_or_else(|| TacticsError::EntityNotFound(id.clone()))?;
        self.world.entity_mut(entity).insert(component);
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, id: &EntityId) -> TacticsResult<()> {
        let entity = self.resolve_entity(id).ok_or_else(|| TacticsError::EntityNotFound(id.clone()))?;
        self.world.entity_mut(entity).remove::<T>();
        Ok(())
    }

    pub fn get_component<T: Component + Clone>(&self, id: &EntityId) -> TacticsResult<T> {
        self.try_get::<T>(id).ok_or_else(|| TacticsError::ComponentNotFound {
            entity: id.clone(),
            component_type: std::any::type_name::<T>(),
        })
    }

    pub fn try_get<T: Component + Clone>(&self, id: &EntityId) -> Option<T> {
        let entity = self.resolve_entity(id)?;
        self.world.get::<T>(entity).cloned()
    }

    pub fn has_component<T: Component>(&self, id: &EntityId) -> bool {
        match self.resolve_entity(id) {
            Some(entity) => self.world.get::<T>(entity).is_some(),
            None => false,
        }
    }

    /// Mutates component `T` on `id` in place via `f`, if present.
    pub fn with_component_mut<T: Component, R>(&mut self, id: &EntityId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let entity = self.resolve_entity(id)?;
        let mut comp = self.world.get_mut::<T>(entity)?;
        Some(f(&mut comp))
    }

    /// Lazily iterates over all entities possessing a `T` component,
    /// in a stable order (ascending by internal entity index, which matches
    /// insertion order for this store since entities are never recycled by
    /// index reuse within a single `EcsStore` lifetime).
    pub fn iter<T: Component + Clone>(&self) -> impl Iterator<Item = (EntityId, T)> + '_ {
        let mut out: Vec<(Entity, T)> = self
            .world
            .iter_entities()
            .filter_map(|e| self.world.get::<T>(e.id()).map(|c| (e.id(), c.clone())))
            .collect();
        out.sort_by_key(|(e, _)| e.index());
        out.into_iter()
            .filter_map(move |(e, c)| self.entity_to_id.get(&e).cloned().map(|id| (id, c)))
    }

    /// Lazily iterates over all entities possessing both `A` and `B`.
    pub fn iter_with2<A: Component + Clone, B: Component + Clone>(
        &self,
    ) -> impl Iterator<Item = (EntityId, A, B)> + '_ {
        let mut out: Vec<(Entity, A, B)> = self
            .world
            .iter_entities()
            .filter_map(|e| {
                let a = self.world.get::<A>(e.id())?.clone();
                let b = self.world.get::<B>(e.id())?.clone();
                Some((e.id(), a, b))
            })
            .collect();
        out.sort_by_key(|(e, _, _)| e.index());
        out.into_iter()
            .filter_map(move |(e, a, b)| self.entity_to_id.get(&e).cloned().map(|id| (id, a, b)))
    }

    pub fn entity_count(&self) -> usize {
        self.id_to_entity.len()
    }
}

impl Default for EcsStore {
    fn default() -> Self {
        Self::new()
    }
}
