use std::any::{Any, TypeId};
use std::collections::HashMap;
use thiserror::Error;

/// Generational handle to an entity in a [`World`].
///
/// A handle outlives the entity it names; once the slot is recycled the
/// generation no longer matches and every lookup through the stale handle
/// fails instead of aliasing the new occupant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Default)]
struct EntityRecord {
    generation: u32,
    alive: bool,
}

/// Marker trait for types that can be attached to entities.
pub trait Component: Any + Send + Sync {}

impl<T: Any + Send + Sync> Component for T {}

trait AnyStorage: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove(&mut self, entity: Entity);
}

struct ComponentMap<T: Component> {
    entries: HashMap<Entity, T>,
}

impl<T: Component> Default for ComponentMap<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Component> AnyStorage for ComponentMap<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, entity: Entity) {
        self.entries.remove(&entity);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcsError {
    #[error("entity {0:?} is not alive in this world")]
    NoSuchEntity(Entity),
}

/// Entity and component storage for the scene the rig lives in.
#[derive(Default)]
pub struct World {
    entities: Vec<EntityRecord>,
    free_list: Vec<u32>,
    storages: HashMap<TypeId, Box<dyn AnyStorage>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> Entity {
        if let Some(index) = self.free_list.pop() {
            let record = &mut self.entities[index as usize];
            record.alive = true;
            Entity::new(index, record.generation)
        } else {
            let index = self.entities.len() as u32;
            self.entities.push(EntityRecord {
                generation: 0,
                alive: true,
            });
            Entity::new(index, 0)
        }
    }

    pub fn despawn(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.validate_entity(entity)?;
        let record = &mut self.entities[entity.index as usize];
        record.alive = false;
        record.generation = record.generation.wrapping_add(1);
        for storage in self.storages.values_mut() {
            storage.remove(entity);
        }
        self.free_list.push(entity.index);
        Ok(())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities
            .get(entity.index as usize)
            .is_some_and(|record| record.alive && record.generation == entity.generation)
    }

    pub fn insert<T: Component>(
        &mut self,
        entity: Entity,
        component: T,
    ) -> Result<Option<T>, EcsError> {
        self.validate_entity(entity)?;
        Ok(self
            .ensure_component_storage::<T>()
            .entries
            .insert(entity, component))
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.contains(entity) {
            return None;
        }
        self.typed_storage::<T>()?.entries.get(&entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.contains(entity) {
            return None;
        }
        self.typed_storage_mut::<T>()?.entries.get_mut(&entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Live entities carrying a `T`, in slot order.
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .typed_storage::<T>()
            .map(|storage| storage.entries.keys().copied().collect())
            .unwrap_or_default();
        entities.sort();
        entities
    }

    fn validate_entity(&self, entity: Entity) -> Result<(), EcsError> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(EcsError::NoSuchEntity(entity))
        }
    }

    fn typed_storage<T: Component>(&self) -> Option<&ComponentMap<T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|storage| storage.as_any().downcast_ref::<ComponentMap<T>>())
    }

    fn typed_storage_mut<T: Component>(&mut self) -> Option<&mut ComponentMap<T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|storage| storage.as_any_mut().downcast_mut::<ComponentMap<T>>())
    }

    fn ensure_component_storage<T: Component>(&mut self) -> &mut ComponentMap<T> {
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentMap::<T>::default()));
        match storage.as_any_mut().downcast_mut::<ComponentMap<T>>() {
            Some(storage) => storage,
            None => unreachable!("component storage keyed by the wrong TypeId"),
        }
    }
}
