use super::CameraRig;
use crate::ecs::{Entity, World};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Maps sessions to the rig each one drives.
///
/// Entries are resolved lazily by scanning the world and revalidated on every
/// lookup, so a despawned rig is never handed out.
#[derive(Debug, Default)]
pub struct RigRegistry {
    entries: HashMap<SessionId, Entity>,
}

impl RigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session's rig, discovering it when the session has none.
    ///
    /// Discovery succeeds only when exactly one live rig exists and no other
    /// session already owns it.
    pub fn resolve(&mut self, session: SessionId, world: &World) -> Option<Entity> {
        if let Some(&rig) = self.entries.get(&session) {
            if world.has::<CameraRig>(rig) {
                return Some(rig);
            }
            log::debug!("[registry] {session:?} dropped stale rig {rig:?}");
            self.entries.remove(&session);
        }

        let candidates: Vec<Entity> = world
            .entities_with::<CameraRig>()
            .into_iter()
            .filter(|rig| !self.entries.values().any(|owned| owned == rig))
            .collect();

        match candidates.as_slice() {
            [] => None,
            [rig] => {
                log::debug!("[registry] {session:?} resolved rig {rig:?}");
                self.entries.insert(session, *rig);
                Some(*rig)
            }
            many => {
                log::warn!(
                    "[registry] {session:?} found {} unclaimed rigs; register one explicitly",
                    many.len()
                );
                None
            }
        }
    }

    pub fn register(&mut self, session: SessionId, rig: Entity) -> Option<Entity> {
        self.entries.insert(session, rig)
    }

    /// Forgets the session's rig. The rig itself is left untouched.
    pub fn release(&mut self, session: SessionId) -> Option<Entity> {
        self.entries.remove(&session)
    }

    pub fn get(&self, session: SessionId) -> Option<Entity> {
        self.entries.get(&session).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::{RigConfig, despawn_rig, spawn_rig};

    const MAIN: SessionId = SessionId(1);

    #[test]
    fn resolves_the_only_rig_lazily() {
        let mut world = World::new();
        let rig = spawn_rig(&mut world, &RigConfig::default()).unwrap();
        let mut registry = RigRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.resolve(MAIN, &world), Some(rig));
        assert_eq!(registry.get(MAIN), Some(rig));
    }

    #[test]
    fn empty_world_yields_no_instance() {
        let world = World::new();
        let mut registry = RigRegistry::new();

        assert_eq!(registry.resolve(MAIN, &world), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn teardown_then_resolve_yields_no_instance() {
        let mut world = World::new();
        let rig = spawn_rig(&mut world, &RigConfig::default()).unwrap();
        let mut registry = RigRegistry::new();
        registry.resolve(MAIN, &world);

        despawn_rig(&mut world, rig).unwrap();
        registry.release(MAIN);

        assert_eq!(registry.resolve(MAIN, &world), None);
    }

    #[test]
    fn stale_entry_is_replaced_by_live_rig() {
        let mut world = World::new();
        let old = spawn_rig(&mut world, &RigConfig::default()).unwrap();
        let mut registry = RigRegistry::new();
        registry.resolve(MAIN, &world);

        despawn_rig(&mut world, old).unwrap();
        let new = spawn_rig(&mut world, &RigConfig::default()).unwrap();

        assert_eq!(registry.resolve(MAIN, &world), Some(new));
        assert_ne!(old, new);
    }

    #[test]
    fn ambiguous_scan_requires_explicit_registration() {
        let mut world = World::new();
        let first = spawn_rig(&mut world, &RigConfig::default()).unwrap();
        let second = spawn_rig(&mut world, &RigConfig::default()).unwrap();
        let mut registry = RigRegistry::new();

        assert_eq!(registry.resolve(MAIN, &world), None);

        registry.register(MAIN, first);
        assert_eq!(registry.resolve(MAIN, &world), Some(first));
        assert_eq!(registry.resolve(SessionId(2), &world), Some(second));
        assert_eq!(registry.len(), 2);
    }
}
