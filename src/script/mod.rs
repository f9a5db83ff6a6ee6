//! Scripts
//!
//! A script owns every listener it binds, plus an index of the ids it resolved
//! per scope. Containers outlive scripts across reloads, so `unload()` must
//! take every listener back out.

pub mod binder;
pub mod manifest;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::info;

use crate::listener::EventListener;

pub use binder::{GlobalContainers, Registries, ScriptBinder};
pub use manifest::{BindingManifest, EntryBuilder, IdFilter};

/// Where a binding lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Npc,
    Zone,
    Item,
    Castle,
    Fortress,
    Global,
    GlobalNpcs,
    GlobalMonsters,
    GlobalPlayers,
    Olympiad,
}

impl Scope {
    /// Id-scoped bindings resolve ids through a registry; the rest share one
    /// global container.
    pub fn is_id_scoped(self) -> bool {
        matches!(
            self,
            Scope::Npc | Scope::Zone | Scope::Item | Scope::Castle | Scope::Fortress
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Npc => "npc",
            Scope::Zone => "zone",
            Scope::Item => "item",
            Scope::Castle => "castle",
            Scope::Fortress => "fortress",
            Scope::Global => "global",
            Scope::GlobalNpcs => "global_npcs",
            Scope::GlobalMonsters => "global_monsters",
            Scope::GlobalPlayers => "global_players",
            Scope::Olympiad => "olympiad",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Script {
    name: Arc<str>,
    listeners: Mutex<Vec<Arc<EventListener>>>,
    registered_ids: DashMap<Scope, BTreeSet<i32>>,
}

impl Script {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            listeners: Mutex::new(Vec::new()),
            registered_ids: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn owner(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn track(&self, listeners: &[Arc<EventListener>]) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(listeners.iter().cloned());
    }

    pub(crate) fn record_id(&self, scope: Scope, id: i32) {
        self.registered_ids.entry(scope).or_default().insert(id);
    }

    /// Ids this script bound to in `scope`, ascending
    pub fn registered_ids(&self, scope: Scope) -> Vec<i32> {
        self.registered_ids
            .get(&scope)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, scope: Scope, id: i32) -> bool {
        self.registered_ids
            .get(&scope)
            .is_some_and(|ids| ids.contains(&id))
    }

    pub fn listeners(&self) -> Vec<Arc<EventListener>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Unregister every listener, newest first. Returns how many were still
    /// registered.
    pub fn unload(&self) -> usize {
        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        self.registered_ids.clear();

        let removed = listeners
            .iter()
            .rev()
            .filter(|listener| listener.unregister_me())
            .count();

        info!("Unloaded script {} ({} listeners)", self.name, removed);
        removed
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_classes() {
        assert!(Scope::Npc.is_id_scoped());
        assert!(Scope::Fortress.is_id_scoped());
        assert!(!Scope::Global.is_id_scoped());
        assert!(!Scope::Olympiad.is_id_scoped());
        assert_eq!(Scope::GlobalMonsters.to_string(), "global_monsters");
    }

    #[test]
    fn test_id_index() {
        let script = Script::new("indexer");
        script.record_id(Scope::Npc, 30002);
        script.record_id(Scope::Npc, 30001);
        script.record_id(Scope::Npc, 30001);

        assert_eq!(script.registered_ids(Scope::Npc), vec![30001, 30002]);
        assert!(script.is_registered(Scope::Npc, 30002));
        assert!(!script.is_registered(Scope::Zone, 30002));
        assert!(script.registered_ids(Scope::Item).is_empty());
    }
}
