//! Script binding
//!
//! Resolves (scope, ids) to listener containers and attaches callbacks on
//! behalf of a script. Every failure here is soft: an unresolved id or a
//! callback that doesn't fit its event type is logged and skipped, and the
//! rest of the script keeps loading.

use std::sync::Arc;

use tracing::{debug, warn};

use super::manifest::{BindingManifest, ManifestEntry, resolve_ids};
use super::{Scope, Script};
use crate::error::BindError;
use crate::event::{EventPayload, EventType, ReturnType};
use crate::listener::{Callback, EventListener, ListenerKind, ListenersContainer};
use crate::world::ContainerRegistry;

/// Registry used when a kind has no loaded templates
struct EmptyRegistry;

impl ContainerRegistry for EmptyRegistry {
    fn container(&self, _id: i32) -> Option<Arc<ListenersContainer>> {
        None
    }
}

/// Id lookups for every id-scoped binding
#[derive(Clone)]
pub struct Registries {
    pub npcs: Arc<dyn ContainerRegistry>,
    pub zones: Arc<dyn ContainerRegistry>,
    pub items: Arc<dyn ContainerRegistry>,
    pub castles: Arc<dyn ContainerRegistry>,
    pub fortresses: Arc<dyn ContainerRegistry>,
}

impl Registries {
    pub fn empty() -> Self {
        let empty: Arc<dyn ContainerRegistry> = Arc::new(EmptyRegistry);
        Self {
            npcs: empty.clone(),
            zones: empty.clone(),
            items: empty.clone(),
            castles: empty.clone(),
            fortresses: empty,
        }
    }

    pub fn for_scope(&self, scope: Scope) -> Option<&Arc<dyn ContainerRegistry>> {
        match scope {
            Scope::Npc => Some(&self.npcs),
            Scope::Zone => Some(&self.zones),
            Scope::Item => Some(&self.items),
            Scope::Castle => Some(&self.castles),
            Scope::Fortress => Some(&self.fortresses),
            _ => None,
        }
    }
}

/// The shared containers for id-less scopes
#[derive(Debug, Clone)]
pub struct GlobalContainers {
    pub global: Arc<ListenersContainer>,
    pub npcs: Arc<ListenersContainer>,
    pub monsters: Arc<ListenersContainer>,
    pub players: Arc<ListenersContainer>,
    pub olympiad: Arc<ListenersContainer>,
}

impl GlobalContainers {
    pub fn new() -> Self {
        Self {
            global: Arc::new(ListenersContainer::new(Scope::Global.as_str())),
            npcs: Arc::new(ListenersContainer::new(Scope::GlobalNpcs.as_str())),
            monsters: Arc::new(ListenersContainer::new(Scope::GlobalMonsters.as_str())),
            players: Arc::new(ListenersContainer::new(Scope::GlobalPlayers.as_str())),
            olympiad: Arc::new(ListenersContainer::new(Scope::Olympiad.as_str())),
        }
    }

    pub fn for_scope(&self, scope: Scope) -> Option<&Arc<ListenersContainer>> {
        match scope {
            Scope::Global => Some(&self.global),
            Scope::GlobalNpcs => Some(&self.npcs),
            Scope::GlobalMonsters => Some(&self.monsters),
            Scope::GlobalPlayers => Some(&self.players),
            Scope::Olympiad => Some(&self.olympiad),
            _ => None,
        }
    }
}

impl Default for GlobalContainers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScriptBinder {
    registries: Registries,
    globals: GlobalContainers,
}

impl ScriptBinder {
    pub fn new(registries: Registries, globals: GlobalContainers) -> Self {
        Self { registries, globals }
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn globals(&self) -> &GlobalContainers {
        &self.globals
    }

    /// Resolve ids to containers, recording each resolved id on the script.
    /// Shared scopes ignore `ids` and resolve to their single container.
    pub fn resolve(&self, script: &Script, scope: Scope, ids: &[i32]) -> Vec<Arc<ListenersContainer>> {
        if let Some(container) = self.globals.for_scope(scope) {
            return vec![container.clone()];
        }

        let Some(registry) = self.registries.for_scope(scope) else {
            return Vec::new();
        };

        let mut containers = Vec::with_capacity(ids.len());
        for &id in ids {
            match registry.container(id) {
                Some(container) => {
                    script.record_id(scope, id);
                    containers.push(container);
                }
                None => {
                    let err = BindError::UnresolvedId { scope, id };
                    warn!("Script {}: {}, skipping", script.name(), err);
                }
            }
        }
        containers
    }

    pub fn register_consumer<E, F>(
        &self,
        script: &Script,
        event_type: EventType,
        scope: Scope,
        ids: &[i32],
        f: F,
    ) -> Vec<Arc<EventListener>>
    where
        E: EventPayload,
        F: Fn(&E) + Send + Sync + 'static,
    {
        match Callback::consumer::<E, F>(event_type, f) {
            Ok(callback) => self.bind(script, event_type, scope, ids, callback, ListenerKind::Consumer, 0),
            Err(err) => skip(script, err),
        }
    }

    pub fn register_function<E, R, F>(
        &self,
        script: &Script,
        event_type: EventType,
        scope: Scope,
        ids: &[i32],
        f: F,
    ) -> Vec<Arc<EventListener>>
    where
        E: EventPayload,
        R: ReturnType,
        F: Fn(&E) -> Option<R> + Send + Sync + 'static,
    {
        match Callback::function::<E, R, F>(event_type, f) {
            Ok(callback) => self.bind(script, event_type, scope, ids, callback, ListenerKind::Function, 0),
            Err(err) => skip(script, err),
        }
    }

    pub fn register_runnable<F>(
        &self,
        script: &Script,
        event_type: EventType,
        scope: Scope,
        ids: &[i32],
        f: F,
    ) -> Vec<Arc<EventListener>>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback = Callback::runnable(f);
        self.bind(script, event_type, scope, ids, callback, ListenerKind::Runnable, 0)
    }

    pub fn register_dummy(
        &self,
        script: &Script,
        event_type: EventType,
        scope: Scope,
        ids: &[i32],
    ) -> Vec<Arc<EventListener>> {
        self.bind(script, event_type, scope, ids, Callback::dummy(), ListenerKind::Dummy, 0)
    }

    /// Bind every manifest entry in declaration order
    pub fn register_manifest(&self, script: &Script, manifest: BindingManifest) -> Vec<Arc<EventListener>> {
        let mut bound = Vec::new();
        for entry in manifest.into_entries() {
            let ManifestEntry {
                event_type,
                scope,
                filters,
                priority,
                callback,
            } = entry;

            let callback = match callback {
                Ok(callback) => callback,
                Err(err) => {
                    skip(script, err);
                    continue;
                }
            };

            let ids = if scope.is_id_scoped() {
                let ids = resolve_ids(&filters, self.registries.for_scope(scope));
                if ids.is_empty() {
                    debug!(
                        "Script {}: {} binding on {} has no ids, nothing bound",
                        script.name(),
                        event_type,
                        scope
                    );
                    continue;
                }
                ids
            } else {
                Vec::new()
            };

            bound.extend(self.bind(
                script,
                event_type,
                scope,
                &ids,
                callback,
                ListenerKind::Manifest,
                priority,
            ));
        }
        bound
    }

    #[allow(clippy::too_many_arguments)]
    fn bind(
        &self,
        script: &Script,
        event_type: EventType,
        scope: Scope,
        ids: &[i32],
        callback: Callback,
        kind: ListenerKind,
        priority: i32,
    ) -> Vec<Arc<EventListener>> {
        let listeners: Vec<Arc<EventListener>> = self
            .resolve(script, scope, ids)
            .iter()
            .map(|container| {
                container.add(Arc::new(EventListener::new(
                    container,
                    event_type,
                    script.owner(),
                    kind,
                    priority,
                    callback.clone(),
                )))
            })
            .collect();

        script.track(&listeners);
        debug!(
            "Script {} bound {} {:?} listener(s) for {} on {}",
            script.name(),
            listeners.len(),
            kind,
            event_type,
            scope
        );
        listeners
    }
}

fn skip(script: &Script, err: BindError) -> Vec<Arc<EventListener>> {
    warn!("Script {}: {}, binding skipped", script.name(), err);
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{OnNpcCanBeSeen, OnNpcTalk, OnPlayerLogin, DamageReturn, TerminateReturn};
    use crate::listener::ListenerSource;
    use crate::world::{Template, TemplateKind, TemplateTable};

    fn binder() -> ScriptBinder {
        let mut npcs = TemplateTable::new(TemplateKind::Npc);
        npcs.insert(Template::new(TemplateKind::Npc, 30001, "Elder Villager", 20));
        npcs.insert(Template::new(TemplateKind::Npc, 30002, "Guard", 20));
        npcs.insert(Template::new(TemplateKind::Npc, 20001, "Gremlin", 1).monster());

        let mut registries = Registries::empty();
        registries.npcs = Arc::new(npcs);
        ScriptBinder::new(registries, GlobalContainers::new())
    }

    fn npc_container(binder: &ScriptBinder, id: i32) -> Arc<ListenersContainer> {
        binder.registries().npcs.container(id).unwrap()
    }

    #[test]
    fn test_unresolved_ids_are_skipped() {
        let binder = binder();
        let script = Script::new("partial");

        let bound = binder.register_consumer::<OnNpcTalk, _>(
            &script,
            EventType::OnNpcTalk,
            Scope::Npc,
            &[30001, 99999, 30002],
            |_| {},
        );

        assert_eq!(bound.len(), 2);
        assert_eq!(script.registered_ids(Scope::Npc), vec![30001, 30002]);
        assert!(npc_container(&binder, 30001).has_listener(EventType::OnNpcTalk));
        assert_eq!(script.listener_count(), 2);
    }

    #[test]
    fn test_mismatched_binding_does_not_stop_script() {
        let binder = binder();
        let script = Script::new("mismatch");

        let bad = binder.register_function::<OnNpcCanBeSeen, DamageReturn, _>(
            &script,
            EventType::OnNpcCanBeSeen,
            Scope::Npc,
            &[30001],
            |_| None,
        );
        let good = binder.register_function::<OnNpcCanBeSeen, TerminateReturn, _>(
            &script,
            EventType::OnNpcCanBeSeen,
            Scope::Npc,
            &[30001],
            |_| Some(TerminateReturn::proceed()),
        );

        assert!(bad.is_empty());
        assert_eq!(good.len(), 1);
        assert_eq!(npc_container(&binder, 30001).count(EventType::OnNpcCanBeSeen), 1);
    }

    #[test]
    fn test_shared_scope_ignores_ids() {
        let binder = binder();
        let script = Script::new("logins");

        let bound = binder.register_runnable(&script, EventType::OnPlayerLogin, Scope::Global, &[1, 2], || {});
        binder.register_dummy(&script, EventType::OnPlayerLogin, Scope::GlobalPlayers, &[]);

        assert_eq!(bound.len(), 1);
        assert!(binder.globals().global.has_listener(EventType::OnPlayerLogin));
        assert!(binder.globals().players.has_listener(EventType::OnPlayerLogin));
        assert!(script.registered_ids(Scope::Global).is_empty());
    }

    #[test]
    fn test_unload_removes_everything() {
        let binder = binder();
        let script = Script::new("reloadable");

        binder.register_dummy(&script, EventType::OnNpcFirstTalk, Scope::Npc, &[30001, 30002]);
        binder.register_consumer::<OnPlayerLogin, _>(&script, EventType::OnPlayerLogin, Scope::Global, &[], |_| {});

        assert_eq!(script.unload(), 3);
        assert_eq!(script.unload(), 0);
        assert!(npc_container(&binder, 30001).is_empty());
        assert!(npc_container(&binder, 30002).is_empty());
        assert!(binder.globals().global.is_empty());
        assert!(script.registered_ids(Scope::Npc).is_empty());
    }

    #[test]
    fn test_same_callback_twice_binds_twice() {
        let binder = binder();
        let script = Script::new("twice");

        for _ in 0..2 {
            binder.register_dummy(&script, EventType::OnNpcTalk, Scope::Npc, &[30001]);
        }
        assert_eq!(npc_container(&binder, 30001).count(EventType::OnNpcTalk), 2);
    }
}
