//! Binding manifests
//!
//! Declarative bindings: a script lists (event, scope, id filters, priority,
//! callback) entries and the binder applies them in declaration order.
//!
//! ```ignore
//! let manifest = BindingManifest::new()
//!     .on(EventType::OnNpcCanBeSeen, Scope::Npc)
//!     .range(20001..=20010)
//!     .npc_level(5)
//!     .priority(1)
//!     .function::<OnNpcCanBeSeen, TerminateReturn, _>(hide_from_low_levels);
//! ```

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::error::BindError;
use crate::event::{EventPayload, EventType, ReturnType};
use crate::listener::Callback;
use crate::world::ContainerRegistry;

/// Id producer for an entry. Filters on one entry are additive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    Ids(Vec<i32>),
    Range(RangeInclusive<i32>),
    /// Every template of the scope at this level
    NpcLevel(i32),
}

#[derive(Debug)]
pub struct ManifestEntry {
    pub event_type: EventType,
    pub scope: super::Scope,
    pub filters: Vec<IdFilter>,
    pub priority: i32,
    pub callback: Result<Callback, BindError>,
}

/// Union of every filter, ascending. Ranges and levels only yield ids the
/// registry knows; explicit ids are kept as given.
pub fn resolve_ids(filters: &[IdFilter], registry: Option<&Arc<dyn ContainerRegistry>>) -> Vec<i32> {
    let mut ids = BTreeSet::new();
    for filter in filters {
        match (filter, registry) {
            (IdFilter::Ids(list), _) => ids.extend(list.iter().copied()),
            (IdFilter::Range(range), Some(registry)) => ids.extend(registry.ids_in_range(range.clone())),
            (IdFilter::NpcLevel(level), Some(registry)) => ids.extend(registry.ids_at_level(*level)),
            (_, None) => {}
        }
    }
    ids.into_iter().collect()
}

#[derive(Debug, Default)]
pub struct BindingManifest {
    entries: Vec<ManifestEntry>,
}

impl BindingManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an entry for `event_type` in `scope`
    pub fn on(self, event_type: EventType, scope: super::Scope) -> EntryBuilder {
        EntryBuilder {
            manifest: self,
            event_type,
            scope,
            filters: Vec::new(),
            priority: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    fn push(mut self, entry: ManifestEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

#[must_use = "an entry is only added once a callback is given"]
pub struct EntryBuilder {
    manifest: BindingManifest,
    event_type: EventType,
    scope: super::Scope,
    filters: Vec<IdFilter>,
    priority: i32,
}

impl EntryBuilder {
    pub fn ids(mut self, ids: impl IntoIterator<Item = i32>) -> Self {
        self.filters.push(IdFilter::Ids(ids.into_iter().collect()));
        self
    }

    pub fn range(mut self, range: RangeInclusive<i32>) -> Self {
        self.filters.push(IdFilter::Range(range));
        self
    }

    pub fn npc_level(mut self, level: i32) -> Self {
        self.filters.push(IdFilter::NpcLevel(level));
        self
    }

    /// Lower runs first
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn consumer<E, F>(self, f: F) -> BindingManifest
    where
        E: EventPayload,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let callback = Callback::consumer::<E, F>(self.event_type, f);
        self.finish(callback)
    }

    pub fn function<E, R, F>(self, f: F) -> BindingManifest
    where
        E: EventPayload,
        R: ReturnType,
        F: Fn(&E) -> Option<R> + Send + Sync + 'static,
    {
        let callback = Callback::function::<E, R, F>(self.event_type, f);
        self.finish(callback)
    }

    pub fn runnable<F>(self, f: F) -> BindingManifest
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.finish(Ok(Callback::runnable(f)))
    }

    pub fn dummy(self) -> BindingManifest {
        self.finish(Ok(Callback::dummy()))
    }

    fn finish(self, callback: Result<Callback, BindError>) -> BindingManifest {
        let entry = ManifestEntry {
            event_type: self.event_type,
            scope: self.scope,
            filters: self.filters,
            priority: self.priority,
            callback,
        };
        self.manifest.push(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DamageReturn, OnNpcCanBeSeen, OnNpcSpawn, TerminateReturn};
    use crate::listener::{ListenerKind, ListenerSource, ListenersContainer};
    use crate::script::{GlobalContainers, Registries, Scope, Script, ScriptBinder};
    use crate::world::{Template, TemplateKind, TemplateTable};

    fn npcs() -> Arc<TemplateTable> {
        let mut npcs = TemplateTable::new(TemplateKind::Npc);
        for id in 20001..=20005 {
            npcs.insert(Template::new(TemplateKind::Npc, id, format!("Gremlin {}", id), 1).monster());
        }
        npcs.insert(Template::new(TemplateKind::Npc, 21000, "Orc", 7).monster());
        npcs.insert(Template::new(TemplateKind::Npc, 21001, "Orc Archer", 7).monster());
        Arc::new(npcs)
    }

    fn binder(npcs: Arc<TemplateTable>) -> ScriptBinder {
        let mut registries = Registries::empty();
        registries.npcs = npcs;
        ScriptBinder::new(registries, GlobalContainers::new())
    }

    fn container(npcs: &TemplateTable, id: i32) -> Arc<ListenersContainer> {
        npcs.container(id).unwrap()
    }

    #[test]
    fn test_filters_are_additive() {
        let npcs = npcs();
        let registry: Arc<dyn ContainerRegistry> = npcs.clone();
        let manifest = BindingManifest::new()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .ids([20001, 99999])
            .range(20003..=20004)
            .npc_level(7)
            .dummy();

        let entries = manifest.into_entries();
        assert_eq!(
            resolve_ids(&entries[0].filters, Some(&registry)),
            vec![20001, 20003, 20004, 21000, 21001, 99999]
        );
    }

    #[test]
    fn test_wide_range_only_yields_known_ids() {
        let npcs = npcs();
        let registry: Arc<dyn ContainerRegistry> = npcs.clone();
        let entries = BindingManifest::new()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .range(0..=i32::MAX)
            .dummy()
            .into_entries();

        assert_eq!(
            resolve_ids(&entries[0].filters, Some(&registry)),
            vec![20001, 20002, 20003, 20004, 20005, 21000, 21001]
        );
        assert!(resolve_ids(&entries[0].filters, None).is_empty());
    }

    #[test]
    fn test_wide_range_binds_every_template() {
        let npcs = npcs();
        let binder = binder(npcs.clone());
        let script = Script::new("wide");

        let manifest = BindingManifest::new()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .range(i32::MIN..=i32::MAX)
            .priority(2)
            .consumer::<OnNpcSpawn, _>(|_| {});

        let bound = binder.register_manifest(&script, manifest);
        assert_eq!(bound.len(), 7);
        assert!(bound.iter().all(|l| l.priority() == 2));
        assert_eq!(script.registered_ids(Scope::Npc).len(), 7);
    }

    #[test]
    fn test_priority_and_declaration_order() {
        let npcs = npcs();
        let binder = binder(npcs.clone());
        let script = Script::new("ordered");

        let manifest = BindingManifest::new()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .ids([20001])
            .priority(5)
            .consumer::<OnNpcSpawn, _>(|_| {})
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .ids([20001])
            .priority(1)
            .dummy()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .ids([20001])
            .priority(1)
            .runnable(|| {});

        let bound = binder.register_manifest(&script, manifest);
        assert_eq!(bound.len(), 3);
        assert!(bound.iter().all(|l| l.kind() == ListenerKind::Manifest));

        let order: Vec<_> = container(&npcs, 20001)
            .listeners(EventType::OnNpcSpawn)
            .iter()
            .map(|l| l.id())
            .collect();
        assert_eq!(order, vec![bound[1].id(), bound[2].id(), bound[0].id()]);
    }

    #[test]
    fn test_empty_id_set_is_inert() {
        let npcs = npcs();
        let binder = binder(npcs);
        let script = Script::new("inert");

        let manifest = BindingManifest::new()
            .on(EventType::OnNpcSpawn, Scope::Npc)
            .npc_level(99)
            .dummy();

        assert!(binder.register_manifest(&script, manifest).is_empty());
        assert_eq!(script.listener_count(), 0);
    }

    #[test]
    fn test_bad_entry_skipped_rest_bound() {
        let npcs = npcs();
        let binder = binder(npcs.clone());
        let script = Script::new("mixed");

        let manifest = BindingManifest::new()
            .on(EventType::OnNpcCanBeSeen, Scope::Npc)
            .ids([20001])
            .function::<OnNpcCanBeSeen, DamageReturn, _>(|_| None)
            .on(EventType::OnNpcCanBeSeen, Scope::Npc)
            .ids([20002])
            .function::<OnNpcCanBeSeen, TerminateReturn, _>(|_| Some(TerminateReturn::terminate()));

        let bound = binder.register_manifest(&script, manifest);
        assert_eq!(bound.len(), 1);
        assert!(!container(&npcs, 20001).has_listener(EventType::OnNpcCanBeSeen));
        assert!(container(&npcs, 20002).has_listener(EventType::OnNpcCanBeSeen));
    }
}
