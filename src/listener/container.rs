//! Listener containers
//!
//! A container maps event types to ordered listener lists. Lists are
//! copy-on-write: every add/remove publishes a fresh `Arc<[..]>`, so a dispatch
//! iterating a snapshot never sees a torn list while a script unloads on
//! another thread.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use super::EventListener;
use crate::event::EventType;

pub type ListenerList = Arc<[Arc<EventListener>]>;

/// Read-only view of one event type's listeners at a point in time.
#[derive(Clone, Default)]
pub struct ListenerSnapshot(Option<ListenerList>);

impl ListenerSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<EventListener>> {
        match &self.0 {
            Some(list) => list.iter(),
            None => [].iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything the dispatcher can pull listeners from.
pub trait ListenerSource: Send + Sync {
    /// Cheap capability check; must not materialize a list
    fn has_listener(&self, event_type: EventType) -> bool;

    /// Ordered listeners for `event_type`, empty if none
    fn listeners(&self, event_type: EventType) -> ListenerSnapshot;

    fn name(&self) -> &str;
}

/// Listener scope owned by an entity or a global singleton
pub struct ListenersContainer {
    name: String,
    listeners: DashMap<EventType, ListenerList>,
}

impl ListenersContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: DashMap::new(),
        }
    }

    /// Insert a listener after every listener whose priority is lower or equal,
    /// so equal priorities keep bind order.
    pub fn add(&self, listener: Arc<EventListener>) -> Arc<EventListener> {
        listener.mark_registered();

        match self.listeners.entry(listener.event_type()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let at = current.partition_point(|l| l.priority() <= listener.priority());
                let mut list = Vec::with_capacity(current.len() + 1);
                list.extend_from_slice(&current[..at]);
                list.push(listener.clone());
                list.extend_from_slice(&current[at..]);
                entry.insert(list.into());
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::from(vec![listener.clone()]));
            }
        }

        trace!(
            container = %self.name,
            event_type = %listener.event_type(),
            owner = %listener.owner(),
            "Listener added"
        );
        listener
    }

    /// Remove a listener. Returns `false` if it wasn't in this container.
    pub fn remove(&self, listener: &EventListener) -> bool {
        listener.mark_unregistered();

        let Entry::Occupied(mut entry) = self.listeners.entry(listener.event_type()) else {
            return false;
        };

        let current = entry.get();
        if !current.iter().any(|l| l.id() == listener.id()) {
            return false;
        }

        let remaining: Vec<Arc<EventListener>> = current
            .iter()
            .filter(|l| l.id() != listener.id())
            .cloned()
            .collect();

        if remaining.is_empty() {
            entry.remove();
        } else {
            entry.insert(remaining.into());
        }

        trace!(
            container = %self.name,
            event_type = %listener.event_type(),
            owner = %listener.owner(),
            "Listener removed"
        );
        true
    }

    /// Number of listeners for `event_type`
    pub fn count(&self, event_type: EventType) -> usize {
        self.listeners.get(&event_type).map_or(0, |list| list.len())
    }

    /// Event types with at least one listener
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.listeners.iter().map(|e| *e.key()).collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ListenerSource for ListenersContainer {
    fn has_listener(&self, event_type: EventType) -> bool {
        // Empty lists are removed, so presence means at least one listener
        self.listeners.contains_key(&event_type)
    }

    fn listeners(&self, event_type: EventType) -> ListenerSnapshot {
        ListenerSnapshot(self.listeners.get(&event_type).map(|list| list.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ListenersContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenersContainer")
            .field("name", &self.name)
            .field("event_types", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{Callback, ListenerKind};

    fn listener(
        container: &Arc<ListenersContainer>,
        event_type: EventType,
        priority: i32,
    ) -> Arc<EventListener> {
        Arc::new(EventListener::new(
            container,
            event_type,
            Arc::from("test_script"),
            ListenerKind::Manifest,
            priority,
            Callback::dummy(),
        ))
    }

    #[test]
    fn test_empty_container() {
        let container = ListenersContainer::new("empty");
        assert!(!container.has_listener(EventType::OnNpcTalk));
        assert!(container.listeners(EventType::OnNpcTalk).is_empty());
        assert_eq!(container.listeners(EventType::OnNpcTalk).iter().count(), 0);
    }

    #[test]
    fn test_add_and_has() {
        let container = Arc::new(ListenersContainer::new("npc:1"));
        let added = container.add(listener(&container, EventType::OnNpcTalk, 0));

        assert!(added.is_registered());
        assert!(container.has_listener(EventType::OnNpcTalk));
        assert!(!container.has_listener(EventType::OnNpcSpawn));
        assert_eq!(container.count(EventType::OnNpcTalk), 1);
        assert_eq!(container.event_types(), vec![EventType::OnNpcTalk]);
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let container = Arc::new(ListenersContainer::new("npc:1"));
        let p5 = container.add(listener(&container, EventType::OnNpcTalk, 5));
        let p1a = container.add(listener(&container, EventType::OnNpcTalk, 1));
        let p1b = container.add(listener(&container, EventType::OnNpcTalk, 1));
        let p3 = container.add(listener(&container, EventType::OnNpcTalk, 3));

        let order: Vec<_> = container
            .listeners(EventType::OnNpcTalk)
            .iter()
            .map(|l| l.id())
            .collect();
        assert_eq!(order, vec![p1a.id(), p1b.id(), p3.id(), p5.id()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let container = Arc::new(ListenersContainer::new("npc:1"));
        let first = container.add(listener(&container, EventType::OnNpcTalk, 0));
        let second = container.add(listener(&container, EventType::OnNpcTalk, 0));

        assert!(container.remove(&first));
        assert!(!container.remove(&first));
        assert_eq!(container.count(EventType::OnNpcTalk), 1);

        assert!(container.remove(&second));
        assert!(!container.has_listener(EventType::OnNpcTalk));
        assert!(container.is_empty());
    }

    #[test]
    fn test_snapshot_survives_removal() {
        let container = Arc::new(ListenersContainer::new("npc:1"));
        let first = container.add(listener(&container, EventType::OnNpcTalk, 0));
        container.add(listener(&container, EventType::OnNpcTalk, 0));

        let snapshot = container.listeners(EventType::OnNpcTalk);
        container.remove(&first);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(container.count(EventType::OnNpcTalk), 1);
    }

    #[test]
    fn test_concurrent_add_remove_while_iterating() {
        let container = Arc::new(ListenersContainer::new("global"));
        for _ in 0..16 {
            container.add(listener(&container, EventType::OnPlayerLogin, 0));
        }

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let l = container.add(listener(&container, EventType::OnPlayerLogin, 0));
                        assert!(container.remove(&l));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = container.listeners(EventType::OnPlayerLogin);
            assert!(snapshot.len() >= 16);
            assert!(snapshot.iter().all(|l| l.event_type() == EventType::OnPlayerLogin));
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(container.count(EventType::OnPlayerLogin), 16);
    }
}
