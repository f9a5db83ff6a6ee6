//! Quest Manager
//!
//! Registry of loaded quests by name. Registering a name that is already
//! loaded unloads the old quest first, so a reload never leaves listeners of
//! the previous version behind.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::quest::{Quest, QuestScript};
use crate::engine::ScriptServices;
use crate::world::Player;

pub struct QuestManager {
    services: Arc<ScriptServices>,
    quests: DashMap<String, Arc<Quest>>,
}

impl QuestManager {
    pub fn new(services: Arc<ScriptServices>) -> Self {
        Self {
            services,
            quests: DashMap::new(),
        }
    }

    /// Create a quest, run its setup and make it visible by name
    pub fn register(
        &self,
        id: i32,
        name: &str,
        description: &str,
        handler: Arc<dyn QuestScript>,
    ) -> Arc<Quest> {
        if let Some((_, old)) = self.quests.remove(name) {
            info!("Replacing quest {}", name);
            old.unload();
        }

        let quest = Quest::new(id, name, description, self.services.clone(), handler);
        quest.handler().setup(&quest);
        self.quests.insert(name.to_string(), quest.clone());

        info!(
            "Loaded quest {} ({}) with {} listeners",
            name,
            id,
            quest.script().listener_count()
        );
        quest
    }

    /// Unload and set up again with the same handler
    pub fn reload(&self, name: &str) -> Option<Arc<Quest>> {
        let old = self.get(name)?;
        Some(self.register(old.id(), old.name(), old.description(), old.handler().clone()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Quest>> {
        self.quests.get(name).map(|q| q.clone())
    }

    pub fn get_by_id(&self, id: i32) -> Option<Arc<Quest>> {
        self.quests
            .iter()
            .find(|q| q.id() == id)
            .map(|q| q.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.quests.iter().map(|q| q.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn unload(&self, name: &str) -> bool {
        match self.quests.remove(name) {
            Some((_, quest)) => {
                quest.unload();
                true
            }
            None => false,
        }
    }

    /// Unload every quest. Returns how many were loaded.
    pub fn unload_all(&self) -> usize {
        let names: Vec<String> = self.quests.iter().map(|q| q.key().clone()).collect();
        names.iter().filter(|name| self.unload(name)).count()
    }

    /// Rebuild a player's quest states from storage. Rows of quests that
    /// aren't loaded are left alone.
    pub async fn restore_player(&self, player: &Arc<Player>) -> usize {
        let rows = self.services.persistence.load_vars(player.object_id()).await;

        let mut by_quest: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in rows {
            by_quest
                .entry(row.quest_name)
                .or_default()
                .push((row.var, row.value));
        }

        let mut restored = 0;
        for (name, vars) in by_quest {
            match self.get(&name) {
                Some(quest) => {
                    quest.restore_state(player, vars);
                    restored += 1;
                }
                None => debug!("Skipping stored state of unloaded quest {}", name),
            }
        }

        debug!("Restored {} quest states for {}", restored, player.name());
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::event::EventType;
    use crate::quest::{QuestStore, STATE_VAR};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        setups: AtomicUsize,
    }

    impl QuestScript for Counting {
        fn setup(&self, quest: &Quest) {
            self.setups.fetch_add(1, Ordering::SeqCst);
            quest.add_start_npc(&[ELDER]);
            quest.add_kill_id(&[WOLF]);
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let world = TestWorld::new();
        let manager = QuestManager::new(world.services.clone());
        assert!(manager.is_empty());

        manager.register(2, "Q002_Wolves", "Wolves", Arc::new(Counting::default()));
        manager.register(1, "Q001_Tutorial", "Tutorial", Arc::new(Counting::default()));

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.names(), vec!["Q001_Tutorial", "Q002_Wolves"]);
        assert_eq!(manager.get_by_id(2).unwrap().name(), "Q002_Wolves");
        assert!(manager.get("Q404").is_none());
    }

    #[tokio::test]
    async fn test_reregister_replaces_listeners() {
        let world = TestWorld::new();
        let manager = QuestManager::new(world.services.clone());
        let handler = Arc::new(Counting::default());
        let elder = world.spawn(1, ELDER);

        let first = manager.register(1, "Q001_Tutorial", "Tutorial", handler.clone());
        let bound = elder.listeners().count(EventType::OnNpcQuestStart);

        let second = manager.reload("Q001_Tutorial").unwrap();
        assert_eq!(handler.setups.load(Ordering::SeqCst), 2);
        assert_eq!(elder.listeners().count(EventType::OnNpcQuestStart), bound);
        assert_eq!(first.script().listener_count(), 0);
        assert!(second.script().listener_count() > 0);
        assert!(Arc::ptr_eq(&manager.get("Q001_Tutorial").unwrap(), &second));
    }

    #[tokio::test]
    async fn test_unload_all() {
        let world = TestWorld::new();
        let manager = QuestManager::new(world.services.clone());
        let wolf = world.spawn(3, WOLF);
        manager.register(1, "Q001_Tutorial", "Tutorial", Arc::new(Counting::default()));
        manager.register(2, "Q002_Wolves", "Wolves", Arc::new(Counting::default()));

        assert!(manager.unload("Q002_Wolves"));
        assert!(!manager.unload("Q002_Wolves"));
        assert_eq!(manager.unload_all(), 1);
        assert!(manager.is_empty());
        assert!(wolf.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_restore_player_groups_by_quest() {
        let world = TestWorld::new();
        world.store.upsert_var("Q001_Tutorial", 100, STATE_VAR, "Completed").await.unwrap();
        world.store.upsert_var("Q002_Wolves", 100, STATE_VAR, "Started").await.unwrap();
        world.store.upsert_var("Q002_Wolves", 100, "kills", "4").await.unwrap();
        world.store.upsert_var("Q002_Wolves", 200, "kills", "9").await.unwrap();

        let manager = QuestManager::new(world.services.clone());
        manager.register(1, "Q001_Tutorial", "Tutorial", Arc::new(Counting::default()));
        manager.register(2, "Q002_Wolves", "Wolves", Arc::new(Counting::default()));

        let (player, _rx) = Player::new(100, "Ayla", 30);
        assert_eq!(manager.restore_player(&player).await, 2);
        assert!(player.quest_state("Q001_Tutorial").unwrap().is_completed());

        let wolves = player.quest_state("Q002_Wolves").unwrap();
        assert!(wolves.is_started());
        assert_eq!(wolves.get_int("kills"), 4);
    }
}
