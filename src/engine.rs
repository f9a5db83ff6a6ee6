//! Scripting Engine
//!
//! Wires templates, the dispatcher, the binding facility, quest persistence
//! and the html cache together, and exposes the hooks the game loop calls when
//! something scriptable happens.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tracing::info;

use crate::config::EngineConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::DataError;
use crate::event::{
    ChatFilterReturn, ChatType, EventType, OnAttackableKill, OnNpcCanBeSeen, OnNpcFirstTalk, OnNpcQuestStart,
    OnNpcSpawn, OnNpcTalk, OnPlayerChat, OnPlayerLogin, TerminateReturn,
};
use crate::html::{HtmlCache, HtmlRenderer};
use crate::listener::ListenersContainer;
use crate::quest::{QuestManager, QuestPersistence, QuestStore};
use crate::script::{GlobalContainers, Registries, Script, ScriptBinder};
use crate::worker::{TokioWorkerPool, WorkerPool};
use crate::world::{Npc, Player, TemplateKind, TemplateTable};

/// Everything a script needs at runtime, passed explicitly
pub struct ScriptServices {
    pub binder: ScriptBinder,
    pub dispatcher: EventDispatcher,
    pub pool: Arc<dyn WorkerPool>,
    pub persistence: QuestPersistence,
    pub html: Arc<dyn HtmlRenderer>,
}

impl ScriptServices {
    pub fn new(
        registries: Registries,
        pool: Arc<dyn WorkerPool>,
        persistence: QuestPersistence,
        html: Arc<dyn HtmlRenderer>,
    ) -> Self {
        let globals = GlobalContainers::new();
        let dispatcher = EventDispatcher::new(globals.global.clone(), pool.clone());
        Self {
            binder: ScriptBinder::new(registries, globals),
            dispatcher,
            pool,
            persistence,
            html,
        }
    }

    pub fn globals(&self) -> &GlobalContainers {
        self.binder.globals()
    }
}

/// Every template table
pub struct Templates {
    pub npcs: Arc<TemplateTable>,
    pub zones: Arc<TemplateTable>,
    pub items: Arc<TemplateTable>,
    pub castles: Arc<TemplateTable>,
    pub fortresses: Arc<TemplateTable>,
}

impl Templates {
    pub fn empty() -> Self {
        Self {
            npcs: Arc::new(TemplateTable::new(TemplateKind::Npc)),
            zones: Arc::new(TemplateTable::new(TemplateKind::Zone)),
            items: Arc::new(TemplateTable::new(TemplateKind::Item)),
            castles: Arc::new(TemplateTable::new(TemplateKind::Castle)),
            fortresses: Arc::new(TemplateTable::new(TemplateKind::Fortress)),
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self, DataError> {
        let load = |kind| -> Result<Arc<TemplateTable>, DataError> {
            let mut table = TemplateTable::new(kind);
            table.load_from_directory(data_dir)?;
            Ok(Arc::new(table))
        };

        Ok(Self {
            npcs: load(TemplateKind::Npc)?,
            zones: load(TemplateKind::Zone)?,
            items: load(TemplateKind::Item)?,
            castles: load(TemplateKind::Castle)?,
            fortresses: load(TemplateKind::Fortress)?,
        })
    }

    pub fn registries(&self) -> Registries {
        Registries {
            npcs: self.npcs.clone(),
            zones: self.zones.clone(),
            items: self.items.clone(),
            castles: self.castles.clone(),
            fortresses: self.fortresses.clone(),
        }
    }
}

pub struct Engine {
    services: Arc<ScriptServices>,
    templates: Templates,
    quests: QuestManager,
    scripts: Mutex<Vec<Arc<Script>>>,
    html: Arc<HtmlCache>,
}

impl Engine {
    /// Build the engine on `runtime`. Starts the persistence writer there.
    pub fn new(config: &EngineConfig, templates: Templates, store: Arc<dyn QuestStore>, runtime: Handle) -> Self {
        let _guard = runtime.enter();

        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::from_handle(runtime.clone()));
        let persistence = QuestPersistence::spawn(store);
        let html = Arc::new(HtmlCache::new(config.html_dir()));

        let services = Arc::new(ScriptServices::new(
            templates.registries(),
            pool,
            persistence,
            html.clone(),
        ));

        Self {
            quests: QuestManager::new(services.clone()),
            services,
            templates,
            scripts: Mutex::new(Vec::new()),
            html,
        }
    }

    pub fn services(&self) -> &Arc<ScriptServices> {
        &self.services
    }

    pub fn binder(&self) -> &ScriptBinder {
        &self.services.binder
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.services.dispatcher
    }

    pub fn globals(&self) -> &GlobalContainers {
        self.services.globals()
    }

    pub fn quests(&self) -> &QuestManager {
        &self.quests
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn html(&self) -> &Arc<HtmlCache> {
        &self.html
    }

    /// Keep a non-quest script so `unload_all` can take it down
    pub fn add_script(&self, script: Script) -> Arc<Script> {
        let script = Arc::new(script);
        info!("Loaded script {} with {} listeners", script.name(), script.listener_count());
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(script.clone());
        script
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn start_html_watcher(&self) -> Result<tokio::sync::mpsc::Receiver<PathBuf>, DataError> {
        self.html.start_watcher()
    }

    /// Unload every quest and script, then wait for pending writes
    pub async fn unload_all(&self) -> usize {
        let quests = self.quests.unload_all();
        let scripts = std::mem::take(&mut *self.scripts.lock().unwrap_or_else(PoisonError::into_inner));
        for script in scripts.iter().rev() {
            script.unload();
        }
        self.services.persistence.flush().await;

        info!("Unloaded {} quests and {} scripts", quests, scripts.len());
        quests + scripts.len()
    }

    // ===== World hooks =====

    fn npc_scope(&self, npc: &Npc) -> &Arc<ListenersContainer> {
        if npc.is_monster() {
            &self.globals().monsters
        } else {
            &self.globals().npcs
        }
    }

    /// Restore quest states, then notify login listeners in the background
    pub async fn player_login(&self, player: &Arc<Player>) -> usize {
        let restored = self.quests.restore_player(player).await;
        self.dispatcher().notify_event_async(
            OnPlayerLogin {
                player: player.clone(),
            },
            &[player.listeners().clone(), self.globals().players.clone()],
        );
        restored
    }

    pub fn npc_spawned(&self, npc: &Arc<Npc>) {
        self.dispatcher().notify_event_async(
            OnNpcSpawn { npc: npc.clone() },
            &[npc.listeners().clone(), self.npc_scope(npc).clone()],
        );
    }

    /// First click on an NPC. Returns `false` if nothing scripted answers.
    pub fn first_talk(&self, npc: &Arc<Npc>, player: &Arc<Player>) -> bool {
        let container: &ListenersContainer = npc.listeners();
        if !self
            .dispatcher()
            .has_listener(EventType::OnNpcFirstTalk, Some(container))
        {
            return false;
        }
        let event = OnNpcFirstTalk {
            npc: npc.clone(),
            player: player.clone(),
        };
        self.dispatcher().notify(&event, Some(container));
        true
    }

    /// Player opened the NPC's quest window
    pub fn quest_start(&self, npc: &Arc<Npc>, player: &Arc<Player>) {
        let event = OnNpcQuestStart {
            npc: npc.clone(),
            player: player.clone(),
        };
        self.dispatcher().notify(&event, Some(npc.listeners().as_ref()));
    }

    pub fn talk(&self, npc: &Arc<Npc>, player: &Arc<Player>) {
        let event = OnNpcTalk {
            npc: npc.clone(),
            player: player.clone(),
        };
        self.dispatcher().notify(&event, Some(npc.listeners().as_ref()));
    }

    pub fn kill(&self, npc: &Arc<Npc>, killer: &Arc<Player>) {
        self.dispatcher().notify_event_async(
            OnAttackableKill {
                attacker: killer.clone(),
                target: npc.clone(),
                is_summon: false,
            },
            &[npc.listeners().clone(), self.npc_scope(npc).clone()],
        );
    }

    /// Whether `player` may perceive `npc`
    pub fn can_see(&self, npc: &Arc<Npc>, player: &Arc<Player>) -> bool {
        let event = OnNpcCanBeSeen {
            npc: npc.clone(),
            player: player.clone(),
        };
        !self
            .dispatcher()
            .notify_event::<TerminateReturn>(&event, Some(npc.listeners().as_ref()))
            .is_some_and(|r| r.terminate)
    }

    /// Text and channel after chat filters
    pub fn chat(&self, player: &Arc<Player>, text: &str, chat_type: ChatType) -> (String, ChatType) {
        let event = OnPlayerChat {
            player: player.clone(),
            target: None,
            text: text.to_string(),
            chat_type,
        };
        match self
            .dispatcher()
            .notify_event::<ChatFilterReturn>(&event, Some(player.listeners().as_ref()))
        {
            Some(filtered) => (filtered.text, filtered.chat_type),
            None => (event.text, event.chat_type),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::quest::{MemoryQuestStore, Quest, QuestScript, QuestStore};
    use crate::script::{BindingManifest, Scope};
    use crate::world::PlayerMessage;
    use tempfile::TempDir;

    struct Greeter;

    impl QuestScript for Greeter {
        fn setup(&self, quest: &Quest) {
            quest.add_start_npc(&[ELDER]);
        }

        fn on_talk(&self, quest: &Quest, _npc: &Arc<Npc>, player: &Arc<Player>) -> Option<String> {
            let qs = quest.get_quest_state(player, true)?;
            qs.start_quest();
            Some("greet.htm".to_string())
        }
    }

    fn engine(dir: &TempDir, store: Arc<MemoryQuestStore>) -> Engine {
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        Engine::new(&config, templates(), store, Handle::current())
    }

    fn html_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let quest_dir = dir.path().join("html/Q900_Greeting");
        std::fs::create_dir_all(&quest_dir).unwrap();
        std::fs::write(quest_dir.join("greet.htm"), "<html>Welcome, %playername%!</html>").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_quest_start_renders_from_html_dir() {
        let dir = html_dir();
        let engine = engine(&dir, Arc::new(MemoryQuestStore::new()));
        engine
            .quests()
            .register(900, "Q900_Greeting", "Greeting", Arc::new(Greeter));

        let elder = spawn(engine.templates(), 1, ELDER);
        let (player, mut rx) = Player::new(100, "Ayla", 1);
        engine.quest_start(&elder, &player);

        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerMessage::Html("<html>Welcome, Ayla!</html>".to_string())
        );
        assert!(player.quest_state("Q900_Greeting").unwrap().is_started());
    }

    #[tokio::test]
    async fn test_first_talk_without_listeners() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(MemoryQuestStore::new()));
        let elder = spawn(engine.templates(), 1, ELDER);
        let (player, _rx) = Player::new(100, "Ayla", 1);

        assert!(!engine.first_talk(&elder, &player));

        let script = Script::new("first_talk");
        engine
            .binder()
            .register_dummy(&script, EventType::OnNpcFirstTalk, Scope::Npc, &[ELDER]);
        let script = engine.add_script(script);

        assert!(engine.first_talk(&elder, &player));
        script.unload();
        assert!(!engine.first_talk(&elder, &player));
    }

    #[tokio::test]
    async fn test_chat_filter_and_visibility() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(MemoryQuestStore::new()));
        let guard = spawn(engine.templates(), 2, GUARD);
        let (player, _rx) = Player::new(100, "Ayla", 1);

        assert_eq!(
            engine.chat(&player, "hello", ChatType::General),
            ("hello".to_string(), ChatType::General)
        );
        assert!(engine.can_see(&guard, &player));

        let script = Script::new("filters");
        engine.binder().register_manifest(
            &script,
            BindingManifest::new()
                .on(EventType::OnPlayerChat, Scope::Global)
                .function::<OnPlayerChat, ChatFilterReturn, _>(|e| {
                    Some(ChatFilterReturn::new(e.text.to_uppercase(), ChatType::Shout, false, false))
                })
                .on(EventType::OnNpcCanBeSeen, Scope::Npc)
                .ids([GUARD])
                .function::<OnNpcCanBeSeen, TerminateReturn, _>(|e| {
                    (e.player.level() < 10).then(TerminateReturn::terminate)
                }),
        );
        engine.add_script(script);

        assert_eq!(
            engine.chat(&player, "hello", ChatType::General),
            ("HELLO".to_string(), ChatType::Shout)
        );
        assert!(!engine.can_see(&guard, &player));
        player.set_level(15);
        assert!(engine.can_see(&guard, &player));

        assert_eq!(engine.unload_all().await, 1);
        assert_eq!(engine.chat(&player, "hi", ChatType::Party).0, "hi");
    }

    #[tokio::test]
    async fn test_login_restores_and_notifies() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryQuestStore::new());
        store.upsert_var("Q900_Greeting", 100, crate::quest::STATE_VAR, "Started").await.unwrap();
        store.upsert_var("Q900_Greeting", 100, "cond", "3").await.unwrap();
        store.upsert_var("Q999_Unloaded", 100, "cond", "1").await.unwrap();

        let engine = engine(&dir, store);
        engine
            .quests()
            .register(900, "Q900_Greeting", "Greeting", Arc::new(Greeter));

        let (tx, mut logins) = tokio::sync::mpsc::unbounded_channel();
        let script = Script::new("login_watch");
        engine.binder().register_consumer::<OnPlayerLogin, _>(
            &script,
            EventType::OnPlayerLogin,
            Scope::GlobalPlayers,
            &[],
            move |e| {
                let _ = tx.send(e.player.object_id());
            },
        );
        engine.add_script(script);

        let (player, _rx) = Player::new(100, "Ayla", 1);
        assert_eq!(engine.player_login(&player).await, 1);

        let qs = player.quest_state("Q900_Greeting").unwrap();
        assert!(qs.is_started());
        assert_eq!(qs.get_cond(), 3);
        assert!(player.quest_state("Q999_Unloaded").is_none());
        assert_eq!(logins.recv().await, Some(100));
    }

    #[tokio::test]
    async fn test_unload_all_flushes_writes() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryQuestStore::new());
        let engine = engine(&dir, store.clone());
        let quest = engine
            .quests()
            .register(900, "Q900_Greeting", "Greeting", Arc::new(Greeter));

        let (player, _rx) = Player::new(100, "Ayla", 1);
        let qs = quest.get_quest_state(&player, true).unwrap();
        qs.start_quest();
        qs.set("token", 7);

        assert_eq!(engine.unload_all().await, 1);
        assert!(engine.quests().is_empty());

        let vars = store.vars_of(100, "Q900_Greeting");
        assert_eq!(vars.get("token").map(String::as_str), Some("7"));
        assert_eq!(vars.get("cond").map(String::as_str), Some("1"));
    }
}
