use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::listener::ListenersContainer;
use crate::quest::QuestState;

/// Content pushed to a player's client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerMessage {
    /// Rendered dialog window
    Html(String),
    /// Plain system chat line
    System(String),
}

/// A connected player, as seen by scripts
pub struct Player {
    object_id: i32,
    name: String,
    level: AtomicI32,
    listeners: Arc<ListenersContainer>,
    /// Quest states keyed by quest name
    quests: DashMap<String, Arc<QuestState>>,
    outbox: mpsc::UnboundedSender<PlayerMessage>,
}

impl Player {
    /// Create a player and the receiving end of its outbound message queue
    pub fn new(
        object_id: i32,
        name: &str,
        level: i32,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Self {
            object_id,
            name: name.to_string(),
            level: AtomicI32::new(level),
            listeners: Arc::new(ListenersContainer::new(format!("player:{}", object_id))),
            quests: DashMap::new(),
            outbox: tx,
        };
        (Arc::new(player), rx)
    }

    pub fn object_id(&self) -> i32 {
        self.object_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> i32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, level: i32) {
        self.level.store(level, Ordering::Relaxed);
    }

    pub fn listeners(&self) -> &Arc<ListenersContainer> {
        &self.listeners
    }

    pub fn send_html(&self, html: impl Into<String>) {
        self.send(PlayerMessage::Html(html.into()));
    }

    pub fn send_message(&self, text: impl Into<String>) {
        self.send(PlayerMessage::System(text.into()));
    }

    fn send(&self, message: PlayerMessage) {
        if self.outbox.send(message).is_err() {
            trace!("Player {} disconnected, dropping message", self.name);
        }
    }

    pub fn quest_state(&self, quest_name: &str) -> Option<Arc<QuestState>> {
        self.quests.get(quest_name).map(|qs| qs.clone())
    }

    pub fn set_quest_state(&self, state: Arc<QuestState>) {
        self.quests.insert(state.quest_name().to_string(), state);
    }

    pub fn remove_quest_state(&self, quest_name: &str) -> Option<Arc<QuestState>> {
        self.quests.remove(quest_name).map(|(_, qs)| qs)
    }

    pub fn quest_states(&self) -> Vec<Arc<QuestState>> {
        self.quests.iter().map(|qs| qs.value().clone()).collect()
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("object_id", &self.object_id)
            .field("name", &self.name)
            .field("level", &self.level())
            .finish()
    }
}
