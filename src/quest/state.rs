//! Quest State Tracking
//!
//! One `QuestState` per (quest, player): a lifecycle marker plus named string
//! variables. Every mutation is queued for persistence immediately.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use dashmap::DashMap;
use tracing::warn;

use super::persistence::QuestPersistence;
use crate::world::Player;

/// Reserved variable the lifecycle marker is persisted under
pub const STATE_VAR: &str = "<state>";

const COND_VAR: &str = "cond";
const MEMO_STATE_VAR: &str = "memoState";

/// Lifecycle of a quest for one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Started,
    Completed,
    /// Script-defined stage beyond the three canonical states
    Stage(u8),
}

impl State {
    fn encode(self) -> u16 {
        match self {
            State::Created => 0,
            State::Started => 1,
            State::Completed => 2,
            State::Stage(n) => 0x100 | n as u16,
        }
    }

    fn decode(raw: u16) -> Self {
        match raw {
            0 => State::Created,
            1 => State::Started,
            2 => State::Completed,
            n => State::Stage((n & 0xff) as u8),
        }
    }

    /// Parse a persisted marker: a state name or a stage number
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Created" | "created" => Some(State::Created),
            "Started" | "started" => Some(State::Started),
            "Completed" | "completed" => Some(State::Completed),
            other => other.parse::<u8>().ok().map(State::Stage),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => f.write_str("Created"),
            State::Started => f.write_str("Started"),
            State::Completed => f.write_str("Completed"),
            State::Stage(n) => write!(f, "{}", n),
        }
    }
}

pub struct QuestState {
    quest_name: Arc<str>,
    char_id: i32,
    state: AtomicU16,
    vars: DashMap<String, String>,
    persistence: QuestPersistence,
}

impl QuestState {
    /// Build a state without persisting anything
    pub fn new(quest_name: Arc<str>, char_id: i32, state: State, persistence: QuestPersistence) -> Self {
        Self {
            quest_name,
            char_id,
            state: AtomicU16::new(state.encode()),
            vars: DashMap::new(),
            persistence,
        }
    }

    /// Rebuild from persisted (var, value) pairs
    pub fn restore(
        quest_name: Arc<str>,
        char_id: i32,
        rows: impl IntoIterator<Item = (String, String)>,
        persistence: QuestPersistence,
    ) -> Self {
        let qs = Self::new(quest_name, char_id, State::Created, persistence);
        for (var, value) in rows {
            if var == STATE_VAR {
                match State::parse(&value) {
                    Some(state) => qs.state.store(state.encode(), Ordering::Release),
                    None => warn!("Quest {}: bad state marker '{}' for char {}", qs.quest_name, value, char_id),
                }
            } else {
                qs.vars.insert(var, value);
            }
        }
        qs
    }

    pub fn quest_name(&self) -> &str {
        &self.quest_name
    }

    pub fn char_id(&self) -> i32 {
        self.char_id
    }

    // ===== Lifecycle =====

    pub fn state(&self) -> State {
        State::decode(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: State) {
        self.state.store(state.encode(), Ordering::Release);
        self.persistence
            .upsert_var(&self.quest_name, self.char_id, STATE_VAR, &state.to_string());
    }

    pub fn is_created(&self) -> bool {
        self.state() == State::Created
    }

    pub fn is_started(&self) -> bool {
        self.state() == State::Started
    }

    pub fn is_completed(&self) -> bool {
        self.state() == State::Completed
    }

    /// Created → Started with cond 1. No effect in any other state.
    pub fn start_quest(&self) {
        if self.is_created() {
            self.set_state(State::Started);
            self.set_cond(1);
        }
    }

    /// Finish the quest. Repeatable quests forget the player entirely;
    /// others keep only the Completed marker so they can't be started again.
    pub fn exit_quest(&self, player: &Player, repeatable: bool) {
        self.vars.clear();
        if repeatable {
            player.remove_quest_state(&self.quest_name);
            self.persistence
                .delete_quest(&self.quest_name, self.char_id, false);
        } else {
            self.persistence
                .delete_quest(&self.quest_name, self.char_id, true);
            self.set_state(State::Completed);
        }
    }

    // ===== Variables =====

    pub fn set(&self, var: &str, value: impl ToString) {
        if var == STATE_VAR {
            warn!("Quest {}: {} is reserved, use set_state", self.quest_name, STATE_VAR);
            return;
        }
        let value = value.to_string();
        self.persistence
            .upsert_var(&self.quest_name, self.char_id, var, &value);
        self.vars.insert(var.to_string(), value);
    }

    pub fn get(&self, var: &str) -> Option<String> {
        self.vars.get(var).map(|v| v.clone())
    }

    /// Integer value of `var`, 0 when unset or not a number
    pub fn get_int(&self, var: &str) -> i32 {
        self.vars
            .get(var)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn unset(&self, var: &str) -> Option<String> {
        let removed = self.vars.remove(var).map(|(_, v)| v);
        if removed.is_some() {
            self.persistence
                .delete_var(&self.quest_name, self.char_id, var);
        }
        removed
    }

    pub fn set_cond(&self, cond: i32) {
        self.set(COND_VAR, cond);
    }

    pub fn get_cond(&self) -> i32 {
        self.get_int(COND_VAR)
    }

    pub fn is_cond(&self, cond: i32) -> bool {
        self.get_cond() == cond
    }

    pub fn set_memo_state(&self, value: i32) {
        self.set(MEMO_STATE_VAR, value);
    }

    pub fn get_memo_state(&self) -> i32 {
        self.get_int(MEMO_STATE_VAR)
    }

    /// Snapshot of every variable
    pub fn vars(&self) -> HashMap<String, String> {
        self.vars
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl fmt::Debug for QuestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestState")
            .field("quest", &self.quest_name)
            .field("char_id", &self.char_id)
            .field("state", &self.state())
            .field("vars", &self.vars.len())
            .finish()
    }
}
