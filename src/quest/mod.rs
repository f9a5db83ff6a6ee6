//! Quest System
//!
//! Persistent per-player state machines built on the event dispatcher:
//! - `state` - lifecycle marker plus string variables per (quest, player)
//! - `persistence` / `store` - ordered background writes to sqlite
//! - `timer` - idempotent named timers
//! - `conditions` - start-condition gate
//! - `quest` / `manager` - quest scripts and their registry

pub mod conditions;
pub mod manager;
pub mod persistence;
#[allow(clippy::module_inception)]
pub mod quest;
pub mod state;
pub mod store;
pub mod timer;

pub use conditions::StartConditions;
pub use manager::QuestManager;
pub use persistence::QuestPersistence;
pub use quest::{Quest, QuestScript};
pub use state::{QuestState, STATE_VAR, State};
pub use store::{MemoryQuestStore, QuestStore, QuestVarRow, SqliteQuestStore};
pub use timer::{QuestTimer, QuestTimers, TimerKey};
