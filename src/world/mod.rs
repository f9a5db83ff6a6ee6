//! World collaborators
//!
//! The minimal entity shapes the scripting engine talks to: templates loaded
//! from TOML (each owning a listener container), spawned NPCs and players.

pub mod npc;
pub mod player;
pub mod template;

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::Deserialize;

use crate::listener::ListenersContainer;

pub use npc::Npc;
pub use player::{Player, PlayerMessage};
pub use template::{Template, TemplateKind, TemplateTable};

/// Registry lookup used by the binding facility to resolve ids to containers.
pub trait ContainerRegistry: Send + Sync {
    /// Container owned by the entity with `id`, if it exists
    fn container(&self, id: i32) -> Option<Arc<ListenersContainer>>;

    /// Ids of every entry at `level` (only meaningful for NPC templates)
    fn ids_at_level(&self, level: i32) -> Vec<i32> {
        let _ = level;
        Vec::new()
    }

    /// Known ids inside `range`, ascending
    fn ids_in_range(&self, range: RangeInclusive<i32>) -> Vec<i32> {
        let _ = range;
        Vec::new()
    }
}

/// World coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub heading: i32,
}

impl Location {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z, heading: 0 }
    }
}

/// Anything that can take part in combat or cross zones
#[derive(Debug, Clone)]
pub enum Creature {
    Player(Arc<Player>),
    Npc(Arc<Npc>),
}

impl Creature {
    pub fn object_id(&self) -> i32 {
        match self {
            Creature::Player(player) => player.object_id(),
            Creature::Npc(npc) => npc.object_id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Creature::Player(player) => player.name(),
            Creature::Npc(npc) => npc.name(),
        }
    }

    /// The container local listeners for this creature live in
    pub fn listeners(&self) -> &Arc<ListenersContainer> {
        match self {
            Creature::Player(player) => player.listeners(),
            Creature::Npc(npc) => npc.listeners(),
        }
    }

    pub fn as_player(&self) -> Option<&Arc<Player>> {
        match self {
            Creature::Player(player) => Some(player),
            Creature::Npc(_) => None,
        }
    }
}
