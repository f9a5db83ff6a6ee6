//! Event payloads
//!
//! One immutable struct per [`EventType`]. A payload's type is its tag: the
//! `event_type()` of a payload always matches the descriptor that names it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::world::{Creature, Location, Npc, Player, Template};

use super::types::EventType;

/// A dispatchable event payload.
pub trait EventPayload: Any + Send + Sync + fmt::Debug {
    fn event_type(&self) -> EventType;

    fn as_any(&self) -> &dyn Any;
}

macro_rules! impl_payload {
    ($($payload:ident),+ $(,)?) => {
        $(
            impl EventPayload for $payload {
                fn event_type(&self) -> EventType {
                    EventType::$payload
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )+
    };
}

/// Chat channel a message was sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    General,
    Shout,
    Whisper,
    Party,
    Trade,
}

// ============================================================================
// NPC events
// ============================================================================

/// First contact with an NPC (before any quest dialog is chosen)
#[derive(Debug, Clone)]
pub struct OnNpcFirstTalk {
    pub npc: Arc<Npc>,
    pub player: Arc<Player>,
}

#[derive(Debug, Clone)]
pub struct OnNpcTalk {
    pub npc: Arc<Npc>,
    pub player: Arc<Player>,
}

/// Player asked a start NPC for its quest list
#[derive(Debug, Clone)]
pub struct OnNpcQuestStart {
    pub npc: Arc<Npc>,
    pub player: Arc<Player>,
}

#[derive(Debug, Clone)]
pub struct OnNpcSpawn {
    pub npc: Arc<Npc>,
}

/// Visibility check: may `player` perceive `npc`?
#[derive(Debug, Clone)]
pub struct OnNpcCanBeSeen {
    pub npc: Arc<Npc>,
    pub player: Arc<Player>,
}

// ============================================================================
// Attackable events
// ============================================================================

#[derive(Debug, Clone)]
pub struct OnAttackableAttack {
    pub attacker: Arc<Player>,
    pub target: Arc<Npc>,
    pub damage: i32,
    pub is_summon: bool,
}

#[derive(Debug, Clone)]
pub struct OnAttackableKill {
    pub attacker: Arc<Player>,
    pub target: Arc<Npc>,
    pub is_summon: bool,
}

// ============================================================================
// Creature events
// ============================================================================

#[derive(Debug, Clone)]
pub struct OnCreatureDamageReceived {
    pub attacker: Creature,
    pub target: Creature,
    pub damage: f64,
    pub skill_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OnCreatureTeleport {
    pub creature: Creature,
    pub destination: Location,
}

#[derive(Debug, Clone)]
pub struct OnCreatureZoneEnter {
    pub creature: Creature,
    pub zone: Arc<Template>,
}

#[derive(Debug, Clone)]
pub struct OnCreatureZoneExit {
    pub creature: Creature,
    pub zone: Arc<Template>,
}

// ============================================================================
// Player events
// ============================================================================

#[derive(Debug, Clone)]
pub struct OnPlayerLogin {
    pub player: Arc<Player>,
}

#[derive(Debug, Clone)]
pub struct OnPlayerLogout {
    pub player: Arc<Player>,
}

#[derive(Debug, Clone)]
pub struct OnPlayerLevelChanged {
    pub player: Arc<Player>,
    pub old_level: i32,
    pub new_level: i32,
}

#[derive(Debug, Clone)]
pub struct OnPlayerChat {
    pub player: Arc<Player>,
    /// Whisper target name, if any
    pub target: Option<String>,
    pub text: String,
    pub chat_type: ChatType,
}

// ============================================================================
// Item, siege and olympiad events
// ============================================================================

#[derive(Debug, Clone)]
pub struct OnItemUse {
    pub item: Arc<Template>,
    pub player: Arc<Player>,
}

#[derive(Debug, Clone)]
pub struct OnCastleSiegeStart {
    pub castle: Arc<Template>,
}

#[derive(Debug, Clone)]
pub struct OnCastleSiegeFinish {
    pub castle: Arc<Template>,
    /// Clan holding the castle after the siege
    pub owner_clan: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OnFortSiegeStart {
    pub fortress: Arc<Template>,
}

#[derive(Debug, Clone)]
pub struct OnFortSiegeFinish {
    pub fortress: Arc<Template>,
    pub owner_clan: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OnOlympiadMatchResult {
    pub winner: Option<Arc<Player>>,
    pub loser: Option<Arc<Player>>,
}

impl_payload!(
    OnNpcFirstTalk,
    OnNpcTalk,
    OnNpcQuestStart,
    OnNpcSpawn,
    OnNpcCanBeSeen,
    OnAttackableAttack,
    OnAttackableKill,
    OnCreatureDamageReceived,
    OnCreatureTeleport,
    OnCreatureZoneEnter,
    OnCreatureZoneExit,
    OnPlayerLogin,
    OnPlayerLogout,
    OnPlayerLevelChanged,
    OnPlayerChat,
    OnItemUse,
    OnCastleSiegeStart,
    OnCastleSiegeFinish,
    OnFortSiegeStart,
    OnFortSiegeFinish,
    OnOlympiadMatchResult,
);
