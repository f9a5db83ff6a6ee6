//! Event Type Registry
//!
//! Every event kind the engine can dispatch, with the payload type it carries
//! and the return types its listeners may produce. The table is static: it is
//! never mutated after startup.

use std::any::{type_name, TypeId};
use std::fmt;

use super::payloads::*;

/// Return types a listener may produce for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Terminate,
    ChatFilter,
    Location,
    Damage,
}

/// All dispatchable event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    // NPC events
    OnNpcFirstTalk,
    OnNpcTalk,
    OnNpcQuestStart,
    OnNpcSpawn,
    OnNpcCanBeSeen,

    // Attackable events
    OnAttackableAttack,
    OnAttackableKill,

    // Creature events
    OnCreatureDamageReceived,
    OnCreatureTeleport,
    OnCreatureZoneEnter,
    OnCreatureZoneExit,

    // Player events
    OnPlayerLogin,
    OnPlayerLogout,
    OnPlayerLevelChanged,
    OnPlayerChat,

    // Item events
    OnItemUse,

    // Siege events
    OnCastleSiegeStart,
    OnCastleSiegeFinish,
    OnFortSiegeStart,
    OnFortSiegeFinish,

    // Olympiad events
    OnOlympiadMatchResult,
}

impl EventType {
    pub const ALL: [EventType; 21] = [
        EventType::OnNpcFirstTalk,
        EventType::OnNpcTalk,
        EventType::OnNpcQuestStart,
        EventType::OnNpcSpawn,
        EventType::OnNpcCanBeSeen,
        EventType::OnAttackableAttack,
        EventType::OnAttackableKill,
        EventType::OnCreatureDamageReceived,
        EventType::OnCreatureTeleport,
        EventType::OnCreatureZoneEnter,
        EventType::OnCreatureZoneExit,
        EventType::OnPlayerLogin,
        EventType::OnPlayerLogout,
        EventType::OnPlayerLevelChanged,
        EventType::OnPlayerChat,
        EventType::OnItemUse,
        EventType::OnCastleSiegeStart,
        EventType::OnCastleSiegeFinish,
        EventType::OnFortSiegeStart,
        EventType::OnFortSiegeFinish,
        EventType::OnOlympiadMatchResult,
    ];

    /// Event type as string (for logging/debugging)
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::OnNpcFirstTalk => "on_npc_first_talk",
            EventType::OnNpcTalk => "on_npc_talk",
            EventType::OnNpcQuestStart => "on_npc_quest_start",
            EventType::OnNpcSpawn => "on_npc_spawn",
            EventType::OnNpcCanBeSeen => "on_npc_can_be_seen",
            EventType::OnAttackableAttack => "on_attackable_attack",
            EventType::OnAttackableKill => "on_attackable_kill",
            EventType::OnCreatureDamageReceived => "on_creature_damage_received",
            EventType::OnCreatureTeleport => "on_creature_teleport",
            EventType::OnCreatureZoneEnter => "on_creature_zone_enter",
            EventType::OnCreatureZoneExit => "on_creature_zone_exit",
            EventType::OnPlayerLogin => "on_player_login",
            EventType::OnPlayerLogout => "on_player_logout",
            EventType::OnPlayerLevelChanged => "on_player_level_changed",
            EventType::OnPlayerChat => "on_player_chat",
            EventType::OnItemUse => "on_item_use",
            EventType::OnCastleSiegeStart => "on_castle_siege_start",
            EventType::OnCastleSiegeFinish => "on_castle_siege_finish",
            EventType::OnFortSiegeStart => "on_fort_siege_start",
            EventType::OnFortSiegeFinish => "on_fort_siege_finish",
            EventType::OnOlympiadMatchResult => "on_olympiad_match_result",
        }
    }

    /// The payload type carried by events of this kind
    pub fn payload_type(self) -> TypeId {
        match self {
            EventType::OnNpcFirstTalk => TypeId::of::<OnNpcFirstTalk>(),
            EventType::OnNpcTalk => TypeId::of::<OnNpcTalk>(),
            EventType::OnNpcQuestStart => TypeId::of::<OnNpcQuestStart>(),
            EventType::OnNpcSpawn => TypeId::of::<OnNpcSpawn>(),
            EventType::OnNpcCanBeSeen => TypeId::of::<OnNpcCanBeSeen>(),
            EventType::OnAttackableAttack => TypeId::of::<OnAttackableAttack>(),
            EventType::OnAttackableKill => TypeId::of::<OnAttackableKill>(),
            EventType::OnCreatureDamageReceived => TypeId::of::<OnCreatureDamageReceived>(),
            EventType::OnCreatureTeleport => TypeId::of::<OnCreatureTeleport>(),
            EventType::OnCreatureZoneEnter => TypeId::of::<OnCreatureZoneEnter>(),
            EventType::OnCreatureZoneExit => TypeId::of::<OnCreatureZoneExit>(),
            EventType::OnPlayerLogin => TypeId::of::<OnPlayerLogin>(),
            EventType::OnPlayerLogout => TypeId::of::<OnPlayerLogout>(),
            EventType::OnPlayerLevelChanged => TypeId::of::<OnPlayerLevelChanged>(),
            EventType::OnPlayerChat => TypeId::of::<OnPlayerChat>(),
            EventType::OnItemUse => TypeId::of::<OnItemUse>(),
            EventType::OnCastleSiegeStart => TypeId::of::<OnCastleSiegeStart>(),
            EventType::OnCastleSiegeFinish => TypeId::of::<OnCastleSiegeFinish>(),
            EventType::OnFortSiegeStart => TypeId::of::<OnFortSiegeStart>(),
            EventType::OnFortSiegeFinish => TypeId::of::<OnFortSiegeFinish>(),
            EventType::OnOlympiadMatchResult => TypeId::of::<OnOlympiadMatchResult>(),
        }
    }

    /// Payload type name, for bind-time diagnostics
    pub fn payload_name(self) -> &'static str {
        match self {
            EventType::OnNpcFirstTalk => type_name::<OnNpcFirstTalk>(),
            EventType::OnNpcTalk => type_name::<OnNpcTalk>(),
            EventType::OnNpcQuestStart => type_name::<OnNpcQuestStart>(),
            EventType::OnNpcSpawn => type_name::<OnNpcSpawn>(),
            EventType::OnNpcCanBeSeen => type_name::<OnNpcCanBeSeen>(),
            EventType::OnAttackableAttack => type_name::<OnAttackableAttack>(),
            EventType::OnAttackableKill => type_name::<OnAttackableKill>(),
            EventType::OnCreatureDamageReceived => type_name::<OnCreatureDamageReceived>(),
            EventType::OnCreatureTeleport => type_name::<OnCreatureTeleport>(),
            EventType::OnCreatureZoneEnter => type_name::<OnCreatureZoneEnter>(),
            EventType::OnCreatureZoneExit => type_name::<OnCreatureZoneExit>(),
            EventType::OnPlayerLogin => type_name::<OnPlayerLogin>(),
            EventType::OnPlayerLogout => type_name::<OnPlayerLogout>(),
            EventType::OnPlayerLevelChanged => type_name::<OnPlayerLevelChanged>(),
            EventType::OnPlayerChat => type_name::<OnPlayerChat>(),
            EventType::OnItemUse => type_name::<OnItemUse>(),
            EventType::OnCastleSiegeStart => type_name::<OnCastleSiegeStart>(),
            EventType::OnCastleSiegeFinish => type_name::<OnCastleSiegeFinish>(),
            EventType::OnFortSiegeStart => type_name::<OnFortSiegeStart>(),
            EventType::OnFortSiegeFinish => type_name::<OnFortSiegeFinish>(),
            EventType::OnOlympiadMatchResult => type_name::<OnOlympiadMatchResult>(),
        }
    }

    /// Return types listeners of this event may produce. Empty means the
    /// event is notification-only.
    pub fn return_kinds(self) -> &'static [ReturnKind] {
        match self {
            EventType::OnNpcCanBeSeen => &[ReturnKind::Terminate],
            EventType::OnItemUse => &[ReturnKind::Terminate],
            EventType::OnCreatureDamageReceived => &[ReturnKind::Damage],
            EventType::OnCreatureTeleport => &[ReturnKind::Location],
            EventType::OnPlayerChat => &[ReturnKind::ChatFilter],
            _ => &[],
        }
    }

    pub fn accepts_return(self, kind: ReturnKind) -> bool {
        self.return_kinds().contains(&kind)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_payload_types_are_distinct() {
        let payloads: HashSet<TypeId> = EventType::ALL.iter().map(|t| t.payload_type()).collect();
        assert_eq!(payloads.len(), EventType::ALL.len());
    }

    #[test]
    fn test_return_contracts() {
        assert!(EventType::OnNpcCanBeSeen.accepts_return(ReturnKind::Terminate));
        assert!(!EventType::OnNpcCanBeSeen.accepts_return(ReturnKind::Damage));
        assert!(EventType::OnNpcTalk.return_kinds().is_empty());
        assert!(EventType::OnPlayerChat.accepts_return(ReturnKind::ChatFilter));
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names.len(), EventType::ALL.len());
        assert_eq!(EventType::OnAttackableKill.to_string(), "on_attackable_kill");
    }
}
