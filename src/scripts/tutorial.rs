//! Q001_Tutorial "Wolves at the Gate"
//!
//! The Elder asks new players to thin out the wolves outside the village, then
//! report to the Gate Guard for a reward.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::quest::{Quest, QuestScript};
use crate::world::{Npc, Player};

pub const NAME: &str = "Q001_Tutorial";
pub const ID: i32 = 1;

pub const ELDER: i32 = 30001;
pub const GATE_GUARD: i32 = 30002;
pub const GREY_WOLF: i32 = 20001;
pub const DIRE_WOLF: i32 = 20002;

pub const WOLVES_NEEDED: i32 = 5;
const FAREWELL_DELAY: Duration = Duration::from_secs(5);

pub struct Tutorial;

impl QuestScript for Tutorial {
    fn setup(&self, quest: &Quest) {
        quest.add_start_npc(&[ELDER]);
        quest.add_talk_id(&[ELDER, GATE_GUARD]);
        quest.add_kill_id(&[GREY_WOLF, DIRE_WOLF]);
        quest.add_cond_level_range(1, 20, "level.htm");
    }

    fn on_talk(&self, quest: &Quest, npc: &Arc<Npc>, player: &Arc<Player>) -> Option<String> {
        let qs = quest.get_quest_state(player, true)?;

        if qs.is_completed() {
            return Some("<html><body>You have already helped us, friend.</body></html>".to_string());
        }

        match (npc.id(), qs.get_cond()) {
            (ELDER, _) if qs.is_created() => {
                qs.start_quest();
                Some("accept.htm".to_string())
            }
            (ELDER, 1) => Some("progress.htm".to_string()),
            (ELDER, _) => Some("report.htm".to_string()),
            (GATE_GUARD, 2) => {
                qs.exit_quest(player, false);
                quest.start_quest_timer("farewell", FAREWELL_DELAY, Some(npc), Some(player), false);
                Some("reward.htm".to_string())
            }
            (GATE_GUARD, _) => Some("guard_idle.htm".to_string()),
            _ => None,
        }
    }

    fn on_kill(&self, quest: &Quest, _npc: &Arc<Npc>, killer: &Arc<Player>, _is_summon: bool) -> Option<String> {
        let qs = quest.get_quest_state(killer, false)?;
        if !qs.is_started() || !qs.is_cond(1) {
            return None;
        }

        let kills = qs.get_int("wolves") + 1;
        if kills >= WOLVES_NEEDED {
            qs.unset("wolves");
            qs.set_cond(2);
            Some("That should be enough. Report to the Gate Guard.".to_string())
        } else {
            qs.set("wolves", kills);
            Some(format!("Wolves slain: {}/{}", kills, WOLVES_NEEDED))
        }
    }

    fn on_timer(
        &self,
        _quest: &Quest,
        name: &str,
        npc: Option<&Arc<Npc>>,
        player: Option<&Arc<Player>>,
    ) -> Option<String> {
        match (name, npc, player) {
            ("farewell", Some(npc), Some(_)) => Some(format!("{}: Safe travels, hero.", npc.name())),
            _ => None,
        }
    }
}

pub fn register(engine: &Engine) -> Arc<Quest> {
    engine
        .quests()
        .register(ID, NAME, "Wolves at the Gate", Arc::new(Tutorial))
}
