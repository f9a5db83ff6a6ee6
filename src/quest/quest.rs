//! Quest scripts
//!
//! A `Quest` is a script with per-player state: it binds listeners through the
//! binding facility and routes each event to its `QuestScript` handler. Any
//! text a handler returns is shown to the player: `.htm` names are rendered
//! from the quest's html directory, `<html>` text is sent as a dialog, and
//! anything else goes out as a system message.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::conditions::StartConditions;
use super::state::{QuestState, State};
use super::timer::{QuestTimer, QuestTimers, TimerKey};
use crate::engine::ScriptServices;
use crate::event::{
    EventPayload, EventType, OnAttackableAttack, OnAttackableKill, OnCreatureZoneEnter,
    OnNpcCanBeSeen, OnNpcFirstTalk, OnNpcQuestStart, OnNpcSpawn, OnNpcTalk, TerminateReturn,
};
use crate::listener::EventListener;
use crate::script::{Scope, Script};
use crate::world::{Creature, Npc, Player, Template};

/// Event handlers of a quest. Every handler is optional.
#[allow(unused_variables)]
pub trait QuestScript: Send + Sync + 'static {
    /// Bind listeners and start conditions. Called once per (re)load.
    fn setup(&self, quest: &Quest) {}

    fn on_talk(&self, quest: &Quest, npc: &Arc<Npc>, player: &Arc<Player>) -> Option<String> {
        None
    }

    fn on_first_talk(&self, quest: &Quest, npc: &Arc<Npc>, player: &Arc<Player>) -> Option<String> {
        None
    }

    fn on_kill(&self, quest: &Quest, npc: &Arc<Npc>, killer: &Arc<Player>, is_summon: bool) -> Option<String> {
        None
    }

    fn on_attack(
        &self,
        quest: &Quest,
        npc: &Arc<Npc>,
        attacker: &Arc<Player>,
        damage: i32,
        is_summon: bool,
    ) -> Option<String> {
        None
    }

    fn on_spawn(&self, quest: &Quest, npc: &Arc<Npc>) {}

    fn on_enter_zone(&self, quest: &Quest, creature: &Creature, zone: &Arc<Template>) -> Option<String> {
        None
    }

    /// Whether `player` may see `npc`
    fn on_can_see(&self, quest: &Quest, npc: &Arc<Npc>, player: &Arc<Player>) -> bool {
        true
    }

    fn on_timer(
        &self,
        quest: &Quest,
        name: &str,
        npc: Option<&Arc<Npc>>,
        player: Option<&Arc<Player>>,
    ) -> Option<String> {
        None
    }
}

pub struct Quest {
    id: i32,
    name: Arc<str>,
    description: String,
    script: Script,
    services: Arc<ScriptServices>,
    handler: Arc<dyn QuestScript>,
    conditions: RwLock<StartConditions>,
    start_npcs: RwLock<BTreeSet<i32>>,
    timers: QuestTimers,
    this: Weak<Quest>,
}

impl Quest {
    pub(crate) fn new(
        id: i32,
        name: &str,
        description: &str,
        services: Arc<ScriptServices>,
        handler: Arc<dyn QuestScript>,
    ) -> Arc<Self> {
        let name: Arc<str> = Arc::from(name);
        Arc::new_cyclic(|this| Self {
            id,
            script: Script::new(name.clone()),
            timers: QuestTimers::new(name.clone(), services.pool.clone()),
            name,
            description: description.to_string(),
            services,
            handler,
            conditions: RwLock::new(StartConditions::new()),
            start_npcs: RwLock::new(BTreeSet::new()),
            this: this.clone(),
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub(crate) fn handler(&self) -> &Arc<dyn QuestScript> {
        &self.handler
    }

    // ===== Player state =====

    /// Fresh Created state for `player`, replacing any previous one
    pub fn new_quest_state(&self, player: &Arc<Player>) -> Arc<QuestState> {
        let qs = Arc::new(QuestState::new(
            self.name.clone(),
            player.object_id(),
            State::Created,
            self.services.persistence.clone(),
        ));
        qs.set_state(State::Created);
        player.set_quest_state(qs.clone());
        qs
    }

    pub fn get_quest_state(&self, player: &Arc<Player>, init_if_none: bool) -> Option<Arc<QuestState>> {
        match player.quest_state(&self.name) {
            Some(qs) => Some(qs),
            None if init_if_none => Some(self.new_quest_state(player)),
            None => None,
        }
    }

    pub(crate) fn restore_state(&self, player: &Arc<Player>, vars: Vec<(String, String)>) -> Arc<QuestState> {
        let qs = Arc::new(QuestState::restore(
            self.name.clone(),
            player.object_id(),
            vars,
            self.services.persistence.clone(),
        ));
        player.set_quest_state(qs.clone());
        qs
    }

    // ===== Start conditions =====

    pub fn add_cond_start<F>(&self, predicate: F, html: &str)
    where
        F: Fn(&Player) -> bool + Send + Sync + 'static,
    {
        self.conditions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(predicate, html);
    }

    pub fn add_cond_min_level(&self, min: i32, html: &str) {
        self.add_cond_start(move |p| p.level() >= min, html);
    }

    pub fn add_cond_max_level(&self, max: i32, html: &str) {
        self.add_cond_start(move |p| p.level() <= max, html);
    }

    pub fn add_cond_level_range(&self, min: i32, max: i32, html: &str) {
        self.add_cond_start(move |p| (min..=max).contains(&p.level()), html);
    }

    pub fn add_cond_completed_quest(&self, quest_name: &str, html: &str) {
        let quest_name = quest_name.to_string();
        self.add_cond_start(
            move |p| p.quest_state(&quest_name).is_some_and(|qs| qs.is_completed()),
            html,
        );
    }

    pub fn can_start_quest(&self, player: &Player) -> bool {
        self.conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .can_start(player)
    }

    /// Fallback of the first failing start condition
    pub fn start_condition_html(&self, player: &Player) -> Option<String> {
        self.conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_html(player)
            .map(str::to_string)
    }

    // ===== Listener helpers =====

    fn bind<E, F>(&self, event_type: EventType, scope: Scope, ids: &[i32], f: F) -> Vec<Arc<EventListener>>
    where
        E: EventPayload,
        F: Fn(&Quest, &E) + Send + Sync + 'static,
    {
        let this = self.this.clone();
        self.services.binder.register_consumer::<E, _>(&self.script, event_type, scope, ids, move |event| {
            if let Some(quest) = this.upgrade() {
                f(&quest, event);
            }
        })
    }

    /// NPCs that offer this quest. Talks to them pass the start conditions
    /// first.
    pub fn add_start_npc(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.start_npcs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids.iter().copied());
        self.bind::<OnNpcQuestStart, _>(EventType::OnNpcQuestStart, Scope::Npc, ids, |quest, e| {
            quest.notify_talk(&e.npc, &e.player);
        })
    }

    pub fn add_talk_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnNpcTalk, _>(EventType::OnNpcTalk, Scope::Npc, ids, |quest, e| {
            quest.notify_talk(&e.npc, &e.player);
        })
    }

    pub fn add_first_talk_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnNpcFirstTalk, _>(EventType::OnNpcFirstTalk, Scope::Npc, ids, |quest, e| {
            if let Some(result) = quest.handler.on_first_talk(quest, &e.npc, &e.player) {
                quest.show_result(&e.player, &result);
            }
        })
    }

    pub fn add_kill_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnAttackableKill, _>(EventType::OnAttackableKill, Scope::Npc, ids, |quest, e| {
            if let Some(result) = quest.handler.on_kill(quest, &e.target, &e.attacker, e.is_summon) {
                quest.show_result(&e.attacker, &result);
            }
        })
    }

    pub fn add_attack_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnAttackableAttack, _>(EventType::OnAttackableAttack, Scope::Npc, ids, |quest, e| {
            if let Some(result) =
                quest
                    .handler
                    .on_attack(quest, &e.target, &e.attacker, e.damage, e.is_summon)
            {
                quest.show_result(&e.attacker, &result);
            }
        })
    }

    pub fn add_spawn_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnNpcSpawn, _>(EventType::OnNpcSpawn, Scope::Npc, ids, |quest, e| {
            quest.handler.on_spawn(quest, &e.npc);
        })
    }

    pub fn add_enter_zone_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        self.bind::<OnCreatureZoneEnter, _>(EventType::OnCreatureZoneEnter, Scope::Zone, ids, |quest, e| {
            let result = quest.handler.on_enter_zone(quest, &e.creature, &e.zone);
            if let (Some(result), Some(player)) = (result, e.creature.as_player()) {
                quest.show_result(player, &result);
            }
        })
    }

    /// Visibility check: hides the NPC from players the handler rejects
    pub fn add_see_id(&self, ids: &[i32]) -> Vec<Arc<EventListener>> {
        let this = self.this.clone();
        self.services
            .binder
            .register_function::<OnNpcCanBeSeen, TerminateReturn, _>(
                &self.script,
                EventType::OnNpcCanBeSeen,
                Scope::Npc,
                ids,
                move |e| {
                    let quest = this.upgrade()?;
                    if quest.handler.on_can_see(&quest, &e.npc, &e.player) {
                        None
                    } else {
                        Some(TerminateReturn::terminate())
                    }
                },
            )
    }

    fn notify_talk(&self, npc: &Arc<Npc>, player: &Arc<Player>) {
        let state = self.get_quest_state(player, false);
        let is_start_npc = self
            .start_npcs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&npc.id());

        if is_start_npc && state.as_ref().is_none_or(|qs| qs.is_created()) {
            if let Some(html) = self.start_condition_html(player) {
                self.show_result(player, &html);
                return;
            }
        } else if state.is_none() {
            debug!("{}: {} has no state, ignoring talk to {}", self.name, player.name(), npc.name());
            return;
        }

        if let Some(result) = self.handler.on_talk(self, npc, player) {
            self.show_result(player, &result);
        }
    }

    // ===== Presentation =====

    /// Render one of this quest's html files
    pub fn render_html(&self, player: &Player, file: &str, substitutions: &[(&str, &str)]) -> Option<String> {
        let resource = format!("{}/{}", self.name, file);
        self.services.html.render(player, &resource, substitutions)
    }

    pub fn show_result(&self, player: &Player, result: &str) {
        if result.ends_with(".htm") || result.ends_with(".html") {
            match self.render_html(player, result, &[]) {
                Some(html) => player.send_html(html),
                None => {
                    warn!("{}: missing html {}", self.name, result);
                    player.send_html(format!(
                        "<html><body>My text is missing:<br>{}/{}</body></html>",
                        self.name, result
                    ));
                }
            }
        } else if result.starts_with("<html") {
            player.send_html(result);
        } else {
            player.send_message(result);
        }
    }

    // ===== Timers =====

    /// Start a timer unless one with the same (name, npc, player) is running
    pub fn start_quest_timer(
        &self,
        name: &str,
        delay: Duration,
        npc: Option<&Arc<Npc>>,
        player: Option<&Arc<Player>>,
        repeating: bool,
    ) -> bool {
        let key = TimerKey::new(name, npc.map(|n| n.object_id()), player.map(|p| p.object_id()));

        let this = self.this.clone();
        let timer_name = name.to_string();
        let npc = npc.cloned();
        let player = player.cloned();
        self.timers.start(key, delay, repeating, move || {
            let Some(quest) = this.upgrade() else {
                return;
            };
            let result = quest
                .handler
                .on_timer(&quest, &timer_name, npc.as_ref(), player.as_ref());
            if let (Some(result), Some(player)) = (result, player.as_ref()) {
                quest.show_result(player, &result);
            }
        })
    }

    pub fn get_quest_timer(&self, name: &str, npc: Option<&Npc>, player: Option<&Player>) -> Option<Arc<QuestTimer>> {
        self.timers.get(&timer_key(name, npc, player))
    }

    pub fn have_quest_timer(&self, name: &str) -> bool {
        self.timers.has_named(name)
    }

    pub fn cancel_quest_timer(&self, name: &str, npc: Option<&Npc>, player: Option<&Player>) -> bool {
        self.timers.cancel(&timer_key(name, npc, player))
    }

    /// Cancel every timer called `name`
    pub fn cancel_quest_timers(&self, name: &str) -> usize {
        self.timers.cancel_named(name)
    }

    // ===== Quest-wide variables =====

    pub fn save_global_var(&self, var: &str, value: impl ToString) {
        self.services
            .persistence
            .save_global_var(&self.name, var, &value.to_string());
    }

    pub async fn load_global_var(&self, var: &str) -> Option<String> {
        self.services.persistence.load_global_var(&self.name, var).await
    }

    pub fn delete_global_var(&self, var: &str) {
        self.services.persistence.delete_global_var(&self.name, var);
    }

    /// Uniform in `0..max`, 0 when `max` is not positive
    pub fn random(max: i32) -> i32 {
        if max <= 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..max)
    }

    /// Cancel timers and unbind every listener
    pub fn unload(&self) -> usize {
        let timers = self.timers.cancel_all();
        if timers > 0 {
            info!("{}: cancelled {} timers", self.name, timers);
        }
        self.script.unload()
    }
}

fn timer_key(name: &str, npc: Option<&Npc>, player: Option<&Player>) -> TimerKey {
    TimerKey::new(name, npc.map(Npc::object_id), player.map(Player::object_id))
}

impl fmt::Debug for Quest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("listeners", &self.script.listener_count())
            .finish()
    }
}
