//! Village guard behaviour
//!
//! A manifest-driven script: chat filtering on the global scope, a watcher
//! NPC only veterans of the tutorial can see, and a bounty counter for
//! monster kills.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use super::tutorial;
use crate::engine::Engine;
use crate::event::{
    ChatFilterReturn, ChatType, EventType, OnAttackableKill, OnNpcCanBeSeen, OnNpcSpawn, OnPlayerChat,
    TerminateReturn,
};
use crate::script::{BindingManifest, Scope, Script};

pub const NAME: &str = "guard_ai";

/// Seen only by players who finished the tutorial
pub const HIDDEN_WATCHER: i32 = 30003;

/// Players below this level can't shout
pub const SHOUT_MIN_LEVEL: i32 = 5;

const BANNED_WORDS: &[&str] = &["darn", "heck"];

/// Mask every banned word with asterisks
pub fn censor(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            if BANNED_WORDS.iter().any(|banned| word.eq_ignore_ascii_case(banned)) {
                "*".repeat(word.len())
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn manifest(bounties: Arc<AtomicU64>) -> BindingManifest {
    BindingManifest::new()
        // Spawn log for every guard-level NPC
        .on(EventType::OnNpcSpawn, Scope::Npc)
        .npc_level(40)
        .consumer::<OnNpcSpawn, _>(|e| {
            debug!("Guard {} ({}) on duty", e.npc.name(), e.npc.object_id());
        })
        .on(EventType::OnNpcCanBeSeen, Scope::Npc)
        .ids([HIDDEN_WATCHER])
        .function::<OnNpcCanBeSeen, TerminateReturn, _>(|e| {
            let veteran = e
                .player
                .quest_state(tutorial::NAME)
                .is_some_and(|qs| qs.is_completed());
            (!veteran).then(TerminateReturn::terminate)
        })
        .on(EventType::OnPlayerChat, Scope::Global)
        .function::<OnPlayerChat, ChatFilterReturn, _>(|e| {
            let censored = censor(&e.text);
            (censored != e.text).then(|| ChatFilterReturn::new(censored, e.chat_type, false, false))
        })
        .on(EventType::OnPlayerChat, Scope::Global)
        .priority(10)
        .function::<OnPlayerChat, ChatFilterReturn, _>(|e| {
            let muted = e.chat_type == ChatType::Shout && e.player.level() < SHOUT_MIN_LEVEL;
            muted.then(|| ChatFilterReturn::new(censor(&e.text), ChatType::General, true, false))
        })
        .on(EventType::OnAttackableKill, Scope::GlobalMonsters)
        .consumer::<OnAttackableKill, _>(move |e| {
            let total = bounties.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("{} claimed bounty on {} (total {})", e.attacker.name(), e.target.name(), total);
        })
}

/// Bind the guard script. Returns the shared bounty counter.
pub fn load(engine: &Engine) -> Arc<AtomicU64> {
    let bounties = Arc::new(AtomicU64::new(0));
    let script = Script::new(NAME);
    engine.binder().register_manifest(&script, manifest(bounties.clone()));

    let script = engine.add_script(script);
    info!(
        "{} guarding {} npcs",
        NAME,
        script.registered_ids(Scope::Npc).len()
    );
    bounties
}
