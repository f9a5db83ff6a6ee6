//! Quest timers
//!
//! A timer is identified by (name, npc, player) within its quest. Starting a
//! timer whose identity already has a live timer does nothing.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use crate::worker::{ScheduledTask, WorkerPool};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub name: String,
    /// NPC object id
    pub npc: Option<i32>,
    /// Player object id
    pub player: Option<i32>,
}

impl TimerKey {
    pub fn new(name: &str, npc: Option<i32>, player: Option<i32>) -> Self {
        Self {
            name: name.to_string(),
            npc,
            player,
        }
    }
}

pub struct QuestTimer {
    id: Uuid,
    key: TimerKey,
    repeating: bool,
    created_at: DateTime<Utc>,
    task: ScheduledTask,
}

impl QuestTimer {
    pub fn key(&self) -> &TimerKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    fn cancel(&self) {
        self.task.cancel();
    }
}

impl fmt::Debug for QuestTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestTimer")
            .field("key", &self.key)
            .field("repeating", &self.repeating)
            .field("created_at", &self.created_at)
            .finish()
    }
}

type TimerMap = DashMap<TimerKey, Arc<QuestTimer>>;

/// Every live timer of one quest
pub struct QuestTimers {
    quest: Arc<str>,
    timers: Arc<TimerMap>,
    pool: Arc<dyn WorkerPool>,
}

impl QuestTimers {
    pub fn new(quest: Arc<str>, pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            quest,
            timers: Arc::new(DashMap::new()),
            pool,
        }
    }

    /// Start a timer calling `fire` after `delay` (and every `delay` after
    /// that when repeating). Returns `false` if the identity is already live.
    pub fn start<F>(&self, key: TimerKey, delay: Duration, repeating: bool, fire: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        match self.timers.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_active() {
                    debug!("Quest {}: timer {:?} already running", self.quest, key);
                    return false;
                }
                entry.insert(self.schedule(key, delay, repeating, fire));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.schedule(key, delay, repeating, fire));
            }
        }
        true
    }

    fn schedule<F>(&self, key: TimerKey, delay: Duration, repeating: bool, fire: F) -> Arc<QuestTimer>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let task = if repeating {
            self.pool.schedule_repeating(Arc::new(fire), delay, delay)
        } else {
            let timers: Weak<TimerMap> = Arc::downgrade(&self.timers);
            let own_key = key.clone();
            self.pool.schedule(
                Box::new(move || {
                    // Drop the entry before firing so the handler may restart it
                    if let Some(timers) = timers.upgrade() {
                        timers.remove_if(&own_key, |_, timer| timer.id == id);
                    }
                    fire();
                }),
                delay,
            )
        };

        Arc::new(QuestTimer {
            id,
            key,
            repeating,
            created_at: Utc::now(),
            task,
        })
    }

    /// Live timer with this identity
    pub fn get(&self, key: &TimerKey) -> Option<Arc<QuestTimer>> {
        self.timers
            .get(key)
            .map(|t| t.value().clone())
            .filter(|t| t.is_active())
    }

    /// Whether any live timer carries `name`
    pub fn has_named(&self, name: &str) -> bool {
        self.timers
            .iter()
            .any(|t| t.key().name == name && t.value().is_active())
    }

    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some((_, timer)) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer named `name`, whatever its npc/player
    pub fn cancel_named(&self, name: &str) -> usize {
        self.cancel_where(|key| key.name == name)
    }

    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    fn cancel_where(&self, matches: impl Fn(&TimerKey) -> bool) -> usize {
        let keys: Vec<TimerKey> = self
            .timers
            .iter()
            .filter(|t| matches(t.key()))
            .map(|t| t.key().clone())
            .collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::TokioWorkerPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn timers() -> QuestTimers {
        let pool = Arc::new(TokioWorkerPool::current().unwrap());
        QuestTimers::new(Arc::from("Q001_Tutorial"), pool)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_per_identity() {
        let timers = timers();
        let key = TimerKey::new("despawn", Some(1000), Some(1));

        let (fired, fire) = counter();
        assert!(timers.start(key.clone(), Duration::from_secs(10), false, fire));
        let (_, fire) = counter();
        assert!(!timers.start(key.clone(), Duration::from_secs(10), false, fire));
        assert_eq!(timers.len(), 1);

        // Different player, different identity
        let (_, fire) = counter();
        assert!(timers.start(TimerKey::new("despawn", Some(1000), Some(2)), Duration::from_secs(10), false, fire));
        assert_eq!(timers.len(), 2);

        assert!(timers.cancel(&key));
        assert!(!timers.cancel(&key));
        let (_, fire) = counter();
        assert!(timers.start(key.clone(), Duration::from_secs(10), false, fire));
        assert!(timers.get(&key).is_some());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_removes_itself() {
        let timers = timers();
        let key = TimerKey::new("wake", None, None);
        let (fired, fire) = counter();

        timers.start(key.clone(), Duration::from_secs(1), false, fire);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timers.get(&key).is_none());
        assert!(!timers.has_named("wake"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_until_cancelled() {
        let timers = timers();
        let (fired, fire) = counter();

        timers.start(TimerKey::new("tick", None, Some(1)), Duration::from_secs(1), true, fire);
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(timers.has_named("tick"));

        assert_eq!(timers.cancel_named("tick"), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let timers = timers();
        for player in 1..=3 {
            let (_, fire) = counter();
            timers.start(TimerKey::new("t", None, Some(player)), Duration::from_secs(5), false, fire);
        }
        assert_eq!(timers.cancel_all(), 3);
        assert!(timers.is_empty());
    }
}
