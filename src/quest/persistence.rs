//! Quest persistence writer
//!
//! Quest state mutations happen on dispatch threads that must not block, so
//! writes are queued to a single background task that applies them in order.
//! Store failures are logged and dropped; the in-memory state stays
//! authoritative for the session.
//!
//! ```text
//!   QuestState::set ─┐
//!   exit_quest ──────┼─► [unbounded queue] ─► writer task ─► QuestStore
//!   save_global_var ─┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::store::{QuestStore, QuestVarRow};

enum PersistOp {
    UpsertVar {
        quest: Arc<str>,
        char_id: i32,
        var: String,
        value: String,
    },
    DeleteVar {
        quest: Arc<str>,
        char_id: i32,
        var: String,
    },
    DeleteQuest {
        quest: Arc<str>,
        char_id: i32,
        keep_state: bool,
    },
    SaveGlobal {
        quest: Arc<str>,
        var: String,
        value: String,
    },
    DeleteGlobal {
        quest: Arc<str>,
        var: String,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct QuestPersistence {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    tx: mpsc::UnboundedSender<PersistOp>,
    store: Arc<dyn QuestStore>,
}

impl QuestPersistence {
    /// Start the writer task on the current tokio runtime
    pub fn spawn(store: Arc<dyn QuestStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), rx));
        Self {
            inner: Some(Inner { tx, store }),
        }
    }

    /// Persistence that drops every write and loads nothing
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    fn send(&self, op: PersistOp) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.tx.send(op).is_err() {
            warn!("Quest persistence writer is gone, dropping write");
        }
    }

    pub fn upsert_var(&self, quest: &Arc<str>, char_id: i32, var: &str, value: &str) {
        self.send(PersistOp::UpsertVar {
            quest: quest.clone(),
            char_id,
            var: var.to_string(),
            value: value.to_string(),
        });
    }

    pub fn delete_var(&self, quest: &Arc<str>, char_id: i32, var: &str) {
        self.send(PersistOp::DeleteVar {
            quest: quest.clone(),
            char_id,
            var: var.to_string(),
        });
    }

    pub fn delete_quest(&self, quest: &Arc<str>, char_id: i32, keep_state: bool) {
        self.send(PersistOp::DeleteQuest {
            quest: quest.clone(),
            char_id,
            keep_state,
        });
    }

    pub fn save_global_var(&self, quest: &Arc<str>, var: &str, value: &str) {
        self.send(PersistOp::SaveGlobal {
            quest: quest.clone(),
            var: var.to_string(),
            value: value.to_string(),
        });
    }

    pub fn delete_global_var(&self, quest: &Arc<str>, var: &str) {
        self.send(PersistOp::DeleteGlobal {
            quest: quest.clone(),
            var: var.to_string(),
        });
    }

    /// Wait until every write queued before this call has been applied
    pub async fn flush(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if inner.tx.send(PersistOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Every persisted variable of a character. Pending writes are flushed
    /// first so a reload sees them.
    pub async fn load_vars(&self, char_id: i32) -> Vec<QuestVarRow> {
        let Some(inner) = &self.inner else {
            return Vec::new();
        };
        self.flush().await;
        match inner.store.select_vars_for_char(char_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load quest vars for char {}: {}", char_id, e);
                Vec::new()
            }
        }
    }

    pub async fn load_global_var(&self, quest: &str, var: &str) -> Option<String> {
        let inner = self.inner.as_ref()?;
        self.flush().await;
        match inner.store.load_global_var(quest, var).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to load global var {}.{}: {}", quest, var, e);
                None
            }
        }
    }
}

async fn run_writer(store: Arc<dyn QuestStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        let (what, result) = match op {
            PersistOp::UpsertVar {
                quest,
                char_id,
                var,
                value,
            } => ("upsert", store.upsert_var(&quest, char_id, &var, &value).await),
            PersistOp::DeleteVar { quest, char_id, var } => {
                ("delete var", store.delete_var(&quest, char_id, &var).await)
            }
            PersistOp::DeleteQuest {
                quest,
                char_id,
                keep_state,
            } => ("delete quest", store.delete_quest(&quest, char_id, keep_state).await),
            PersistOp::SaveGlobal { quest, var, value } => {
                ("save global", store.save_global_var(&quest, &var, &value).await)
            }
            PersistOp::DeleteGlobal { quest, var } => {
                ("delete global", store.delete_global_var(&quest, &var).await)
            }
            PersistOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        if let Err(e) = result {
            warn!("Quest persistence {} failed: {}", what, e);
        }
    }
    debug!("Quest persistence writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::store::MemoryQuestStore;

    #[tokio::test]
    async fn test_writes_apply_in_order() {
        let store = Arc::new(MemoryQuestStore::new());
        let persistence = QuestPersistence::spawn(store.clone());
        let quest: Arc<str> = Arc::from("Q001_Tutorial");

        persistence.upsert_var(&quest, 1, "cond", "1");
        persistence.upsert_var(&quest, 1, "cond", "2");
        persistence.upsert_var(&quest, 1, "kills", "4");
        persistence.delete_var(&quest, 1, "kills");
        persistence.flush().await;

        let vars = store.vars_of(1, "Q001_Tutorial");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["cond"], "2");
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let store = Arc::new(MemoryQuestStore::new());
        let persistence = QuestPersistence::spawn(store.clone());
        let quest: Arc<str> = Arc::from("Q001_Tutorial");

        store.set_failing(true);
        persistence.upsert_var(&quest, 1, "cond", "1");
        persistence.flush().await;
        assert!(persistence.load_vars(1).await.is_empty());

        store.set_failing(false);
        persistence.upsert_var(&quest, 1, "cond", "3");
        assert_eq!(persistence.load_vars(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_global_vars() {
        let persistence = QuestPersistence::spawn(Arc::new(MemoryQuestStore::new()));
        let quest: Arc<str> = Arc::from("Q001_Tutorial");

        persistence.save_global_var(&quest, "season", "2");
        assert_eq!(persistence.load_global_var("Q001_Tutorial", "season").await, Some("2".into()));

        persistence.delete_global_var(&quest, "season");
        assert_eq!(persistence.load_global_var("Q001_Tutorial", "season").await, None);
    }

    #[tokio::test]
    async fn test_disabled_is_inert() {
        let persistence = QuestPersistence::disabled();
        persistence.upsert_var(&Arc::from("Q"), 1, "cond", "1");
        persistence.flush().await;
        assert!(!persistence.is_enabled());
        assert!(persistence.load_vars(1).await.is_empty());
    }
}
