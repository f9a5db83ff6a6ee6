//! Bundled Scripts
//!
//! Content shipped with the engine. Each module exposes a loader that binds
//! its listeners through the engine; `register_all` loads every one of them.

pub mod guard_ai;
pub mod tutorial;

use tracing::info;

use crate::engine::Engine;

/// Load every bundled quest and script. Returns how many were loaded.
pub fn register_all(engine: &Engine) -> usize {
    tutorial::register(engine);
    guard_ai::load(engine);

    let loaded = engine.quests().len() + engine.script_count();
    info!("Registered {} bundled scripts", loaded);
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Templates;
    use crate::quest::MemoryQuestStore;
    use std::sync::Arc;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn test_register_all_with_bundled_data() {
        let config = EngineConfig {
            data_dir: std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data"),
            ..EngineConfig::default()
        };
        let templates = Templates::load(&config.data_dir).unwrap();
        assert_eq!(templates.npcs.len(), 5);

        let engine = Engine::new(&config, templates, Arc::new(MemoryQuestStore::new()), Handle::current());
        assert_eq!(register_all(&engine), 2);
        assert!(engine.quests().get(tutorial::NAME).is_some());
        assert_eq!(engine.script_count(), 1);

        assert_eq!(engine.unload_all().await, 2);
        assert!(engine.globals().global.is_empty());
        assert_eq!(engine.script_count(), 0);
    }
}
