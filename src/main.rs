use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{error, info, warn};

use isometric_scripting::config::EngineConfig;
use isometric_scripting::engine::{Engine, Templates};
use isometric_scripting::quest::{MemoryQuestStore, QuestStore, SqliteQuestStore};
use isometric_scripting::scripts;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match config.log_filter.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log_filter '{}': {}", config.log_filter, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store: Arc<dyn QuestStore> = if config.persistence.in_memory {
        info!("Using in-memory quest store");
        Arc::new(MemoryQuestStore::new())
    } else {
        match SqliteQuestStore::new(&config.database_url, config.persistence.max_connections).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("Quest store unavailable ({}), progress will not survive a restart", e);
                Arc::new(MemoryQuestStore::new())
            }
        }
    };

    let templates = match Templates::load(&config.data_dir) {
        Ok(templates) => templates,
        Err(e) => {
            error!("Failed to load templates: {}", e);
            Templates::empty()
        }
    };

    let engine = Engine::new(&config, templates, store, Handle::current());
    scripts::register_all(&engine);

    if config.html_hot_reload {
        match engine.start_html_watcher() {
            Ok(mut changes) => {
                tokio::spawn(async move {
                    while let Some(path) = changes.recv().await {
                        info!("Html hot-reload: {:?}", path);
                    }
                });
                info!("Html hot-reload enabled");
            }
            Err(e) => warn!("Html hot-reload disabled: {}", e),
        }
    }

    info!(
        "Script engine ready: {} quests, data from {:?}",
        engine.quests().len(),
        config.data_dir
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    engine.unload_all().await;
}
