//! HTML dialogs
//!
//! Quest and NPC dialogs are `.htm` files under the html data directory,
//! addressed by their path relative to it (e.g. `Q001_Tutorial/start.htm`).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::error::DataError;
use crate::world::Player;

/// Produces player-facing content from a named resource
pub trait HtmlRenderer: Send + Sync {
    /// Render `resource` for `player`, replacing `%key%` placeholders.
    /// `None` if the resource doesn't exist.
    fn render(&self, player: &Player, resource: &str, substitutions: &[(&str, &str)]) -> Option<String>;
}

/// Disk-backed dialog cache
pub struct HtmlCache {
    root: PathBuf,
    cache: DashMap<String, Arc<str>>,
}

impl HtmlCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw file content, cached after the first read
    pub fn load(&self, resource: &str) -> Option<Arc<str>> {
        if let Some(html) = self.cache.get(resource) {
            return Some(html.clone());
        }

        let relative = Path::new(resource);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            warn!("Rejecting html resource outside the html root: {}", resource);
            return None;
        }

        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let html: Arc<str> = Arc::from(content);
                self.cache.insert(resource.to_string(), html.clone());
                Some(html)
            }
            Err(e) => {
                debug!("Html {:?} not readable: {}", path, e);
                None
            }
        }
    }

    /// Drop the cached copy of the file at `path`. Paths outside the root
    /// clear the whole cache.
    pub fn invalidate(&self, path: &Path) {
        // Watcher events carry absolute paths, the root may be relative
        let key = path
            .strip_prefix(&self.root)
            .ok()
            .and_then(resource_key)
            .or_else(|| {
                let root = std::fs::canonicalize(&self.root).ok()?;
                path.strip_prefix(&root).ok().and_then(resource_key)
            });

        match key {
            Some(key) => {
                self.cache.remove(&key);
            }
            None => self.clear(),
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Watch the html root and invalidate files as they change. Returns a
    /// receiver of changed paths.
    pub fn start_watcher(self: &Arc<Self>) -> Result<tokio::sync::mpsc::Receiver<PathBuf>, DataError> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        info!("Html hot-reload watcher started for {:?}", self.root);

        let cache = Arc::clone(self);
        std::thread::spawn(move || {
            // Keep the watcher alive for as long as this thread runs
            let _watcher = watcher;

            while let Ok(event) = notify_rx.recv() {
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    continue;
                }

                for path in event.paths {
                    let is_html = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "htm" || e == "html");
                    if !is_html {
                        continue;
                    }

                    debug!("Html changed: {:?}", path);
                    cache.invalidate(&path);
                    if tx.blocking_send(path).is_err() {
                        error!("Html watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn resource_key(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    parts.map(|parts| parts.join("/"))
}

impl HtmlRenderer for HtmlCache {
    fn render(&self, player: &Player, resource: &str, substitutions: &[(&str, &str)]) -> Option<String> {
        let html = self.load(resource)?;

        let mut out = html
            .replace("%playername%", player.name())
            .replace("%objectId%", &player.object_id().to_string());
        for (key, value) in substitutions {
            out = out.replace(&format!("%{}%", key), value);
        }
        Some(out)
    }
}
