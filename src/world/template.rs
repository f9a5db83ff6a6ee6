//! Template tables
//!
//! NPC, zone, item, castle and fortress templates loaded from TOML. Each
//! template owns the listener container scripts bind to; the container lives as
//! long as the template, across script reloads.

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::ContainerRegistry;
use crate::error::DataError;
use crate::listener::ListenersContainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Npc,
    Zone,
    Item,
    Castle,
    Fortress,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Npc => "npc",
            TemplateKind::Zone => "zone",
            TemplateKind::Item => "item",
            TemplateKind::Castle => "castle",
            TemplateKind::Fortress => "fortress",
        }
    }

    /// Subdirectory of the data dir holding this kind's TOML files
    pub fn dir_name(&self) -> &'static str {
        match self {
            TemplateKind::Npc => "npcs",
            TemplateKind::Zone => "zones",
            TemplateKind::Item => "items",
            TemplateKind::Castle => "castles",
            TemplateKind::Fortress => "fortresses",
        }
    }
}

/// Raw template as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawTemplate {
    pub name: Option<String>,
    #[serde(default)]
    pub level: i32,
    /// NPC only: attackable monster rather than a townsfolk NPC
    #[serde(default)]
    pub monster: bool,
}

/// A resolved template
#[derive(Debug)]
pub struct Template {
    pub id: i32,
    pub kind: TemplateKind,
    pub name: String,
    pub level: i32,
    pub monster: bool,
    listeners: Arc<ListenersContainer>,
}

impl Template {
    pub fn new(kind: TemplateKind, id: i32, name: impl Into<String>, level: i32) -> Self {
        let name = name.into();
        Self {
            listeners: Arc::new(ListenersContainer::new(format!("{}:{}", kind.as_str(), id))),
            id,
            kind,
            name,
            level,
            monster: false,
        }
    }

    pub fn monster(mut self) -> Self {
        self.monster = true;
        self
    }

    fn from_raw(kind: TemplateKind, id: i32, raw: &RawTemplate) -> Self {
        let mut template = Self::new(
            kind,
            id,
            raw.name.clone().unwrap_or_else(|| format!("{}_{}", kind.as_str(), id)),
            raw.level,
        );
        template.monster = raw.monster;
        template
    }

    pub fn listeners(&self) -> &Arc<ListenersContainer> {
        &self.listeners
    }
}

/// Registry for all templates of one kind
pub struct TemplateTable {
    kind: TemplateKind,
    templates: HashMap<i32, Arc<Template>>,
}

impl TemplateTable {
    pub fn new(kind: TemplateKind) -> Self {
        Self {
            kind,
            templates: HashMap::new(),
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Load all template files for this kind from `data_dir/<kind dir>`
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<usize, DataError> {
        let dir = data_dir.join(self.kind.dir_name());

        if !dir.exists() {
            warn!("{} directory does not exist: {:?}", self.kind.as_str(), dir);
            return Ok(0);
        }

        let entries = std::fs::read_dir(&dir).map_err(|source| DataError::Io {
            path: dir.clone(),
            source,
        })?;

        let before = self.templates.len();
        for entry in entries {
            let entry = entry.map_err(|source| DataError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "toml") {
                self.load_file(&path)?;
            }
        }

        let loaded = self.templates.len() - before;
        info!("Loaded {} {} templates", loaded, self.kind.as_str());
        Ok(loaded)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), DataError> {
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // Parse as table of templates keyed by id
        let table: HashMap<String, RawTemplate> =
            toml::from_str(&content).map_err(|source| DataError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        for (key, raw) in table {
            let Ok(id) = key.parse::<i32>() else {
                warn!("Skipping {} entry with non-numeric id '{}' in {:?}", self.kind.as_str(), key, path);
                continue;
            };
            if self.templates.contains_key(&id) {
                warn!("Duplicate {} id {} in {:?}, overwriting", self.kind.as_str(), id, path);
            }
            self.insert(Template::from_raw(self.kind, id, &raw));
        }

        Ok(())
    }

    pub fn insert(&mut self, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        self.templates.insert(template.id, template.clone());
        template
    }

    /// Get a template by ID
    pub fn get(&self, id: i32) -> Option<&Arc<Template>> {
        self.templates.get(&id)
    }

    /// Get all template IDs
    pub fn ids(&self) -> impl Iterator<Item = &i32> {
        self.templates.keys()
    }

    /// Get all templates
    pub fn all(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.values()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.templates.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl ContainerRegistry for TemplateTable {
    fn container(&self, id: i32) -> Option<Arc<ListenersContainer>> {
        self.templates.get(&id).map(|t| t.listeners.clone())
    }

    fn ids_at_level(&self, level: i32) -> Vec<i32> {
        let ids: BTreeSet<i32> = self
            .templates
            .values()
            .filter(|t| t.level == level)
            .map(|t| t.id)
            .collect();
        ids.into_iter().collect()
    }

    fn ids_in_range(&self, range: RangeInclusive<i32>) -> Vec<i32> {
        let ids: BTreeSet<i32> = self.templates.keys().copied().filter(|id| range.contains(id)).collect();
        ids.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_npcs_toml() -> &'static str {
        r#"
[20001]
name = "Gremlin"
level = 1
monster = true

[20002]
name = "Rabbit"
level = 1
monster = true

[30001]
name = "Elder Villager"
level = 20

[not_a_number]
name = "Broken"
"#
    }

    #[test]
    fn test_load_templates() {
        let temp_dir = TempDir::new().unwrap();
        let npc_dir = temp_dir.path().join("npcs");
        std::fs::create_dir_all(&npc_dir).unwrap();
        std::fs::write(npc_dir.join("village.toml"), create_test_npcs_toml()).unwrap();

        let mut table = TemplateTable::new(TemplateKind::Npc);
        let loaded = table.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(loaded, 3);
        let gremlin = table.get(20001).unwrap();
        assert_eq!(gremlin.name, "Gremlin");
        assert!(gremlin.monster);
        assert!(!table.get(30001).unwrap().monster);
        assert_eq!(table.ids_at_level(1), vec![20001, 20002]);
        assert_eq!(table.ids_in_range(20002..=i32::MAX), vec![20002, 30001]);
        assert!(table.ids_in_range(0..=20000).is_empty());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut table = TemplateTable::new(TemplateKind::Castle);
        assert_eq!(table.load_from_directory(temp_dir.path()).unwrap(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_container_lookup() {
        let mut table = TemplateTable::new(TemplateKind::Zone);
        let zone = table.insert(Template::new(TemplateKind::Zone, 7, "Peace Zone", 0));

        let container = table.container(7).unwrap();
        assert!(Arc::ptr_eq(&container, zone.listeners()));
        assert!(table.container(8).is_none());
    }
}
