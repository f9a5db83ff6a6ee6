use std::sync::Arc;

use super::{Location, Template};
use crate::listener::ListenersContainer;

/// A spawned NPC instance
#[derive(Debug)]
pub struct Npc {
    object_id: i32,
    /// Template this NPC was spawned from (e.g. 30001 "Elder Villager")
    template: Arc<Template>,
    pub spawn: Location,
}

impl Npc {
    pub fn new(object_id: i32, template: Arc<Template>, spawn: Location) -> Self {
        Self {
            object_id,
            template,
            spawn,
        }
    }

    pub fn object_id(&self) -> i32 {
        self.object_id
    }

    /// Template id
    pub fn id(&self) -> i32 {
        self.template.id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn level(&self) -> i32 {
        self.template.level
    }

    pub fn is_monster(&self) -> bool {
        self.template.monster
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// NPC listeners live on the template, shared by every spawn of it
    pub fn listeners(&self) -> &Arc<ListenersContainer> {
        self.template.listeners()
    }
}
