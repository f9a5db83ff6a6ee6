//! Quest start conditions
//!
//! An ordered list of (predicate, fallback html) pairs. Evaluation stops at the
//! first failing predicate.

use std::fmt;
use std::sync::Arc;

use crate::world::Player;

type Predicate = Arc<dyn Fn(&Player) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct StartConditions {
    conditions: Vec<(Predicate, String)>,
}

impl StartConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, predicate: F, html: impl Into<String>)
    where
        F: Fn(&Player) -> bool + Send + Sync + 'static,
    {
        self.conditions.push((Arc::new(predicate), html.into()));
    }

    pub fn can_start(&self, player: &Player) -> bool {
        self.failing_html(player).is_none()
    }

    /// Fallback of the first failing condition, `None` if all pass
    pub fn failing_html(&self, player: &Player) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(predicate, _)| !predicate(player))
            .map(|(_, html)| html.as_str())
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl fmt::Debug for StartConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartConditions")
            .field("count", &self.conditions.len())
            .finish()
    }
}
