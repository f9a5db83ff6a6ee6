//! Listener return protocol
//!
//! A listener result carries two flags: `override` replaces whatever result an
//! earlier listener produced in the same dispatch, `abort` stops the dispatch.

use std::any::Any;
use std::fmt;

use super::payloads::ChatType;
use super::types::ReturnKind;
use crate::world::Location;

/// Type-erased listener result.
pub trait EventReturn: Any + Send + Sync + fmt::Debug {
    fn kind(&self) -> ReturnKind;

    fn is_override(&self) -> bool;

    fn is_abort(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// A concrete return type with a statically known kind.
pub trait ReturnType: EventReturn + Sized {
    const KIND: ReturnKind;
}

/// The override/abort pair every return type embeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnFlags {
    pub override_: bool,
    pub abort: bool,
}

impl ReturnFlags {
    pub fn new(override_: bool, abort: bool) -> Self {
        Self { override_, abort }
    }
}

macro_rules! impl_return {
    ($ty:ident => $kind:ident) => {
        impl EventReturn for $ty {
            fn kind(&self) -> ReturnKind {
                ReturnKind::$kind
            }

            fn is_override(&self) -> bool {
                self.flags.override_
            }

            fn is_abort(&self) -> bool {
                self.flags.abort
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
                self
            }
        }

        impl ReturnType for $ty {
            const KIND: ReturnKind = ReturnKind::$kind;
        }
    };
}

/// Yes/no answer, e.g. "may this player see this NPC?" or "may this item be used?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateReturn {
    pub terminate: bool,
    pub flags: ReturnFlags,
}

impl TerminateReturn {
    pub fn new(terminate: bool, override_: bool, abort: bool) -> Self {
        Self {
            terminate,
            flags: ReturnFlags::new(override_, abort),
        }
    }

    /// Terminate, replacing any earlier answer
    pub fn terminate() -> Self {
        Self::new(true, true, true)
    }

    /// Let the action proceed without overriding earlier answers
    pub fn proceed() -> Self {
        Self::new(false, false, false)
    }
}

/// Replacement text for a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFilterReturn {
    pub text: String,
    pub chat_type: ChatType,
    pub flags: ReturnFlags,
}

impl ChatFilterReturn {
    pub fn new(text: impl Into<String>, chat_type: ChatType, override_: bool, abort: bool) -> Self {
        Self {
            text: text.into(),
            chat_type,
            flags: ReturnFlags::new(override_, abort),
        }
    }
}

/// Replacement destination for a teleport
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReturn {
    /// `None` keeps the original destination
    pub location: Option<Location>,
    pub flags: ReturnFlags,
}

impl LocationReturn {
    pub fn new(location: Option<Location>, override_: bool, abort: bool) -> Self {
        Self {
            location,
            flags: ReturnFlags::new(override_, abort),
        }
    }

    pub fn redirect(location: Location) -> Self {
        Self::new(Some(location), true, false)
    }
}

/// Replacement damage value
#[derive(Debug, Clone, PartialEq)]
pub struct DamageReturn {
    pub damage: f64,
    pub flags: ReturnFlags,
}

impl DamageReturn {
    pub fn new(damage: f64, override_: bool, abort: bool) -> Self {
        Self {
            damage,
            flags: ReturnFlags::new(override_, abort),
        }
    }
}

impl_return!(TerminateReturn => Terminate);
impl_return!(ChatFilterReturn => ChatFilter);
impl_return!(LocationReturn => Location);
impl_return!(DamageReturn => Damage);
