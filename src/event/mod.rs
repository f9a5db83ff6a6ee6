//! Event Taxonomy
//!
//! Event kinds, their payloads and the return protocol listeners use to
//! override or abort a dispatch.

pub mod payloads;
pub mod returns;
pub mod types;

pub use payloads::*;
pub use returns::{
    ChatFilterReturn, DamageReturn, EventReturn, LocationReturn, ReturnFlags, ReturnType,
    TerminateReturn,
};
pub use types::{EventType, ReturnKind};
