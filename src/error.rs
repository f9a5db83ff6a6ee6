//! Error types shared across the scripting engine.
//!
//! Nothing in here is fatal for the server: binding errors skip one binding,
//! store errors are logged by the persistence writer, and data/config errors
//! are reported to the binary which falls back to defaults.

use std::path::PathBuf;

use thiserror::Error;

use crate::event::{EventType, ReturnKind};
use crate::script::Scope;

/// Errors raised while binding a script callback to listener containers.
#[derive(Debug, Error)]
pub enum BindError {
    /// The callback's payload type does not match the event type's payload.
    #[error("{event_type} expects payload {expected}, callback takes {found}")]
    PayloadMismatch {
        event_type: EventType,
        expected: &'static str,
        found: &'static str,
    },

    /// The callback returns a type the event type does not accept.
    #[error("{event_type} does not accept {found:?} returns (accepts {accepted:?})")]
    ReturnMismatch {
        event_type: EventType,
        found: ReturnKind,
        accepted: &'static [ReturnKind],
    },

    /// An id could not be resolved through the scope's registry.
    #[error("no {scope} registered with id {id}")]
    UnresolvedId { scope: Scope, id: i32 },
}

/// Errors raised by a quest store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend refused the operation (used by in-memory stores).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while loading template or HTML data from disk.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Errors raised while loading the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
