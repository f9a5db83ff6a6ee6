//! Scripting layer for the isometric game server
//!
//! Typed events flow from the game loop through the [`dispatcher`] to
//! listeners held in per-entity [`listener`] containers. Scripts bind those
//! listeners through the [`script`] binder, and quests add per-player state,
//! timers and persistence on top ([`quest`]). [`engine::Engine`] wires it all
//! together.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod html;
pub mod listener;
pub mod quest;
pub mod script;
pub mod scripts;
pub mod worker;
pub mod world;

pub use config::EngineConfig;
pub use dispatcher::EventDispatcher;
pub use engine::{Engine, ScriptServices, Templates};
