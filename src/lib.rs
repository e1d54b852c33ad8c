pub mod channel;
pub mod codec;
pub mod commands;
pub mod config;
pub mod core;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod input;
pub mod keymap;
pub mod lua;
pub mod projection;
pub mod property;
pub mod registry;
pub mod repl;
pub mod view;

pub use engine::{Engine, EventObserver, Format, PropertyValue};
pub use error::EngineError;
