//! Lab submission intake (`labsubmit`) and TA backup staging (`labbackup`).

pub mod backup;
pub mod canvas;
pub mod compiler;
pub mod config;
pub mod console;
pub mod core;
pub mod executor;
pub mod filer;
pub mod header;
pub mod memcheck;
pub mod roster;
pub mod runner;
pub mod sandbox;
pub mod submit;
pub mod window;

pub use config::{Config, ConfigError};
