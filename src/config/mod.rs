//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! First run (no file):
//!     defaults.rs → cloud::bootstrap race → merge.rs → defaults.rs
//!     → validation.rs → loader.rs (save) → live Configuration
//!
//! Every session:
//!     migration.rs (salvage older file) → loader.rs (load)
//!     → defaults.rs → validation.rs → live Configuration
//!
//! Steady state:
//!     cloud::poll proposes a mutation
//!     → manager.rs applies merge.rs against the live config
//!     → defaults.rs → validation.rs → version + 1 → save
//!     → atomic swap of Arc<Configuration> → published to next()
//!
//! Out-of-band edits:
//!     watcher.rs detects change → loader.rs loads
//!     → manager.rs: version != live → rewrite file from memory
//!                   version == live → same commit path as a mutation
//! ```
//!
//! # Design Decisions
//! - A Configuration is never mutated in place once published; every change
//!   is a new value
//! - Merge never applies defaults; defaults always run afterwards
//! - Validation separates syntactic (serde) from semantic checks

pub mod defaults;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod migration;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use manager::{ConfigManager, FirstRun, ManagerOptions};
pub use schema::{ChainedServerInfo, ClientConfig, Configuration, FrontedServerInfo, Role};
