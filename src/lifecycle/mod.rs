//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config dir → Salvage old config → Assemble fetchers
//!     → Manager init (bootstrap race on first run)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop polling → Stop file watch → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: config directory errors are fatal to startup
//! - Shared state (ETag cache) is built once here and injected

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
