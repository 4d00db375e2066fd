//! Cloud configuration bootstrap and refresh for a circumvention proxy.
//!
//! On first run a working configuration is raced over every packaged chained
//! proxy and a direct domain-fronted path; afterwards the document is polled
//! with conditional GETs and merged into the live configuration without ever
//! corrupting it on a bad update.

pub mod cloud;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::schema::Configuration;
pub use config::{ConfigError, ConfigManager};
pub use lifecycle::Shutdown;
