//! Network transports for fetching the cloud configuration.
//!
//! # Data Flow
//! ```text
//! ChainedServerInfo → dialer.rs → reqwest::Client via that proxy
//! trusted CAs + masquerades → fronted.rs → direct fronted responses
//! ```
//!
//! # Design Decisions
//! - Bootstrap transports never reuse connections
//! - Every connection attempt is bounded by a 30 second deadline

pub mod dialer;
pub mod fronted;

pub use dialer::{DialError, DialerFactory, ProxyDialer};
pub use fronted::{DirectFetcher, MasqueradeFetcher};
