//! Cloud configuration acquisition.
//!
//! # Data Flow
//! ```text
//! First run:
//!     bootstrap.rs races fetch.rs over every chained server
//!     and the direct fronted path → first successful payload
//!
//! Steady state:
//!     poll.rs → fetch.rs (through the egress client)
//!     → 304: nothing to do
//!     → 200: mutation merging the payload
//! ```
//!
//! # Design Decisions
//! - One EtagCache is built at startup and shared by every fetcher
//! - Poll computes its next wait independently of the fetch outcome
//! - Bootstrap losers are left to finish; their results are dropped

pub mod bootstrap;
pub mod etag;
pub mod fetch;
pub mod poll;

pub use bootstrap::{BootstrapRace, BootstrapServers, RacePath, RaceWinner};
pub use etag::EtagCache;
pub use fetch::{ConfigFetcher, FetchError};
pub use poll::{CloudPoller, Mutation, PollOutcome};
