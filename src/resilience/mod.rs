//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Poll tick completes:
//!     → backoff.rs (jittered wait before the next tick)
//! ```
//!
//! # Design Decisions
//! - Poll errors never stop the loop; the next tick is the retry
//! - Jittered waits prevent a thundering herd against the config source
//! - Network deadlines live with the transports (see `net::dialer`)

pub mod backoff;
