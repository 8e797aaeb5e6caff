//! Client-driven throughput measurement against the firewall service
//!
//! - `engine`: sequential timed rounds with cooperative cancellation
//! - `trial`: per-round results, sessions and rate computation

pub mod engine;
pub mod trial;

pub use engine::{DEFAULT_MULTI_ROUNDS, SpeedEvent, SpeedTestEngine, SpeedTestError};
pub use trial::{Direction, MIN_ELAPSED_SECS, Mode, SpeedSession, SpeedTrial};
