//! Cutline Common Utilities
//!
//! Shared infrastructure for all Cutline crates:
//! - Error taxonomy and result alias
//! - Frame clock and rate limiting for render loops and progress reporting
//! - Tracing/logging initialization
//! - Engine configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
