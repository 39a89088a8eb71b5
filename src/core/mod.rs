//! NOMAD Mux - Core traits, types, and constants.
//!
//! This module provides the foundational types shared by the framing,
//! telemetry and session layers. It has no task or runtime state.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
