//! Voice activity detection.
//!
//! The engine trait scores individual frames; the detector wraps an engine
//! with onset/offset debouncing, a speech heartbeat, and the consecutive-
//! error guard the session relies on for fail-safety.

pub mod config;
pub mod detector;
pub mod energy;
pub mod engine;
pub mod state;
pub mod types;

pub use config::VadConfig;
pub use detector::VadDetector;
pub use energy::{EnergyVad, EnergyVadConfig};
pub use engine::VadEngine;
pub use types::{VadEvent, VadState};
