//! Message-driven actuation for the receiver
//!
//! This module handles:
//! - Evaluating the presence, indicator and authorization rules
//! - Applying servo and indicator commands through the actuator port
//! - Holding the authorized pose for the dwell period
//! - Emitting notification events

mod engine;
pub mod rules;

pub use engine::{CycleError, CycleReport, DecisionEngine};
