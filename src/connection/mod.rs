//! Receiver session management
//!
//! This module handles:
//! - Tuning the radio to the home channel
//! - Optional passive rendezvous with the sender
//! - Polling the link and handing each datagram to the decision engine
//! - Periodic link diagnostics

mod manager;

pub use manager::{ReceiverConfig, ReceiverSession, SessionEvent};
