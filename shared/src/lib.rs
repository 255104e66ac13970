//! GateLink Shared Protocol Types
//!
//! This crate provides the protocol types, codec, link layer and rendezvous
//! logic shared by the sender node and the receiver node.

pub mod codec;
pub mod link;
pub mod rendezvous;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;

pub use codec::{decode, encode, DecodeError};
pub use link::{LinkChannel, LinkError, LinkStatus};

/// Protocol parameters for the system
pub mod protocol {
    use std::time::Duration;

    /// Discovery payload transmitted by the sender on every scanned channel
    pub const DISCOVERY_PAYLOAD: &[u8] = b"STARTING";

    /// Acknowledgment payload returned by the receiver during rendezvous
    pub const ACK_PAYLOAD: &[u8] = b"RECEIVED";

    /// Greeting sent once by the sender after channel selection
    pub const GREETING_PAYLOAD: &[u8] = b"Starting...";

    /// Lowest regulatory 2.4 GHz channel
    pub const MIN_CHANNEL: u8 = 1;

    /// Highest regulatory 2.4 GHz channel
    pub const MAX_CHANNEL: u8 = 13;

    /// Channel used when no receiver acknowledges the sweep
    pub const FALLBACK_CHANNEL: u8 = 1;

    /// Receiver rendezvous wait per attempt
    pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Sender wait for an acknowledgment on each channel
    pub const SCAN_REPLY_TIMEOUT: Duration = Duration::from_millis(250);

    /// Pause between scanned channels so the radio settles
    pub const SCAN_SETTLE_DELAY: Duration = Duration::from_millis(100);

    /// Pause before the sweep starts
    pub const SCAN_STARTUP_DELAY: Duration = Duration::from_secs(2);

    /// Wait for the link-layer acknowledgment of a send
    pub const LINK_ACK_TIMEOUT: Duration = Duration::from_millis(50);

    /// Receiver steady-state poll timeout
    pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Interval between link-status diagnostics on the receiver
    pub const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(5);

    /// Sender cycle cadence
    pub const SENDER_PERIOD: Duration = Duration::from_secs(1);

    /// Sentinel distance meaning "no valid reading"
    pub const NO_READING_CM: f64 = -1.0;

    /// Maximum number of peers the link layer can hold
    pub const MAX_PEERS: usize = 20;
}

/// A regulatory 2.4 GHz radio channel (1..=13)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RadioChannel(u8);

impl RadioChannel {
    /// Create a channel, rejecting values outside 1..=13
    pub fn new(channel: u8) -> Result<Self, LinkError> {
        if (protocol::MIN_CHANNEL..=protocol::MAX_CHANNEL).contains(&channel) {
            Ok(Self(channel))
        } else {
            Err(LinkError::InvalidChannel(channel))
        }
    }

    /// The fallback channel used when a sweep finds no receiver
    pub fn fallback() -> Self {
        Self(protocol::FALLBACK_CHANNEL)
    }

    /// Channel number
    pub fn get(self) -> u8 {
        self.0
    }

    /// The next channel in ascending scan order, if any
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }

    /// All channels in scan order
    pub fn all() -> impl Iterator<Item = RadioChannel> {
        (protocol::MIN_CHANNEL..=protocol::MAX_CHANNEL).map(RadioChannel)
    }
}

impl Default for RadioChannel {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for RadioChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 6-byte link-layer address of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    /// Length of an address on the wire
    pub const LEN: usize = 6;

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Read an address from the first six bytes of a frame
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let head: [u8; 6] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Self(head))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when parsing a malformed address string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid peer address: {0}")]
pub struct AddressParseError(String);

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| AddressParseError(s.into()))?;
            if part.len() != 2 {
                return Err(AddressParseError(s.into()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.into()))?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError(s.into()));
        }
        Ok(Self(bytes))
    }
}

/// RFID authorization tri-state carried in every status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfidStatus {
    /// A tag was read but its UID is not authorized
    Unauthorized,
    /// No tag present this cycle
    #[default]
    Absent,
    /// The authorized tag was read
    Authorized,
}

impl RfidStatus {
    /// Wire code for this status
    pub fn code(self) -> i8 {
        match self {
            RfidStatus::Unauthorized => -1,
            RfidStatus::Absent => 0,
            RfidStatus::Authorized => 1,
        }
    }

    /// Map a decoded authorization code; anything other than exactly 1 or -1 is `Absent`
    pub fn from_code(code: f64) -> Self {
        if code == 1.0 {
            RfidStatus::Authorized
        } else if code == -1.0 {
            RfidStatus::Unauthorized
        } else {
            RfidStatus::Absent
        }
    }
}

/// The per-cycle snapshot sent from sender to receiver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusMessage {
    pub distance_cm: f64,
    pub rfid_status: RfidStatus,
}

impl StatusMessage {
    pub fn new(distance_cm: f64, rfid_status: RfidStatus) -> Self {
        Self {
            distance_cm,
            rfid_status,
        }
    }

    /// The message a receiver substitutes for a payload with too few fields
    pub fn reset() -> Self {
        Self::new(protocol::NO_READING_CM, RfidStatus::Absent)
    }

    /// Whether the distance is a genuine range reading
    pub fn has_reading(&self) -> bool {
        self.distance_cm > 0.0
    }
}
