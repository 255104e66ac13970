//! Link layer abstraction for the point-to-point radio
//!
//! The [`LinkChannel`] trait is the datagram primitive both nodes run on:
//! channel selection, a small peer table, acknowledged sends and bounded
//! receives. Two backends are provided:
//! - [`UdpLink`]: host emulation of the radio over UDP, one port per channel
//! - [`MemoryLink`]: an in-process shared medium used by tests

mod memory;
mod udp;

pub use memory::{Ether, MemoryLink};
pub use udp::{UdpLink, UdpLinkConfig};

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{PeerAddress, RadioChannel};

/// Errors surfaced by a link backend
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Send failed: no link-layer acknowledgment from {0}")]
    SendFailed(PeerAddress),

    #[error("Peer already registered: {0}")]
    PeerExists(PeerAddress),

    #[error("Peer table full ({0} entries)")]
    PeerTableFull(usize),

    #[error("Peer not registered: {0}")]
    PeerNotFound(PeerAddress),

    #[error("Radio channel not configured")]
    NotConfigured,

    #[error("Invalid radio channel: {0}")]
    InvalidChannel(u8),

    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Failures callers may ignore outright (duplicate peer registration)
    pub fn is_benign(&self) -> bool {
        matches!(self, LinkError::PeerExists(_))
    }
}

/// Read-only snapshot of the link for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub local_address: PeerAddress,
    pub channel: Option<RadioChannel>,
    pub peer_count: usize,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(channel) => write!(
                f,
                "addr={} channel={} peers={}",
                self.local_address, channel, self.peer_count
            ),
            None => write!(
                f,
                "addr={} channel=unset peers={}",
                self.local_address, self.peer_count
            ),
        }
    }
}

/// Point-to-point datagram link
#[async_trait]
pub trait LinkChannel: Send {
    /// Tune the radio to a channel
    async fn configure(&mut self, channel: RadioChannel) -> Result<(), LinkError>;

    /// Add a peer to the peer table
    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError>;

    /// Remove a peer from the peer table
    fn unregister_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError>;

    /// Send a datagram to a registered peer
    async fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError>;

    /// Wait up to `timeout` for a datagram from any address
    ///
    /// Returns `Ok(None)` when the wait expires.
    async fn receive(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<(PeerAddress, Bytes)>, LinkError>;

    /// Snapshot of the link state
    fn status(&self) -> LinkStatus;
}

/// Register a peer, treating a duplicate registration as success
pub fn ensure_peer<L: LinkChannel + ?Sized>(
    link: &mut L,
    peer: PeerAddress,
) -> Result<(), LinkError> {
    match link.register_peer(peer) {
        Err(e) if e.is_benign() => Ok(()),
        other => other,
    }
}

/// Fixed-capacity peer table shared by the backends
#[derive(Debug, Clone)]
pub(crate) struct PeerTable {
    peers: Vec<PeerAddress>,
    capacity: usize,
}

impl PeerTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn add(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        if self.contains(&peer) {
            return Err(LinkError::PeerExists(peer));
        }
        if self.peers.len() >= self.capacity {
            return Err(LinkError::PeerTableFull(self.capacity));
        }
        self.peers.push(peer);
        Ok(())
    }

    pub(crate) fn remove(&mut self, peer: &PeerAddress) -> Result<(), LinkError> {
        match self.peers.iter().position(|p| p == peer) {
            Some(pos) => {
                self.peers.remove(pos);
                Ok(())
            }
            None => Err(LinkError::PeerNotFound(*peer)),
        }
    }

    pub(crate) fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.contains(peer)
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }
}
