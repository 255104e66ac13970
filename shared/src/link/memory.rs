//! In-process radio medium
//!
//! An [`Ether`] connects any number of [`MemoryLink`] stations. A datagram is
//! delivered only when the destination station exists and is tuned to the
//! sender's channel, otherwise the send fails the way an unacknowledged
//! radio frame does.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{LinkChannel, LinkError, LinkStatus, PeerTable};
use crate::{protocol, PeerAddress, RadioChannel};

type Frame = (PeerAddress, Bytes);

struct Station {
    channel: Option<RadioChannel>,
    inbox: mpsc::UnboundedSender<Frame>,
}

/// Shared medium connecting in-memory stations
#[derive(Clone, Default)]
pub struct Ether {
    stations: Arc<Mutex<HashMap<PeerAddress, Station>>>,
}

impl Ether {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new station with the given address
    pub fn attach(&self, address: PeerAddress) -> MemoryLink {
        let (inbox, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            address,
            Station {
                channel: None,
                inbox,
            },
        );

        MemoryLink {
            ether: self.clone(),
            address,
            channel: None,
            peers: PeerTable::new(protocol::MAX_PEERS),
            rx,
        }
    }

    /// Current channel of a station, if attached and configured
    pub fn channel_of(&self, address: &PeerAddress) -> Option<RadioChannel> {
        self.lock().get(address).and_then(|s| s.channel)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerAddress, Station>> {
        // A poisoned table only means a test task panicked mid-update
        self.stations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A station on an [`Ether`]
pub struct MemoryLink {
    ether: Ether,
    address: PeerAddress,
    channel: Option<RadioChannel>,
    peers: PeerTable,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryLink {
    pub fn address(&self) -> PeerAddress {
        self.address
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.ether.lock().remove(&self.address);
    }
}

#[async_trait]
impl LinkChannel for MemoryLink {
    async fn configure(&mut self, channel: RadioChannel) -> Result<(), LinkError> {
        self.channel = Some(channel);
        if let Some(station) = self.ether.lock().get_mut(&self.address) {
            station.channel = Some(channel);
        }
        Ok(())
    }

    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.peers.add(peer)
    }

    fn unregister_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.peers.remove(&peer)
    }

    async fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        let channel = self.channel.ok_or(LinkError::NotConfigured)?;
        if !self.peers.contains(&peer) {
            return Err(LinkError::PeerNotFound(peer));
        }

        let stations = self.ether.lock();
        match stations.get(&peer) {
            Some(station) if station.channel == Some(channel) => station
                .inbox
                .send((self.address, Bytes::copy_from_slice(payload)))
                .map_err(|_| LinkError::SendFailed(peer)),
            _ => {
                debug!("[LINK] {} not reachable on channel {}", peer, channel);
                Err(LinkError::SendFailed(peer))
            }
        }
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, LinkError> {
        if self.channel.is_none() {
            return Err(LinkError::NotConfigured);
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(frame) => Ok(frame),
            Err(_) => Ok(None),
        }
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            local_address: self.address,
            channel: self.channel,
            peer_count: self.peers.len(),
        }
    }
}
