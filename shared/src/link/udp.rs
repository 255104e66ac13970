//! UDP emulation of the radio link
//!
//! Each radio channel maps to a port: a node listens on
//! `listen_base_port + channel` and transmits to `remote_base_port + channel`,
//! so two nodes only hear each other while tuned to the same channel.
//!
//! Every datagram is framed as:
//! ```text
//! [ 6 bytes: source address ][ 1 byte: kind ][ 1 byte: sequence ][ N bytes: payload ]
//! ```
//!
//! A background radio task owns the socket while a channel is configured. It
//! answers every data frame with an ack frame carrying the same sequence
//! number, the way the real radio acknowledges at the link layer. A send that
//! sees no matching ack within `ack_timeout` fails with
//! [`LinkError::SendFailed`].

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{LinkChannel, LinkError, LinkStatus, PeerTable};
use crate::{protocol, PeerAddress, RadioChannel};

/// Source address, kind and sequence number
const HEADER_LEN: usize = PeerAddress::LEN + 2;

/// Largest frame the emulated radio carries (ESP-NOW payload limit + header)
const MAX_FRAME: usize = 250 + HEADER_LEN;

/// Pause after a socket error before the radio task reads again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

type Inbound = io::Result<(PeerAddress, Bytes)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Data = 0x01,
    Ack = 0x02,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameKind::Data),
            0x02 => Some(FrameKind::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    source: PeerAddress,
    kind: FrameKind,
    seq: u8,
    payload: Bytes,
}

/// Configuration for the UDP radio emulation
#[derive(Debug, Clone)]
pub struct UdpLinkConfig {
    /// Link-layer address of this node
    pub local_address: PeerAddress,
    /// Interface both nodes share
    pub bind_ip: IpAddr,
    /// Port base this node listens on
    pub listen_base_port: u16,
    /// Port base the counterpart listens on
    pub remote_base_port: u16,
    /// Peer table capacity
    pub max_peers: usize,
    /// Wait for the link-layer ack of each send
    pub ack_timeout: Duration,
}

impl Default for UdpLinkConfig {
    fn default() -> Self {
        Self {
            local_address: PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_base_port: 47000,
            remote_base_port: 48000,
            max_peers: protocol::MAX_PEERS,
            ack_timeout: protocol::LINK_ACK_TIMEOUT,
        }
    }
}

impl UdpLinkConfig {
    fn listen_addr(&self, channel: RadioChannel) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.listen_base_port + u16::from(channel.get()))
    }

    fn remote_addr(&self, channel: RadioChannel) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.remote_base_port + u16::from(channel.get()))
    }
}

/// Socket tuned to one channel plus the task reading it
struct Radio {
    socket: Arc<UdpSocket>,
    channel: RadioChannel,
    data_rx: mpsc::UnboundedReceiver<Inbound>,
    ack_rx: mpsc::UnboundedReceiver<(PeerAddress, u8)>,
    task: JoinHandle<()>,
}

impl Drop for Radio {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Radio link emulated over UDP
pub struct UdpLink {
    config: UdpLinkConfig,
    radio: Option<Radio>,
    peers: PeerTable,
    seq: u8,
}

impl UdpLink {
    /// Create an unconfigured link; call `configure` before use
    pub fn new(config: UdpLinkConfig) -> Self {
        let peers = PeerTable::new(config.max_peers);
        Self {
            config,
            radio: None,
            peers,
            seq: 0,
        }
    }
}

/// Build a frame carrying the source address
fn frame(source: PeerAddress, kind: FrameKind, seq: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(source.as_bytes());
    buf.put_u8(kind as u8);
    buf.put_u8(seq);
    buf.put_slice(payload);
    buf.freeze()
}

/// Parse a frame; runts and unknown kinds yield `None`
fn unframe(datagram: &[u8]) -> Option<Frame> {
    let source = PeerAddress::from_slice(datagram)?;
    let kind = FrameKind::from_byte(*datagram.get(PeerAddress::LEN)?)?;
    let seq = *datagram.get(PeerAddress::LEN + 1)?;
    Some(Frame {
        source,
        kind,
        seq,
        payload: Bytes::copy_from_slice(&datagram[HEADER_LEN..]),
    })
}

/// Read the socket, ack data frames and route everything to the link
async fn radio_loop(
    socket: Arc<UdpSocket>,
    local: PeerAddress,
    data_tx: mpsc::UnboundedSender<Inbound>,
    ack_tx: mpsc::UnboundedSender<(PeerAddress, u8)>,
) {
    let mut buf = [0u8; MAX_FRAME];

    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                if data_tx.send(Err(e)).is_err() {
                    break;
                }
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        match unframe(&buf[..n]) {
            Some(Frame {
                kind: FrameKind::Data,
                source,
                seq,
                payload,
            }) => {
                let ack = frame(local, FrameKind::Ack, seq, &[]);
                if let Err(e) = socket.send_to(&ack, from).await {
                    debug!("[LINK] Ack to {} failed: {}", from, e);
                }
                if data_tx.send(Ok((source, payload))).is_err() {
                    break;
                }
            }
            Some(Frame {
                kind: FrameKind::Ack,
                source,
                seq,
                ..
            }) => {
                let _ = ack_tx.send((source, seq));
            }
            None => warn!("[LINK] Dropping malformed frame ({} bytes) from {}", n, from),
        }
    }
}

#[async_trait]
impl LinkChannel for UdpLink {
    async fn configure(&mut self, channel: RadioChannel) -> Result<(), LinkError> {
        if self.radio.as_ref().map(|r| r.channel) == Some(channel) {
            return Ok(());
        }

        // Release the old port before binding the new one
        self.radio = None;
        let addr = self.config.listen_addr(channel);
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("[LINK] Radio on channel {} ({})", channel, addr);

        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(radio_loop(
            socket.clone(),
            self.config.local_address,
            data_tx,
            ack_tx,
        ));

        self.radio = Some(Radio {
            socket,
            channel,
            data_rx,
            ack_rx,
            task,
        });
        Ok(())
    }

    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.peers.add(peer)
    }

    fn unregister_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.peers.remove(&peer)
    }

    async fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        if !self.peers.contains(&peer) {
            return Err(LinkError::PeerNotFound(peer));
        }
        let radio = self.radio.as_mut().ok_or(LinkError::NotConfigured)?;
        let target = self.config.remote_addr(radio.channel);

        // Acks left over from earlier sends are stale
        while radio.ack_rx.try_recv().is_ok() {}

        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let datagram = frame(self.config.local_address, FrameKind::Data, seq, payload);
        if let Err(e) = radio.socket.send_to(&datagram, target).await {
            debug!("[LINK] send_to {} failed: {}", target, e);
            return Err(LinkError::SendFailed(peer));
        }

        let deadline = Instant::now() + self.config.ack_timeout;
        loop {
            match timeout_at(deadline, radio.ack_rx.recv()).await {
                Ok(Some((source, acked))) if source == peer && acked == seq => return Ok(()),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => {
                    debug!("[LINK] No ack from {} on channel {}", peer, radio.channel);
                    return Err(LinkError::SendFailed(peer));
                }
            }
        }
    }

    async fn receive(
        &mut self,
        wait: Duration,
    ) -> Result<Option<(PeerAddress, Bytes)>, LinkError> {
        let radio = self.radio.as_mut().ok_or(LinkError::NotConfigured)?;

        match timeout(wait, radio.data_rx.recv()).await {
            Ok(Some(Ok(frame))) => Ok(Some(frame)),
            Ok(Some(Err(e))) => Err(LinkError::Io(e)),
            Ok(None) => Err(LinkError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "radio task stopped",
            ))),
            Err(_) => Ok(None),
        }
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            local_address: self.config.local_address,
            channel: self.radio.as_ref().map(|r| r.channel),
            peer_count: self.peers.len(),
        }
    }
}
