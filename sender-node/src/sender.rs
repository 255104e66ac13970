//! Sender loop: sample the sensors, update the display, transmit a status
//! message to the receiver once per cycle

use anyhow::{Context, Result};
use gatelink_shared::{
    encode,
    link::{ensure_peer, UdpLinkConfig},
    protocol,
    rendezvous::{self, ScanConfig},
    LinkChannel, PeerAddress, RadioChannel, RfidStatus, StatusMessage,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::peripheral::{uid_hex, RangeSensor, StatusDisplay, TagReader};

/// Row the status line is drawn on
const STATUS_ROW: u32 = 16;

/// Configuration for the sender node
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Radio link settings (the sender's own address lives here)
    pub link: UdpLinkConfig,
    /// Address of the receiver
    pub receiver: PeerAddress,
    /// Sweep channels for the receiver before the first cycle
    pub rendezvous: bool,
    /// Channel used when the sweep is disabled
    pub channel: RadioChannel,
    /// Sweep timing
    pub scan: ScanConfig,
    /// Cycle cadence
    pub period: Duration,
    /// UID (uppercase hex) of the only authorized card
    pub authorized_uid: String,
    /// Chance a simulated card is in the field
    pub sim_tag_probability: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            link: UdpLinkConfig {
                local_address: PeerAddress::new([0x24, 0x6f, 0x28, 0x01, 0x02, 0x03]),
                listen_base_port: 47000,
                remote_base_port: 48000,
                ..Default::default()
            },
            receiver: PeerAddress::new([0x14, 0x2b, 0x2f, 0xae, 0xe3, 0xa4]),
            rendezvous: true,
            channel: RadioChannel::fallback(),
            scan: ScanConfig::default(),
            period: protocol::SENDER_PERIOD,
            authorized_uid: "786E5C3E".into(),
            sim_tag_probability: 0.2,
        }
    }
}

/// What one cycle observed and sent
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub message: StatusMessage,
    /// UID of the tag read this cycle, as uppercase hex
    pub uid: Option<String>,
    /// Line drawn on the display
    pub display_text: &'static str,
    /// Whether the link accepted the datagram
    pub delivered: bool,
}

/// Status line for an authorization result
pub fn display_text(status: RfidStatus) -> &'static str {
    match status {
        RfidStatus::Authorized => "Access Granted",
        RfidStatus::Unauthorized => "Access Denied",
        RfidStatus::Absent => "Standby",
    }
}

/// Drives the sender peripherals and the link
pub struct SenderLoop<L, R, T, D> {
    config: SenderConfig,
    link: L,
    range: R,
    tags: T,
    display: D,
    cycles: u64,
}

impl<L, R, T, D> SenderLoop<L, R, T, D>
where
    L: LinkChannel,
    R: RangeSensor,
    T: TagReader,
    D: StatusDisplay,
{
    pub fn new(config: SenderConfig, link: L, range: R, tags: T, display: D) -> Self {
        Self {
            config,
            link,
            range,
            tags,
            display,
            cycles: 0,
        }
    }

    /// Select the channel, register the receiver and send the greeting
    pub async fn setup(&mut self) -> Result<RadioChannel> {
        let receiver = self.config.receiver;

        let channel = if self.config.rendezvous {
            info!("[SCAN] Looking for receiver {}", receiver);
            rendezvous::scan_for_receiver(&mut self.link, receiver, &self.config.scan)
                .await
                .channel
        } else {
            let channel = self.config.channel;
            self.link
                .configure(channel)
                .await
                .with_context(|| format!("Failed to tune channel {}", channel))?;
            info!("[SCAN] Channel search disabled, using channel {}", channel);
            channel
        };

        if let Err(e) = ensure_peer(&mut self.link, receiver) {
            warn!("[SENDER] Failed to register receiver {}: {}", receiver, e);
        }

        if let Err(e) = self.link.send(receiver, protocol::GREETING_PAYLOAD).await {
            warn!("[SENDER] Greeting not delivered: {}", e);
        }

        info!("[SENDER] {}", self.link.status());
        Ok(channel)
    }

    /// Run one cycle
    pub async fn tick(&mut self) -> CycleOutcome {
        let distance_cm = match self.range.read_distance_cm() {
            Ok(distance) => distance,
            Err(e) => {
                warn!("[SENDER] Distance read failed: {}", e);
                protocol::NO_READING_CM
            }
        };
        info!("[SENDER] Distance: {} cm", distance_cm);

        let uid = match self.tags.poll_tag() {
            Ok(tag) => tag.map(|raw| uid_hex(&raw)),
            Err(e) => {
                warn!("[SENDER] Tag read failed: {}", e);
                None
            }
        };

        let rfid_status = match &uid {
            Some(uid) if *uid == self.config.authorized_uid => {
                info!("[SENDER] Card {}: authorized", uid);
                RfidStatus::Authorized
            }
            Some(uid) => {
                info!("[SENDER] Card {}: unknown", uid);
                RfidStatus::Unauthorized
            }
            None => RfidStatus::Absent,
        };

        let text = display_text(rfid_status);
        self.display.clear();
        self.display.text(text, 0, STATUS_ROW);
        self.display.show();

        let message = StatusMessage::new(distance_cm, rfid_status);
        let payload = encode(&message);
        let delivered = match self.link.send(self.config.receiver, &payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[SENDER] Send failed: {}", e);
                false
            }
        };
        debug!("[SENDER] Sent {:?}", payload);

        self.cycles += 1;

        CycleOutcome {
            message,
            uid,
            display_text: text,
            delivered,
        }
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}
