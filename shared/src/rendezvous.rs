//! Channel rendezvous drivers
//!
//! Runs the pure state machines from [`crate::state_machine`] against a
//! [`LinkChannel`]. The receiver listens passively on its home channel; the
//! sender sweeps channels 1..=13 until the receiver acknowledges.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::link::{ensure_peer, LinkChannel};
use crate::protocol;
use crate::state_machine::{
    ChannelScan, ListenEvent, ListenSession, ListenState, ScanEvent, ScanState, TransitionResult,
};
use crate::{PeerAddress, RadioChannel};

/// Timing for the sender's sweep
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Pause before the first channel is probed
    pub startup_delay: Duration,
    /// Wait for an acknowledgment on each channel
    pub reply_timeout: Duration,
    /// Pause between channels
    pub settle_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            startup_delay: protocol::SCAN_STARTUP_DELAY,
            reply_timeout: protocol::SCAN_REPLY_TIMEOUT,
            settle_delay: protocol::SCAN_SETTLE_DELAY,
        }
    }
}

/// Outcome of the sender's sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub channel: RadioChannel,
    /// True when no channel acknowledged and the default channel was taken
    pub fallback: bool,
    pub channels_tried: u8,
}

/// Sweep channels for the receiver (sender role)
///
/// Never fails: when nothing acknowledges, the fallback channel is selected.
/// The radio is left tuned to the selected channel.
pub async fn scan_for_receiver<L: LinkChannel + ?Sized>(
    link: &mut L,
    receiver: PeerAddress,
    config: &ScanConfig,
) -> ScanOutcome {
    tokio::time::sleep(config.startup_delay).await;

    let mut scan = ChannelScan::new();

    loop {
        let channel = match scan.state() {
            ScanState::Scanning { channel } => channel,
            ScanState::Converged { channel, fallback } => {
                if fallback {
                    warn!(
                        "[SCAN] No receiver acknowledged on channels 1-13, using channel {}",
                        channel
                    );
                } else {
                    info!("[SCAN] Receiver found on channel {}", channel);
                }
                if let Err(e) = link.configure(channel).await {
                    warn!("[SCAN] Failed to retune to channel {}: {}", channel, e);
                }
                return ScanOutcome {
                    channel,
                    fallback,
                    channels_tried: scan.channels_tried(),
                };
            }
            ScanState::Init => {
                scan.process_event(ScanEvent::Start);
                continue;
            }
        };

        info!("[SCAN] Trying channel {}...", channel);
        let event = probe_channel(link, receiver, channel, config.reply_timeout).await;

        if event == ScanEvent::NoAck {
            if let Err(e) = link.unregister_peer(receiver) {
                debug!("[SCAN] Unregister {} failed: {}", receiver, e);
            }
            tokio::time::sleep(config.settle_delay).await;
        }

        if let TransitionResult::Invalid { from, event } = scan.process_event(event) {
            warn!("[SCAN] Ignoring {:?} in state {:?}", event, from);
        }
    }
}

/// Try a single channel and report whether the receiver acknowledged
async fn probe_channel<L: LinkChannel + ?Sized>(
    link: &mut L,
    receiver: PeerAddress,
    channel: RadioChannel,
    reply_timeout: Duration,
) -> ScanEvent {
    if let Err(e) = link.configure(channel).await {
        warn!("[SCAN] Failed to tune channel {}: {}", channel, e);
        return ScanEvent::NoAck;
    }

    if let Err(e) = ensure_peer(link, receiver) {
        warn!("[SCAN] Failed to register receiver {}: {}", receiver, e);
    }

    // Delivery failure is expected on the wrong channel; still wait out the reply window
    if let Err(e) = link.send(receiver, protocol::DISCOVERY_PAYLOAD).await {
        debug!("[SCAN] Discovery on channel {} not delivered: {}", channel, e);
    }

    match link.receive(reply_timeout).await {
        Ok(Some((_, payload))) if &payload[..] == protocol::ACK_PAYLOAD => {
            ScanEvent::AckReceived
        }
        Ok(Some((from, _))) => {
            debug!("[SCAN] Unexpected reply from {} on channel {}", from, channel);
            ScanEvent::NoAck
        }
        Ok(None) => ScanEvent::NoAck,
        Err(e) => {
            warn!("[SCAN] Receive failed on channel {}: {}", channel, e);
            ScanEvent::NoAck
        }
    }
}

/// Wait for the sender's first datagram and acknowledge it (receiver role)
///
/// The radio must already be on the home channel. Loops until a sender is
/// registered and acknowledged, then returns its address.
pub async fn listen_for_sender<L: LinkChannel + ?Sized>(
    link: &mut L,
    listen_timeout: Duration,
) -> PeerAddress {
    let mut session = ListenSession::new();

    loop {
        let event = match session.state() {
            ListenState::Done { peer } => {
                info!("[LISTEN] Rendezvous complete with {}", peer);
                return peer;
            }
            ListenState::Listening => match link.receive(listen_timeout).await {
                Ok(Some((host, _))) => {
                    info!("[LISTEN] Received discovery message from {}", host);
                    match ensure_peer(link, host) {
                        Ok(()) => ListenEvent::Registered(host),
                        Err(e) => {
                            warn!("[LISTEN] Failed to add peer {}: {}", host, e);
                            ListenEvent::RegistrationFailed
                        }
                    }
                }
                Ok(None) => {
                    info!(
                        "[LISTEN] No discovery message within {:?}, retrying",
                        listen_timeout
                    );
                    ListenEvent::Timeout
                }
                Err(e) => {
                    warn!("[LISTEN] Receive failed: {}", e);
                    ListenEvent::Timeout
                }
            },
            ListenState::PeerRegistered { peer } => {
                match link.send(peer, protocol::ACK_PAYLOAD).await {
                    Ok(()) => ListenEvent::AckSent,
                    Err(e) => {
                        warn!("[LISTEN] Failed to acknowledge {}: {}", peer, e);
                        ListenEvent::AckFailed
                    }
                }
            }
        };

        if let TransitionResult::Invalid { from, event } = session.process_event(event) {
            warn!("[LISTEN] Ignoring {:?} in state {:?}", event, from);
        }
    }
}
