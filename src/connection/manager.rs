//! Receiver session: rendezvous once, then poll the link forever

use anyhow::{Context, Result};
use gatelink_shared::{
    link::UdpLinkConfig, protocol, rendezvous, LinkChannel, LinkError, PeerAddress, RadioChannel,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::decision::{CycleError, CycleReport, DecisionEngine};
use crate::diagnostics::LinkMonitor;
use crate::notify::{Notifier, WebhookConfig};
use crate::peripheral::ActuatorPort;

/// Post card events to the webhook
pub const ENABLE_WEBHOOK: bool = true;

/// Webhook endpoint used when posting is enabled
pub const WEBHOOK_URL: &str = "http://127.0.0.1:8090/webhook";

/// Outcome of a single poll of the link
#[derive(Debug)]
pub enum SessionEvent {
    /// Nothing arrived within the poll timeout
    Idle,
    /// A message was processed
    Cycle(CycleReport),
    /// A datagram arrived but its cycle was skipped
    Skipped { from: PeerAddress, error: CycleError },
    /// The link reported an error while receiving
    LinkFault(LinkError),
}

/// Configuration for the receiver node
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Radio link settings (the receiver's own address lives here)
    pub link: UdpLinkConfig,
    /// Channel the receiver stays on
    pub home_channel: RadioChannel,
    /// Wait for the sender's discovery before entering steady state
    pub rendezvous: bool,
    /// Wait per rendezvous attempt
    pub listen_timeout: Duration,
    /// Steady-state receive timeout
    pub poll_timeout: Duration,
    /// Interval between link diagnostics
    pub diagnostic_interval: Duration,
    /// Pause after a receive error before polling again
    pub fault_backoff: Duration,
    /// How long the authorized pose is held
    pub dwell: Duration,
    /// Webhook for notifications; `None` disables posting
    pub webhook: Option<WebhookConfig>,
    /// Chance a simulated force sensor reports a load
    pub sim_load_probability: f64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            link: UdpLinkConfig {
                local_address: PeerAddress::new([0x14, 0x2b, 0x2f, 0xae, 0xe3, 0xa4]),
                listen_base_port: 48000,
                remote_base_port: 47000,
                ..Default::default()
            },
            home_channel: RadioChannel::fallback(),
            rendezvous: true,
            listen_timeout: protocol::LISTEN_TIMEOUT,
            poll_timeout: protocol::POLL_TIMEOUT,
            diagnostic_interval: protocol::DIAGNOSTIC_INTERVAL,
            fault_backoff: Duration::from_secs(1),
            dwell: Duration::from_secs(5),
            webhook: ENABLE_WEBHOOK.then(|| WebhookConfig::new(WEBHOOK_URL)),
            sim_load_probability: 0.3,
        }
    }
}

/// Owns the link and the decision engine for the lifetime of the node
pub struct ReceiverSession<L, P, N> {
    config: ReceiverConfig,
    link: L,
    engine: DecisionEngine<P, N>,
    monitor: LinkMonitor,
    sender: Option<PeerAddress>,
}

impl<L, P, N> ReceiverSession<L, P, N>
where
    L: LinkChannel,
    P: ActuatorPort,
    N: Notifier,
{
    pub fn new(config: ReceiverConfig, link: L, engine: DecisionEngine<P, N>) -> Self {
        let monitor = LinkMonitor::new(config.diagnostic_interval);
        Self {
            config,
            link,
            engine,
            monitor,
            sender: None,
        }
    }

    /// Tune to the home channel and, if enabled, wait for the sender
    ///
    /// Returns the sender's address when rendezvous ran.
    pub async fn establish(&mut self) -> Result<Option<PeerAddress>> {
        let channel = self.config.home_channel;
        self.link
            .configure(channel)
            .await
            .with_context(|| format!("Failed to tune home channel {}", channel))?;
        info!("[LINK] Receiver {}", self.link.status());

        if self.config.rendezvous {
            info!("[LISTEN] Waiting for sender on channel {}", channel);
            let peer = rendezvous::listen_for_sender(&mut self.link, self.config.listen_timeout).await;
            self.sender = Some(peer);
        } else {
            info!("[LISTEN] Rendezvous disabled, staying on channel {}", channel);
        }

        Ok(self.sender)
    }

    /// Wait for one datagram and run its cycle
    ///
    /// Every error is logged here and the caller keeps polling.
    pub async fn poll_once(&mut self) -> SessionEvent {
        let event = match self.link.receive(self.config.poll_timeout).await {
            Ok(None) => SessionEvent::Idle,
            Ok(Some((from, payload))) => match self.engine.handle_payload(&payload).await {
                Ok(report) => SessionEvent::Cycle(report),
                Err(error) => {
                    warn!("[ENGINE] Skipping message from {}: {}", from, error);
                    SessionEvent::Skipped { from, error }
                }
            },
            Err(e) => {
                warn!("[LINK] Receive failed: {}, retrying in {:?}", e, self.config.fault_backoff);
                tokio::time::sleep(self.config.fault_backoff).await;
                SessionEvent::LinkFault(e)
            }
        };

        self.monitor.check(&self.link.status());
        event
    }

    /// Sender address learned during rendezvous
    pub fn sender(&self) -> Option<PeerAddress> {
        self.sender
    }

    pub fn engine(&self) -> &DecisionEngine<P, N> {
        &self.engine
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::rules::{self, Position};
    use crate::notify::DisabledNotifier;
    use crate::peripheral::{ServoId, SimulatedActuators};
    use gatelink_shared::link::{Ether, MemoryLink};

    const SENDER: PeerAddress = PeerAddress::new([0x24, 0x6f, 0x28, 0x01, 0x02, 0x03]);

    fn config(rendezvous: bool) -> ReceiverConfig {
        ReceiverConfig {
            home_channel: RadioChannel::new(4).unwrap(),
            rendezvous,
            ..Default::default()
        }
    }

    fn session(
        ether: &Ether,
        config: ReceiverConfig,
    ) -> ReceiverSession<MemoryLink, SimulatedActuators, DisabledNotifier> {
        let link = ether.attach(config.link.local_address);
        let engine = DecisionEngine::new(SimulatedActuators::new(0.0), DisabledNotifier, config.dwell);
        ReceiverSession::new(config, link, engine)
    }

    async fn sender_on(ether: &Ether, receiver: PeerAddress, channel: u8) -> MemoryLink {
        let mut link = ether.attach(SENDER);
        link.configure(RadioChannel::new(channel).unwrap()).await.unwrap();
        link.register_peer(receiver).unwrap();
        link
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_with_rendezvous() {
        let ether = Ether::new();
        let cfg = config(true);
        let receiver = cfg.link.local_address;
        let mut session = session(&ether, cfg);
        let mut sender = sender_on(&ether, receiver, 4).await;

        // The discovery datagram only lands once the receiver is tuned
        let discover = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sender.send(receiver, protocol::DISCOVERY_PAYLOAD).await.unwrap();
        };
        let (peer, _) = tokio::join!(session.establish(), discover);
        let peer = peer.unwrap();

        assert_eq!(peer, Some(SENDER));
        assert_eq!(session.sender(), Some(SENDER));
        assert_eq!(ether.channel_of(&receiver), RadioChannel::new(4).ok());

        let (_, ack) = sender
            .receive(Duration::from_millis(10))
            .await
            .unwrap()
            .expect("ack expected");
        assert_eq!(&ack[..], protocol::ACK_PAYLOAD);

        // Exactly one acknowledgment
        assert!(sender
            .receive(Duration::from_millis(500))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_default_config_posts_to_webhook() {
        let config = ReceiverConfig::default();
        let webhook = config.webhook.expect("webhook enabled by default");
        assert_eq!(webhook.url, WEBHOOK_URL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_without_rendezvous() {
        let ether = Ether::new();
        let mut session = session(&ether, config(false));

        assert_eq!(session.establish().await.unwrap(), None);
        assert_eq!(session.link().status().channel, RadioChannel::new(4).ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_idle_without_traffic() {
        let ether = Ether::new();
        let mut session = session(&ether, config(false));
        session.establish().await.unwrap();

        assert!(matches!(session.poll_once().await, SessionEvent::Idle));
        assert_eq!(session.engine().cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_runs_cycle() {
        let ether = Ether::new();
        let cfg = config(false);
        let receiver = cfg.link.local_address;
        let mut session = session(&ether, cfg);
        session.establish().await.unwrap();
        let mut sender = sender_on(&ether, receiver, 4).await;

        sender.send(receiver, b"85.2,0").await.unwrap();
        match session.poll_once().await {
            SessionEvent::Cycle(report) => assert_eq!(report.state.actuators, rules::REST_POSE),
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert_eq!(session.engine().port().angle(ServoId::One), Position::Open.angle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_malformed_payload() {
        let ether = Ether::new();
        let cfg = config(false);
        let receiver = cfg.link.local_address;
        let mut session = session(&ether, cfg);
        session.establish().await.unwrap();
        let mut sender = sender_on(&ether, receiver, 4).await;

        sender.send(receiver, b"12,yes").await.unwrap();
        match session.poll_once().await {
            SessionEvent::Skipped { from, error } => {
                assert_eq!(from, SENDER);
                assert!(matches!(error, CycleError::Decode(_)));
            }
            other => panic!("expected a skipped cycle, got {:?}", other),
        }
        assert_eq!(session.engine().cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_before_establish_is_link_fault() {
        let ether = Ether::new();
        let mut session = session(&ether, config(false));
        let backoff = ReceiverConfig::default().fault_backoff;

        // Each fault is followed by a pause, so a broken link cannot spin
        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            assert!(matches!(
                session.poll_once().await,
                SessionEvent::LinkFault(LinkError::NotConfigured)
            ));
        }
        assert!(start.elapsed() >= backoff * 3);
    }
}
