mod connection;
mod decision;
mod diagnostics;
mod notify;
mod peripheral;

use anyhow::Result;
use connection::{ReceiverConfig, ReceiverSession, SessionEvent};
use decision::DecisionEngine;
use gatelink_shared::link::UdpLink;
use peripheral::SimulatedActuators;

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ReceiverConfig::default();

    info!("Receiver node starting: {}", config.link.local_address);
    info!("  Home channel: {}", config.home_channel);
    info!("  Rendezvous: {}", if config.rendezvous { "enabled" } else { "disabled" });

    match &config.webhook {
        Some(webhook) => info!("  Webhook: {}", webhook.url),
        None => info!("  Webhook: disabled"),
    }
    let notifier = notify::notifier_for(config.webhook.clone())?;

    let link = UdpLink::new(config.link.clone());
    let actuators = SimulatedActuators::new(config.sim_load_probability);
    let engine = DecisionEngine::new(actuators, notifier, config.dwell);

    let mut session = ReceiverSession::new(config, link, engine);
    if let Some(sender) = session.establish().await? {
        info!("Paired with sender {}", sender);
    }

    info!("Entering receive loop");
    loop {
        if let SessionEvent::Cycle(report) = session.poll_once().await {
            debug!(
                "Cycle complete: actuators={:?} indicator={:?}",
                report.state.actuators, report.state.indicator
            );
        }
    }
}
