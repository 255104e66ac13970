mod peripheral;
mod sender;

use anyhow::Result;
use gatelink_shared::link::UdpLink;
use peripheral::{init_display, SimulatedRangeSensor, SimulatedTagReader, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use sender::{SenderConfig, SenderLoop};

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = SenderConfig::default();

    info!("Sender node starting: {}", config.link.local_address);
    info!("  Receiver: {}", config.receiver);
    info!(
        "  Channel search: {}",
        if config.rendezvous { "enabled" } else { "disabled" }
    );

    let link = UdpLink::new(config.link.clone());
    let range = SimulatedRangeSensor::default();
    let tags = SimulatedTagReader::new(
        SimulatedTagReader::default_cards(),
        config.sim_tag_probability,
    );
    let display = init_display(DISPLAY_WIDTH, DISPLAY_HEIGHT);
    let period = config.period;

    let mut sender = SenderLoop::new(config, link, range, tags, display);
    let channel = sender.setup().await?;
    info!("Sending on channel {}", channel);

    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        sender.tick().await;
    }
}
