use anyhow::Context;
use deck_interface::{
    DECK_1_ADDRESS, DECK_2_ADDRESS,
    implementation_tokio::{DeckReader, ReaderConfig, VelocityMode},
};
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let address = match std::env::args().nth(1).as_deref() {
        Some("2") => DECK_2_ADDRESS,
        _ => DECK_1_ADDRESS,
    };

    let reader = DeckReader::open(ReaderConfig {
        address,
        velocity_mode: VelocityMode::Predictive,
        ..Default::default()
    })
    .context("Open deck")?;

    let (tx, mut rx) = broadcast::channel(10);
    let join_handle = tokio::spawn(reader.start(tx));

    while let Ok(reading) = rx.recv().await {
        let frame = reading.frame;
        info!(
            "deck1 {:>6} @ {:>8.1}/s  deck2 {:>6} @ {:>8.1}/s  buttons {:?}  volume {:>4}  slider {:>4}",
            frame.encoders[0].position,
            reading.velocity[0],
            frame.encoders[1].position,
            reading.velocity[1],
            frame.buttons,
            frame.volume,
            frame.slider,
        );
    }

    join_handle.await.context("Deck reader")
}
