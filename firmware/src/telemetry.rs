use deck_interface::{
    ENCODER_COUNT, encoder::AtomicCount, input::InputSampler, publish::TelemetryPublisher,
};
use defmt::{debug, info, warn};
use embassy_time::{Duration, Instant, Ticker, Timer};

use crate::{
    encoder::{COUNTS, with_tracker},
    inputs::{AdcPots, BUTTONS},
    serial::i2c::SlaveFrame,
};

const SAMPLE_PERIOD: Duration = Duration::from_millis(20);
const PUBLISH_PERIOD: Duration = Duration::from_millis(10);

fn elapsed_ms(since: Instant, now: Instant) -> f32 {
    (now - since).as_micros() as f32 / 1000.0
}

/// Logs both encoders. Keeps its own velocity baselines so it never shifts
/// the ones used for the published frame.
#[embassy_executor::task]
pub async fn sample_encoders() -> ! {
    // Zeroing needs the raw counts, wait for the quadrature tasks
    while !COUNTS.iter().all(AtomicCount::is_running) {
        Timer::after_millis(1).await;
    }

    with_tracker(|tracker| {
        for id in 0..ENCODER_COUNT {
            tracker.reset(id);
        }
    });
    info!("Encoders zeroed");

    let mut baselines = [0i32; ENCODER_COUNT];
    let mut ticker = Ticker::every(SAMPLE_PERIOD);
    let mut last = Instant::now();

    loop {
        ticker.next().await;

        let now = Instant::now();
        let period_ms = elapsed_ms(last, now);
        last = now;

        for (id, baseline) in baselines.iter_mut().enumerate() {
            let (position, velocity) = with_tracker(|tracker| {
                (
                    tracker.position(id),
                    tracker.velocity_from(baseline, id, period_ms),
                )
            });
            debug!("Encoder {}: position {} velocity {}/s", id, position, velocity);
        }
    }
}

/// Read, pack, publish and clear, once per period.
#[embassy_executor::task]
pub async fn publish_telemetry(pots: AdcPots) -> ! {
    let mut inputs = InputSampler::new(&BUTTONS, pots);
    let mut publisher = TelemetryPublisher::new(SlaveFrame);

    let mut ticker = Ticker::every(PUBLISH_PERIOD);
    let mut last = Instant::now();

    loop {
        ticker.next().await;

        let now = Instant::now();
        let period_ms = elapsed_ms(last, now);
        last = now;

        let encoders = with_tracker(|tracker| tracker.sample_all(period_ms));
        let timestamp_ms = now.as_millis() as u32;

        if let Err(err) = publisher.cycle(encoders, &mut inputs, timestamp_ms) {
            warn!("Failed to publish frame, keeping button flags: {}", err);
        }
    }
}
