use std::{collections::VecDeque, time::Duration};

use anyhow::{Context, bail};
use rppal::i2c::I2c;
use tokio::{
    sync::broadcast,
    time::{self, MissedTickBehavior},
};

use crate::{
    DECK_1_ADDRESS, ENCODER_COUNT,
    frame::TelemetryFrame,
    layout::{FrameLayout, FrameVersion, MAX_FRAME_LEN},
};

/// Something a telemetry frame can be read from.
pub trait FrameSource: Send {
    /// Fills all of `buf` with one frame.
    fn read_frame(&mut self, buf: &mut [u8]) -> anyhow::Result<()>;
}

/// A deck on a Linux I2C bus.
pub struct RppalFrameSource {
    i2c: I2c,
}

impl RppalFrameSource {
    pub fn open(bus: u8, address: u8) -> anyhow::Result<Self> {
        let mut i2c = I2c::with_bus(bus).with_context(|| format!("Open I2C bus {bus}"))?;
        i2c.set_slave_address(address as u16)
            .with_context(|| format!("Select deck at {address:#04x}"))?;

        Ok(Self { i2c })
    }
}

impl FrameSource for RppalFrameSource {
    fn read_frame(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        // The deck ignores the register byte and always answers with the
        // latest frame
        self.i2c.block_read(0, buf).context("I2C block read")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VelocityMode {
    /// Sliding window over the last few readings
    Smoothed,
    /// Hold the last velocity between encoder ticks, for low PPR encoders
    Predictive,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub bus: u8,
    pub address: u8,
    pub poll_interval: Duration,
    pub version: FrameVersion,
    pub velocity_mode: VelocityMode,
    /// Readings the smoothed velocity spans; below 2 it stays at 0
    pub smoothing_window: usize,
    pub velocity_timeout_ms: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: DECK_1_ADDRESS,
            poll_interval: Duration::from_millis(20),
            version: FrameVersion::CURRENT,
            velocity_mode: VelocityMode::Smoothed,
            smoothing_window: 10,
            velocity_timeout_ms: 500,
        }
    }
}

/// Velocity from the first to the last of the most recent `window` readings.
#[derive(Debug, Clone)]
pub struct VelocitySmoother {
    window: usize,
    samples: VecDeque<(i32, u32)>,
    last_velocity: f32,
}

impl VelocitySmoother {
    /// A window below two readings never has a span to measure and always
    /// reports 0.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            last_velocity: 0.0,
        }
    }

    /// Counts per second. `timestamp_ms` is the device clock of the reading.
    pub fn update(&mut self, position: i32, timestamp_ms: u32) -> f32 {
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back((position, timestamp_ms));

        let (Some(&(first_pos, first_ts)), Some(&(last_pos, last_ts))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let delta_s = last_ts.wrapping_sub(first_ts) as f32 / 1000.0;
        if delta_s > 0.001 {
            self.last_velocity = last_pos.wrapping_sub(first_pos) as f32 / delta_s;
        }

        self.last_velocity
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_velocity = 0.0;
    }
}

/// Only recomputes velocity when the position moves and keeps predicting it
/// in between. Falls to zero once the position has been still for longer
/// than the timeout.
#[derive(Debug, Clone)]
pub struct PredictiveVelocity {
    timeout_ms: u32,
    last: Option<(i32, u32)>,
    last_change_ms: u32,
    velocity: f32,
}

impl PredictiveVelocity {
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            timeout_ms,
            last: None,
            last_change_ms: 0,
            velocity: 0.0,
        }
    }

    pub fn update(&mut self, position: i32, timestamp_ms: u32) -> f32 {
        let Some((last_pos, last_ts)) = self.last else {
            self.last = Some((position, timestamp_ms));
            self.last_change_ms = timestamp_ms;
            return 0.0;
        };

        if position != last_pos {
            let delta_s = timestamp_ms.wrapping_sub(last_ts) as f32 / 1000.0;
            if delta_s > 0.001 {
                self.velocity = position.wrapping_sub(last_pos) as f32 / delta_s;
                self.last_change_ms = timestamp_ms;
            }
            self.last = Some((position, timestamp_ms));
        } else if timestamp_ms.wrapping_sub(self.last_change_ms) > self.timeout_ms {
            self.velocity = 0.0;
        }

        self.velocity
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.last_change_ms = 0;
        self.velocity = 0.0;
    }
}

#[derive(Debug, Clone)]
enum Estimator {
    Smoothed(VelocitySmoother),
    Predictive(PredictiveVelocity),
}

impl Estimator {
    fn new(config: &ReaderConfig) -> Self {
        match config.velocity_mode {
            VelocityMode::Smoothed => {
                Estimator::Smoothed(VelocitySmoother::new(config.smoothing_window))
            }
            VelocityMode::Predictive => {
                Estimator::Predictive(PredictiveVelocity::new(config.velocity_timeout_ms))
            }
        }
    }

    fn update(&mut self, position: i32, timestamp_ms: u32) -> f32 {
        match self {
            Estimator::Smoothed(smoother) => smoother.update(position, timestamp_ms),
            Estimator::Predictive(predictive) => predictive.update(position, timestamp_ms),
        }
    }

    fn reset(&mut self) {
        match self {
            Estimator::Smoothed(smoother) => smoother.reset(),
            Estimator::Predictive(predictive) => predictive.reset(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DeckReading {
    pub frame: TelemetryFrame,
    /// Host side estimate, counts/s
    pub velocity: [f32; ENCODER_COUNT],
    /// Velocity as measured by the deck, counts/s
    pub device_velocity: [f32; ENCODER_COUNT],
    pub predicted: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub total_reads: u64,
    pub read_errors: u64,
}

impl ReadStats {
    pub fn error_rate(&self) -> f64 {
        if self.total_reads == 0 {
            return 0.0;
        }
        self.read_errors as f64 / self.total_reads as f64
    }
}

pub struct DeckReader<S> {
    source: S,
    config: ReaderConfig,
    layout: &'static FrameLayout,
    estimators: [Estimator; ENCODER_COUNT],
    stats: ReadStats,
}

impl DeckReader<RppalFrameSource> {
    pub fn open(config: ReaderConfig) -> anyhow::Result<Self> {
        let source = RppalFrameSource::open(config.bus, config.address)?;
        Ok(Self::new(source, config))
    }
}

impl<S: FrameSource> DeckReader<S> {
    pub fn new(source: S, config: ReaderConfig) -> Self {
        info!(
            "Reading deck {:#04x} with {:?} velocity",
            config.address, config.velocity_mode
        );

        Self {
            source,
            layout: config.version.layout(),
            estimators: core::array::from_fn(|_| Estimator::new(&config)),
            config,
            stats: ReadStats::default(),
        }
    }

    pub fn read(&mut self) -> anyhow::Result<DeckReading> {
        self.stats.total_reads += 1;

        let mut buf = [0; MAX_FRAME_LEN];
        let buf = &mut buf[..self.layout.len];
        let frame = match self.read_into(buf) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.read_errors += 1;
                return Err(err);
            }
        };

        let mut velocity = [0.0; ENCODER_COUNT];
        for (id, estimator) in self.estimators.iter_mut().enumerate() {
            velocity[id] = estimator.update(frame.encoders[id].position, frame.timestamp_ms);
        }

        Ok(DeckReading {
            frame,
            velocity,
            device_velocity: frame.encoders.map(|encoder| encoder.velocity.as_f32()),
            predicted: self.config.velocity_mode == VelocityMode::Predictive,
        })
    }

    fn read_into(&mut self, buf: &mut [u8]) -> anyhow::Result<TelemetryFrame> {
        self.source.read_frame(buf)?;
        if buf.iter().all(|&byte| byte == 0xFF) {
            bail!("Deck returned an idle bus");
        }

        Ok(TelemetryFrame::decode(self.layout, buf)?)
    }

    pub fn reset_velocity(&mut self) {
        for estimator in &mut self.estimators {
            estimator.reset();
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Polls the deck until every receiver is gone. Needs the multi-threaded
    /// runtime, reads block the worker they run on.
    pub async fn start(mut self, outbound: broadcast::Sender<DeckReading>) {
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match tokio::task::block_in_place(|| self.read()) {
                Ok(reading) => {
                    debug!("Got reading: {:?}", reading);

                    if outbound.send(reading).is_err() {
                        info!("reading channel disconnected");
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        "Error reading deck ({:.1}% failed): {:?}",
                        self.stats.error_rate() * 100.0,
                        err
                    );
                }
            }
        }
    }
}
