//! Quadrature decoding, logical zero point and velocity for the deck encoders.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicI32, Ordering};

use crate::{Velocity, frame::EncoderSample};

/// Transition table for 4x decoding, indexed by `previous << 2 | current`
/// where a state is `A << 1 | B`.
///
/// Forward is 00 -> 10 -> 11 -> 01 -> 00: A rising while B is low counts up,
/// A rising while B is high counts down, B rising while A is high counts up.
/// Transitions that skip a state are noise and count 0.
const QUADRATURE_TABLE: [i8; 16] = [
    0, -1, 1, 0, //
    1, 0, 0, -1, //
    -1, 0, 0, 1, //
    0, 1, -1, 0, //
];

/// Limits of the raw counter. Reaching either one resets the count to 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CountLimits {
    pub low: i32,
    pub high: i32,
}

impl CountLimits {
    pub const DEFAULT: CountLimits = CountLimits {
        low: -10_000,
        high: 10_000,
    };
}

impl Default for CountLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Software quadrature counter fed with the levels of channel A and B.
#[derive(Debug)]
pub struct QuadratureCounter {
    state: u8,
    count: i32,
    limits: CountLimits,
}

impl QuadratureCounter {
    pub fn new(limits: CountLimits, a: bool, b: bool) -> Self {
        Self {
            state: Self::state_of(a, b),
            count: 0,
            limits,
        }
    }

    fn state_of(a: bool, b: bool) -> u8 {
        ((a as u8) << 1) | b as u8
    }

    /// Feeds the levels sampled after an edge and returns the new count.
    pub fn update(&mut self, a: bool, b: bool) -> i32 {
        let next = Self::state_of(a, b);
        let step = QUADRATURE_TABLE[((self.state << 2) | next) as usize];
        self.state = next;

        self.count += step as i32;
        if self.count >= self.limits.high || self.count <= self.limits.low {
            self.count = 0;
        }

        self.count
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CountError {
    /// The counter for this encoder has not been started
    NotRunning,
    /// No counter exists for this encoder
    UnknownEncoder,
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountError::NotRunning => write!(f, "counter not running"),
            CountError::UnknownEncoder => write!(f, "unknown encoder"),
        }
    }
}

/// Source of the raw per-encoder counts.
pub trait CountSource {
    fn raw_count(&self, id: usize) -> Result<i32, CountError>;
}

impl<T: CountSource + ?Sized> CountSource for &T {
    fn raw_count(&self, id: usize) -> Result<i32, CountError> {
        (**self).raw_count(id)
    }
}

/// Raw count shared between the task decoding an encoder and its readers.
#[derive(Debug)]
pub struct AtomicCount {
    count: AtomicI32,
    running: AtomicBool,
}

impl AtomicCount {
    pub const fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self, count: i32) {
        self.count.store(count, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
    }

    /// Whether the decoding task has started this counter.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn store(&self, count: i32) {
        self.count.store(count, Ordering::Relaxed);
    }

    pub fn load(&self) -> Result<i32, CountError> {
        if !self.is_running() {
            return Err(CountError::NotRunning);
        }

        Ok(self.count.load(Ordering::Relaxed))
    }
}

impl Default for AtomicCount {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CountSource for [AtomicCount; N] {
    fn raw_count(&self, id: usize) -> Result<i32, CountError> {
        self.get(id).ok_or(CountError::UnknownEncoder)?.load()
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EncoderState {
    /// Added to the raw count to get the visible position
    pub offset: i32,
    /// Position seen by the last call to [`EncoderTracker::velocity`]
    pub last_sampled_position: i32,
}

impl EncoderState {
    pub const ZERO: EncoderState = EncoderState {
        offset: 0,
        last_sampled_position: 0,
    };
}

/// Position and velocity of `N` encoders on top of a [`CountSource`].
///
/// Read failures never reach the caller: the position degrades to the
/// current offset and the failure is logged.
pub struct EncoderTracker<S, const N: usize> {
    source: S,
    states: [EncoderState; N],
}

impl<S: CountSource, const N: usize> EncoderTracker<S, N> {
    pub const fn new(source: S) -> Self {
        Self {
            source,
            states: [EncoderState::ZERO; N],
        }
    }

    pub fn state(&self, id: usize) -> Option<&EncoderState> {
        self.states.get(id)
    }

    /// Moves the logical zero to the current raw count and restarts the
    /// velocity baseline.
    pub fn reset(&mut self, id: usize) {
        let Some(state) = self.states.get_mut(id) else {
            error!("Reset of unknown encoder {}", id);
            return;
        };

        state.last_sampled_position = 0;
        match self.source.raw_count(id) {
            Ok(raw) => {
                state.offset = raw.wrapping_neg();
                info!("Encoder {} position reset to 0", id);
            }
            Err(err) => error!("Failed to reset encoder {}: {}", id, err),
        }
    }

    pub fn position(&self, id: usize) -> i32 {
        let Some(state) = self.states.get(id) else {
            error!("Position of unknown encoder {}", id);
            return 0;
        };

        match self.source.raw_count(id) {
            Ok(raw) => raw.wrapping_add(state.offset),
            Err(err) => {
                warn!("Failed to get encoder {} count: {}", id, err);
                state.offset
            }
        }
    }

    /// Counts per second since the previous call, which must have happened
    /// `sample_period_ms` ago.
    pub fn velocity(&mut self, id: usize, sample_period_ms: f32) -> f32 {
        let position = self.position(id);
        let Some(state) = self.states.get_mut(id) else {
            return 0.0;
        };

        velocity_between(&mut state.last_sampled_position, position, sample_period_ms)
    }

    /// Like [`Self::velocity`], against a baseline owned by the caller so
    /// that several readers can sample at their own pace.
    pub fn velocity_from(&self, baseline: &mut i32, id: usize, sample_period_ms: f32) -> f32 {
        let position = self.position(id);
        velocity_between(baseline, position, sample_period_ms)
    }

    /// Position and fixed point velocity of every encoder.
    pub fn sample_all(&mut self, sample_period_ms: f32) -> [EncoderSample; N] {
        core::array::from_fn(|id| EncoderSample {
            position: self.position(id),
            velocity: Velocity::from_f32(self.velocity(id, sample_period_ms)),
        })
    }
}

fn velocity_between(baseline: &mut i32, position: i32, sample_period_ms: f32) -> f32 {
    let delta = position.wrapping_sub(*baseline);
    *baseline = position;

    if sample_period_ms <= 0.0 {
        return 0.0;
    }

    delta as f32 / (sample_period_ms / 1000.0)
}
