#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod encoder;
pub mod frame;
#[cfg(all(feature = "std", feature = "implementation_tokio"))]
pub mod implementation_tokio;
pub mod input;
pub mod layout;
pub mod publish;

use bitflags::bitflags;

/// Number of decks, one rotary encoder each.
pub const ENCODER_COUNT: usize = 2;

/// Four sound effect buttons and two song buttons.
pub const BUTTON_COUNT: usize = 6;

/// Minimum gap between two accepted presses of the same button.
pub const DEBOUNCE_WINDOW_US: u32 = 50_000;

/// Velocities travel as counts/s multiplied by this factor.
pub const VELOCITY_SCALE: f32 = 100.0;

/// Full scale of the 12 bit potentiometer ADC.
pub const POT_MAX: u16 = 4095;

/// 7-bit address of deck 1. Deck 2 answers on [`DECK_2_ADDRESS`].
pub const DECK_1_ADDRESS: u8 = 0x42;
pub const DECK_2_ADDRESS: u8 = 0x43;

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const Sfx1 = 0b00000001;
        const Sfx2 = 0b00000010;
        const Sfx3 = 0b00000100;
        const Sfx4 = 0b00001000;
        const Song1 = 0b00010000;
        const Song2 = 0b00100000;
    }
}

impl Buttons {
    pub fn from_index(index: usize) -> Self {
        if index < BUTTON_COUNT {
            Self::from_bits_truncate(1 << index)
        } else {
            Self::empty()
        }
    }
}

/// Errors from hardware seams that end up in the log: `defmt::Format` on the
/// device, `Debug` on the host.
#[cfg(feature = "defmt")]
pub trait LoggableError: defmt::Format {}
#[cfg(feature = "defmt")]
impl<T: defmt::Format> LoggableError for T {}

#[cfg(not(feature = "defmt"))]
pub trait LoggableError: core::fmt::Debug {}
#[cfg(not(feature = "defmt"))]
impl<T: core::fmt::Debug> LoggableError for T {}

/// Encoder velocity in fixed point, counts/s × [`VELOCITY_SCALE`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Velocity(pub i32);

impl Velocity {
    /// Truncates toward zero, the way masters already in the field decode it.
    pub fn from_f32(counts_per_sec: f32) -> Self {
        Self((counts_per_sec * VELOCITY_SCALE) as i32)
    }

    pub fn as_f32(&self) -> f32 {
        self.0 as f32 / VELOCITY_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_truncates_toward_zero() {
        assert_eq!(Velocity::from_f32(12.34), Velocity(1234));
        assert_eq!(Velocity::from_f32(-7.0), Velocity(-700));
        assert_eq!(Velocity::from_f32(1.999), Velocity(199));
        assert_eq!(Velocity::from_f32(-1.999), Velocity(-199));
        assert_eq!(Velocity::from_f32(0.004), Velocity(0));
    }

    #[test]
    fn velocity_saturates_instead_of_wrapping() {
        assert_eq!(Velocity::from_f32(f32::MAX), Velocity(i32::MAX));
        assert_eq!(Velocity::from_f32(f32::NAN), Velocity(0));
    }

    #[test]
    fn button_bits_follow_indices() {
        assert_eq!(Buttons::from_index(0), Buttons::Sfx1);
        assert_eq!(Buttons::from_index(5), Buttons::Song2);
        assert_eq!(Buttons::from_index(6), Buttons::empty());
        assert_eq!((Buttons::Sfx1 | Buttons::Sfx3).bits(), 0b00000101);
    }
}
