//! Debounced buttons and potentiometers.
//!
//! Button cells are written from edge handlers and cleared by the publish
//! task. Every field is a single word, so loads and stores are enough and
//! nothing here ever blocks.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::{BUTTON_COUNT, Buttons, DEBOUNCE_WINDOW_US, LoggableError, POT_MAX};

#[derive(Debug)]
struct ButtonCell {
    /// Pressed since the last clear, not currently held
    pressed: AtomicBool,
    last_press_us: AtomicU32,
}

impl ButtonCell {
    const fn new() -> Self {
        Self {
            pressed: AtomicBool::new(false),
            last_press_us: AtomicU32::new(0),
        }
    }
}

/// Sticky press flags for every button, indexed like [`Buttons`].
#[derive(Debug)]
pub struct ButtonBank {
    pins: [u8; BUTTON_COUNT],
    cells: [ButtonCell; BUTTON_COUNT],
}

impl ButtonBank {
    /// `pins[i]` is the GPIO number wired to button `i`.
    pub const fn new(pins: [u8; BUTTON_COUNT]) -> Self {
        Self {
            pins,
            cells: [const { ButtonCell::new() }; BUTTON_COUNT],
        }
    }

    pub fn button_index(&self, pin: u8) -> Option<usize> {
        self.pins.iter().position(|&button_pin| button_pin == pin)
    }

    /// Records a press edge on `pin` at `now_us`. Returns whether the edge
    /// was accepted; edges inside the debounce window of the previous
    /// accepted press are bounce.
    pub fn on_button_edge(&self, pin: u8, now_us: u32) -> bool {
        let Some(index) = self.button_index(pin) else {
            return false;
        };
        let cell = &self.cells[index];

        let elapsed = now_us.wrapping_sub(cell.last_press_us.load(Ordering::Relaxed));
        if elapsed <= DEBOUNCE_WINDOW_US {
            return false;
        }

        cell.pressed.store(true, Ordering::Release);
        cell.last_press_us.store(now_us, Ordering::Relaxed);
        true
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.cells
            .get(index)
            .is_some_and(|cell| cell.pressed.load(Ordering::Acquire))
    }

    pub fn flags(&self) -> Buttons {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.pressed.load(Ordering::Acquire))
            .fold(Buttons::empty(), |flags, (index, _)| {
                flags | Buttons::from_index(index)
            })
    }

    pub fn clear_flags(&self) {
        for cell in &self.cells {
            cell.pressed.store(false, Ordering::Release);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pot {
    Volume,
    Slider,
}

impl fmt::Display for Pot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pot::Volume => write!(f, "volume"),
            Pot::Slider => write!(f, "slider"),
        }
    }
}

/// ADC access for the potentiometers.
pub trait PotSource {
    type Error: LoggableError;

    /// One raw sample in `0..=4095`.
    fn read_raw(&mut self, pot: Pot) -> Result<u16, Self::Error>;
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    pub buttons: Buttons,
    pub volume: u16,
    pub slider: u16,
}

pub struct InputSampler<'a, P> {
    buttons: &'a ButtonBank,
    pots: P,
}

impl<'a, P: PotSource> InputSampler<'a, P> {
    pub fn new(buttons: &'a ButtonBank, pots: P) -> Self {
        Self { buttons, pots }
    }

    pub fn read_volume(&mut self) -> u16 {
        self.read_pot(Pot::Volume)
    }

    pub fn read_slider(&mut self) -> u16 {
        self.read_pot(Pot::Slider)
    }

    fn read_pot(&mut self, pot: Pot) -> u16 {
        match self.pots.read_raw(pot) {
            Ok(raw) => raw.min(POT_MAX),
            Err(err) => {
                warn!("Failed to read {} potentiometer: {:?}", pot, err);
                0
            }
        }
    }

    pub fn snapshot(&mut self) -> InputSnapshot {
        InputSnapshot {
            buttons: self.buttons.flags(),
            volume: self.read_volume(),
            slider: self.read_slider(),
        }
    }

    /// Only call once the flags from the last snapshot reached the master.
    pub fn clear_flags(&self) {
        self.buttons.clear_flags();
    }

    pub fn buttons(&self) -> &'a ButtonBank {
        self.buttons
    }
}
