use deck_interface::{
    BUTTON_COUNT,
    input::{ButtonBank, Pot, PotSource},
};
use defmt::info;
use embassy_rp::{
    adc::{self, Adc, Async, Channel},
    gpio::Input,
};
use embassy_time::Instant;

/// GPIO of SFX1..SFX4, SONG1 and SONG2. Buttons pull the line low.
pub const BUTTON_PINS: [u8; BUTTON_COUNT] = [2, 3, 4, 5, 6, 7];

pub static BUTTONS: ButtonBank = ButtonBank::new(BUTTON_PINS);

#[embassy_executor::task(pool_size = 6)]
pub async fn button_task(pin: u8, mut input: Input<'static>) -> ! {
    loop {
        input.wait_for_falling_edge().await;

        let now_us = Instant::now().as_micros() as u32;
        if BUTTONS.on_button_edge(pin, now_us) {
            info!("Button on GPIO{} pressed", pin);
        }
    }
}

/// Volume on ADC0 and the slider on ADC1.
pub struct AdcPots {
    adc: Adc<'static, Async>,
    volume: Channel<'static>,
    slider: Channel<'static>,
}

impl AdcPots {
    pub fn new(adc: Adc<'static, Async>, volume: Channel<'static>, slider: Channel<'static>) -> Self {
        Self {
            adc,
            volume,
            slider,
        }
    }
}

impl PotSource for AdcPots {
    type Error = adc::Error;

    fn read_raw(&mut self, pot: Pot) -> Result<u16, adc::Error> {
        let channel = match pot {
            Pot::Volume => &mut self.volume,
            Pot::Slider => &mut self.slider,
        };

        self.adc.blocking_read(channel)
    }
}
