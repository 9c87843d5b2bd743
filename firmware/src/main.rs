//! Firmware of one deck: two turntable encoders, six buttons and two
//! potentiometers published as a telemetry frame on I2C.
//!
//! Core 0 watches the hardware and logs, core 1 answers the bus.

#![no_std]
#![no_main]

pub mod encoder;
pub mod inputs;
pub mod motor_controller;
pub mod serial;
pub mod telemetry;

use defmt::{info, unwrap};
use embassy_executor::Executor;
use embassy_rp::{
    adc::{self, Adc, Channel},
    bind_interrupts,
    gpio::{Input, Pull},
    i2c,
    multicore::{Stack, spawn_core1},
    peripherals::I2C1,
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::{
    inputs::{AdcPots, BUTTON_PINS},
    motor_controller::HBridge,
};

bind_interrupts!(pub struct Irqs {
    ADC_IRQ_FIFO => adc::InterruptHandler;
    I2C1_IRQ => i2c::InterruptHandler<I2C1>;
});

static mut CORE1_STACK: Stack<4096> = Stack::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("Deck booting");
    let p = embassy_rp::init(Default::default());

    let pots = AdcPots::new(
        Adc::new(p.ADC, Irqs, adc::Config::default()),
        Channel::new_pin(p.PIN_26, Pull::None),
        Channel::new_pin(p.PIN_27, Pull::None),
    );

    spawn_core1(
        p.CORE1,
        unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
        move || {
            let executor1 = EXECUTOR1.init(Executor::new());
            executor1.run(|spawner| {
                unwrap!(spawner.spawn(serial::i2c::start_i2c(spawner, p.I2C1, p.PIN_19, p.PIN_18)));
                unwrap!(spawner.spawn(telemetry::publish_telemetry(pots)));
            });
        },
    );

    let executor0 = EXECUTOR0.init(Executor::new());
    executor0.run(|spawner| {
        unwrap!(spawner.spawn(encoder::quadrature_task(
            0,
            Input::new(p.PIN_10, Pull::Up),
            Input::new(p.PIN_11, Pull::Up),
        )));
        unwrap!(spawner.spawn(encoder::quadrature_task(
            1,
            Input::new(p.PIN_12, Pull::Up),
            Input::new(p.PIN_13, Pull::Up),
        )));

        let buttons = [
            Input::new(p.PIN_2, Pull::Up),
            Input::new(p.PIN_3, Pull::Up),
            Input::new(p.PIN_4, Pull::Up),
            Input::new(p.PIN_5, Pull::Up),
            Input::new(p.PIN_6, Pull::Up),
            Input::new(p.PIN_7, Pull::Up),
        ];
        for (pin, input) in BUTTON_PINS.into_iter().zip(buttons) {
            unwrap!(spawner.spawn(inputs::button_task(pin, input)));
        }

        unwrap!(spawner.spawn(motor_controller::start_motors([
            HBridge::new(0, p.PWM_SLICE0, p.PIN_16, p.PIN_14, p.PIN_15),
            HBridge::new(1, p.PWM_SLICE3, p.PIN_22, p.PIN_20, p.PIN_21),
        ])));

        unwrap!(spawner.spawn(telemetry::sample_encoders()));
    })
}
