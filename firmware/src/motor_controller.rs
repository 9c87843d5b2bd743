use defmt::info;
use embassy_rp::{
    gpio::{AnyPin, Level, Output},
    pwm::{ChannelAPin, Config, Pwm, SetDutyCycle, Slice},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};

/// Counter top for a 5 kHz PWM from the 125 MHz system clock.
const PWM_TOP: u16 = 24_999;

/// Duty of both platters at boot, out of 255.
const START_DUTY: u16 = 150;

/// Owner of the bridges once running. Dropping one stops its PWM.
pub static MOTORS: Mutex<CriticalSectionRawMutex, Option<[HBridge; 2]>> = Mutex::new(None);

/// Platter motor behind a two input H-bridge with a PWM enable line.
pub struct HBridge {
    motor_id: u8,
    pwm: Pwm<'static>,
    in1: Output<'static>,
    in2: Output<'static>,

    last_speed: f32,
}

impl HBridge {
    pub fn new<T: Slice>(
        motor_id: u8,
        slice: T,
        enable: impl ChannelAPin<T>,
        in1: impl Into<AnyPin>,
        in2: impl Into<AnyPin>,
    ) -> Self {
        let mut config = Config::default();
        config.top = PWM_TOP;

        Self {
            motor_id,
            pwm: Pwm::new_output_a(slice, enable, config),
            in1: Output::new(in1.into(), Level::Low),
            in2: Output::new(in2.into(), Level::Low),
            last_speed: 0.0,
        }
    }

    /// `speed` in `-1.0..=1.0`, negative spins backwards and 0 coasts.
    pub fn set_speed(&mut self, speed: f32) {
        let speed = speed.clamp(-1.0, 1.0);

        self.in1.set_level((speed > 0.0).into());
        self.in2.set_level((speed < 0.0).into());

        let duty = speed.abs() * self.pwm.max_duty_cycle() as f32;
        let _ = self.pwm.set_duty_cycle(duty as u16);

        self.last_speed = speed;
    }

    pub fn last_speed(&self) -> f32 {
        self.last_speed
    }

    pub fn motor_id(&self) -> u8 {
        self.motor_id
    }
}

/// Spins both platters forward. There is no feedback, the speed stays where
/// it is set.
#[embassy_executor::task]
pub async fn start_motors(mut motors: [HBridge; 2]) {
    for motor in &mut motors {
        motor.set_speed(START_DUTY as f32 / 255.0);
        info!(
            "Motor {} running at {}/255 ({})",
            motor.motor_id(),
            START_DUTY,
            motor.last_speed()
        );
    }

    *MOTORS.lock().await = Some(motors);
}
