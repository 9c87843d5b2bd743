use core::{cell::RefCell, fmt};

use deck_interface::{layout::FRAME_LEN, publish::FrameSink};
use defmt::{error, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_rp::{
    i2c_slave::{Command, Config, I2cSlave},
    peripherals::{I2C1, PIN_18, PIN_19},
};
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use portable_atomic::{AtomicBool, Ordering};

use crate::Irqs;

#[cfg(not(feature = "deck-2"))]
const ADDRESS: u8 = deck_interface::DECK_1_ADDRESS;
#[cfg(feature = "deck-2")]
const ADDRESS: u8 = deck_interface::DECK_2_ADDRESS;

/// Latest published frame. Replaced as a whole under the lock, so a master
/// read always gets one complete frame.
static FRAME: Mutex<CriticalSectionRawMutex, RefCell<[u8; FRAME_LEN]>> =
    Mutex::new(RefCell::new([0; FRAME_LEN]));

static BUS_READY: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Copy, Clone, PartialEq, Eq, defmt::Format)]
pub enum PublishError {
    /// The slave has not been configured yet
    BusNotReady,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::BusNotReady => write!(f, "i2c bus not ready"),
        }
    }
}

/// Hands frames to the device task answering master reads.
pub struct SlaveFrame;

impl FrameSink for SlaveFrame {
    type Error = PublishError;

    fn publish(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), PublishError> {
        if !BUS_READY.load(Ordering::Acquire) {
            return Err(PublishError::BusNotReady);
        }

        FRAME.lock(|slot| *slot.borrow_mut() = *frame);
        Ok(())
    }
}

#[embassy_executor::task]
pub async fn start_i2c(spawner: Spawner, i2c: I2C1, scl: PIN_19, sda: PIN_18) {
    let mut config = Config::default();
    config.addr = ADDRESS as u16;
    config.general_call = false;

    let dev = I2cSlave::new(i2c, scl, sda, Irqs, config);
    unwrap!(spawner.spawn(device_task(dev)));
}

#[embassy_executor::task]
async fn device_task(mut dev: I2cSlave<'static, I2C1>) -> ! {
    info!("Start i2c interface at {:#x}", ADDRESS);
    BUS_READY.store(true, Ordering::Release);

    loop {
        let mut buf_in = [0u8; 8];
        match dev.listen(&mut buf_in).await {
            // Register byte first, then the read
            Ok(Command::WriteRead(_)) | Ok(Command::Read) => {
                let frame = FRAME.lock(|slot| *slot.borrow());

                let res = dev.respond_and_fill(&frame, 0).await;
                if let Err(err) = res {
                    warn!("I2c error while responding: {}", err);
                }
            }
            Ok(Command::Write(_)) => {}
            Ok(Command::GeneralCall(_)) => {
                warn!("Received unsupported i2c command");
                dev.reset();
            }
            Err(err) => error!("I2c error while listening: {}", err),
        }
    }
}
