use core::cell::RefCell;

use defmt::info;
use deck_interface::{
    ENCODER_COUNT,
    encoder::{AtomicCount, CountLimits, EncoderTracker, QuadratureCounter},
};
use embassy_futures::select::select;
use embassy_rp::gpio::Input;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

pub type Tracker = EncoderTracker<&'static [AtomicCount; ENCODER_COUNT], ENCODER_COUNT>;

/// Raw counts, written only by the quadrature tasks.
pub static COUNTS: [AtomicCount; ENCODER_COUNT] = [const { AtomicCount::new() }; ENCODER_COUNT];

/// Offsets and velocity baselines, shared by the sample and publish tasks.
pub static TRACKER: Mutex<CriticalSectionRawMutex, RefCell<Tracker>> =
    Mutex::new(RefCell::new(EncoderTracker::new(&COUNTS)));

/// Decodes one encoder for as long as the device runs.
#[embassy_executor::task(pool_size = 2)]
pub async fn quadrature_task(id: usize, mut a: Input<'static>, mut b: Input<'static>) -> ! {
    let mut counter = QuadratureCounter::new(CountLimits::DEFAULT, a.is_high(), b.is_high());
    COUNTS[id].start(counter.count());
    info!("Encoder {} counting", id);

    loop {
        select(a.wait_for_any_edge(), b.wait_for_any_edge()).await;

        let count = counter.update(a.is_high(), b.is_high());
        COUNTS[id].store(count);
    }
}

/// Runs `f` with exclusive access to the tracker.
pub fn with_tracker<R>(f: impl FnOnce(&mut Tracker) -> R) -> R {
    TRACKER.lock(|tracker| f(&mut tracker.borrow_mut()))
}
