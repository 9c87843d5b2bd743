use std::cell::Cell;

use deck_interface::{
    Buttons, ENCODER_COUNT, Velocity,
    encoder::{AtomicCount, EncoderTracker},
    frame::TelemetryFrame,
    input::{ButtonBank, InputSampler, Pot, PotSource},
    layout::{FRAME_LEN, Field, FrameVersion},
    publish::{FrameSink, TelemetryPublisher},
};

const PINS: [u8; 6] = [2, 3, 4, 5, 6, 7];

struct Pots {
    volume: u16,
    slider: u16,
}

impl PotSource for Pots {
    type Error = ();

    fn read_raw(&mut self, pot: Pot) -> Result<u16, ()> {
        Ok(match pot {
            Pot::Volume => self.volume,
            Pot::Slider => self.slider,
        })
    }
}

/// Latest-frame slot that can be told to reject the next publish.
#[derive(Default)]
struct Slot {
    frame: Option<[u8; FRAME_LEN]>,
    reject: Cell<bool>,
}

impl FrameSink for Slot {
    type Error = ();

    fn publish(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), ()> {
        if self.reject.replace(false) {
            return Err(());
        }
        self.frame = Some(*frame);
        Ok(())
    }
}

#[test]
fn deck_state_reaches_the_master() {
    let counts = [AtomicCount::new(), AtomicCount::new()];
    counts[0].start(0);
    counts[1].start(0);

    let mut tracker = EncoderTracker::<_, ENCODER_COUNT>::new(&counts);
    let bank = ButtonBank::new(PINS);
    let mut inputs = InputSampler::new(
        &bank,
        Pots {
            volume: 2048,
            slider: 0,
        },
    );
    let mut publisher = TelemetryPublisher::new(Slot::default());

    // Deck 1 turns forward, deck 2 backward, over one 10 ms period
    counts[0].store(5);
    counts[1].store(-2);
    bank.on_button_edge(2, 100_000);
    bank.on_button_edge(4, 100_000);

    let encoders = tracker.sample_all(10.0);
    publisher.cycle(encoders, &mut inputs, 123_456).unwrap();

    let bytes = publisher.sink().frame.unwrap();
    let frame = TelemetryFrame::unpack(&bytes);
    assert_eq!(frame.encoders[0].position, 5);
    assert_eq!(frame.encoders[0].velocity, Velocity(50_000));
    assert_eq!(frame.encoders[1].position, -2);
    assert_eq!(frame.encoders[1].velocity, Velocity(-20_000));
    assert_eq!(frame.timestamp_ms, 123_456);
    assert_eq!(frame.buttons.bits(), 0b00000101);
    assert_eq!(frame.volume, 2048);
    assert_eq!(frame.slider, 0);

    // Presses are reported once
    assert_eq!(bank.flags(), Buttons::empty());
}

#[test]
fn rejected_frame_is_retried_with_the_same_presses() {
    let counts = [AtomicCount::new(), AtomicCount::new()];
    let mut tracker = EncoderTracker::<_, ENCODER_COUNT>::new(&counts);
    let bank = ButtonBank::new(PINS);
    let mut inputs = InputSampler::new(
        &bank,
        Pots {
            volume: 1,
            slider: 4095,
        },
    );
    let mut publisher = TelemetryPublisher::new(Slot::default());

    bank.on_button_edge(7, 100_000);
    publisher.sink().reject.set(true);

    // Counters are not running yet, positions fall back to their offset
    let encoders = tracker.sample_all(10.0);
    assert!(publisher.cycle(encoders, &mut inputs, 10).is_err());
    assert!(publisher.sink().frame.is_none());
    assert_eq!(bank.flags(), Buttons::Song2);

    let encoders = tracker.sample_all(10.0);
    publisher.cycle(encoders, &mut inputs, 20).unwrap();

    let frame = TelemetryFrame::unpack(&publisher.sink().frame.unwrap());
    assert_eq!(frame.buttons, Buttons::Song2);
    assert_eq!(frame.encoders[0].position, 0);
    assert_eq!(frame.slider, 4095);
    assert_eq!(bank.flags(), Buttons::empty());
}

#[test]
fn reset_zeroes_published_position() {
    let counts = [AtomicCount::new(), AtomicCount::new()];
    counts[0].start(1234);
    counts[1].start(0);

    let mut tracker = EncoderTracker::<_, ENCODER_COUNT>::new(&counts);
    tracker.reset(0);

    let bank = ButtonBank::new(PINS);
    let mut inputs = InputSampler::new(
        &bank,
        Pots {
            volume: 0,
            slider: 0,
        },
    );
    let mut publisher = TelemetryPublisher::new(Slot::default());

    let encoders = tracker.sample_all(10.0);
    publisher.cycle(encoders, &mut inputs, 0).unwrap();

    let frame = TelemetryFrame::unpack(&publisher.sink().frame.unwrap());
    assert_eq!(frame.encoders[0].position, 0);
    assert_eq!(frame.encoders[0].velocity, Velocity(0));
}

#[test]
fn published_layout_is_fixed() {
    let layout = FrameVersion::CURRENT.layout();
    assert_eq!(layout.len, 25);

    let offsets = [
        (Field::Position(0), 0),
        (Field::Velocity(0), 4),
        (Field::Position(1), 8),
        (Field::Velocity(1), 12),
        (Field::Timestamp, 16),
        (Field::Buttons, 20),
        (Field::Volume, 21),
        (Field::Slider, 23),
    ];
    for (field, offset) in offsets {
        assert_eq!(layout.find(field).map(|spec| spec.offset), Some(offset));
    }
}
