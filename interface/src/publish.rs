//! The read, pack, publish and clear cycle behind every frame the master sees.

use crate::{
    ENCODER_COUNT,
    frame::{EncoderSample, TelemetryPacker},
    input::{InputSampler, PotSource},
    layout::FRAME_LEN,
};

/// Outgoing buffer of the bus the master reads from.
///
/// Only the latest frame is kept; a publish replaces the previous one as a
/// whole.
pub trait FrameSink {
    type Error;

    fn publish(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), Self::Error>;
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    type Error = T::Error;

    fn publish(&mut self, frame: &[u8; FRAME_LEN]) -> Result<(), Self::Error> {
        (**self).publish(frame)
    }
}

pub struct TelemetryPublisher<K> {
    packer: TelemetryPacker,
    sink: K,
}

impl<K: FrameSink> TelemetryPublisher<K> {
    pub fn new(sink: K) -> Self {
        Self {
            packer: TelemetryPacker::new(),
            sink,
        }
    }

    /// Publishes one frame. Button flags are cleared only once the frame
    /// reached the sink, so a failed cycle hands the same presses to the next
    /// one.
    pub fn cycle<P: PotSource>(
        &mut self,
        encoders: [EncoderSample; ENCODER_COUNT],
        inputs: &mut InputSampler<'_, P>,
        timestamp_ms: u32,
    ) -> Result<(), K::Error> {
        let snapshot = inputs.snapshot();
        let frame = self.packer.pack(encoders, &snapshot, timestamp_ms);

        self.sink.publish(frame)?;
        inputs.clear_flags();

        trace!("Published frame at {} ms", timestamp_ms);
        Ok(())
    }

    pub fn last_frame(&self) -> &[u8; FRAME_LEN] {
        self.packer.buffer()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}
