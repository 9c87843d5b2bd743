use core::fmt;

use bytes::{Buf, BufMut};

use crate::{
    Buttons, ENCODER_COUNT, Velocity,
    input::InputSnapshot,
    layout::{Encoding, FRAME_LEN, Field, FrameLayout, FrameVersion, MAX_FRAME_LEN},
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EncoderSample {
    pub position: i32,
    pub velocity: Velocity,
}

/// Everything a master learns from one read.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub encoders: [EncoderSample; ENCODER_COUNT],
    /// Milliseconds since boot, wrapping
    pub timestamp_ms: u32,
    pub buttons: Buttons,
    pub volume: u16,
    pub slider: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The buffer cannot hold a frame of this version
    BufferTooSmall { needed: usize, available: usize },
    /// Received frame has the wrong size for the layout
    WrongLength { expected: usize, actual: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small ({available} < {needed} bytes)")
            }
            FrameError::WrongLength { expected, actual } => {
                write!(f, "frame is {actual} bytes, expected {expected}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

impl TelemetryFrame {
    pub fn new(
        encoders: [EncoderSample; ENCODER_COUNT],
        inputs: &InputSnapshot,
        timestamp_ms: u32,
    ) -> Self {
        Self {
            encoders,
            timestamp_ms,
            buttons: inputs.buttons,
            volume: inputs.volume,
            slider: inputs.slider,
        }
    }

    fn encoder(&self, id: u8) -> EncoderSample {
        self.encoders.get(id as usize).copied().unwrap_or_default()
    }

    fn encoder_mut(&mut self, id: u8) -> Option<&mut EncoderSample> {
        self.encoders.get_mut(id as usize)
    }

    /// Writes the frame at the start of `out` and returns its length.
    ///
    /// `out` is only touched once the whole frame is encoded, so it never
    /// holds a mix of two frames.
    pub fn encode(&self, layout: &FrameLayout, out: &mut [u8]) -> Result<usize, FrameError> {
        if out.len() < layout.len {
            return Err(FrameError::BufferTooSmall {
                needed: layout.len,
                available: out.len(),
            });
        }

        let mut scratch = [0u8; MAX_FRAME_LEN];
        for spec in layout.fields {
            let mut dst = &mut scratch[spec.offset..spec.end()];

            match (spec.field, spec.encoding) {
                (Field::Position(id), Encoding::I32) => dst.put_i32_le(self.encoder(id).position),
                (Field::Velocity(id), Encoding::Fixed100) => {
                    dst.put_i32_le(self.encoder(id).velocity.0)
                }
                (Field::Timestamp, Encoding::U32) => dst.put_u32_le(self.timestamp_ms),
                (Field::Buttons, Encoding::U8) => dst.put_u8(self.buttons.bits()),
                (Field::Volume, Encoding::U16) => dst.put_u16_le(self.volume),
                (Field::Slider, Encoding::U16) => dst.put_u16_le(self.slider),
                (field, encoding) => {
                    error!("No encoding of {:?} as {:?}", field, encoding);
                }
            }
        }

        out[..layout.len].copy_from_slice(&scratch[..layout.len]);
        Ok(layout.len)
    }

    /// Fields missing from older layouts decode as zero.
    pub fn decode(layout: &FrameLayout, bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != layout.len {
            return Err(FrameError::WrongLength {
                expected: layout.len,
                actual: bytes.len(),
            });
        }

        let mut frame = TelemetryFrame::default();
        for spec in layout.fields {
            let mut src = &bytes[spec.offset..spec.end()];

            match (spec.field, spec.encoding) {
                (Field::Position(id), Encoding::I32) => {
                    let position = src.get_i32_le();
                    if let Some(encoder) = frame.encoder_mut(id) {
                        encoder.position = position;
                    }
                }
                (Field::Velocity(id), Encoding::Fixed100) => {
                    let velocity = Velocity(src.get_i32_le());
                    if let Some(encoder) = frame.encoder_mut(id) {
                        encoder.velocity = velocity;
                    }
                }
                (Field::Timestamp, Encoding::U32) => frame.timestamp_ms = src.get_u32_le(),
                (Field::Buttons, Encoding::U8) => {
                    frame.buttons = Buttons::from_bits_truncate(src.get_u8())
                }
                (Field::Volume, Encoding::U16) => frame.volume = src.get_u16_le(),
                (Field::Slider, Encoding::U16) => frame.slider = src.get_u16_le(),
                (field, encoding) => {
                    error!("No decoding of {:?} as {:?}", field, encoding);
                }
            }
        }

        Ok(frame)
    }

    /// Frame in the layout the firmware publishes.
    pub fn pack(&self) -> [u8; FRAME_LEN] {
        let mut buffer = [0; FRAME_LEN];
        // Cannot fail, the buffer is exactly one current frame
        let _ = self.encode(FrameVersion::CURRENT.layout(), &mut buffer);
        buffer
    }

    pub fn unpack(bytes: &[u8; FRAME_LEN]) -> Self {
        Self::decode(FrameVersion::CURRENT.layout(), bytes).unwrap_or_default()
    }
}

/// Owner of the outgoing frame buffer. Every pack rebuilds the whole frame.
pub struct TelemetryPacker {
    buffer: [u8; FRAME_LEN],
}

impl TelemetryPacker {
    pub const fn new() -> Self {
        Self {
            buffer: [0; FRAME_LEN],
        }
    }

    pub fn pack(
        &mut self,
        encoders: [EncoderSample; ENCODER_COUNT],
        inputs: &InputSnapshot,
        timestamp_ms: u32,
    ) -> &[u8; FRAME_LEN] {
        self.buffer = TelemetryFrame::new(encoders, inputs, timestamp_ms).pack();
        &self.buffer
    }

    pub fn buffer(&self) -> &[u8; FRAME_LEN] {
        &self.buffer
    }
}

impl Default for TelemetryPacker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TelemetryFrame {
        TelemetryFrame {
            encoders: [
                EncoderSample {
                    position: -5,
                    velocity: Velocity::from_f32(12.34),
                },
                EncoderSample {
                    position: 1000,
                    velocity: Velocity::from_f32(-7.0),
                },
            ],
            timestamp_ms: 123_456,
            buttons: Buttons::from_bits_truncate(0b00000101),
            volume: 2048,
            slider: 0,
        }
    }

    #[test]
    fn packs_known_bytes() {
        let bytes = sample_frame().pack();

        assert_eq!(&bytes[0..4], &(-5i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &1234i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1000i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &(-700i32).to_le_bytes());
        assert_eq!(&bytes[16..20], &123_456u32.to_le_bytes());
        assert_eq!(bytes[20], 0b00000101);
        assert_eq!(&bytes[21..23], &2048u16.to_le_bytes());
        assert_eq!(&bytes[23..25], &[0, 0]);
    }

    #[test]
    fn unpack_reverses_pack() {
        let frame = sample_frame();
        let decoded = TelemetryFrame::unpack(&frame.pack());

        assert_eq!(decoded, frame);
        assert_eq!(decoded.encoders[0].velocity, Velocity(1234));
        assert_eq!(decoded.encoders[1].velocity, Velocity(-700));
        assert_eq!(decoded.encoders[1].velocity.as_f32(), -7.0);
    }

    #[test]
    fn negative_values_use_twos_complement() {
        let frame = TelemetryFrame {
            encoders: [EncoderSample {
                position: -1,
                velocity: Velocity(i32::MIN),
            }; ENCODER_COUNT],
            timestamp_ms: u32::MAX,
            buttons: Buttons::all(),
            volume: u16::MAX,
            slider: u16::MAX,
        };
        let bytes = frame.pack();

        assert_eq!(bytes.len(), 25);
        assert_eq!(&bytes[0..4], &[0xFF; 4]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x80]);
        assert_eq!(bytes[20], 0b00111111);
    }

    #[test]
    fn encode_refuses_short_buffer_without_touching_it() {
        let mut buffer = [0xAA; 20];
        let res = sample_frame().encode(FrameVersion::V3.layout(), &mut buffer);

        assert_eq!(
            res,
            Err(FrameError::BufferTooSmall {
                needed: 25,
                available: 20
            })
        );
        assert_eq!(buffer, [0xAA; 20]);
    }

    #[test]
    fn encode_leaves_tail_of_larger_buffer() {
        let mut buffer = [0xAA; 32];
        let len = sample_frame()
            .encode(FrameVersion::V3.layout(), &mut buffer)
            .unwrap();

        assert_eq!(len, 25);
        assert_eq!(&buffer[25..], &[0xAA; 7]);
    }

    #[test]
    fn legacy_layouts_carry_deck_one() {
        let frame = sample_frame();

        let mut v1 = [0; 12];
        frame.encode(FrameVersion::V1.layout(), &mut v1).unwrap();
        assert_eq!(&v1[8..12], &123_456u32.to_le_bytes());

        let decoded = TelemetryFrame::decode(FrameVersion::V1.layout(), &v1).unwrap();
        assert_eq!(decoded.encoders[0], frame.encoders[0]);
        assert_eq!(decoded.encoders[1], EncoderSample::default());
        assert_eq!(decoded.buttons, Buttons::empty());

        let mut v2 = [0; 15];
        frame.encode(FrameVersion::V2.layout(), &mut v2).unwrap();
        assert_eq!(v2[12], 0b00000101);
        assert_eq!(&v2[13..15], &2048u16.to_le_bytes());

        let decoded = TelemetryFrame::decode(FrameVersion::V2.layout(), &v2).unwrap();
        assert_eq!(decoded.volume, 2048);
        assert_eq!(decoded.slider, 0);
    }

    #[test]
    fn decode_checks_length() {
        let res = TelemetryFrame::decode(FrameVersion::V3.layout(), &[0; 12]);
        assert_eq!(
            res,
            Err(FrameError::WrongLength {
                expected: 25,
                actual: 12
            })
        );
    }

    #[test]
    fn unknown_button_bits_are_dropped() {
        let mut bytes = sample_frame().pack();
        bytes[20] = 0b11000001;

        assert_eq!(TelemetryFrame::unpack(&bytes).buttons, Buttons::Sfx1);
    }

    #[test]
    fn packer_overwrites_previous_frame() {
        let mut packer = TelemetryPacker::new();
        let frame = sample_frame();
        let inputs = InputSnapshot {
            buttons: frame.buttons,
            volume: frame.volume,
            slider: frame.slider,
        };

        packer.pack(frame.encoders, &inputs, frame.timestamp_ms);
        assert_eq!(packer.buffer(), &frame.pack());

        let idle = packer.pack(Default::default(), &InputSnapshot::default(), 0);
        assert_eq!(idle, &[0; FRAME_LEN]);
    }
}
