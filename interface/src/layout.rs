//! Byte layout of the telemetry frame an I2C master reads from the deck.
//!
//! Every version is described by a single table of fields. Offsets are
//! derived from the field widths when the table is built, so the packer,
//! the decoder and the docs below cannot disagree.
//!
//! | Version | Size | Fields |
//! |---|---|---|
//! | V1 | 12 | position[0], velocity[0], timestamp |
//! | V2 | 15 | V1 + button flags, volume |
//! | V3 | 25 | position/velocity for both decks, timestamp, button flags, volume, slider |
//!
//! All multi-byte fields are little-endian. There is no framing, checksum or
//! version byte on the wire: master and deck must agree on the version.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    /// Position of the given encoder
    Position(u8),
    /// Velocity of the given encoder
    Velocity(u8),
    Timestamp,
    Buttons,
    Volume,
    Slider,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Encoding {
    I32,
    /// `i32` holding the value × [`crate::VELOCITY_SCALE`]
    Fixed100,
    U32,
    U16,
    U8,
}

impl Encoding {
    pub const fn width(self) -> usize {
        match self {
            Encoding::I32 | Encoding::Fixed100 | Encoding::U32 => 4,
            Encoding::U16 => 2,
            Encoding::U8 => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub encoding: Encoding,
    pub offset: usize,
}

impl FieldSpec {
    pub const fn end(&self) -> usize {
        self.offset + self.encoding.width()
    }
}

#[derive(Debug)]
pub struct FrameLayout {
    pub version: FrameVersion,
    pub fields: &'static [FieldSpec],
    pub len: usize,
}

impl FrameLayout {
    pub fn find(&self, field: Field) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.field == field)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameVersion {
    /// Single deck, encoder only
    V1,
    /// Single deck with buttons and one potentiometer
    V2,
    /// Dual deck
    V3,
}

impl FrameVersion {
    pub const CURRENT: FrameVersion = FrameVersion::V3;

    pub const fn layout(self) -> &'static FrameLayout {
        match self {
            FrameVersion::V1 => &V1_LAYOUT,
            FrameVersion::V2 => &V2_LAYOUT,
            FrameVersion::V3 => &V3_LAYOUT,
        }
    }

    /// Picks the version a master receives from the number of bytes it reads.
    pub fn from_len(len: usize) -> Option<Self> {
        [FrameVersion::V1, FrameVersion::V2, FrameVersion::V3]
            .into_iter()
            .find(|version| version.layout().len == len)
    }
}

/// Size of the frame currently published by the firmware.
pub const FRAME_LEN: usize = FrameVersion::CURRENT.layout().len;

/// Largest frame of any version.
pub const MAX_FRAME_LEN: usize = max(max(V1_LAYOUT.len, V2_LAYOUT.len), V3_LAYOUT.len);

const V1_FIELDS: [FieldSpec; 3] = place([
    (Field::Position(0), Encoding::I32),
    (Field::Velocity(0), Encoding::Fixed100),
    (Field::Timestamp, Encoding::U32),
]);

const V2_FIELDS: [FieldSpec; 5] = place([
    (Field::Position(0), Encoding::I32),
    (Field::Velocity(0), Encoding::Fixed100),
    (Field::Timestamp, Encoding::U32),
    (Field::Buttons, Encoding::U8),
    (Field::Volume, Encoding::U16),
]);

const V3_FIELDS: [FieldSpec; 8] = place([
    (Field::Position(0), Encoding::I32),
    (Field::Velocity(0), Encoding::Fixed100),
    (Field::Position(1), Encoding::I32),
    (Field::Velocity(1), Encoding::Fixed100),
    (Field::Timestamp, Encoding::U32),
    (Field::Buttons, Encoding::U8),
    (Field::Volume, Encoding::U16),
    (Field::Slider, Encoding::U16),
]);

const V1_LAYOUT: FrameLayout = FrameLayout {
    version: FrameVersion::V1,
    fields: &V1_FIELDS,
    len: packed_len(&V1_FIELDS),
};

const V2_LAYOUT: FrameLayout = FrameLayout {
    version: FrameVersion::V2,
    fields: &V2_FIELDS,
    len: packed_len(&V2_FIELDS),
};

const V3_LAYOUT: FrameLayout = FrameLayout {
    version: FrameVersion::V3,
    fields: &V3_FIELDS,
    len: packed_len(&V3_FIELDS),
};

/// Lays fields out back to back in declaration order.
const fn place<const N: usize>(fields: [(Field, Encoding); N]) -> [FieldSpec; N] {
    let mut out = [FieldSpec {
        field: Field::Timestamp,
        encoding: Encoding::U8,
        offset: 0,
    }; N];

    let mut offset = 0;
    let mut idx = 0;
    while idx < N {
        let (field, encoding) = fields[idx];
        out[idx] = FieldSpec {
            field,
            encoding,
            offset,
        };
        offset += encoding.width();
        idx += 1;
    }

    out
}

const fn packed_len(fields: &[FieldSpec]) -> usize {
    match fields.last() {
        Some(last) => last.end(),
        None => 0,
    }
}

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}
