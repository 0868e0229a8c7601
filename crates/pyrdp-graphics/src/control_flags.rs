//! `controlFlags`, the one byte prefixing every drawing order
//! (`[MS-RDPEGDI] 2.2.2.1.1`), selecting whether it's primary, secondary, or
//! alternate-secondary and how its fields are encoded.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        const STANDARD = 0x01;
        const SECONDARY = 0x02;
        const BOUNDS = 0x04;
        const TYPE_CHANGE = 0x08;
        const DELTA_COORDS = 0x10;
        const ZERO_BOUNDS_DELTAS = 0x20;
        const ZERO_FIELD_BYTE_BIT0 = 0x40;
        const ZERO_FIELD_BYTE_BIT1 = 0x80;
    }
}
