//! NTSTATUS values as seen on the wire in RDPDR device I/O responses and a
//! handful of RDP connection-sequence failures.
//!
//! Only the codes this proxy actually branches on are named; every other
//! 32-bit value round-trips through [`NtStatus::Other`] so that an unknown
//! status is still relayed and recorded faithfully instead of being
//! collapsed to a generic failure.

use crate::{Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtStatus {
    Success,
    Pending,
    NoMoreFiles,
    ObjectNameNotFound,
    ObjectNameCollision,
    AccessDenied,
    DeviceNotReady,
    InvalidParameter,
    NotSupported,
    /// Any 32-bit value not named above, preserved verbatim.
    Other(u32),
}

impl NtStatus {
    pub const SUCCESS: u32 = 0x0000_0000;
    pub const PENDING: u32 = 0x0000_0103;
    pub const NO_MORE_FILES: u32 = 0x8000_0006;
    pub const OBJECT_NAME_NOT_FOUND: u32 = 0xC000_0034;
    pub const OBJECT_NAME_COLLISION: u32 = 0xC000_0035;
    pub const ACCESS_DENIED: u32 = 0xC000_0022;
    pub const DEVICE_NOT_READY: u32 = 0xC000_00A3;
    pub const INVALID_PARAMETER: u32 = 0xC000_000D;
    pub const NOT_SUPPORTED: u32 = 0xC000_0010;

    pub fn from_u32(value: u32) -> Self {
        match value {
            Self::SUCCESS => Self::Success,
            Self::PENDING => Self::Pending,
            Self::NO_MORE_FILES => Self::NoMoreFiles,
            Self::OBJECT_NAME_NOT_FOUND => Self::ObjectNameNotFound,
            Self::OBJECT_NAME_COLLISION => Self::ObjectNameCollision,
            Self::ACCESS_DENIED => Self::AccessDenied,
            Self::DEVICE_NOT_READY => Self::DeviceNotReady,
            Self::INVALID_PARAMETER => Self::InvalidParameter,
            Self::NOT_SUPPORTED => Self::NotSupported,
            other => Self::Other(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Pending => Self::PENDING,
            Self::NoMoreFiles => Self::NO_MORE_FILES,
            Self::ObjectNameNotFound => Self::OBJECT_NAME_NOT_FOUND,
            Self::ObjectNameCollision => Self::OBJECT_NAME_COLLISION,
            Self::AccessDenied => Self::ACCESS_DENIED,
            Self::DeviceNotReady => Self::DEVICE_NOT_READY,
            Self::InvalidParameter => Self::INVALID_PARAMETER,
            Self::NotSupported => Self::NOT_SUPPORTED,
            Self::Other(value) => value,
        }
    }

    /// The catch-all used when this proxy itself needs to synthesize a
    /// failure status (e.g. relaying a device I/O request it could not
    /// forward), preserving the distinction from a genuine server-reported
    /// `Other`.
    pub fn pyrdp_failure() -> Self {
        Self::Other(0xE000_0001)
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Pending)
    }
}

impl Pdu for NtStatus {
    const NAME: &'static str = "NtStatus";
}

impl Encode for NtStatus {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_fixed_part_size!(in: dst);
        dst.write_u32(self.to_u32());
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl NtStatus {
    const FIXED_PART_SIZE: usize = 4;
}

impl<'de> Decode<'de> for NtStatus {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        crate::ensure_fixed_part_size!(in: src);
        Ok(Self::from_u32(src.read_u32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_status_round_trips() {
        let mut buf = [0u8; 4];
        {
            let mut dst = WriteCursor::new(&mut buf);
            NtStatus::AccessDenied.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(NtStatus::decode(&mut src).unwrap(), NtStatus::AccessDenied);
    }

    #[test]
    fn unknown_status_preserves_raw_value() {
        let mut buf = [0u8; 4];
        {
            let mut dst = WriteCursor::new(&mut buf);
            dst.write_u32(0x1234_5678);
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(NtStatus::decode(&mut src).unwrap(), NtStatus::Other(0x1234_5678));
    }
}
