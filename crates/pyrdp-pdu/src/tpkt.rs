//! TPKT header (RFC 1006 / ITU-T T.123) that prefixes every X.224 TPDU on
//! the wire.

use crate::{ensure_fixed_part_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

/// Fixed 4-byte header: version(1) + reserved(1) + total packet length(2, BE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpktHeader {
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;
    pub const SIZE: usize = 4;
    const FIXED_PART_SIZE: usize = Self::SIZE;

    pub fn packet_length(&self) -> usize {
        usize::from(self.packet_length)
    }
}

impl Pdu for TpktHeader {
    const NAME: &'static str = "TpktHeader";
}

impl Encode for TpktHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u8(Self::VERSION);
        dst.write_u8(0); // reserved
        dst.write_u16_be(self.packet_length);
        Ok(())
    }

    fn size(&self) -> usize {
        Self::SIZE
    }
}

impl<'de> Decode<'de> for TpktHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u8();
        if version != Self::VERSION {
            return Err(invalid_field_err!(Self::NAME, "version", "unsupported TPKT version"));
        }

        src.advance(1); // reserved
        let packet_length = src.read_u16_be();

        Ok(Self { packet_length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = TpktHeader { packet_length: 42 };
        let mut buf = [0u8; 4];
        {
            let mut dst = WriteCursor::new(&mut buf);
            header.encode(&mut dst).unwrap();
        }
        assert_eq!(buf, [0x03, 0x00, 0x00, 0x2a]);

        let mut src = ReadCursor::new(&buf);
        assert_eq!(TpktHeader::decode(&mut src).unwrap(), header);
    }

    #[test]
    fn rejects_unsupported_version() {
        let buf = [0x02, 0x00, 0x00, 0x07];
        let mut src = ReadCursor::new(&buf);
        assert!(TpktHeader::decode(&mut src).is_err());
    }
}
