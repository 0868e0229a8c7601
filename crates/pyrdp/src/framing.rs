//! Minimal wire framer distinguishing slow-path (TPKT/X.224) frames from
//! fast-path frames by the action bits of the leading byte
//! (`[MS-RDPBCGR] 2.2.9.1`), reading exactly one complete frame at a time so
//! the relay can tap it for observation before forwarding the same bytes
//! on, untouched.

use std::io;

use pyrdp_core::ReadCursor;
use pyrdp_pdu::tpkt::TpktHeader;
use pyrdp_pdu::Decode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

const FASTPATH_ACTION_MASK: u8 = 0x3;
const FASTPATH_ACTION_X224: u8 = 0x3;
const PER_LENGTH_TWO_BYTE_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    SlowPath,
    FastPath,
}

/// One complete wire frame, header included, exactly as it should be
/// forwarded to the other side of the relay.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub bytes: Vec<u8>,
}

fn classify(first_byte: u8) -> FrameKind {
    if first_byte & FASTPATH_ACTION_MASK == FASTPATH_ACTION_X224 {
        FrameKind::SlowPath
    } else {
        FrameKind::FastPath
    }
}

/// Resolves the PER length determinant fast-path headers use
/// (`[MS-RDPBCGR] 2.2.9.1.1.1`): one byte if its high bit is clear, else two
/// bytes with the high bit masked off the first. Returns the decoded total
/// frame length (header included) and how many bytes encoded it.
fn fastpath_total_length(length_prefix: u8, low_byte: Option<u8>) -> Option<(usize, usize)> {
    if length_prefix & PER_LENGTH_TWO_BYTE_FLAG == 0 {
        Some((usize::from(length_prefix), 1))
    } else {
        let low_byte = low_byte?;
        let high = usize::from(length_prefix & !PER_LENGTH_TWO_BYTE_FLAG) << 8;
        Some((high | usize::from(low_byte), 2))
    }
}

fn to_io_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Reads exactly one frame from `reader`, or `None` on clean EOF.
pub(crate) async fn read_frame(reader: &mut (impl AsyncBufRead + Unpin)) -> io::Result<Option<Frame>> {
    let first_byte = match reader.fill_buf().await? {
        [] => return Ok(None),
        buf => buf[0],
    };

    match classify(first_byte) {
        FrameKind::SlowPath => read_slow_path_frame(reader).await.map(Some),
        FrameKind::FastPath => read_fast_path_frame(reader).await.map(Some),
    }
}

async fn read_slow_path_frame(reader: &mut (impl AsyncBufRead + Unpin)) -> io::Result<Frame> {
    let mut header_bytes = [0u8; TpktHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;

    let header = TpktHeader::decode(&mut ReadCursor::new(&header_bytes)).map_err(to_io_error)?;
    let total = header.packet_length();
    if total < TpktHeader::SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "TPKT packet shorter than its own header"));
    }

    let mut bytes = vec![0u8; total];
    bytes[..TpktHeader::SIZE].copy_from_slice(&header_bytes);
    reader.read_exact(&mut bytes[TpktHeader::SIZE..]).await?;

    Ok(Frame {
        kind: FrameKind::SlowPath,
        bytes,
    })
}

async fn read_fast_path_frame(reader: &mut (impl AsyncBufRead + Unpin)) -> io::Result<Frame> {
    let mut header_prefix = [0u8; 2];
    reader.read_exact(&mut header_prefix).await?;

    let (total, length_field_size) = if header_prefix[1] & PER_LENGTH_TWO_BYTE_FLAG == 0 {
        fastpath_total_length(header_prefix[1], None).expect("single-byte length always resolves")
    } else {
        let mut low_byte = [0u8; 1];
        reader.read_exact(&mut low_byte).await?;
        let resolved = fastpath_total_length(header_prefix[1], Some(low_byte[0])).expect("two-byte length always resolves");
        let mut bytes = vec![0u8; resolved.0.max(3)];
        bytes[0] = header_prefix[0];
        bytes[1] = header_prefix[1];
        bytes[2] = low_byte[0];
        reader.read_exact(&mut bytes[3..]).await?;
        return Ok(Frame {
            kind: FrameKind::FastPath,
            bytes,
        });
    };

    let consumed = 1 + length_field_size;
    if total < consumed {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "fast-path frame shorter than its own header"));
    }

    let mut bytes = vec![0u8; total];
    bytes[..2].copy_from_slice(&header_prefix);
    reader.read_exact(&mut bytes[2..]).await?;

    Ok(Frame {
        kind: FrameKind::FastPath,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_tpkt_version_as_slow_path() {
        assert_eq!(classify(0x03), FrameKind::SlowPath);
    }

    #[test]
    fn classifies_fastpath_action_as_fast_path() {
        assert_eq!(classify(0x00), FrameKind::FastPath);
        assert_eq!(classify(0x40), FrameKind::FastPath);
    }

    #[test]
    fn single_byte_fastpath_length_resolves_directly() {
        assert_eq!(fastpath_total_length(0x20, None), Some((0x20, 1)));
    }

    #[test]
    fn two_byte_fastpath_length_combines_both_bytes() {
        // high byte 0x81 (top bit set, value bits 0x01), low byte 0x2C -> 0x012C
        assert_eq!(fastpath_total_length(0x81, Some(0x2C)), Some((0x012C, 2)));
    }

    #[test]
    fn two_byte_length_without_low_byte_is_none() {
        assert_eq!(fastpath_total_length(0x81, None), None);
    }
}
