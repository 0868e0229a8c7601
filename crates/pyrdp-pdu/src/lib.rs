//! RDP PDU types and codecs: BER and PER encoding rules, TPKT/X.224 framing,
//! MCS, client info, the capability-set subset the proxy inspects, and the
//! slow-path/fast-path input/output PDUs.

pub(crate) mod ber;
pub(crate) mod per;

pub mod capability_sets;
pub mod client_info;
pub mod fastpath;
pub mod input;
pub mod mcs;
pub mod nt_status;
pub mod slowpath;
pub mod tpkt;
pub mod x224;

pub use pyrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Clock, ReadCursor, SystemClock, WriteCursor,
};

/// The error kind shared by every PDU in this crate.
pub type PduError = pyrdp_core::Error<pyrdp_core::ErrorKind>;
pub type PduErrorKind = pyrdp_core::ErrorKind;
pub use pyrdp_core::ErrorExt as PduErrorExt;

pub type PduResult<T> = core::result::Result<T, PduError>;

/// A PDU that knows its own name, for error-context and logging purposes.
pub trait Pdu {
    const NAME: &'static str;
}

/// Decodes a value of `Self` from a byte cursor.
pub trait Decode<'de>: Sized {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self>;
}

/// Encodes a value of `Self` into a byte cursor.
pub trait Encode {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()>;
    fn size(&self) -> usize;
}
