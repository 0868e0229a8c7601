//! Byte-cursor primitives, the shared error envelope, and bounds-check macros
//! used by every other `pyrdp-*` crate.

mod clock;
mod cursor;
mod error;
#[macro_use]
mod macros;

pub use clock::{Clock, SystemClock};
pub use cursor::{ReadCursor, WriteCursor};
pub use error::{Error, ErrorExt, ErrorKind};

/// Convenience alias used throughout the codec crates.
pub type Result<T, K> = core::result::Result<T, Error<K>>;
