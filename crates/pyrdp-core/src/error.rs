use std::fmt;

/// The kind of failure that occurred while decoding, encoding, or otherwise
/// processing a PDU. Shared across every `pyrdp-*` crate so error handling
/// stays uniform from the byte cursor up through the MITM orchestration
/// layer.
#[derive(Debug)]
pub enum ErrorKind {
    /// Not enough bytes remained in the input to read a fixed-size field.
    NotEnoughBytes { received: usize, expected: usize },
    /// A field decoded to a value outside what the wire format permits.
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    /// A recognized but unimplemented value (a PDU type this crate doesn't
    /// decode further). Distinct from `InvalidField`: the input is
    /// well-formed, this crate just stops short of it.
    UnsupportedValue { field: &'static str, value: String },
    /// Anything else, carrying a short message.
    Other(&'static str),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotEnoughBytes { received, expected } => {
                write!(f, "not enough bytes: received {received}, expected {expected}")
            }
            ErrorKind::InvalidField { field, reason } => {
                write!(f, "invalid field `{field}`: {reason}")
            }
            ErrorKind::UnsupportedValue { field, value } => {
                write!(f, "unsupported value for `{field}`: {value}")
            }
            ErrorKind::Other(message) => write!(f, "{message}"),
        }
    }
}

/// A decode/encode/runtime error carrying the name of the operation it
/// happened in, a [`ErrorKind`]-shaped cause, and an optional chained source.
pub struct Error<K = ErrorKind> {
    context: &'static str,
    kind: K,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl<K> Error<K> {
    pub fn new(context: &'static str, kind: K) -> Self {
        Self {
            context,
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

impl<K: fmt::Debug> fmt::Debug for Error<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("context", &self.context)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<K: fmt::Display> fmt::Display for Error<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.kind)
    }
}

impl<K: fmt::Debug + fmt::Display> std::error::Error for Error<K> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Shorthand constructors, mirroring the teacher's `PduErrorExt` extension
/// trait so call sites read `Error::not_enough_bytes(...)` instead of
/// spelling out `ErrorKind` variants inline.
pub trait ErrorExt {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self;
    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self;
    fn unsupported_value(context: &'static str, field: &'static str, value: impl Into<String>) -> Self;
}

impl ErrorExt for Error<ErrorKind> {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self {
        Error::new(context, ErrorKind::NotEnoughBytes { received, expected })
    }

    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self {
        Error::new(context, ErrorKind::InvalidField { field, reason })
    }

    fn unsupported_value(context: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Error::new(
            context,
            ErrorKind::UnsupportedValue {
                field,
                value: value.into(),
            },
        )
    }
}
