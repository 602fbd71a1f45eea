use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::connection::ConnectionState;
use crate::protocol::HeaderField;
use crate::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Test if the error indicates that the operation would block.
    #[inline]
    pub(crate) fn would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Test if the error just means "not enough bytes buffered yet", as
    /// opposed to a genuine parse failure (`spec.md` §4.4 receive steps 2
    /// and 4: "wait" is not a protocol violation).
    #[inline]
    pub(crate) fn is_buffer_underflow(&self) -> bool {
        matches!(self.kind, ErrorKind::BufferUnderflow)
    }

    /// Test if this error represents a parse error or protocol violation,
    /// either of which require tearing down the connection per `spec.md` §7.
    pub(crate) fn is_fatal(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::WouldBlock | ErrorKind::RemoteError { .. }
        )
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock => Self::new(ErrorKind::WouldBlock),
            _ => Self::new(ErrorKind::Io(error)),
        }
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::WouldBlock => write!(f, "would block"),
            ErrorKind::BufferUnderflow => write!(f, "buffer underflow"),
            ErrorKind::MissingBus => write!(f, "missing session or system bus address"),
            ErrorKind::InvalidAddress => write!(f, "invalid d-bus address"),
            ErrorKind::InvalidSasl => write!(f, "invalid SASL line"),
            ErrorKind::InvalidSaslResponse => write!(f, "unrecognized SASL command"),
            ErrorKind::SaslRejected => write!(f, "SASL mechanism rejected by server"),
            ErrorKind::SaslTimeout => write!(f, "SASL handshake timed out"),
            ErrorKind::UnsupportedMechanism => write!(f, "no supported SASL mechanism offered"),
            ErrorKind::InvalidState(state) => write!(f, "invalid connection state `{state}`"),
            ErrorKind::InvalidProtocolVersion(version) => {
                write!(f, "unsupported protocol version {version}")
            }
            ErrorKind::InvalidEndianness(byte) => write!(f, "invalid endianness byte `{byte}`"),
            ErrorKind::InvalidMessageType(ty) => write!(f, "invalid message type {ty}"),
            ErrorKind::MissingPath => write!(f, "missing required PATH header"),
            ErrorKind::MissingInterface => write!(f, "missing required INTERFACE header"),
            ErrorKind::MissingMember => write!(f, "missing required MEMBER header"),
            ErrorKind::MissingReplySerial => write!(f, "missing required REPLY_SERIAL header"),
            ErrorKind::MissingErrorName => write!(f, "missing required ERROR_NAME header"),
            ErrorKind::ZeroSerial => write!(f, "zero in header serial"),
            ErrorKind::InvalidHeaderField(field) => {
                write!(f, "unsupported header field {field:?}")
            }
            ErrorKind::InvalidObjectPath => write!(f, "invalid object path syntax"),
            ErrorKind::InvalidInterfaceName => write!(f, "invalid interface name syntax"),
            ErrorKind::InvalidMemberName => write!(f, "invalid member name syntax"),
            ErrorKind::InvalidBusName => write!(f, "invalid bus name syntax"),
            ErrorKind::NotNullTerminated => write!(f, "string is not null terminated"),
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::MessageTooLong(length) => {
                write!(f, "message of length {length} is too long (max is 134217728)")
            }
            ErrorKind::SignatureTooDeep => write!(f, "signature exceeds maximum nesting depth"),
            ErrorKind::SignatureNotSet => write!(f, "no signature set for this scope"),
            ErrorKind::TypeMismatch => write!(f, "value does not match the declared signature"),
            ErrorKind::ScopeMismatch => write!(f, "close does not match the currently open container"),
            ErrorKind::ScopeNotEmpty => write!(f, "container closed before all its types were written"),
            ErrorKind::DictEntryNotInArray => {
                write!(f, "dict entries may only appear as array elements")
            }
            ErrorKind::ContainerDepthExceeded => {
                write!(f, "container nesting exceeds maximum depth")
            }
            ErrorKind::InvalidBooleanValue(value) => {
                write!(f, "invalid boolean wire value {value}")
            }
            ErrorKind::EmbeddedNul => write!(f, "string contains an embedded NUL byte"),
            ErrorKind::StringTooLong => write!(f, "string exceeds the maximum representable length"),
            ErrorKind::SerialsExhausted => {
                write!(f, "no serial available; all are in use by live reply registrations")
            }
            ErrorKind::RemoteError { name, .. } => write!(f, "remote error: {name}"),
            ErrorKind::Disconnected => write!(f, "connection is closed"),
            ErrorKind::Unblocked => write!(f, "blocking call was cancelled by unblock()"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

/// Private error kind, deliberately not exposed so new variants are not a
/// breaking change (mirrors the teacher crate's `Error`/`ErrorKind` split).
#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    Utf8Error(Utf8Error),
    WouldBlock,
    BufferUnderflow,
    MissingBus,
    InvalidAddress,
    InvalidSasl,
    InvalidSaslResponse,
    SaslRejected,
    SaslTimeout,
    UnsupportedMechanism,
    InvalidState(ConnectionState),
    InvalidProtocolVersion(u8),
    InvalidEndianness(u8),
    InvalidMessageType(u8),
    MissingPath,
    MissingInterface,
    MissingMember,
    MissingReplySerial,
    MissingErrorName,
    ZeroSerial,
    InvalidHeaderField(HeaderField),
    InvalidObjectPath,
    InvalidInterfaceName,
    InvalidMemberName,
    InvalidBusName,
    NotNullTerminated,
    ArrayTooLong(u32),
    MessageTooLong(u32),
    SignatureTooDeep,
    SignatureNotSet,
    TypeMismatch,
    ScopeMismatch,
    ScopeNotEmpty,
    DictEntryNotInArray,
    ContainerDepthExceeded,
    InvalidBooleanValue(u32),
    EmbeddedNul,
    StringTooLong,
    SerialsExhausted,
    /// An incoming `error` kind message surfaced to a reply's error handler
    /// (`spec.md` §7, "remote error reply" — does not affect the connection).
    RemoteError { name: Box<str>, message: Box<str> },
    /// Synthesized for pending replies when the connection tears down.
    Disconnected,
    /// Returned to a `block(block)` caller released by `unblock()` rather
    /// than by its reply arriving (`spec.md` §5).
    Unblocked,
}
