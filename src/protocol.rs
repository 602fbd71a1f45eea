//! Low level details of the D-Bus wire protocol: the fixed message header,
//! the closed set of header field codes, and the closed set of signature
//! type codes.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitXor};

use crate::frame::Frame;

/// The fixed-size portion of a D-Bus message header.
///
/// Every message on the wire begins with this layout, followed by the
/// variable-length header field array, alignment padding to an 8-byte
/// boundary, and finally the body.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct Header {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) version: u8,
    pub(crate) body_length: u32,
    pub(crate) serial: u32,
}

unsafe impl Frame for Header {
    fn adjust(&mut self, endianness: Endianness) {
        self.body_length.adjust(endianness);
        self.serial.adjust(endianness);
    }
}

macro_rules! raw_enum {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)*
                    _ => f.write_str("INVALID"),
                }
            }
        }
    }
}

macro_rules! raw_set {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Default, Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                struct Raw(&'static str);

                impl fmt::Debug for Raw {
                    #[inline]
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "{}", self.0)
                    }
                }

                let mut f = f.debug_set();
                let mut this = *self;

                $(
                    if this & Self::$variant {
                        f.entry(&Raw(stringify!($variant)));
                        this = this ^ Self::$variant;
                    }
                )*

                if this.0 != 0 {
                    f.entry(&this.0);
                }

                f.finish()
            }
        }
    }
}

raw_enum! {
    /// The endianness a message was encoded in.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian, `l`.
        LITTLE = b'l',
        /// Big endian, `B`.
        BIG = b'B',
    }
}

impl Endianness {
    /// Native endianness of the current target.
    #[cfg(target_endian = "little")]
    pub(crate) const NATIVE: Self = Self::LITTLE;
    /// Native endianness of the current target.
    #[cfg(target_endian = "big")]
    pub(crate) const NATIVE: Self = Self::BIG;

    /// The non-native endianness, i.e. the other variant from [`Self::NATIVE`].
    #[cfg(target_endian = "little")]
    pub(crate) const SWAPPED: Self = Self::BIG;
    /// The non-native endianness, i.e. the other variant from [`Self::NATIVE`].
    #[cfg(target_endian = "big")]
    pub(crate) const SWAPPED: Self = Self::LITTLE;
}

raw_enum! {
    /// The protocol-level kind of a message.
    #[repr(u8)]
    pub enum MessageType {
        /// Method call. May prompt a method-return or error reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply. The ERROR_NAME header carries the well-known error name.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

unsafe impl Frame for MessageType {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

raw_set! {
    /// Flag bits carried in every message header.
    #[repr(u8)]
    pub enum Flags {
        /// No flags set.
        EMPTY = 0,
        /// This message does not expect a method-return or error reply, even
        /// if it is of a kind that can have one.
        NO_REPLY_EXPECTED = 1,
        /// The bus must not launch an owner for the destination name in
        /// response to this message.
        NO_AUTO_START = 2,
        /// The caller is prepared to wait for interactive authorization.
        ALLOW_INTERACTIVE_AUTHORIZATION = 4,
    }
}

unsafe impl Frame for Flags {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

impl BitOr<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Flags) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd<Flags> for Flags {
    type Output = bool;

    #[inline]
    fn bitand(self, rhs: Flags) -> Self::Output {
        self.0 & rhs.0 != 0
    }
}

impl BitXor<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitxor(self, rhs: Flags) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

raw_enum! {
    /// The closed set of header field codes (`spec.md` §6).
    #[repr(u8)]
    pub enum HeaderField {
        /// The object path a call is sent to, or a signal emitted from.
        PATH = 1,
        /// The interface a method call is invoked on, or a signal emitted from.
        INTERFACE = 2,
        /// The method or signal name.
        MEMBER = 3,
        /// The well-known name of the error, for error replies.
        ERROR_NAME = 4,
        /// The serial this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// The unique name of the sending connection.
        SENDER = 7,
        /// The signature of the message body.
        SIGNATURE = 8,
    }
}

unsafe impl Frame for HeaderField {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

raw_enum! {
    /// The closed alphabet of signature type codes (`spec.md` §3).
    #[repr(u8)]
    pub(crate) enum Type {
        /// Not a valid type code; used to terminate signatures.
        INVALID = b'\0',
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean; only 0 or 1 are valid on the wire.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double.
        DOUBLE = b'd',
        /// UTF-8 string, NUL terminated, no embedded NUL.
        STRING = b's',
        /// Object path.
        OBJECT_PATH = b'o',
        /// Type signature.
        SIGNATURE = b'g',
        /// Array.
        ARRAY = b'a',
        /// Opening struct paren.
        OPEN_PAREN = b'(',
        /// Closing struct paren.
        CLOSE_PAREN = b')',
        /// Self-describing variant.
        VARIANT = b'v',
        /// Opening dict-entry brace.
        OPEN_BRACE = b'{',
        /// Closing dict-entry brace.
        CLOSE_BRACE = b'}',
    }
}

impl Type {
    /// The wire alignment for a type whose signature character is `self`.
    ///
    /// Struct and dict-entry alignment is handled specially by callers since
    /// it does not depend on the first contained type (`spec.md` §3).
    pub(crate) const fn alignment(self) -> usize {
        match self {
            Type::BYTE => 1,
            Type::BOOLEAN | Type::UINT32 | Type::INT32 => 4,
            Type::INT16 | Type::UINT16 => 2,
            Type::INT64 | Type::UINT64 | Type::DOUBLE => 8,
            Type::STRING | Type::OBJECT_PATH => 4,
            Type::SIGNATURE => 1,
            Type::ARRAY => 4,
            Type::OPEN_PAREN | Type::CLOSE_PAREN => 8,
            Type::OPEN_BRACE | Type::CLOSE_BRACE => 8,
            Type::VARIANT => 1,
            _ => 1,
        }
    }
}

/// Maximum number of bytes in an array body, excluding the length prefix and
/// the pad between it and the first element (`spec.md` §3).
pub const MAX_ARRAY_LENGTH: u32 = 1 << 26;

/// Maximum number of bytes in a complete message (`spec.md` §3).
pub const MAX_MESSAGE_LENGTH: u32 = 1 << 27;

/// Maximum number of bytes in a signature string (`spec.md` §3).
pub const MAX_SIGNATURE_LENGTH: usize = 255;

/// Maximum combined nesting depth of arrays, structs and variants
/// (`spec.md` §3: "at least 32 levels").
pub const MAX_CONTAINER_DEPTH: usize = 32;
