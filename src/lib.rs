//! A synchronous, transport-agnostic D-Bus client core.
//!
//! This crate implements the wire codec, the in-memory [`Message`]
//! representation, the client side of the SASL handshake, and a
//! [`Connection`] multiplexer that dispatches replies, signals, and method
//! calls against caller-registered handlers. It never opens a socket or
//! spawns a thread itself: callers drive a [`Connection`] through an
//! explicit [`Transport`], which makes it equally usable from a blocking
//! `std::net`/`std::os::unix::net` loop, an async runtime's reactor, or a
//! test harness feeding it canned bytes.

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::protocol::{Endianness, Flags, MessageType};
pub mod protocol;

pub(crate) mod buf;

pub mod sasl;

#[doc(inline)]
pub use self::signature::{OwnedSignature, Signature, SignatureError};
mod signature;

mod frame;

#[doc(inline)]
pub use self::message::{Message, MessageKind};
mod message;

#[doc(inline)]
pub use self::body::{Builder, Iter};
pub mod body;

pub use self::object_path::{ObjectPath, OwnedObjectPath};
mod object_path;

mod names;

#[doc(inline)]
pub use self::connection::{
    session_bus_address, system_bus_address, Address, BlockMode, BlockOutcome, Connection,
    ConnectionBuilder, ConnectionState, HandlerError, Handle, MatchRule, Transport,
};
pub mod connection;

mod utils;
