//! The connection multiplexer: SASL handshake, message codec, and dispatch
//! against reply/match/bind tables, all driven by an explicit
//! [`Transport`] rather than an owned socket or an async runtime
//! (`spec.md` §2, §4.4).

pub use self::address::{session_bus_address, system_bus_address, Address};
mod address;

pub use self::connection::Connection;
mod connection;

pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::state::ConnectionState;
mod state;

pub(crate) use self::tables::{BindTable, MatchTable, ReplyEntry, ReplyTable};
pub use self::tables::{HandlerError, MatchRule};
mod tables;

pub use self::transport::{BlockMode, BlockOutcome, Handle, Transport};
mod transport;
