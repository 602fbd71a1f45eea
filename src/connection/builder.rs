use crate::error::{Error, ErrorKind, Result};
use crate::sasl::{External, Mechanism};

use super::address::{session_bus_address, system_bus_address, Address};
use super::connection::Connection;
use super::transport::Transport;

enum BusChoice {
    Session,
    System,
    Address(Box<str>),
}

/// Builds a [`Connection`] and drives it to [`super::ConnectionState::Authenticating`]
/// in one step, picking the bus address and SASL mechanism the way a caller
/// almost always wants (`spec.md` §9's redesign note on global bus-address
/// state: resolution is an explicit operation here, not ambient lookup).
pub struct ConnectionBuilder {
    bus: BusChoice,
}

impl ConnectionBuilder {
    /// Start from the session bus (the default).
    pub fn new() -> Self {
        Self {
            bus: BusChoice::Session,
        }
    }

    /// Connect to the address in `DBUS_SESSION_BUS_ADDRESS`.
    pub fn session_bus(mut self) -> Self {
        self.bus = BusChoice::Session;
        self
    }

    /// Connect to the address in `DBUS_SYSTEM_BUS_ADDRESS`, or the
    /// well-known default system socket path.
    pub fn system_bus(mut self) -> Self {
        self.bus = BusChoice::System;
        self
    }

    /// Connect to an explicit `transport:key=value,...` address instead of
    /// resolving one from the environment.
    pub fn address(mut self, address: impl Into<Box<str>>) -> Self {
        self.bus = BusChoice::Address(address.into());
        self
    }

    /// Resolve the configured bus address without opening a transport.
    /// Exposed so a caller's transport factory can inspect it before
    /// dialing (`spec.md` §6: "the core parses these to the extent needed
    /// to pick a transport factory").
    pub fn resolve_address(&self) -> Result<Address> {
        match &self.bus {
            BusChoice::Session => session_bus_address(),
            BusChoice::System => system_bus_address(),
            BusChoice::Address(address) => Address::parse(address),
        }
    }

    /// Wrap `transport` in a [`Connection`] and begin the `EXTERNAL`
    /// handshake, authenticating as the current user (`spec.md` §4.3).
    ///
    /// Requires the `libc` feature; without it, construct a [`Connection`]
    /// directly and call [`Connection::start_handshake`] with a mechanism
    /// of your choosing.
    #[cfg(all(unix, feature = "libc"))]
    pub fn connect<T: Transport>(self, transport: T) -> Result<Connection<T>> {
        self.connect_with(transport, External::from_current_user())
    }

    /// Wrap `transport` in a [`Connection`] and begin the handshake using
    /// an explicit [`Mechanism`], for callers that can't or don't want the
    /// `libc`-derived `EXTERNAL` identity (`spec.md` §4.3: "the state
    /// machine is mechanism-agnostic").
    pub fn connect_with<T, M>(self, transport: T, mechanism: M) -> Result<Connection<T>>
    where
        T: Transport,
        M: Mechanism + Send + 'static,
    {
        let _ = self.resolve_address().map_err(|_| Error::new(ErrorKind::MissingBus))?;
        let mut connection = Connection::new(transport);
        connection.start_handshake(mechanism)?;
        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BlockMode, BlockOutcome, Handle};

    #[derive(Default)]
    struct NullTransport;

    impl Transport for NullTransport {
        fn recv(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn send(&mut self, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }

        fn block(
            &mut self,
            _mode: BlockMode,
            _handle: Handle,
            _timeout_ms: Option<u64>,
        ) -> Result<BlockOutcome> {
            Ok(BlockOutcome::Signalled)
        }
    }

    #[test]
    fn connect_with_starts_the_handshake() {
        std::env::remove_var("DBUS_SESSION_BUS_ADDRESS");

        let err = ConnectionBuilder::new()
            .session_bus()
            .connect_with(NullTransport, crate::sasl::External::new(1000));

        // No DBUS_SESSION_BUS_ADDRESS in a test environment: resolution
        // fails before a transport is ever touched.
        assert!(err.is_err());
    }

    #[test]
    fn explicit_address_bypasses_environment_lookup() {
        let connection = ConnectionBuilder::new()
            .address("unix:path=/tmp/does-not-need-to-exist")
            .connect_with(NullTransport, crate::sasl::External::new(1000))
            .unwrap();

        assert_eq!(
            connection.state(),
            crate::connection::ConnectionState::Authenticating
        );
    }
}
