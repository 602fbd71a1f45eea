//! D-Bus address strings: `transport:key=value,key=value` descriptors, plus
//! the well-known environment variables that supply default bus addresses
//! (`spec.md` §6).

use std::collections::HashMap;
use std::env;

use crate::error::{Error, ErrorKind, Result};

pub const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
pub const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
pub const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// A parsed `transport:key=value,...` descriptor.
///
/// The core only parses far enough to hand a transport factory its
/// parameters (`spec.md` §6: "the core parses these to the extent needed to
/// pick a transport factory; transport implementations own the rest") — it
/// never opens a socket itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    transport: Box<str>,
    params: HashMap<Box<str>, Box<str>>,
}

impl Address {
    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|value| &**value)
    }

    /// Parse a single descriptor: `transport:key=value,key=value`.
    pub fn parse(address: &str) -> Result<Self> {
        let (transport, rest) = address
            .split_once(':')
            .ok_or_else(|| Error::new(ErrorKind::InvalidAddress))?;

        if transport.is_empty() {
            return Err(Error::new(ErrorKind::InvalidAddress));
        }

        let mut params = HashMap::new();

        if !rest.is_empty() {
            for pair in rest.split(',') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| Error::new(ErrorKind::InvalidAddress))?;

                if key.is_empty() {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                }

                params.insert(key.into(), value.into());
            }
        }

        Ok(Self {
            transport: transport.into(),
            params,
        })
    }
}

/// Resolve the session bus address from `DBUS_SESSION_BUS_ADDRESS`.
pub fn session_bus_address() -> Result<Address> {
    from_env(ENV_SESSION_BUS, None)
}

/// Resolve the system bus address from `DBUS_SYSTEM_BUS_ADDRESS`, falling
/// back to the well-known default path.
pub fn system_bus_address() -> Result<Address> {
    from_env(ENV_SYSTEM_BUS, Some(DEFAULT_SYSTEM_BUS))
}

fn from_env(var: &str, default: Option<&str>) -> Result<Address> {
    let value = match env::var(var) {
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_owned(),
            None => return Err(Error::new(ErrorKind::MissingBus)),
        },
    };

    Address::parse(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_path_address() {
        let address = Address::parse("unix:path=/var/run/dbus/system_bus_socket").unwrap();
        assert_eq!(address.transport(), "unix");
        assert_eq!(address.param("path"), Some("/var/run/dbus/system_bus_socket"));
    }

    #[test]
    fn parses_multiple_params() {
        let address = Address::parse("unix:abstract=/tmp/bus,guid=deadbeef").unwrap();
        assert_eq!(address.param("abstract"), Some("/tmp/bus"));
        assert_eq!(address.param("guid"), Some("deadbeef"));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(Address::parse("not-an-address").is_err());
    }

    #[test]
    fn rejects_param_without_equals() {
        assert!(Address::parse("unix:path").is_err());
    }
}
