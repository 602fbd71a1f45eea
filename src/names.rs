//! Interface, member, and bus name syntax validation (`spec.md` §3).

use crate::error::{Error, ErrorKind, Result};

const MAX_NAME_LENGTH: usize = 255;

fn is_name_start(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_')
}

fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
}

fn validate_component(segment: &[u8]) -> bool {
    match segment.split_first() {
        Some((&first, rest)) => is_name_start(first) && rest.iter().all(|&b| is_name_char(b)),
        None => false,
    }
}

/// Interface names: non-empty, `<=255` bytes, components in
/// `[A-Za-z_][A-Za-z0-9_]*`, at least one `.`.
pub(crate) fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(Error::new(ErrorKind::InvalidInterfaceName));
    }

    let mut components = 0;

    for segment in name.split('.') {
        if !validate_component(segment.as_bytes()) {
            return Err(Error::new(ErrorKind::InvalidInterfaceName));
        }

        components += 1;
    }

    if components < 2 {
        return Err(Error::new(ErrorKind::InvalidInterfaceName));
    }

    Ok(())
}

/// Member names: non-empty, `<=255` bytes, a single component in
/// `[A-Za-z_][A-Za-z0-9_]*`, no dots.
pub(crate) fn validate_member_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.contains('.') {
        return Err(Error::new(ErrorKind::InvalidMemberName));
    }

    if !validate_component(name.as_bytes()) {
        return Err(Error::new(ErrorKind::InvalidMemberName));
    }

    Ok(())
}

/// Bus names: `<=255` bytes, either unique (`:`-prefixed, `.`-separated
/// segments whose first character may be a digit) or well-known
/// (`.`-separated segments matching `[A-Za-z_-][A-Za-z0-9_-]*`).
pub(crate) fn validate_bus_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(Error::new(ErrorKind::InvalidBusName));
    }

    if let Some(rest) = name.strip_prefix(':') {
        if rest.is_empty() {
            return Err(Error::new(ErrorKind::InvalidBusName));
        }

        for segment in rest.split('.') {
            if segment.is_empty() || !segment.bytes().all(|b| is_name_char(b) || b == b'-') {
                return Err(Error::new(ErrorKind::InvalidBusName));
            }
        }

        return Ok(());
    }

    for segment in name.split('.') {
        let mut bytes = segment.bytes();

        let Some(first) = bytes.next() else {
            return Err(Error::new(ErrorKind::InvalidBusName));
        };

        if !(is_name_start(first) || first == b'-') {
            return Err(Error::new(ErrorKind::InvalidBusName));
        }

        if !bytes.all(|b| is_name_char(b) || b == b'-') {
            return Err(Error::new(ErrorKind::InvalidBusName));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_interface_name() {
        assert!(validate_interface_name("org.freedesktop.DBus").is_ok());
    }

    #[test]
    fn rejects_interface_name_without_dot() {
        assert!(validate_interface_name("NoDot").is_err());
    }

    #[test]
    fn accepts_member_name() {
        assert!(validate_member_name("RequestName").is_ok());
    }

    #[test]
    fn rejects_member_name_with_dot() {
        assert!(validate_member_name("Has.Dot").is_err());
    }

    #[test]
    fn accepts_unique_bus_name_with_digit_segment() {
        assert!(validate_bus_name(":1.42").is_ok());
    }

    #[test]
    fn accepts_well_known_bus_name() {
        assert!(validate_bus_name("org.freedesktop.DBus").is_ok());
    }

    #[test]
    fn rejects_well_known_name_starting_with_digit() {
        assert!(validate_bus_name("1.example").is_err());
    }
}
