use std::env;
use std::fs;
use std::path::PathBuf;

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::error::{Error, ErrorKind, Result};

/// A pluggable SASL authentication mechanism (`spec.md` §4.3: "the state
/// machine is mechanism-agnostic, delegating challenge handling to a
/// per-mechanism callback set").
pub trait Mechanism {
    /// The mechanism name sent in the initial `AUTH <mechanism> ...` line.
    fn name(&self) -> &'static str;

    /// The hex-encoded initial response appended to `AUTH <mechanism>`, if
    /// any.
    fn initial_response(&mut self) -> Option<Vec<u8>>;

    /// Compute the hex-encoded reply to a server `DATA <hex>` challenge.
    fn challenge(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// `EXTERNAL`: authenticates from transport credentials (the connecting
/// process's uid). Carries its identity as the initial response and accepts
/// no further challenge (`spec.md` §4.3).
pub struct External {
    id_hex: Vec<u8>,
}

impl External {
    /// Build an `EXTERNAL` mechanism authenticating as `uid`, ASCII-decimal
    /// digits hex-encoded one byte at a time (matches the reference
    /// implementation's own encoding of the local uid).
    pub fn new(uid: u32) -> Self {
        let decimal = uid.to_string();
        let mut id_hex = Vec::with_capacity(decimal.len() * 2);

        for byte in decimal.bytes() {
            id_hex.extend_from_slice(format!("{byte:02x}").as_bytes());
        }

        Self { id_hex }
    }

    #[cfg(all(unix, feature = "libc"))]
    pub fn from_current_user() -> Self {
        Self::new(unsafe { libc::getuid() })
    }
}

impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn initial_response(&mut self) -> Option<Vec<u8>> {
        Some(self.id_hex.clone())
    }

    fn challenge(&mut self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::InvalidSaslResponse))
    }
}

/// `DBUS_COOKIE_SHA1`: the server sends a context name, cookie id, and
/// server challenge; the client looks the cookie up in its keyring file,
/// picks its own challenge, and replies with the SHA1 digest of
/// `server-challenge:client-challenge:cookie` (`spec.md` §4.3).
pub struct CookieSha1 {
    id_hex: Vec<u8>,
}

impl CookieSha1 {
    pub fn new(uid: u32) -> Self {
        let decimal = uid.to_string();
        let mut id_hex = Vec::with_capacity(decimal.len() * 2);

        for byte in decimal.bytes() {
            id_hex.extend_from_slice(format!("{byte:02x}").as_bytes());
        }

        Self { id_hex }
    }
}

impl Mechanism for CookieSha1 {
    fn name(&self) -> &'static str {
        "DBUS_COOKIE_SHA1"
    }

    fn initial_response(&mut self) -> Option<Vec<u8>> {
        Some(self.id_hex.clone())
    }

    fn challenge(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let decoded = decode_hex(data)?;
        let mut parts = decoded.splitn(3, |&b| b == b' ');

        let context = parts.next().ok_or_else(|| Error::new(ErrorKind::InvalidSasl))?;
        let cookie_id = parts.next().ok_or_else(|| Error::new(ErrorKind::InvalidSasl))?;
        let server_challenge = parts.next().ok_or_else(|| Error::new(ErrorKind::InvalidSasl))?;

        let context = std::str::from_utf8(context).map_err(Error::from)?;
        let cookie_id = std::str::from_utf8(cookie_id).map_err(Error::from)?;

        let cookie = read_cookie(context, cookie_id)?;

        let mut client_challenge = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut client_challenge);
        let client_challenge_hex = hex::encode(client_challenge);

        let mut hasher = Sha1::new();
        hasher.update(server_challenge);
        hasher.update(b":");
        hasher.update(client_challenge_hex.as_bytes());
        hasher.update(b":");
        hasher.update(cookie.as_bytes());
        let digest = hasher.finalize();

        let mut response = client_challenge_hex.into_bytes();
        response.push(b' ');
        response.extend_from_slice(hex::encode(digest).as_bytes());

        Ok(hex::encode(response).into_bytes())
    }
}

/// Lets a boxed mechanism be driven by [`super::ClientHandshake`] without
/// making it generic over a trait object, so a connection can pick its
/// mechanism at runtime.
impl Mechanism for Box<dyn Mechanism + Send> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initial_response(&mut self) -> Option<Vec<u8>> {
        (**self).initial_response()
    }

    fn challenge(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        (**self).challenge(data)
    }
}

fn decode_hex(data: &[u8]) -> Result<Vec<u8>> {
    hex::decode(data).map_err(|_| Error::new(ErrorKind::InvalidSasl))
}

/// Read cookie `id` from the `~/.dbus-keyrings/<context>` keyring file.
///
/// Each line is `<id> <creation-time> <cookie>`; the cookie value is
/// returned as-is.
fn read_cookie(context: &str, id: &str) -> Result<String> {
    let path = keyring_path(context)?;
    let contents = fs::read_to_string(path).map_err(Error::from)?;

    for line in contents.lines() {
        let mut fields = line.splitn(3, ' ');
        let Some(line_id) = fields.next() else { continue };

        if line_id != id {
            continue;
        }

        let _creation_time = fields.next();

        if let Some(cookie) = fields.next() {
            return Ok(cookie.to_owned());
        }
    }

    Err(Error::new(ErrorKind::InvalidSasl))
}

fn keyring_path(context: &str) -> Result<PathBuf> {
    let home = env::var_os("HOME").ok_or_else(|| Error::new(ErrorKind::MissingBus))?;
    let mut path = PathBuf::from(home);
    path.push(".dbus-keyrings");
    path.push(context);
    Ok(path)
}
