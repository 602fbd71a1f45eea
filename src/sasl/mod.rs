//! The D-Bus SASL handshake: a line-oriented, CRLF-terminated ASCII
//! exchange that authenticates a connection before any message traffic
//! flows (`spec.md` §4.3).

pub use self::mechanism::{CookieSha1, External, Mechanism};
mod mechanism;

#[cfg(test)]
mod tests;

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Handshake not yet started.
    Start,
    /// `AUTH` sent, waiting on `OK`/`DATA`/`REJECTED`/`ERROR`.
    WaitData,
    /// Server accepted; `BEGIN` has been (or is about to be) sent.
    Done,
}

/// The outcome of handing one server line to [`ClientHandshake::receive_line`].
pub(crate) enum HandshakeEvent {
    /// A `DATA` challenge was answered; write this back and stay in
    /// `wait-data`.
    Reply(Vec<u8>),
    /// The server accepted (`OK <guid>`); call [`ClientHandshake::begin`] to
    /// get the `BEGIN` line, then switch the connection to message mode.
    Accepted { guid: Box<[u8]> },
}

/// Drives the client side of the SASL handshake (`spec.md` §4.3's
/// `start` → `wait-data` → `done` state machine), delegating
/// challenge-response to a [`Mechanism`].
pub(crate) struct ClientHandshake<M> {
    mechanism: M,
    state: HandshakeState,
}

impl<M: Mechanism> ClientHandshake<M> {
    pub(crate) fn new(mechanism: M) -> Self {
        Self {
            mechanism,
            state: HandshakeState::Start,
        }
    }

    /// Emit the initial NUL byte and `AUTH <mechanism> <initial-response>`
    /// line, entering `wait-data`. Only legal once, at the very start.
    pub(crate) fn start(&mut self) -> Result<Vec<u8>> {
        if self.state != HandshakeState::Start {
            return Err(Error::new(ErrorKind::InvalidSasl));
        }

        let mut out = vec![0u8];
        out.extend_from_slice(b"AUTH ");
        out.extend_from_slice(self.mechanism.name().as_bytes());

        if let Some(initial) = self.mechanism.initial_response() {
            out.push(b' ');
            out.extend_from_slice(&initial);
        }

        out.extend_from_slice(b"\r\n");
        self.state = HandshakeState::WaitData;
        Ok(out)
    }

    /// Handle one complete line received from the server while in
    /// `wait-data` (the trailing CRLF must already be stripped by the
    /// caller, see [`split_line`]).
    pub(crate) fn receive_line(&mut self, line: &[u8]) -> Result<HandshakeEvent> {
        if self.state != HandshakeState::WaitData {
            return Err(Error::new(ErrorKind::InvalidSasl));
        }

        let line = crate::utils::trim_end(line);
        let (command, rest) = crate::utils::split_once(line, b' ').unwrap_or((line, &[]));

        match command {
            b"OK" => {
                self.state = HandshakeState::Done;
                Ok(HandshakeEvent::Accepted {
                    guid: rest.to_vec().into_boxed_slice(),
                })
            }
            b"DATA" => {
                let response = self.mechanism.challenge(rest)?;
                let mut out = b"DATA ".to_vec();
                out.extend_from_slice(&response);
                out.extend_from_slice(b"\r\n");
                Ok(HandshakeEvent::Reply(out))
            }
            b"REJECTED" | b"ERROR" => Err(Error::new(ErrorKind::SaslRejected)),
            _ => Err(Error::new(ErrorKind::InvalidSaslResponse)),
        }
    }

    /// The `BEGIN` line that ends the handshake and switches the
    /// connection to the binary message protocol. Only legal once the
    /// server has sent `OK`.
    pub(crate) fn begin(&self) -> Result<Vec<u8>> {
        if self.state != HandshakeState::Done {
            return Err(Error::new(ErrorKind::InvalidSasl));
        }

        Ok(b"BEGIN\r\n".to_vec())
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }
}

/// Split the first CRLF- or LF-terminated line off `buf`, returning the
/// line with its terminator stripped and the remaining bytes. `None` if no
/// terminator has arrived yet (`spec.md` §4.3: "partial lines are buffered
/// until a CRLF arrives").
pub(crate) fn split_line(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let n = buf.iter().position(|&b| b == b'\n')?;
    let (line, rest) = buf.split_at(n);
    Some((line, &rest[1..]))
}
