use crate::buf::OwnedBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{self, Message, MessageKind};
use crate::object_path::OwnedObjectPath;
use crate::sasl::{ClientHandshake, HandshakeEvent, Mechanism};
use crate::signature::Signature;

use super::state::ConnectionState;
use super::tables::{BindMiss, BindTable, HandlerError, MatchRule, MatchTable, ReplyEntry, ReplyTable};
use super::transport::{BlockMode, BlockOutcome, Handle, Transport};

/// Well known bus daemon destination, path, and interface (`spec.md` §4.4
/// "Readiness").
const BUS_DESTINATION: &str = "org.freedesktop.DBus";
const BUS_PATH: &str = "/org/freedesktop/DBus";
const BUS_INTERFACE: &str = "org.freedesktop.DBus";

/// Well-known error names the multiplexer itself emits (`spec.md` §6).
const ERROR_UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
const ERROR_UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

/// Drives a single D-Bus connection: authentication, message parsing, and
/// dispatch against the bind/reply/match tables (`spec.md` §2, §4.4).
///
/// Generic over its [`Transport`] so tests can drive the state machine
/// against an in-memory byte pipe instead of a real socket, which the core
/// deliberately does not open itself (`spec.md` §1).
pub struct Connection<T> {
    transport: T,
    state: ConnectionState,
    recv: OwnedBuf,
    handshake: Option<ClientHandshake<Box<dyn Mechanism + Send>>>,
    hello_serial: Option<u32>,
    next_serial: u32,
    unique_name: Option<Box<str>>,
    replies: ReplyTable,
    matches: MatchTable,
    binds: BindTable,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::New,
            recv: OwnedBuf::new(),
            handshake: None,
            hello_serial: None,
            next_serial: 1,
            unique_name: None,
            replies: ReplyTable::default(),
            matches: MatchTable::default(),
            binds: BindTable::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn unique_name(&self) -> Option<&str> {
        self.unique_name.as_deref()
    }

    /// Begin the SASL handshake with `mechanism` (`spec.md` §4.3 `start`).
    pub fn start_handshake<M>(&mut self, mechanism: M) -> Result<()>
    where
        M: Mechanism + Send + 'static,
    {
        if self.state != ConnectionState::New {
            return Err(Error::new(ErrorKind::InvalidState(self.state)));
        }

        let mut handshake = ClientHandshake::new(Box::new(mechanism) as Box<dyn Mechanism + Send>);
        let out = handshake.start()?;
        self.handshake = Some(handshake);
        self.state = ConnectionState::Authenticating;
        self.send_all(&out)
    }

    /// Feed freshly received bytes into the connection, parsing and
    /// dispatching as many complete messages (or SASL lines) as are
    /// buffered (`spec.md` §4.4 "Receive path").
    pub fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(Error::new(ErrorKind::Disconnected)),
            ConnectionState::Authenticating => self.feed_handshake(bytes),
            _ => self.feed_messages(bytes),
        }
    }

    /// Read once from the transport and feed whatever arrived. Returns the
    /// number of bytes read (`0` means the peer closed the stream).
    pub fn pump(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 4096];
        let n = self.transport.recv(&mut scratch)?;

        if n == 0 {
            self.close(ErrorKind::Disconnected);
            return Ok(0);
        }

        self.feed(&scratch[..n])?;
        Ok(n)
    }

    fn feed_handshake(&mut self, bytes: &[u8]) -> Result<()> {
        self.recv.extend_from_slice(bytes);

        loop {
            let Some((line, consumed)) = next_line(&self.recv) else {
                break;
            };

            self.recv.advance(consumed);

            if let Err(err) = self.handle_handshake_line(&line) {
                self.close_with(&err);
                return Err(err);
            }

            if self.state != ConnectionState::Authenticating {
                break;
            }
        }

        Ok(())
    }

    fn handle_handshake_line(&mut self, line: &[u8]) -> Result<()> {
        let mut handshake = self
            .handshake
            .take()
            .ok_or_else(|| Error::new(ErrorKind::InvalidSasl))?;

        match handshake.receive_line(line)? {
            HandshakeEvent::Reply(out) => {
                self.handshake = Some(handshake);
                self.send_all(&out)
            }
            HandshakeEvent::Accepted { .. } => {
                let begin = handshake.begin()?;
                self.send_all(&begin)?;
                self.send_hello()
            }
        }
    }

    fn send_hello(&mut self) -> Result<()> {
        let serial = self.next_serial();

        let message = Message::method_call(
            OwnedObjectPath::new(BUS_PATH).expect("well-known path is valid"),
            "Hello",
            serial,
        )
        .with_destination(BUS_DESTINATION)
        .with_interface(BUS_INTERFACE);

        self.hello_serial = Some(serial);
        self.state = ConnectionState::HelloSent;
        self.send_raw(&message)
    }

    fn feed_messages(&mut self, bytes: &[u8]) -> Result<()> {
        self.recv.extend_from_slice(bytes);

        loop {
            match message::decode(self.recv.get()) {
                Ok((message, consumed)) => {
                    self.recv.advance(consumed);
                    self.dispatch(message)?;
                }
                Err(err) if err.is_buffer_underflow() => break,
                Err(err) => {
                    self.close_with(&err);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// `spec.md` §4.4 "Dispatch".
    fn dispatch(&mut self, message: Message) -> Result<()> {
        if self.state == ConnectionState::HelloSent
            && message.kind().reply_serial() == self.hello_serial
            && matches!(message.kind(), MessageKind::MethodReturn { .. })
        {
            let mut iter = message.iter_body();
            let name = iter.next_str()?;
            self.unique_name = Some(name.into());
            self.state = ConnectionState::Ready;
            return Ok(());
        }

        match message.kind() {
            MessageKind::MethodReturn { .. } => {
                let reply_serial = message.kind().reply_serial().expect("method-return always has one");
                self.dispatch_reply(reply_serial, Ok(&message));
            }
            MessageKind::Error { .. } => {
                let reply_serial = message.kind().reply_serial().expect("error always has one");
                self.dispatch_reply(reply_serial, Err(&message));
            }
            MessageKind::Signal { .. } => {
                self.matches.dispatch(&message);
            }
            MessageKind::MethodCall { .. } => {
                self.dispatch_method_call(&message)?;
            }
        }

        Ok(())
    }

    fn dispatch_reply(&mut self, reply_serial: u32, outcome: Result<&Message, &Message>) {
        let Some(entry) = self.replies.remove(reply_serial) else {
            // No registration: dropped silently (`spec.md` §4.4, §8).
            return;
        };

        match outcome {
            Ok(reply) => (entry.on_reply)(reply),
            Err(error) => {
                let name = error.kind().error_name().unwrap_or("");
                let description = first_string_arg(error).unwrap_or_default();
                (entry.on_error)(name, &description);
            }
        }
    }

    fn dispatch_method_call(&mut self, message: &Message) -> Result<()> {
        let path = message
            .kind()
            .path()
            .expect("method-call kind always carries a path");
        let member = message.kind().member().expect("method-call always has a member");

        let handler = match self.binds.find(path, message.interface(), member) {
            Ok(handler) => handler,
            Err(miss) => return self.reply_unknown(message, miss),
        };

        let outcome = handler(message);

        match outcome {
            Ok(reply) => {
                let serial = self.next_serial();
                self.send_raw(&reply.with_serial(serial))
            }
            Err(HandlerError::Named { name, message: text }) => {
                self.reply_error(message, &name, &text)
            }
            Err(HandlerError::InvalidArgs) => {
                self.reply_error(message, ERROR_INVALID_ARGS, "invalid arguments")
            }
        }
    }

    /// Replies with the most specific of `UnknownObject`/`UnknownInterface`/
    /// `UnknownMethod` the bind table could determine (`spec.md` §6
    /// supplemented features).
    fn reply_unknown(&mut self, message: &Message, miss: BindMiss) -> Result<()> {
        let (name, text) = match miss {
            BindMiss::UnknownObject => (ERROR_UNKNOWN_OBJECT, "no such object path"),
            BindMiss::UnknownInterface => (ERROR_UNKNOWN_INTERFACE, "no such interface on that path"),
            BindMiss::UnknownMethod => (ERROR_UNKNOWN_METHOD, "no such method on that interface"),
        };

        self.reply_error(message, name, text)
    }

    fn reply_error(&mut self, call: &Message, name: &str, text: &str) -> Result<()> {
        let serial = self.next_serial();
        let reply = call
            .error(name, serial)
            .build_body(Signature::new_const("s"), |b| b.append_str(text))?;
        self.send_raw(&reply)
    }

    /// `spec.md` §4.4 "Send path": assigns a serial if needed, builds the
    /// wire bytes, and calls the transport's send callback synchronously.
    pub fn send(&mut self, message: Message) -> Result<u32> {
        if self.state == ConnectionState::Closed {
            return Err(Error::new(ErrorKind::Disconnected));
        }

        let serial = if message.serial() == 0 {
            self.next_serial()
        } else {
            message.serial()
        };

        let message = message.with_serial(serial);
        self.send_raw(&message)?;
        Ok(serial)
    }

    /// Like [`Connection::send`], but register a one-shot reply handler
    /// under the assigned serial first.
    pub fn call(
        &mut self,
        message: Message,
        on_reply: impl FnOnce(&Message) + Send + 'static,
        on_error: impl FnOnce(&str, &str) + Send + 'static,
    ) -> Result<u32> {
        let serial = if message.serial() == 0 {
            self.next_serial()
        } else {
            message.serial()
        };

        self.replies.insert(
            serial,
            ReplyEntry {
                on_reply: Box::new(on_reply),
                on_error: Box::new(on_error),
            },
        );

        let message = message.with_serial(serial);

        if let Err(err) = self.send_raw(&message) {
            self.replies.remove(serial);
            return Err(err);
        }

        Ok(serial)
    }

    fn send_raw(&mut self, message: &Message) -> Result<()> {
        let bytes = message::encode(message)?;

        if let Err(err) = self.send_all(&bytes) {
            self.close_with(&err);
            return Err(err);
        }

        Ok(())
    }

    fn send_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let n = self.transport.send(bytes)?;

            if n == 0 {
                return Err(Error::new(ErrorKind::Disconnected));
            }

            bytes = &bytes[n..];
        }

        Ok(())
    }

    /// `spec.md` §4.4 "next_serial()": wraps past 1, skipping 0.
    fn next_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = if serial == u32::MAX { 1 } else { serial + 1 };
        serial
    }

    pub fn register_match(
        &mut self,
        rule: MatchRule,
        handler: impl FnMut(&Message) -> bool + Send + 'static,
    ) -> u64 {
        self.matches.insert(rule, Box::new(handler))
    }

    pub fn unregister_match(&mut self, id: u64) {
        self.matches.remove(id);
    }

    pub fn bind(
        &mut self,
        path: OwnedObjectPath,
        interface: Option<Box<str>>,
        member: impl Into<Box<str>>,
        handler: impl FnMut(&Message) -> Result<Message, HandlerError> + Send + 'static,
    ) {
        self.binds.insert(path, interface, member, Box::new(handler));
    }

    pub fn unbind(&mut self, path: &OwnedObjectPath, interface: Option<&str>, member: &str) {
        self.binds.remove(path, interface, member);
    }

    /// `spec.md` §4.4 "Blocking primitive".
    pub fn block(
        &mut self,
        mode: BlockMode,
        handle: Handle,
        timeout_ms: Option<u64>,
    ) -> Result<BlockOutcome> {
        if mode == BlockMode::WaitForConnected && self.state == ConnectionState::Ready {
            return Ok(BlockOutcome::Signalled);
        }

        self.transport.block(mode, handle, timeout_ms)
    }

    fn close(&mut self, reason: ErrorKind) {
        self.close_with(&Error::new(reason));
    }

    /// Voluntarily tear the connection down: settle pending replies, release
    /// matches and binds, and stop accepting further traffic (`spec.md`
    /// §4.4 "closed"). Idempotent.
    pub fn shutdown(&mut self) {
        self.close(ErrorKind::Disconnected);
    }

    /// `spec.md` §4.4 "closed": settle pending replies, release matches and
    /// binds, and stop accepting further traffic.
    fn close_with(&mut self, err: &Error) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.state = ConnectionState::Closed;
        self.replies.drain_with_disconnect(&err.to_string());
        self.matches.clear();
        self.binds.clear();
    }
}

/// Peel the first CRLF/LF-terminated line off `buf`, returning an owned copy
/// of the line (without terminator) and the number of bytes (including the
/// terminator) to advance the buffer by.
fn next_line(buf: &OwnedBuf) -> Option<(Vec<u8>, usize)> {
    let data = buf.get();
    let (line, rest) = crate::sasl::split_line(data)?;
    let consumed = data.len() - rest.len();
    Some((line.to_vec(), consumed))
}

fn first_string_arg(message: &Message) -> Option<String> {
    if message.signature().as_str().starts_with('s') {
        let mut iter = message.iter_body();
        return iter.next_str().ok().map(str::to_owned);
    }

    None
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::message::{decode, encode};
    use crate::protocol::MessageType;
    use crate::sasl::External;

    #[derive(Default)]
    struct MockTransport {
        sent: Vec<u8>,
    }

    impl Transport for MockTransport {
        fn recv(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn send(&mut self, buf: &[u8]) -> Result<usize> {
            self.sent.extend_from_slice(buf);
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

    /// Drive a fresh connection through `EXTERNAL` authentication and the
    /// `Hello` handshake, returning it in the `ready` state with its
    /// transport's sent buffer cleared.
    fn ready_connection() -> Connection<MockTransport> {
        let mut conn = Connection::new(MockTransport::default());
        conn.start_handshake(External::new(1000)).unwrap();

        conn.feed(b"OK 0123456789abcdef\r\n").unwrap();
        assert_eq!(conn.state(), ConnectionState::HelloSent);

        let hello_serial = conn.hello_serial.unwrap();
        let dummy = Message::method_call(
            OwnedObjectPath::new(BUS_PATH).unwrap(),
            "Hello",
            hello_serial,
        );
        let reply = dummy
            .method_return(1)
            .build_body(Signature::new_const("s"), |b| b.append_str(":1.42"))
            .unwrap();
        conn.feed(&encode(&reply).unwrap()).unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);

        conn.transport.sent.clear();
        conn
    }

    #[test]
    fn handshake_reaches_ready_after_hello_reply() {
        let conn = ready_connection();
        assert_eq!(conn.unique_name(), Some(":1.42"));
    }

    #[test]
    fn start_handshake_sends_auth_line() {
        let mut conn = Connection::new(MockTransport::default());
        conn.start_handshake(External::new(1000)).unwrap();
        assert!(conn.transport.sent.starts_with(b"\0AUTH EXTERNAL "));
        assert_eq!(conn.state(), ConnectionState::Authenticating);
    }

    #[test]
    fn reply_is_routed_and_removed_after_firing() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/").unwrap();
        let call = Message::method_call(path, "Ping", 0);

        let got = Arc::new(Mutex::new(None));
        let got_clone = got.clone();

        let serial = conn
            .call(
                call,
                move |reply| *got_clone.lock().unwrap() = Some(reply.clone()),
                |_, _| panic!("unexpected error reply"),
            )
            .unwrap();

        assert!(conn.replies.contains(serial));

        let dummy = Message::method_call(OwnedObjectPath::new("/").unwrap(), "Ping", serial);
        let reply = dummy.method_return(9);
        conn.feed(&encode(&reply).unwrap()).unwrap();

        assert!(got.lock().unwrap().is_some());
        assert!(!conn.replies.contains(serial));
    }

    #[test]
    fn signal_matches_on_arg0() {
        let mut conn = ready_connection();

        let matched = Arc::new(Mutex::new(false));
        let matched_clone = matched.clone();

        let rule = MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_arg(0, "hello");
        conn.register_match(
            rule,
            Box::new(move |_msg| {
                *matched_clone.lock().unwrap() = true;
                false
            }),
        );

        let path = OwnedObjectPath::new("/").unwrap();
        let signal = Message::signal(path, "Tick", 5)
            .with_interface("com.example.Clock")
            .build_body(Signature::new_const("s"), |b| b.append_str("hello"))
            .unwrap();

        conn.feed(&encode(&signal).unwrap()).unwrap();

        assert!(*matched.lock().unwrap());
    }

    #[test]
    fn signal_with_wrong_arg0_does_not_match() {
        let mut conn = ready_connection();

        let matched = Arc::new(Mutex::new(false));
        let matched_clone = matched.clone();

        let rule = MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_arg(0, "hello");
        conn.register_match(
            rule,
            Box::new(move |_msg| {
                *matched_clone.lock().unwrap() = true;
                false
            }),
        );

        let path = OwnedObjectPath::new("/").unwrap();
        let signal = Message::signal(path, "Tick", 5)
            .with_interface("com.example.Clock")
            .build_body(Signature::new_const("s"), |b| b.append_str("goodbye"))
            .unwrap();

        conn.feed(&encode(&signal).unwrap()).unwrap();

        assert!(!*matched.lock().unwrap());
    }

    #[test]
    fn bound_method_call_is_dispatched_and_replied() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/demo").unwrap();
        conn.bind(
            path.clone(),
            Some("com.example.Demo".into()),
            "Echo",
            Box::new(|msg| {
                let mut iter = msg.iter_body();
                let text = iter
                    .next_str()
                    .map_err(|_| HandlerError::InvalidArgs)?
                    .to_owned();
                msg.method_return(0)
                    .build_body(Signature::new_const("s"), |b| b.append_str(&text))
                    .map_err(|_| HandlerError::InvalidArgs)
            }),
        );

        let call = Message::method_call(path, "Echo", 7)
            .with_interface("com.example.Demo")
            .build_body(Signature::new_const("s"), |b| b.append_str("hi"))
            .unwrap();

        conn.feed(&encode(&call).unwrap()).unwrap();

        let (reply, _) = decode(&conn.transport.sent).unwrap();
        assert!(matches!(reply.kind(), MessageKind::MethodReturn { .. }));
        let mut iter = reply.iter_body();
        assert_eq!(iter.next_str().unwrap(), "hi");
    }

    #[test]
    fn unbound_path_gets_unknown_object_error() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/demo").unwrap();
        let call = Message::method_call(path, "Echo", 7).with_interface("com.example.Demo");

        conn.feed(&encode(&call).unwrap()).unwrap();

        let (reply, _) = decode(&conn.transport.sent).unwrap();
        match reply.kind() {
            MessageKind::Error { error_name, .. } => {
                assert_eq!(&**error_name, ERROR_UNKNOWN_OBJECT);
            }
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[test]
    fn bound_path_with_wrong_interface_gets_unknown_interface_error() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/demo").unwrap();
        conn.bind(
            path.clone(),
            Some("com.example.Demo".into()),
            "Echo",
            Box::new(|msg| Ok(msg.method_return(0))),
        );

        let call = Message::method_call(path, "Echo", 7).with_interface("com.example.Other");
        conn.feed(&encode(&call).unwrap()).unwrap();

        let (reply, _) = decode(&conn.transport.sent).unwrap();
        match reply.kind() {
            MessageKind::Error { error_name, .. } => {
                assert_eq!(&**error_name, ERROR_UNKNOWN_INTERFACE);
            }
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[test]
    fn bound_path_with_unbound_member_gets_unknown_method_error() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/demo").unwrap();
        conn.bind(
            path.clone(),
            Some("com.example.Demo".into()),
            "Echo",
            Box::new(|msg| Ok(msg.method_return(0))),
        );

        let call = Message::method_call(path, "Other", 7).with_interface("com.example.Demo");
        conn.feed(&encode(&call).unwrap()).unwrap();

        let (reply, _) = decode(&conn.transport.sent).unwrap();
        match reply.kind() {
            MessageKind::Error { error_name, .. } => {
                assert_eq!(&**error_name, ERROR_UNKNOWN_METHOD);
            }
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[test]
    fn serial_wraps_past_max_skipping_zero() {
        let mut conn = ready_connection();
        conn.next_serial = u32::MAX;

        let path = OwnedObjectPath::new("/").unwrap();
        let first = conn.send(Message::method_call(path.clone(), "Ping", 0)).unwrap();
        let second = conn.send(Message::method_call(path, "Ping", 0)).unwrap();

        assert_eq!(first, u32::MAX);
        assert_eq!(second, 1);
    }

    #[test]
    fn close_settles_pending_replies_with_disconnect() {
        let mut conn = ready_connection();

        let path = OwnedObjectPath::new("/").unwrap();
        let call = Message::method_call(path, "Ping", 0);

        let error = Arc::new(Mutex::new(None));
        let error_clone = error.clone();

        conn.call(
            call,
            |_| panic!("unexpected reply"),
            move |name, desc| *error_clone.lock().unwrap() = Some((name.to_string(), desc.to_string())),
        )
        .unwrap();

        conn.close_with(&Error::new(ErrorKind::Disconnected));

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(error.lock().unwrap().is_some());
    }
}
