//! The three registration tables the multiplexer dispatches against:
//! replies (outgoing serial → handler), matches (predicate → handler), and
//! binds (object path + interface → method handlers) (`spec.md` §2, §4.4).

use std::collections::HashMap;

use crate::message::Message;
use crate::object_path::OwnedObjectPath;
use crate::protocol::MessageType;

/// The outcome a method-call handler may report instead of a reply message.
pub enum HandlerError {
    /// A named application error, sent back as an `error` message verbatim.
    Named { name: Box<str>, message: Box<str> },
    /// The convenience path: the multiplexer converts this into a stock
    /// `InvalidArgs` error reply so handlers don't duplicate argument-shape
    /// validation (`spec.md` §4.4 "Argument-error convenience").
    InvalidArgs,
}

pub(crate) type MethodHandler = Box<dyn FnMut(&Message) -> Result<Message, HandlerError> + Send>;
/// A signal handler. Returning `true` unregisters the match after this call
/// (`spec.md` §5's reentrant self-removal).
pub(crate) type SignalHandler = Box<dyn FnMut(&Message) -> bool + Send>;
pub(crate) type ReplyHandler = Box<dyn FnOnce(&Message) + Send>;
/// `(error_name, description)`. `description` is the error reply's first
/// string argument when one arrived, or a synthesized explanation when the
/// connection tore down before a reply came (`spec.md` §7).
pub(crate) type ErrorHandler = Box<dyn FnOnce(&str, &str) + Send>;

/// A one-shot success/error pair registered under an outgoing serial
/// (`spec.md` §2: "replies (outgoing serial → reply/error handlers)").
pub(crate) struct ReplyEntry {
    pub(crate) on_reply: ReplyHandler,
    pub(crate) on_error: ErrorHandler,
}

/// Outgoing-serial → reply-handler table. Entries are removed the moment
/// they fire (`spec.md` §3: "removing the registration is idempotent").
#[derive(Default)]
pub(crate) struct ReplyTable {
    entries: HashMap<u32, ReplyEntry>,
}

impl ReplyTable {
    pub(crate) fn insert(&mut self, serial: u32, entry: ReplyEntry) {
        self.entries.insert(serial, entry);
    }

    /// Remove and return the registration for `serial`, if any. A no-op if
    /// it has already fired or was never registered (`spec.md` §8).
    pub(crate) fn remove(&mut self, serial: u32) -> Option<ReplyEntry> {
        self.entries.remove(&serial)
    }

    pub(crate) fn contains(&self, serial: u32) -> bool {
        self.entries.contains_key(&serial)
    }

    /// Drain every pending registration, invoking each `on_error` with a
    /// synthesized disconnect error (`spec.md` §4.4: "closed: all pending
    /// reply registrations are invoked with a synthesized local error").
    pub(crate) fn drain_with_disconnect(&mut self, description: &str) {
        for (_, entry) in self.entries.drain() {
            (entry.on_error)("disconnected", description);
        }
    }
}

/// A signal filter (`spec.md` §4.4 "Dispatch — signal", §6 "Match rule
/// grammar"). Every set field must equal the corresponding value on an
/// incoming message for the rule to fire.
#[derive(Default, Clone)]
pub struct MatchRule {
    message_type: Option<MessageType>,
    sender: Option<Box<str>>,
    destination: Option<Box<str>>,
    interface: Option<Box<str>>,
    path: Option<Box<str>>,
    member: Option<Box<str>>,
    error_name: Option<Box<str>>,
    args: Vec<(usize, Box<str>)>,
}

impl MatchRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<Box<str>>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<Box<str>>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<Box<str>>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<Box<str>>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_member(mut self, member: impl Into<Box<str>>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn with_error_name(mut self, error_name: impl Into<Box<str>>) -> Self {
        self.error_name = Some(error_name.into());
        self
    }

    pub fn with_arg(mut self, index: usize, value: impl Into<Box<str>>) -> Self {
        self.args.push((index, value.into()));
        self
    }

    /// Does every filter set on this rule equal the corresponding field (or
    /// argument) of `message`?
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(message_type) = self.message_type {
            if message_type != message.kind().message_type() {
                return false;
            }
        }

        if let Some(sender) = &self.sender {
            if message.sender() != Some(&**sender) {
                return false;
            }
        }

        if let Some(destination) = &self.destination {
            if message.destination() != Some(&**destination) {
                return false;
            }
        }

        if let Some(interface) = &self.interface {
            if message.interface() != Some(&**interface) {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if message.kind().path().map(|p| p.as_str()) != Some(&**path) {
                return false;
            }
        }

        if let Some(member) = &self.member {
            if message.kind().member() != Some(&**member) {
                return false;
            }
        }

        if let Some(error_name) = &self.error_name {
            if message.kind().error_name() != Some(&**error_name) {
                return false;
            }
        }

        for (index, expected) in &self.args {
            if string_arg(message, *index).as_deref() != Some(&**expected) {
                return false;
            }
        }

        true
    }

    /// Serialize to the `AddMatch`/`RemoveMatch` call form: comma-separated
    /// `key='value'` pairs, value-internal quotes and backslashes escaped
    /// (`spec.md` §6).
    pub fn to_match_string(&self) -> String {
        let mut parts = Vec::new();

        if let Some(message_type) = self.message_type {
            parts.push(format!("type='{}'", escape(message_type_name(message_type))));
        }

        if let Some(sender) = &self.sender {
            parts.push(format!("sender='{}'", escape(sender)));
        }

        if let Some(destination) = &self.destination {
            parts.push(format!("destination='{}'", escape(destination)));
        }

        if let Some(interface) = &self.interface {
            parts.push(format!("interface='{}'", escape(interface)));
        }

        if let Some(path) = &self.path {
            parts.push(format!("path='{}'", escape(path)));
        }

        if let Some(member) = &self.member {
            parts.push(format!("member='{}'", escape(member)));
        }

        for (index, value) in &self.args {
            parts.push(format!("arg{index}='{}'", escape(value)));
        }

        parts.join(",")
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());

    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }

        out.push(c);
    }

    out
}

fn message_type_name(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::METHOD_CALL => "method_call",
        MessageType::METHOD_RETURN => "method_return",
        MessageType::ERROR => "error",
        MessageType::SIGNAL => "signal",
        _ => "invalid",
    }
}

/// Read the string-family argument at top-level index `index` out of
/// `message`'s body, if any (`spec.md` §4.4: "per-argument string-equality
/// filters at indices 0..n").
fn string_arg(message: &Message, index: usize) -> Option<String> {
    let mut iter = message.iter_body();
    let mut sig = message.signature();
    let mut i = 0;

    loop {
        if iter.is_done() {
            return None;
        }

        let (first, rest) = sig.split_first_type().ok()?;

        let value = match first.as_str() {
            "s" => Some(iter.next_str().ok()?.to_owned()),
            "o" => Some(iter.next_object_path().ok()?.to_owned()),
            "g" => Some(iter.next_signature_value().ok()?.as_str().to_owned()),
            _ => {
                iter.skip_value().ok()?;
                None
            }
        };

        if i == index {
            return value;
        }

        sig = rest;
        i += 1;
    }
}

struct MatchEntry {
    id: u64,
    rule: MatchRule,
    handler: SignalHandler,
}

/// Signal filter → handler registrations.
///
/// Dispatch snapshots the matching ids before invoking any handler, then
/// looks each one up fresh for its turn — an entry another handler removed
/// in the meantime is simply skipped rather than causing a stale borrow
/// (`spec.md` §5: "a handler invoked during dispatch may register,
/// unregister, or remove itself").
#[derive(Default)]
pub(crate) struct MatchTable {
    entries: Vec<MatchEntry>,
    next_id: u64,
}

impl MatchTable {
    pub(crate) fn insert(&mut self, rule: MatchRule, handler: SignalHandler) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(MatchEntry { id, rule, handler });
        id
    }

    /// Remove the registration for `id`. A no-op if it's already gone.
    pub(crate) fn remove(&mut self, id: u64) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// Invoke every matching handler for `message`. A handler returns `true`
    /// to unregister itself once this call returns (`spec.md` §5's
    /// reentrant self-removal) — the only mutation a [`SignalHandler`] can
    /// make to the table, since it isn't handed a reference to it.
    pub(crate) fn dispatch(&mut self, message: &Message) {
        let ids: Vec<u64> = self
            .entries
            .iter()
            .filter(|entry| entry.rule.matches(message))
            .map(|entry| entry.id)
            .collect();

        let mut to_remove = Vec::new();

        for id in ids {
            let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
                continue;
            };

            if (entry.handler)(message) {
                to_remove.push(id);
            }
        }

        if !to_remove.is_empty() {
            self.entries.retain(|entry| !to_remove.contains(&entry.id));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

struct Bind {
    interface: Option<Box<str>>,
    methods: HashMap<Box<str>, MethodHandler>,
}

/// Why [`BindTable::find`] failed, so the caller can reply with the most
/// specific of `UnknownObject`/`UnknownInterface`/`UnknownMethod` instead of
/// a single catch-all error (`spec.md` §6 supplemented features).
pub(crate) enum BindMiss {
    /// No bind is registered for the path at all.
    UnknownObject,
    /// The path is known, but not under the message's `INTERFACE` header.
    UnknownInterface,
    /// The path (and interface, if any) is known, but not this member.
    UnknownMethod,
}

/// Object-path → interface-scoped method handlers (`spec.md` §2: "binds
/// (object-path + interface → handler)").
#[derive(Default)]
pub(crate) struct BindTable {
    paths: HashMap<OwnedObjectPath, Vec<Bind>>,
}

impl BindTable {
    /// Register `member` on `path`/`interface`. `interface = None` matches
    /// any incoming message whose own `INTERFACE` header is absent
    /// (`spec.md` §4.4: "if the header is absent, for each bind in path
    /// order").
    pub(crate) fn insert(
        &mut self,
        path: OwnedObjectPath,
        interface: Option<Box<str>>,
        member: impl Into<Box<str>>,
        handler: MethodHandler,
    ) {
        let binds = self.paths.entry(path).or_default();

        let bind = match binds.iter_mut().find(|b| b.interface == interface) {
            Some(bind) => bind,
            None => {
                binds.push(Bind {
                    interface,
                    methods: HashMap::new(),
                });
                binds.last_mut().unwrap()
            }
        };

        bind.methods.insert(member.into(), handler);
    }

    pub(crate) fn remove(&mut self, path: &OwnedObjectPath, interface: Option<&str>, member: &str) {
        if let Some(binds) = self.paths.get_mut(path) {
            binds.retain_mut(|bind| {
                if bind.interface.as_deref() == interface {
                    bind.methods.remove(member);
                }

                !bind.methods.is_empty()
            });

            if binds.is_empty() {
                self.paths.remove(path);
            }
        }
    }

    /// Find the handler for an incoming method-call's path/interface/member,
    /// per `spec.md` §4.4's bind lookup rule. Distinguishes why the lookup
    /// failed so the caller can reply with the most specific well-known
    /// error name available.
    pub(crate) fn find(
        &mut self,
        path: &OwnedObjectPath,
        interface: Option<&str>,
        member: &str,
    ) -> Result<&mut MethodHandler, BindMiss> {
        let Some(binds) = self.paths.get_mut(path) else {
            return Err(BindMiss::UnknownObject);
        };

        let interface_known = interface.is_none()
            || binds
                .iter()
                .any(|bind| bind.interface.as_deref() == interface);

        if !interface_known {
            return Err(BindMiss::UnknownInterface);
        }

        for bind in binds {
            let eligible = match interface {
                Some(interface) => bind.interface.as_deref() == Some(interface),
                None => true,
            };

            if eligible {
                if let Some(handler) = bind.methods.get_mut(member) {
                    return Ok(handler);
                }
            }
        }

        Err(BindMiss::UnknownMethod)
    }

    pub(crate) fn clear(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;

    fn signal(path: &str, interface: &str, member: &str, arg0: Option<&str>) -> Message {
        let message = Message::signal(OwnedObjectPath::new(path).unwrap(), member, 1)
            .with_interface(interface);

        match arg0 {
            Some(value) => message
                .build_body(Signature::new_const("s"), |b| b.append_str(value))
                .unwrap(),
            None => message,
        }
    }

    #[test]
    fn match_rule_requires_every_set_filter() {
        let rule = MatchRule::new()
            .with_interface("com.example.Clock")
            .with_member("Tick");

        assert!(rule.matches(&signal("/", "com.example.Clock", "Tick", None)));
        assert!(!rule.matches(&signal("/", "com.example.Other", "Tick", None)));
        assert!(!rule.matches(&signal("/", "com.example.Clock", "Tock", None)));
    }

    #[test]
    fn match_rule_checks_arg0() {
        let rule = MatchRule::new().with_arg(0, "hello");

        assert!(rule.matches(&signal("/", "com.example.Clock", "Tick", Some("hello"))));
        assert!(!rule.matches(&signal("/", "com.example.Clock", "Tick", Some("goodbye"))));
        assert!(!rule.matches(&signal("/", "com.example.Clock", "Tick", None)));
    }

    #[test]
    fn to_match_string_escapes_quotes() {
        let rule = MatchRule::new().with_member("it's");
        assert_eq!(rule.to_match_string(), r"member='it\'s'");
    }

    #[test]
    fn handler_returning_true_unregisters_itself() {
        let mut table = MatchTable::default();
        let rule = MatchRule::new().with_member("Tick");

        let calls = std::cell::Cell::new(0);
        table.insert(
            rule,
            Box::new(move |_msg| {
                calls.set(calls.get() + 1);
                true
            }),
        );

        let message = signal("/", "com.example.Clock", "Tick", None);
        table.dispatch(&message);
        assert_eq!(table.entries.len(), 0);

        // The match is gone, so a second dispatch does not fire it again.
        table.dispatch(&message);
    }

    #[test]
    fn self_unregistering_handler_does_not_disturb_the_rest_of_the_pass() {
        let mut table = MatchTable::default();
        let rule = MatchRule::new().with_member("Tick");

        // The first handler unregisters itself; the second must still fire
        // in this same dispatch pass (removal is deferred to the pass's end).
        let second_fired = std::rc::Rc::new(std::cell::Cell::new(false));
        let second_fired_clone = second_fired.clone();

        table.insert(rule.clone(), Box::new(|_msg| true));
        table.insert(
            rule,
            Box::new(move |_msg| {
                second_fired_clone.set(true);
                false
            }),
        );

        let message = signal("/", "com.example.Clock", "Tick", None);
        table.dispatch(&message);

        assert!(second_fired.get());
        assert_eq!(table.entries.len(), 1);
    }

    #[test]
    fn bind_table_finds_interface_then_falls_back_to_none() {
        let mut table = BindTable::default();
        let path = OwnedObjectPath::new("/demo").unwrap();

        table.insert(
            path.clone(),
            None,
            "Ping",
            Box::new(|_| Ok(Message::signal(OwnedObjectPath::new("/").unwrap(), "x", 1))),
        );

        assert!(table.find(&path, Some("com.example.Demo"), "Ping").is_ok());
        assert!(table.find(&path, None, "Ping").is_ok());
        assert!(matches!(
            table.find(&path, Some("com.example.Demo"), "Pong"),
            Err(BindMiss::UnknownMethod)
        ));
    }

    #[test]
    fn bind_table_remove_drops_empty_path_entry() {
        let mut table = BindTable::default();
        let path = OwnedObjectPath::new("/demo").unwrap();

        table.insert(
            path.clone(),
            None,
            "Ping",
            Box::new(|_| Ok(Message::signal(OwnedObjectPath::new("/").unwrap(), "x", 1))),
        );

        table.remove(&path, None, "Ping");
        assert!(matches!(
            table.find(&path, None, "Ping"),
            Err(BindMiss::UnknownMethod)
        ));
    }

    #[test]
    fn bind_table_distinguishes_unknown_object_from_unknown_interface() {
        let mut table = BindTable::default();
        let path = OwnedObjectPath::new("/demo").unwrap();

        assert!(matches!(
            table.find(&path, Some("com.example.Demo"), "Ping"),
            Err(BindMiss::UnknownObject)
        ));

        table.insert(
            path.clone(),
            Some("com.example.Demo".into()),
            "Ping",
            Box::new(|_| Ok(Message::signal(OwnedObjectPath::new("/").unwrap(), "x", 1))),
        );

        assert!(matches!(
            table.find(&path, Some("com.example.Other"), "Ping"),
            Err(BindMiss::UnknownInterface)
        ));
    }
}
