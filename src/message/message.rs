use crate::body::{Builder, Iter};
use crate::error::{Error, ErrorKind, Result};
use crate::message::kind::MessageKind;
use crate::object_path::OwnedObjectPath;
use crate::protocol::Flags;
use crate::signature::{OwnedSignature, Signature};

/// An in-memory D-Bus message: typed header fields, a signature, and an
/// argument payload (`spec.md` §3, §4.5).
///
/// This is the unit of exchange between the codec and the connection
/// multiplexer: messages are built via the constructors and `with_*`
/// setters below, turned into bytes by [`super::header::encode`], and
/// produced from bytes by [`super::header::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    serial: u32,
    flags: Flags,
    interface: Option<Box<str>>,
    destination: Option<Box<str>>,
    sender: Option<Box<str>>,
    signature: OwnedSignature,
    body: Vec<u8>,
}

impl Message {
    fn new(kind: MessageKind, serial: u32) -> Self {
        Self {
            kind,
            serial,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            signature: OwnedSignature::new(),
            body: Vec::new(),
        }
    }

    pub fn method_call(path: OwnedObjectPath, member: impl Into<Box<str>>, serial: u32) -> Self {
        Self::new(
            MessageKind::MethodCall {
                path,
                member: member.into(),
            },
            serial,
        )
    }

    pub fn method_return(&self, serial: u32) -> Self {
        let mut m = Self::new(
            MessageKind::MethodReturn {
                reply_serial: self.serial,
            },
            serial,
        );
        m.destination = self.sender.clone();
        m.sender = self.destination.clone();
        m
    }

    pub fn error(&self, error_name: impl Into<Box<str>>, serial: u32) -> Self {
        let mut m = Self::new(
            MessageKind::Error {
                error_name: error_name.into(),
                reply_serial: self.serial,
            },
            serial,
        );
        m.destination = self.sender.clone();
        m.sender = self.destination.clone();
        m
    }

    pub fn signal(path: OwnedObjectPath, member: impl Into<Box<str>>, serial: u32) -> Self {
        Self::new(
            MessageKind::Signal {
                path,
                member: member.into(),
            },
            serial,
        )
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn with_interface(mut self, interface: impl Into<Box<str>>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn with_destination(mut self, destination: impl Into<Box<str>>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn with_sender(mut self, sender: impl Into<Box<str>>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Append arguments to the message's body under `signature`, using the
    /// codec's builder (`spec.md` §4.5's "append arguments" operation).
    pub fn build_body<F>(mut self, signature: &Signature, build: F) -> Result<Self>
    where
        F: FnOnce(&mut Builder) -> Result<()>,
    {
        let mut builder = Builder::new();
        builder.set_signature(signature)?;
        build(&mut builder)?;
        self.body = builder.finish()?;
        self.signature = signature.to_owned();
        Ok(self)
    }

    /// Iterate the message's body using the codec's iterator (`spec.md`
    /// §4.5's "iterate arguments" operation). The message's own signature is
    /// the single source of truth for what the iterator expects.
    pub fn iter_body(&self) -> Iter<'_> {
        Iter::new(&self.body, &self.signature)
    }

    /// Assemble a message from its already-validated parts. Used by
    /// [`super::header::decode`], which has no access to `Message`'s private
    /// fields from a sibling module.
    pub fn from_parts(
        kind: MessageKind,
        serial: u32,
        flags: Flags,
        interface: Option<Box<str>>,
        destination: Option<Box<str>>,
        sender: Option<Box<str>>,
        signature: OwnedSignature,
        body: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            serial,
            flags,
            interface,
            destination,
            sender,
            signature,
            body,
        }
    }

    /// Validate the kind-dependent required header fields (`spec.md` §3).
    pub fn validate_required(&self) -> Result<()> {
        match &self.kind {
            MessageKind::MethodCall { .. } => {}
            MessageKind::MethodReturn { .. } => {}
            MessageKind::Error { .. } => {}
            MessageKind::Signal { .. } => {
                if self.interface.is_none() {
                    return Err(Error::new(ErrorKind::MissingInterface));
                }
            }
        }

        Ok(())
    }
}
