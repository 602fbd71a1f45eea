use crate::object_path::OwnedObjectPath;
use crate::protocol::MessageType;

/// The kind-specific required fields of a message (`spec.md` §3: "Required
/// fields by kind").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Method call. May prompt a method-return or error reply.
    MethodCall {
        path: OwnedObjectPath,
        member: Box<str>,
    },
    /// Method reply with returned data.
    MethodReturn { reply_serial: u32 },
    /// Error reply. `error_name` is a well-known error name string.
    Error {
        error_name: Box<str>,
        reply_serial: u32,
    },
    /// Signal emission. Unlike a method call, the interface is mandatory
    /// (`spec.md` §3).
    Signal {
        path: OwnedObjectPath,
        member: Box<str>,
    },
}

impl MessageKind {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }

    pub fn path(&self) -> Option<&OwnedObjectPath> {
        match self {
            MessageKind::MethodCall { path, .. } | MessageKind::Signal { path, .. } => Some(path),
            MessageKind::MethodReturn { .. } | MessageKind::Error { .. } => None,
        }
    }

    pub fn member(&self) -> Option<&str> {
        match self {
            MessageKind::MethodCall { member, .. } | MessageKind::Signal { member, .. } => {
                Some(member)
            }
            MessageKind::MethodReturn { .. } | MessageKind::Error { .. } => None,
        }
    }

    pub fn error_name(&self) -> Option<&str> {
        match self {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    pub fn reply_serial(&self) -> Option<u32> {
        match self {
            MessageKind::MethodReturn { reply_serial } | MessageKind::Error { reply_serial, .. } => {
                Some(*reply_serial)
            }
            _ => None,
        }
    }
}
