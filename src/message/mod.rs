//! Messages: typed header fields plus a signature-described body
//! (`spec.md` §3, §4.5).

pub use self::kind::MessageKind;
mod kind;

pub use self::message::Message;
mod message;

pub(crate) use self::header::{decode, encode, peek, Peeked};
mod header;

#[cfg(test)]
mod tests;
