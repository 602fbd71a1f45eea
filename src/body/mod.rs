//! The message body codec: a builder that appends values following a
//! declared signature, and an iterator that reads them back out.
//!
//! Both sides are pushdown automata over the signature grammar (`spec.md`
//! §4.1, §4.2): a small stack of open containers (array, struct, dict entry,
//! variant), bounded to [`crate::protocol::MAX_CONTAINER_DEPTH`], plus a
//! "remaining signature" cursor for whichever scope is innermost.

pub use self::builder::Builder;
mod builder;

pub use self::iter::Iter;
mod iter;

pub(crate) use self::flip::{flip_in_place, flip_in_place_from};
mod flip;

#[cfg(test)]
mod tests;
