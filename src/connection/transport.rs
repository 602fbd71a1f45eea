use crate::error::Result;

/// Modes for [`Transport::block`] (`spec.md` §4.4 "Blocking primitive").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    WaitForConnected,
    Block,
    Unblock,
}

/// Outcome of a suspended `block(Block)` call: did the handle get signalled,
/// was it released by `unblock()` first, or did it time out (`spec.md` §5)?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Signalled,
    Unblocked,
    TimedOut,
}

/// An opaque wait handle passed to [`Transport::block`]; the integration
/// layer decides how a caller holding one is suspended and woken.
pub type Handle = u64;

/// The byte-stream and suspension callbacks the core is built on top of
/// (`spec.md` §6: "the core declares a threading contract, not an
/// implementation"). Socket transports, event-loop integration, and
/// cross-thread proxying are out of scope (`spec.md` §1); this trait is the
/// seam they plug into.
pub trait Transport {
    /// Read into `buf`, returning the number of bytes read. `Ok(0)` means
    /// the peer closed the stream.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf`, returning the number of bytes accepted. A transport may
    /// accept fewer than `buf.len()` bytes; the caller retries the rest.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;

    /// Suspend the calling thread per `mode` (`spec.md` §4.4 "Blocking
    /// primitive"). `handle` names the wait; for `Unblock`, `handle` is the
    /// handle to release rather than wait on.
    fn block(&mut self, mode: BlockMode, handle: Handle, timeout_ms: Option<u64>)
        -> Result<BlockOutcome>;

    /// Does the calling thread already own this connection? A transport
    /// that never runs the connection across threads can leave this at the
    /// default (`spec.md` §6's threading contract is optional).
    fn should_proxy(&self) -> bool {
        false
    }
}
