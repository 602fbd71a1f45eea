use super::padding_to;

/// A growable write buffer.
///
/// Used both as the codec's body-builder output and as the connection
/// multiplexer's receive accumulator. Alignment is tracked relative to the
/// buffer's own length, which is valid for message bodies because the fixed
/// header and header-field array are always padded to an 8-byte boundary
/// before the body begins (`spec.md` §3) — every alignment this crate deals
/// with divides 8.
#[derive(Debug, Default, Clone)]
pub(crate) struct OwnedBuf {
    data: Vec<u8>,
}

impl OwnedBuf {
    pub(crate) const fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub(crate) fn get(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Pad the buffer with zero bytes up to the next multiple of `align`.
    pub(crate) fn align_to(&mut self, align: usize) {
        let pad = padding_to(self.data.len(), align);
        self.data.resize(self.data.len() + pad, 0);
    }

    /// Remove the first `n` bytes, shifting the remainder down.
    ///
    /// Used by the send path to drop bytes the transport has accepted, and
    /// by the receive path to drop a fully-dispatched message.
    pub(crate) fn advance(&mut self, n: usize) {
        self.data.drain(..n);
    }

    pub(crate) fn as_vec(&self) -> &Vec<u8> {
        &self.data
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Write a `u32` in native byte order at `offset`, backpatching a
    /// previously reserved length slot (`spec.md` §4.1: array length
    /// backpatch on `end_array`).
    pub(crate) fn patch_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }
}
