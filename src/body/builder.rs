use crate::buf::OwnedBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{Type, MAX_ARRAY_LENGTH, MAX_CONTAINER_DEPTH};
use crate::signature::{OwnedSignature, Signature};

/// An open container on the builder's scope stack.
enum Frame {
    Array {
        /// The element type, reused for every item and restored into
        /// `current` once an item finishes.
        element: OwnedSignature,
        /// What `current` becomes in the parent scope once this array closes.
        outer_after: OwnedSignature,
        /// Offset of the reserved 4-byte length slot, backpatched on close.
        length_offset: usize,
        /// Offset of the first byte after the length slot's element-alignment
        /// padding, i.e. where the array body starts.
        first_element_offset: usize,
    },
    Struct {
        outer_after: OwnedSignature,
    },
    DictEntry {
        outer_after: OwnedSignature,
    },
    Variant {
        outer_after: OwnedSignature,
    },
}

/// Builds a message body by appending values that must conform to a
/// signature declared up front (`spec.md` §4.1).
///
/// The builder is a pushdown automaton: `current` holds the signature still
/// to be satisfied in whichever scope is innermost, and `stack` holds the
/// open containers. Appending a value consumes one complete type off the
/// front of `current`; closing a container restores the parent's `current`.
pub struct Builder {
    buf: OwnedBuf,
    current: OwnedSignature,
    stack: Vec<Frame>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            buf: OwnedBuf::new(),
            current: OwnedSignature::new(),
            stack: Vec::new(),
        }
    }

    /// Declare the signature this builder expects to be filled, starting a
    /// fresh top-level sequence. Only legal before anything has been
    /// appended, or between two already-complete top-level types.
    pub fn set_signature(&mut self, sig: &Signature) -> Result<()> {
        self.ensure_sequential_point()?;
        self.current = sig.to_owned();
        Ok(())
    }

    /// Extend the signature still expected at the current (top-level only)
    /// scope, for callers that build up a signature incrementally.
    pub fn append_signature(&mut self, sig: &Signature) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(Error::new(ErrorKind::ScopeMismatch));
        }

        self.current.push_signature(sig)?;
        Ok(())
    }

    fn ensure_sequential_point(&self) -> Result<()> {
        if !self.stack.is_empty() || !self.current.is_empty() {
            return Err(Error::new(ErrorKind::ScopeMismatch));
        }

        Ok(())
    }

    /// Consume one complete type off the front of `current`, checking it is
    /// exactly `expected` (a single type code, e.g. `y` or `u`).
    fn expect_primitive(&mut self, expected: u8) -> Result<()> {
        let (first, rest) = self.current.split_first_type()?;

        if first.as_bytes() != [expected] {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        self.current = rest.to_owned();
        self.after_value_closed();
        Ok(())
    }

    /// After a complete type has just been written, an array scope repeats
    /// its element type rather than exhausting `current`.
    fn after_value_closed(&mut self) {
        if self.current.is_empty() {
            if let Some(Frame::Array { element, .. }) = self.stack.last() {
                self.current = element.clone();
            }
        }
    }

    fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.stack.len() >= MAX_CONTAINER_DEPTH {
            return Err(Error::new(ErrorKind::ContainerDepthExceeded));
        }

        self.stack.push(frame);
        Ok(())
    }

    pub fn append_u8(&mut self, value: u8) -> Result<()> {
        self.expect_primitive(b'y')?;
        self.buf.extend_from_slice(&[value]);
        Ok(())
    }

    pub fn append_bool(&mut self, value: bool) -> Result<()> {
        self.expect_primitive(b'b')?;
        self.buf.align_to(4);
        self.buf.extend_from_slice(&(value as u32).to_ne_bytes());
        Ok(())
    }

    pub fn append_i16(&mut self, value: i16) -> Result<()> {
        self.expect_primitive(b'n')?;
        self.buf.align_to(2);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_u16(&mut self, value: u16) -> Result<()> {
        self.expect_primitive(b'q')?;
        self.buf.align_to(2);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_i32(&mut self, value: i32) -> Result<()> {
        self.expect_primitive(b'i')?;
        self.buf.align_to(4);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_u32(&mut self, value: u32) -> Result<()> {
        self.expect_primitive(b'u')?;
        self.buf.align_to(4);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_i64(&mut self, value: i64) -> Result<()> {
        self.expect_primitive(b'x')?;
        self.buf.align_to(8);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_u64(&mut self, value: u64) -> Result<()> {
        self.expect_primitive(b't')?;
        self.buf.align_to(8);
        self.buf.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    pub fn append_f64(&mut self, value: f64) -> Result<()> {
        self.expect_primitive(b'd')?;
        self.buf.align_to(8);
        self.buf.extend_from_slice(&value.to_bits().to_ne_bytes());
        Ok(())
    }

    pub fn append_str(&mut self, value: &str) -> Result<()> {
        self.expect_primitive(b's')?;
        self.write_string_body(value)
    }

    /// Object paths share the string's wire format; grammar is validated by
    /// the caller (`crate::object_path`) before the bytes reach here.
    pub fn append_object_path(&mut self, value: &str) -> Result<()> {
        self.expect_primitive(b'o')?;
        self.write_string_body(value)
    }

    fn write_string_body(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::new(ErrorKind::EmbeddedNul));
        }

        let len =
            u32::try_from(value.len()).map_err(|_| Error::new(ErrorKind::StringTooLong))?;

        self.buf.align_to(4);
        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(&[0]);
        Ok(())
    }

    /// A signature used as a *value* (type code `g`), not the builder's own
    /// declared signature. Wire format is a one-byte length, the bytes, NUL.
    pub fn append_signature_value(&mut self, value: &Signature) -> Result<()> {
        self.expect_primitive(b'g')?;

        let len = u8::try_from(value.len()).map_err(|_| Error::new(ErrorKind::StringTooLong))?;
        self.buf.extend_from_slice(&[len]);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(&[0]);
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;

        if first.as_bytes().first() != Some(&b'a') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let element = unsafe { Signature::new_unchecked(&first.as_bytes()[1..]) }.to_owned();

        self.buf.align_to(4);
        let length_offset = self.buf.len();
        self.buf.extend_from_slice(&0u32.to_ne_bytes());

        let element_alignment = Type(*element.as_bytes().first().unwrap_or(&0)).alignment();
        self.buf.align_to(element_alignment);
        let first_element_offset = self.buf.len();

        self.push_frame(Frame::Array {
            element: element.clone(),
            outer_after: after.to_owned(),
            length_offset,
            first_element_offset,
        })?;

        self.current = element;
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        let frame = self.stack.pop().ok_or_else(|| Error::new(ErrorKind::ScopeMismatch))?;

        let Frame::Array {
            outer_after,
            length_offset,
            first_element_offset,
            ..
        } = frame
        else {
            return Err(Error::new(ErrorKind::ScopeMismatch));
        };

        let body_len = u32::try_from(self.buf.len() - first_element_offset)
            .map_err(|_| Error::new(ErrorKind::ArrayTooLong(u32::MAX)))?;

        if body_len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(body_len)));
        }

        self.buf.patch_u32(length_offset, body_len);
        self.current = outer_after;
        self.after_value_closed();
        Ok(())
    }

    pub fn begin_struct(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;
        let bytes = first.as_bytes();

        if bytes.first() != Some(&b'(') || bytes.last() != Some(&b')') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let inner = unsafe { Signature::new_unchecked(&bytes[1..bytes.len() - 1]) }.to_owned();

        self.buf.align_to(8);
        self.push_frame(Frame::Struct {
            outer_after: after.to_owned(),
        })?;
        self.current = inner;
        Ok(())
    }

    pub fn end_struct(&mut self) -> Result<()> {
        if !self.current.is_empty() {
            return Err(Error::new(ErrorKind::ScopeNotEmpty));
        }

        match self.stack.pop() {
            Some(Frame::Struct { outer_after }) => {
                self.current = outer_after;
                self.after_value_closed();
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::ScopeMismatch)),
        }
    }

    pub fn begin_dict_entry(&mut self) -> Result<()> {
        if !matches!(self.stack.last(), Some(Frame::Array { .. })) {
            return Err(Error::new(ErrorKind::DictEntryNotInArray));
        }

        let (first, after) = self.current.split_first_type()?;
        let bytes = first.as_bytes();

        if bytes.first() != Some(&b'{') || bytes.last() != Some(&b'}') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let inner = unsafe { Signature::new_unchecked(&bytes[1..bytes.len() - 1]) }.to_owned();

        self.buf.align_to(8);
        self.push_frame(Frame::DictEntry {
            outer_after: after.to_owned(),
        })?;
        self.current = inner;
        Ok(())
    }

    pub fn end_dict_entry(&mut self) -> Result<()> {
        if !self.current.is_empty() {
            return Err(Error::new(ErrorKind::ScopeNotEmpty));
        }

        match self.stack.pop() {
            Some(Frame::DictEntry { outer_after }) => {
                self.current = outer_after;
                self.after_value_closed();
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::ScopeMismatch)),
        }
    }

    pub fn begin_variant(&mut self, inner: &Signature) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;

        if first.as_bytes() != [b'v'] {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        inner.validate_single()?;

        let len = u8::try_from(inner.len()).map_err(|_| Error::new(ErrorKind::StringTooLong))?;
        self.buf.extend_from_slice(&[len]);
        self.buf.extend_from_slice(inner.as_bytes());
        self.buf.extend_from_slice(&[0]);

        self.push_frame(Frame::Variant {
            outer_after: after.to_owned(),
        })?;
        self.current = inner.to_owned();
        Ok(())
    }

    pub fn end_variant(&mut self) -> Result<()> {
        if !self.current.is_empty() {
            return Err(Error::new(ErrorKind::ScopeNotEmpty));
        }

        match self.stack.pop() {
            Some(Frame::Variant { outer_after }) => {
                self.current = outer_after;
                self.after_value_closed();
                Ok(())
            }
            _ => Err(Error::new(ErrorKind::ScopeMismatch)),
        }
    }

    /// Finish building, returning the accumulated bytes. Errors if any
    /// container is still open or the declared signature was not fully
    /// satisfied.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() || !self.current.is_empty() {
            return Err(Error::new(ErrorKind::ScopeNotEmpty));
        }

        Ok(self.buf.into_vec())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Write bytes directly, bypassing signature tracking. Used by the
    /// message layer to lay down the fixed 12-byte header before the
    /// signature-driven header-field array and body, so that every
    /// subsequent alignment call is relative to the true start of the
    /// message rather than this buffer's own start.
    ///
    /// Only legal before anything has been declared or between complete
    /// top-level types, same as [`Builder::set_signature`].
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_sequential_point()?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Zero-pad to `align` directly, bypassing signature tracking. Used by
    /// the message layer for the pad between the header-field array and the
    /// body (`spec.md` §3).
    pub fn align_raw(&mut self, align: usize) -> Result<()> {
        self.ensure_sequential_point()?;
        self.buf.align_to(align);
        Ok(())
    }

    /// Backpatch a `u32` written earlier via [`Builder::write_raw`]. Used by
    /// the message layer to fill in the body-length header field once the
    /// body has been fully built.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf.patch_u32(offset, value);
    }
}
