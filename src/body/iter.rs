use crate::buf::ReadBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{Type, MAX_ARRAY_LENGTH, MAX_CONTAINER_DEPTH};
use crate::signature::{OwnedSignature, Signature};

enum Frame {
    Array {
        element: OwnedSignature,
        outer_after: OwnedSignature,
        end_offset: usize,
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

/// Reads a message body back out, following the same signature the sender
/// declared (`spec.md` §4.2). Mirrors [`super::Builder`]'s scope stack.
///
/// The buffer handed to an `Iter` must already be in native byte order; the
/// connection multiplexer flips non-native messages once, in full, right
/// after parsing the header (`spec.md` §4.4 step 5), so this code never has
/// to branch on endianness.
pub struct Iter<'a> {
    data: ReadBuf<'a>,
    current: OwnedSignature,
    stack: Vec<Frame>,
}

impl<'a> Iter<'a> {
    pub fn new(data: &'a [u8], sig: &Signature) -> Self {
        Self {
            data: ReadBuf::new(data),
            current: sig.to_owned(),
            stack: Vec::new(),
        }
    }

    /// Construct an iterator starting `start` bytes into `data`, tracking
    /// alignment relative to `data`'s start rather than the cursor's.
    ///
    /// Needed for the header-field array, which does not begin at an
    /// 8-aligned offset from the start of the buffer it's embedded in (it
    /// follows the 12-byte fixed header) but whose element alignment must
    /// still be computed relative to the true start of the message
    /// (`spec.md` §3).
    pub fn new_at(data: &'a [u8], start: usize, sig: &Signature) -> Result<Self> {
        let mut read = ReadBuf::new(data);
        read.advance(start)?;
        Ok(Self {
            data: read,
            current: sig.to_owned(),
            stack: Vec::new(),
        })
    }

    /// True once every declared type has been read and every container
    /// closed.
    pub fn is_done(&self) -> bool {
        self.stack.is_empty() && self.current.is_empty()
    }

    /// Current absolute read position in the buffer passed to [`Iter::new`]
    /// or [`Iter::new_at`].
    pub fn pos(&self) -> usize {
        self.data.pos()
    }

    fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.stack.len() >= MAX_CONTAINER_DEPTH {
            return Err(Error::new(ErrorKind::ContainerDepthExceeded));
        }

        self.stack.push(frame);
        Ok(())
    }

    fn after_value_closed(&mut self) {
        if self.current.is_empty() {
            if let Some(Frame::Array { element, .. }) = self.stack.last() {
                self.current = element.clone();
            }
        }
    }

    fn expect_primitive(&mut self, expected: u8) -> Result<()> {
        let (first, rest) = self.current.split_first_type()?;

        if first.as_bytes() != [expected] {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        self.current = rest.to_owned();
        Ok(())
    }

    pub fn next_u8(&mut self) -> Result<u8> {
        self.expect_primitive(b'y')?;
        let value = self.data.take(1)?[0];
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_bool(&mut self) -> Result<bool> {
        self.expect_primitive(b'b')?;
        self.data.align_to(4)?;
        let raw = u32::from_ne_bytes(self.data.take_array::<4>()?);
        let value = match raw {
            0 => false,
            1 => true,
            other => return Err(Error::new(ErrorKind::InvalidBooleanValue(other))),
        };
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_i16(&mut self) -> Result<i16> {
        self.expect_primitive(b'n')?;
        self.data.align_to(2)?;
        let value = i16::from_ne_bytes(self.data.take_array::<2>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_u16(&mut self) -> Result<u16> {
        self.expect_primitive(b'q')?;
        self.data.align_to(2)?;
        let value = u16::from_ne_bytes(self.data.take_array::<2>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_i32(&mut self) -> Result<i32> {
        self.expect_primitive(b'i')?;
        self.data.align_to(4)?;
        let value = i32::from_ne_bytes(self.data.take_array::<4>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_u32(&mut self) -> Result<u32> {
        self.expect_primitive(b'u')?;
        self.data.align_to(4)?;
        let value = u32::from_ne_bytes(self.data.take_array::<4>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_i64(&mut self) -> Result<i64> {
        self.expect_primitive(b'x')?;
        self.data.align_to(8)?;
        let value = i64::from_ne_bytes(self.data.take_array::<8>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_u64(&mut self) -> Result<u64> {
        self.expect_primitive(b't')?;
        self.data.align_to(8)?;
        let value = u64::from_ne_bytes(self.data.take_array::<8>()?);
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_f64(&mut self) -> Result<f64> {
        self.expect_primitive(b'd')?;
        self.data.align_to(8)?;
        let value = f64::from_bits(u64::from_ne_bytes(self.data.take_array::<8>()?));
        self.after_value_closed();
        Ok(value)
    }

    fn read_string_body(&mut self) -> Result<&'a str> {
        self.data.align_to(4)?;
        let len = u32::from_ne_bytes(self.data.take_array::<4>()?) as usize;
        let bytes = self.data.take(len)?;
        let nul = self.data.take(1)?;

        if nul != [0] {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        std::str::from_utf8(bytes).map_err(Error::from)
    }

    pub fn next_str(&mut self) -> Result<&'a str> {
        self.expect_primitive(b's')?;
        let value = self.read_string_body()?;
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_object_path(&mut self) -> Result<&'a str> {
        self.expect_primitive(b'o')?;
        let value = self.read_string_body()?;
        crate::object_path::ObjectPath::new(value)?;
        self.after_value_closed();
        Ok(value)
    }

    pub fn next_signature_value(&mut self) -> Result<&'a Signature> {
        self.expect_primitive(b'g')?;
        let len = self.data.take(1)?[0] as usize;
        let bytes = self.data.take(len)?;
        let nul = self.data.take(1)?;

        if nul != [0] {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        let sig = Signature::new(bytes)?;
        self.after_value_closed();
        Ok(sig)
    }

    pub fn enter_array(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;
        let bytes = first.as_bytes();

        if bytes.first() != Some(&b'a') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let element = unsafe { Signature::new_unchecked(&bytes[1..]) }.to_owned();

        self.data.align_to(4)?;
        let len = u32::from_ne_bytes(self.data.take_array::<4>()?);

        if len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        let element_alignment = Type(*element.as_bytes().first().unwrap_or(&0)).alignment();
        self.data.align_to(element_alignment)?;
        let end_offset = self.data.pos() + len as usize;

        self.push_frame(Frame::Array {
            element: element.clone(),
            outer_after: after.to_owned(),
            end_offset,
        })?;
        self.current = element;
        Ok(())
    }

    /// Whether another element remains to be read in the innermost array.
    pub fn in_array(&self) -> bool {
        match self.stack.last() {
            Some(Frame::Array { end_offset, .. }) => self.data.pos() < *end_offset,
            _ => false,
        }
    }

    pub fn exit_array(&mut self) -> Result<()> {
        match self.stack.last() {
            Some(Frame::Array { end_offset, .. }) if self.data.pos() != *end_offset => {
                return Err(Error::new(ErrorKind::ScopeNotEmpty));
            }
            Some(Frame::Array { .. }) => {}
            _ => return Err(Error::new(ErrorKind::ScopeMismatch)),
        }

        let Some(Frame::Array { outer_after, .. }) = self.stack.pop() else {
            unreachable!("checked above");
        };

        self.current = outer_after;
        self.after_value_closed();
        Ok(())
    }

    pub fn enter_struct(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;
        let bytes = first.as_bytes();

        if bytes.first() != Some(&b'(') || bytes.last() != Some(&b')') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let inner = unsafe { Signature::new_unchecked(&bytes[1..bytes.len() - 1]) }.to_owned();

        self.data.align_to(8)?;
        self.push_frame(Frame::Struct {
            outer_after: after.to_owned(),
        })?;
        self.current = inner;
        Ok(())
    }

    pub fn exit_struct(&mut self) -> Result<()> {
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

    pub fn enter_dict_entry(&mut self) -> Result<()> {
        if !matches!(self.stack.last(), Some(Frame::Array { .. })) {
            return Err(Error::new(ErrorKind::DictEntryNotInArray));
        }

        let (first, after) = self.current.split_first_type()?;
        let bytes = first.as_bytes();

        if bytes.first() != Some(&b'{') || bytes.last() != Some(&b'}') {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let inner = unsafe { Signature::new_unchecked(&bytes[1..bytes.len() - 1]) }.to_owned();

        self.data.align_to(8)?;
        self.push_frame(Frame::DictEntry {
            outer_after: after.to_owned(),
        })?;
        self.current = inner;
        Ok(())
    }

    pub fn exit_dict_entry(&mut self) -> Result<()> {
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

    pub fn enter_variant(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;

        if first.as_bytes() != [b'v'] {
            return Err(Error::new(ErrorKind::TypeMismatch));
        }

        let sig_len = self.data.take(1)?[0] as usize;
        let sig_bytes = self.data.take(sig_len)?;
        let nul = self.data.take(1)?;

        if nul != [0] {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        let inner = Signature::new(sig_bytes)?;
        inner.validate_single()?;

        self.push_frame(Frame::Variant {
            outer_after: after.to_owned(),
        })?;
        self.current = inner.to_owned();
        Ok(())
    }

    pub fn exit_variant(&mut self) -> Result<()> {
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

    /// Skip the next complete type without returning its value. An array's
    /// length prefix lets its whole body be skipped in one jump; structs and
    /// variants recurse field by field.
    pub fn skip_value(&mut self) -> Result<()> {
        let (first, after) = self.current.split_first_type()?;
        self.skip_one(first.as_bytes())?;
        self.current = after.to_owned();
        self.after_value_closed();
        Ok(())
    }

    fn skip_one(&mut self, ty: &[u8]) -> Result<()> {
        match ty[0] {
            b'y' => {
                self.data.advance(1)?;
            }
            b'b' | b'i' | b'u' => {
                self.data.align_to(4)?;
                self.data.advance(4)?;
            }
            b'n' | b'q' => {
                self.data.align_to(2)?;
                self.data.advance(2)?;
            }
            b'x' | b't' | b'd' => {
                self.data.align_to(8)?;
                self.data.advance(8)?;
            }
            b's' | b'o' => {
                self.data.align_to(4)?;
                let len = u32::from_ne_bytes(self.data.take_array::<4>()?) as usize;
                self.data.advance(len + 1)?;
            }
            b'g' => {
                let len = self.data.take(1)?[0] as usize;
                self.data.advance(len + 1)?;
            }
            b'a' => {
                self.data.align_to(4)?;
                let len = u32::from_ne_bytes(self.data.take_array::<4>()?);

                if len > MAX_ARRAY_LENGTH {
                    return Err(Error::new(ErrorKind::ArrayTooLong(len)));
                }

                let align = Type(*ty.get(1).unwrap_or(&0)).alignment();
                self.data.align_to(align)?;
                self.data.advance(len as usize)?;
            }
            b'(' => {
                self.data.align_to(8)?;
                let mut remaining =
                    unsafe { Signature::new_unchecked(&ty[1..ty.len() - 1]) }.to_owned();

                while !remaining.is_empty() {
                    let (field, rest) = remaining.split_first_type()?;
                    let field_bytes = field.as_bytes().to_vec();
                    remaining = rest.to_owned();
                    self.skip_one(&field_bytes)?;
                }
            }
            b'v' => {
                let sig_len = self.data.take(1)?[0] as usize;
                let sig_bytes = self.data.take(sig_len)?.to_vec();
                let nul = self.data.take(1)?;

                if nul != [0] {
                    return Err(Error::new(ErrorKind::NotNullTerminated));
                }

                let inner = Signature::new(&sig_bytes)?;
                inner.validate_single()?;
                self.skip_one(inner.as_bytes())?;
            }
            _ => return Err(Error::new(ErrorKind::TypeMismatch)),
        }

        Ok(())
    }
}
