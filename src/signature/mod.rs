//! D-Bus type signatures: a string drawn from the closed alphabet
//! `y b n q i u x t d s o g a ( ) { } v` that denotes a sequence of complete
//! types (`spec.md` §3).

#[cfg(test)]
mod tests;

pub use self::error::SignatureError;
mod error;

pub(crate) use self::error::SignatureErrorKind;

mod validate;

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use crate::protocol::MAX_SIGNATURE_LENGTH;

/// A borrowed, validated D-Bus signature.
///
/// All signature bytes are drawn from the closed type-code alphabet, which
/// is a subset of ASCII, so a `Signature` can always be viewed as `&str`.
#[derive(PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Signature(str);

impl Signature {
    /// The empty signature, denoting zero complete types.
    pub const EMPTY: &'static Signature = Signature::new_const("");

    /// Construct a signature from a validated string at compile time.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a valid sequence of complete types. Intended
    /// for use with string literals known to be valid signatures.
    #[track_caller]
    pub const fn new_const(value: &'static str) -> &'static Signature {
        // Constant-time validation is not attempted here; callers pass
        // literals they control. Runtime construction goes through `new`.
        unsafe { &*(value as *const str as *const Signature) }
    }

    /// Validate and construct a signature from a byte string.
    pub fn new(bytes: &[u8]) -> Result<&Signature, SignatureError> {
        validate::validate_sequence(bytes)?;
        let s = std::str::from_utf8(bytes)
            .expect("signature alphabet is a subset of ASCII");
        Ok(unsafe { &*(s as *const str as *const Signature) })
    }

    /// Construct a signature from an already-validated slice without
    /// re-checking it.
    pub(crate) unsafe fn new_unchecked(bytes: &[u8]) -> &Signature {
        let s = std::str::from_utf8_unchecked(bytes);
        &*(s as *const str as *const Signature)
    }

    /// The signature as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The signature as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Split off the first complete type, in a non-array-element context.
    pub(crate) fn split_first_type(&self) -> Result<(&Signature, &Signature), SignatureError> {
        let n = validate::first_type_len(self.as_bytes())?;
        let (head, tail) = self.as_bytes().split_at(n);
        Ok(unsafe { (Signature::new_unchecked(head), Signature::new_unchecked(tail)) })
    }

    /// Split off the first complete type, immediately after an array's `a`.
    pub(crate) fn split_first_array_element(
        &self,
    ) -> Result<(&Signature, &Signature), SignatureError> {
        let n = validate::first_array_element_type_len(self.as_bytes())?;
        let (head, tail) = self.as_bytes().split_at(n);
        Ok(unsafe { (Signature::new_unchecked(head), Signature::new_unchecked(tail)) })
    }

    /// Validate that this signature denotes exactly one complete type, as
    /// required of a variant's embedded signature.
    pub(crate) fn validate_single(&self) -> Result<(), SignatureError> {
        validate::validate_single(self.as_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl ToOwned for Signature {
    type Owned = OwnedSignature;

    fn to_owned(&self) -> OwnedSignature {
        OwnedSignature {
            data: self.0.to_owned(),
        }
    }
}

/// An owned, growable D-Bus signature, bounded to the protocol's 255-byte
/// maximum (`spec.md` §3).
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct OwnedSignature {
    data: String,
}

impl OwnedSignature {
    /// Construct a new, empty signature.
    pub const fn new() -> Self {
        Self { data: String::new() }
    }

    /// Append a single type code, without validating the resulting
    /// signature is well-formed; used internally by the builder which
    /// enforces well-formedness incrementally via its scope stack.
    pub(crate) fn push_byte(&mut self, byte: u8) -> Result<(), SignatureError> {
        if self.data.len() >= MAX_SIGNATURE_LENGTH {
            return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
        }

        self.data.push(byte as char);
        Ok(())
    }

    /// Append another signature's bytes.
    pub(crate) fn push_signature<S>(&mut self, other: &S) -> Result<(), SignatureError>
    where
        S: AsRef<Signature> + ?Sized,
    {
        let bytes = other.as_ref().as_bytes();

        if self.data.len() + bytes.len() > MAX_SIGNATURE_LENGTH {
            return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
        }

        self.data.push_str(other.as_ref().as_str());
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

impl Deref for OwnedSignature {
    type Target = Signature;

    fn deref(&self) -> &Signature {
        unsafe { Signature::new_unchecked(self.data.as_bytes()) }
    }
}

impl Borrow<Signature> for OwnedSignature {
    fn borrow(&self) -> &Signature {
        self
    }
}

impl AsRef<Signature> for OwnedSignature {
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl fmt::Debug for OwnedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.data.as_str(), f)
    }
}

impl fmt::Display for OwnedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.data.as_str(), f)
    }
}

impl TryFrom<&str> for OwnedSignature {
    type Error = SignatureError;

    fn try_from(value: &str) -> Result<Self, SignatureError> {
        Signature::new(value.as_bytes())?;

        if value.len() > MAX_SIGNATURE_LENGTH {
            return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
        }

        Ok(Self { data: value.to_owned() })
    }
}
