use crate::protocol::MAX_CONTAINER_DEPTH;

use super::{SignatureError, SignatureErrorKind};

/// Basic (non-container) types are the only types legal as a dict-entry key
/// (`spec.md` §3: "{` `K,V` `}`" with `K` restricted in the D-Bus spec to a
/// basic type).
fn is_basic_type(code: u8) -> bool {
    matches!(
        code,
        b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
    )
}

/// Consume exactly one complete type from the front of `bytes`, returning
/// the number of bytes it occupied.
///
/// `in_array_element` is true only when this call parses the type
/// immediately following an `a`; it is the sole context in which a leading
/// `{` (dict entry) is legal (`spec.md` §4.1: "Dict entries are only legal
/// as immediate children of an array").
fn consume_one(
    bytes: &[u8],
    depth: usize,
    in_array_element: bool,
) -> Result<usize, SignatureError> {
    let Some(&head) = bytes.first() else {
        return Err(SignatureError::new(SignatureErrorKind::Empty));
    };

    match head {
        b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
        | b'v' => Ok(1),
        b'a' => {
            if depth == MAX_CONTAINER_DEPTH {
                return Err(SignatureError::new(SignatureErrorKind::ExceededMaximumDepth));
            }

            let rest = &bytes[1..];

            if rest.is_empty() {
                return Err(SignatureError::new(
                    SignatureErrorKind::TrailingArrayWithNoElement,
                ));
            }

            let n = consume_one(rest, depth + 1, true)?;
            Ok(1 + n)
        }
        b'(' => {
            if depth == MAX_CONTAINER_DEPTH {
                return Err(SignatureError::new(SignatureErrorKind::ExceededMaximumDepth));
            }

            let mut rest = &bytes[1..];
            let mut total = 1;
            let mut fields = 0usize;

            loop {
                if rest.first() == Some(&b')') {
                    if fields == 0 {
                        return Err(SignatureError::new(SignatureErrorKind::EmptyStruct));
                    }

                    return Ok(total + 1);
                }

                if rest.is_empty() {
                    return Err(SignatureError::new(SignatureErrorKind::UnbalancedStruct));
                }

                let n = consume_one(rest, depth + 1, false)?;
                total += n;
                rest = &rest[n..];
                fields += 1;
            }
        }
        b'{' => {
            if !in_array_element {
                return Err(SignatureError::new(SignatureErrorKind::DictEntryNotInArray));
            }

            if depth == MAX_CONTAINER_DEPTH {
                return Err(SignatureError::new(SignatureErrorKind::ExceededMaximumDepth));
            }

            let mut rest = &bytes[1..];

            if rest.is_empty() {
                return Err(SignatureError::new(SignatureErrorKind::UnbalancedDictEntry));
            }

            if !is_basic_type(rest[0]) {
                return Err(SignatureError::new(
                    SignatureErrorKind::DictEntryKeyNotBasic,
                ));
            }

            let kn = consume_one(rest, depth + 1, false)?;
            rest = &rest[kn..];

            if rest.is_empty() {
                return Err(SignatureError::new(
                    SignatureErrorKind::DictEntryNeedsExactlyTwoTypes,
                ));
            }

            let vn = consume_one(rest, depth + 1, false)?;
            rest = &rest[vn..];

            if rest.first() != Some(&b'}') {
                return Err(SignatureError::new(SignatureErrorKind::UnbalancedDictEntry));
            }

            Ok(1 + kn + vn + 1)
        }
        b')' => Err(SignatureError::new(SignatureErrorKind::UnbalancedStruct)),
        b'}' => Err(SignatureError::new(SignatureErrorKind::UnbalancedDictEntry)),
        other => Err(SignatureError::new(SignatureErrorKind::InvalidTypeCode(
            other,
        ))),
    }
}

/// Validate that `bytes` is a (possibly empty) sequence of complete types.
pub(crate) fn validate_sequence(bytes: &[u8]) -> Result<(), SignatureError> {
    let mut rest = bytes;

    while !rest.is_empty() {
        let n = consume_one(rest, 0, false)?;
        rest = &rest[n..];
    }

    Ok(())
}

/// Validate that `bytes` denotes exactly one complete type, as required of
/// a variant's embedded signature (`spec.md` §3, §4.2).
pub(crate) fn validate_single(bytes: &[u8]) -> Result<(), SignatureError> {
    if bytes.is_empty() {
        return Err(SignatureError::new(SignatureErrorKind::Empty));
    }

    let n = consume_one(bytes, 0, false)?;

    if n != bytes.len() {
        return Err(SignatureError::new(SignatureErrorKind::NotOneCompleteType));
    }

    Ok(())
}

/// Length in bytes of the first complete type in `bytes`, in a context that
/// is not an array element (top level, struct field, variant body).
pub(crate) fn first_type_len(bytes: &[u8]) -> Result<usize, SignatureError> {
    consume_one(bytes, 0, false)
}

/// Length in bytes of the first complete type in `bytes`, immediately after
/// having consumed an array's `a`. This is the only context in which a
/// dict-entry type is legal.
pub(crate) fn first_array_element_type_len(bytes: &[u8]) -> Result<usize, SignatureError> {
    consume_one(bytes, 0, true)
}
