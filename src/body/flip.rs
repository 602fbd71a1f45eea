use crate::buf::padding_to;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{Endianness, Type, MAX_ARRAY_LENGTH};
use crate::signature::Signature;

/// Byte-swap every fixed-width primitive in `buf` so a message encoded in
/// `source` endianness reads correctly in the host's native endianness.
///
/// Applied once, in full, right after the fixed header is parsed
/// (`spec.md` §4.4 step 5) so the iterator never has to branch on
/// endianness itself. `source` must name the endianness `buf` is CURRENTLY
/// encoded in — not necessarily the wire's original encoding, since calling
/// this twice (once with `Endianness::NATIVE`, once with the opposite) on
/// the same buffer is required to be the identity, and the second call's
/// `source` is whatever the first call just produced.
pub(crate) fn flip_in_place(buf: &mut [u8], sig: &Signature, source: Endianness) -> Result<()> {
    flip_in_place_from(buf, 0, sig, source)
}

/// As [`flip_in_place`], but starts walking `sig` at absolute position
/// `start` in `buf` rather than 0.
///
/// Needed for the header-field array: it begins at true offset 12 in a
/// full message buffer, which is not itself 8-aligned, so its `(yv)`
/// elements must have their alignment computed relative to the message's
/// true start (passed here as `buf` itself) rather than relative to a
/// byte 0 that doesn't correspond to any real alignment boundary.
pub(crate) fn flip_in_place_from(
    buf: &mut [u8],
    start: usize,
    sig: &Signature,
    source: Endianness,
) -> Result<()> {
    let mut pos = start;
    let mut remaining = sig;

    while !remaining.is_empty() {
        let (first, rest) = remaining.split_first_type()?;
        flip_one(buf, &mut pos, first.as_bytes(), source)?;
        remaining = rest;
    }

    Ok(())
}

fn align(buf_len: usize, pos: &mut usize, alignment: usize) -> Result<()> {
    let pad = padding_to(*pos, alignment);

    if *pos + pad > buf_len {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    *pos += pad;
    Ok(())
}

fn swap_at(buf: &mut [u8], pos: usize, width: usize) -> Result<()> {
    if pos + width > buf.len() {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    buf[pos..pos + width].reverse();
    Ok(())
}

/// Read the 4-byte length prefix at `pos`, interpreting the CURRENT bytes
/// as encoded in `source` — without mutating them.
///
/// This must not be folded into a "swap first, then read native" step:
/// doing so only recovers the right value when `source` happens to be the
/// non-native endianness, and silently misreads it (and so, via
/// [`MAX_ARRAY_LENGTH`], can spuriously reject an otherwise valid buffer)
/// on a second application to a buffer that is already native. Reading the
/// length directly in `source` first keeps the swap that follows a pure,
/// order-independent byte reversal, so applying [`flip_one`] twice with
/// `source` and then its opposite is genuinely the identity.
fn read_len(buf: &[u8], pos: usize, source: Endianness) -> Result<u32> {
    if pos + 4 > buf.len() {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    let raw = u32::from_ne_bytes(buf[pos..pos + 4].try_into().unwrap());

    Ok(if source == Endianness::NATIVE {
        raw
    } else {
        raw.swap_bytes()
    })
}

fn flip_one(buf: &mut [u8], pos: &mut usize, ty: &[u8], source: Endianness) -> Result<()> {
    match ty[0] {
        b'y' => {
            if *pos + 1 > buf.len() {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            *pos += 1;
        }
        b'b' | b'i' | b'u' => {
            align(buf.len(), pos, 4)?;
            swap_at(buf, *pos, 4)?;
            *pos += 4;
        }
        b'n' | b'q' => {
            align(buf.len(), pos, 2)?;
            swap_at(buf, *pos, 2)?;
            *pos += 2;
        }
        b'x' | b't' | b'd' => {
            align(buf.len(), pos, 8)?;
            swap_at(buf, *pos, 8)?;
            *pos += 8;
        }
        b's' | b'o' => {
            align(buf.len(), pos, 4)?;
            let len = read_len(buf, *pos, source)? as usize;
            swap_at(buf, *pos, 4)?;
            *pos += 4;
            *pos += len + 1;
        }
        b'g' => {
            if *pos + 1 > buf.len() {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            let len = buf[*pos] as usize;
            *pos += 1 + len + 1;
        }
        b'a' => {
            align(buf.len(), pos, 4)?;
            let len = read_len(buf, *pos, source)?;
            swap_at(buf, *pos, 4)?;

            if len > MAX_ARRAY_LENGTH {
                return Err(Error::new(ErrorKind::ArrayTooLong(len)));
            }

            *pos += 4;

            let element = unsafe { Signature::new_unchecked(&ty[1..]) };
            let elem_align = Type(*element.as_bytes().first().unwrap_or(&0)).alignment();
            align(buf.len(), pos, elem_align)?;
            let end = *pos + len as usize;

            if end > buf.len() {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            while *pos < end {
                flip_one(buf, pos, element.as_bytes(), source)?;
            }
        }
        b'(' | b'{' => {
            align(buf.len(), pos, 8)?;
            let mut remaining =
                unsafe { Signature::new_unchecked(&ty[1..ty.len() - 1]) }.to_owned();

            while !remaining.is_empty() {
                let (field, rest) = remaining.split_first_type()?;
                let field_bytes = field.as_bytes().to_vec();
                remaining = rest.to_owned();
                flip_one(buf, pos, &field_bytes, source)?;
            }
        }
        b'v' => {
            if *pos + 1 > buf.len() {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            let sig_len = buf[*pos] as usize;
            let sig_start = *pos + 1;

            if sig_start + sig_len + 1 > buf.len() {
                return Err(Error::new(ErrorKind::BufferUnderflow));
            }

            let inner_bytes = buf[sig_start..sig_start + sig_len].to_vec();
            *pos = sig_start + sig_len + 1;

            let inner = Signature::new(&inner_bytes)?;
            inner.validate_single()?;
            flip_one(buf, pos, inner.as_bytes(), source)?;
        }
        _ => return Err(Error::new(ErrorKind::TypeMismatch)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::flip_in_place;
    use crate::protocol::Endianness;
    use crate::signature::Signature;

    #[test]
    fn flipping_twice_is_identity() {
        let sig = Signature::new(b"a(yu)").unwrap();
        let mut buf = vec![
            0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x11, 0xCC, 0xCC, 0xCC, 0x11, 0x22,
            0x33, 0x44, 0x99, 0xCC, 0xCC, 0xCC, 0x99, 0xAA, 0xBB, 0xCC,
        ];
        let original = buf.clone();

        flip_in_place(&mut buf, sig, Endianness::NATIVE).unwrap();
        assert_ne!(buf, original);
        flip_in_place(&mut buf, sig, Endianness::SWAPPED).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn flips_string_length_but_not_utf8_bytes() {
        let sig = Signature::new(b"s").unwrap();
        // length 2, "hi", NUL
        let mut buf = vec![0x02, 0x00, 0x00, 0x00, b'h', b'i', 0x00];
        flip_in_place(&mut buf, sig, Endianness::NATIVE).unwrap();
        assert_eq!(&buf[4..6], b"hi");
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x02]);
    }
}
