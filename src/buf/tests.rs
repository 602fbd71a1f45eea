use super::{padding_to, OwnedBuf, ReadBuf};

#[test]
fn padding_computes_next_multiple() {
    assert_eq!(padding_to(0, 8), 0);
    assert_eq!(padding_to(1, 8), 7);
    assert_eq!(padding_to(7, 8), 1);
    assert_eq!(padding_to(8, 8), 0);
    assert_eq!(padding_to(3, 4), 1);
}

#[test]
fn owned_buf_aligns_and_patches() {
    let mut buf = OwnedBuf::new();
    buf.extend_from_slice(b"a");
    buf.align_to(4);
    assert_eq!(buf.len(), 4);
    assert_eq!(buf.get(), &[b'a', 0, 0, 0]);

    buf.extend_from_slice(&[0u8; 4]);
    buf.patch_u32(4, 0xAABBCCDD);
    assert_eq!(&buf.get()[4..8], &0xAABBCCDDu32.to_ne_bytes());
}

#[test]
fn owned_buf_advance_drops_prefix() {
    let mut buf = OwnedBuf::new();
    buf.extend_from_slice(b"hello");
    buf.advance(2);
    assert_eq!(buf.get(), b"llo");
}

#[test]
fn read_buf_underflow_is_an_error() {
    let data = [1u8, 2, 3];
    let mut r = ReadBuf::new(&data);
    assert!(r.take(3).is_ok());
    assert!(r.take(1).is_err());
}

#[test]
fn read_buf_alignment_skips_padding() {
    let data = [0u8; 8];
    let mut r = ReadBuf::new(&data);
    r.advance(1).unwrap();
    r.align_to(4).unwrap();
    assert_eq!(r.pos(), 4);
}
