use super::{Builder, Iter};
use crate::signature::Signature;

#[test]
fn round_trips_primitives() {
    let sig = Signature::new(b"ybnqixtds").unwrap();
    let mut builder = Builder::new();
    builder.set_signature(sig).unwrap();
    builder.append_u8(0x11).unwrap();
    builder.append_bool(true).unwrap();
    builder.append_i16(-7).unwrap();
    builder.append_u16(7).unwrap();
    builder.append_i32(-70000).unwrap();
    builder.append_i64(-1).unwrap();
    builder.append_u64(u64::MAX).unwrap();
    builder.append_f64(3.5).unwrap();
    builder.append_str("hi").unwrap();
    let bytes = builder.finish().unwrap();

    let mut iter = Iter::new(&bytes, sig);
    assert_eq!(iter.next_u8().unwrap(), 0x11);
    assert!(iter.next_bool().unwrap());
    assert_eq!(iter.next_i16().unwrap(), -7);
    assert_eq!(iter.next_u16().unwrap(), 7);
    assert_eq!(iter.next_i32().unwrap(), -70000);
    assert_eq!(iter.next_i64().unwrap(), -1);
    assert_eq!(iter.next_u64().unwrap(), u64::MAX);
    assert_eq!(iter.next_f64().unwrap(), 3.5);
    assert_eq!(iter.next_str().unwrap(), "hi");
    assert!(iter.is_done());
}

#[test]
fn round_trips_array_of_struct() {
    let sig = Signature::new(b"a(yu)").unwrap();
    let mut builder = Builder::new();
    builder.set_signature(sig).unwrap();
    builder.begin_array().unwrap();
    for (byte, word) in [(0x11u8, 0x44332211u32), (0x99, 0xCCBBAA99)] {
        builder.begin_struct().unwrap();
        builder.append_u8(byte).unwrap();
        builder.append_u32(word).unwrap();
        builder.end_struct().unwrap();
    }
    builder.end_array().unwrap();
    let bytes = builder.finish().unwrap();

    let mut iter = Iter::new(&bytes, sig);
    iter.enter_array().unwrap();
    let mut items = Vec::new();
    while iter.in_array() {
        iter.enter_struct().unwrap();
        let byte = iter.next_u8().unwrap();
        let word = iter.next_u32().unwrap();
        iter.exit_struct().unwrap();
        items.push((byte, word));
    }
    iter.exit_array().unwrap();
    assert!(iter.is_done());
    assert_eq!(items, vec![(0x11, 0x44332211), (0x99, 0xCCBBAA99)]);
}

/// `spec.md` §8 scenario 2, literal bytes.
#[test]
fn iterates_literal_array_of_struct_bytes() {
    let bytes = [
        0x10, 0x00, 0x00, 0x00, // array length: 16 bytes
        0x00, 0x00, 0x00, 0x00, // pad to 8 for first struct
        0x11, 0xCC, 0xCC, 0xCC, 0x11, 0x22, 0x33, 0x44,
        0x99, 0xCC, 0xCC, 0xCC, 0x99, 0xAA, 0xBB, 0xCC,
    ];
    let sig = Signature::new(b"a(yu)").unwrap();
    let mut iter = Iter::new(&bytes, sig);
    iter.enter_array().unwrap();

    let mut items = Vec::new();
    while iter.in_array() {
        iter.enter_struct().unwrap();
        let byte = iter.next_u8().unwrap();
        let word = iter.next_u32().unwrap();
        iter.exit_struct().unwrap();
        items.push((byte, word));
    }
    iter.exit_array().unwrap();

    assert_eq!(items, vec![(0x11, 0x44332211), (0x99, 0xCCBBAA99)]);
}

/// `spec.md` §8 scenario 3: overlong UTF-8 is rejected.
#[test]
fn rejects_overlong_utf8_string() {
    let bytes = [0x02, 0x00, 0x00, 0x00, 0xC0, 0x80, 0x00];
    let sig = Signature::new(b"s").unwrap();
    let mut iter = Iter::new(&bytes, sig);
    assert!(iter.next_str().is_err());
}

#[test]
fn round_trips_dict_array() {
    let sig = Signature::new(b"a{sv}").unwrap();
    let mut builder = Builder::new();
    builder.set_signature(sig).unwrap();
    builder.begin_array().unwrap();
    builder.begin_dict_entry().unwrap();
    builder.append_str("answer").unwrap();
    builder.begin_variant(Signature::new(b"u").unwrap()).unwrap();
    builder.append_u32(42).unwrap();
    builder.end_variant().unwrap();
    builder.end_dict_entry().unwrap();
    builder.end_array().unwrap();
    let bytes = builder.finish().unwrap();

    let mut iter = Iter::new(&bytes, sig);
    iter.enter_array().unwrap();
    assert!(iter.in_array());
    iter.enter_dict_entry().unwrap();
    assert_eq!(iter.next_str().unwrap(), "answer");
    iter.enter_variant().unwrap();
    assert_eq!(iter.next_u32().unwrap(), 42);
    iter.exit_variant().unwrap();
    iter.exit_dict_entry().unwrap();
    assert!(!iter.in_array());
    iter.exit_array().unwrap();
    assert!(iter.is_done());
}

#[test]
fn empty_array_still_emits_element_alignment_pad() {
    let sig = Signature::new(b"a(yu)").unwrap();
    let mut builder = Builder::new();
    builder.set_signature(sig).unwrap();
    builder.begin_array().unwrap();
    builder.end_array().unwrap();
    let bytes = builder.finish().unwrap();

    // 4-byte length (== 0) + 4 bytes of padding to the struct's 8-byte alignment.
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[0..4], &0u32.to_ne_bytes());
}

#[test]
fn variant_rejects_multi_type_signature() {
    let mut builder = Builder::new();
    builder.set_signature(Signature::new(b"v").unwrap()).unwrap();
    assert!(builder.begin_variant(Signature::new(b"ii").unwrap()).is_err());
}

#[test]
fn dict_entry_outside_array_is_rejected() {
    let mut builder = Builder::new();
    builder
        .set_signature(Signature::new(b"i").unwrap())
        .unwrap();
    assert!(builder.begin_dict_entry().is_err());
}

#[test]
fn type_mismatch_is_rejected() {
    let mut builder = Builder::new();
    builder
        .set_signature(Signature::new(b"u").unwrap())
        .unwrap();
    assert!(builder.append_u8(1).is_err());
}

#[test]
fn struct_aligns_to_eight_even_with_byte_first_field() {
    let sig = Signature::new(b"y(yy)").unwrap();
    let mut builder = Builder::new();
    builder.set_signature(sig).unwrap();
    builder.append_u8(1).unwrap();
    builder.begin_struct().unwrap();
    builder.append_u8(2).unwrap();
    builder.append_u8(3).unwrap();
    builder.end_struct().unwrap();
    let bytes = builder.finish().unwrap();

    assert_eq!(bytes.len(), 10); // 1 byte + 7 pad to align struct to 8 + 2 bytes
}

quickcheck::quickcheck! {
    /// Any string free of embedded NULs round-trips through the builder and
    /// iterator unchanged, whatever alignment padding precedes it.
    fn string_round_trips(prefix: u8, s: String) -> bool {
        let s = s.replace('\0', "");
        let sig = Signature::new(b"ys").unwrap();
        let mut builder = Builder::new();
        builder.set_signature(sig).unwrap();
        builder.append_u8(prefix).unwrap();
        builder.append_str(&s).unwrap();
        let bytes = builder.finish().unwrap();

        let mut iter = Iter::new(&bytes, sig);
        iter.next_u8().unwrap() == prefix && iter.next_str().unwrap() == s
    }

    /// An array of `u32`s round-trips regardless of length.
    fn u32_array_round_trips(values: Vec<u32>) -> bool {
        let sig = Signature::new(b"au").unwrap();
        let mut builder = Builder::new();
        builder.set_signature(sig).unwrap();
        builder.begin_array().unwrap();
        for &value in &values {
            builder.append_u32(value).unwrap();
        }
        builder.end_array().unwrap();
        let bytes = builder.finish().unwrap();

        let mut iter = Iter::new(&bytes, sig);
        iter.enter_array().unwrap();
        let mut out = Vec::new();
        while iter.in_array() {
            out.push(iter.next_u32().unwrap());
        }
        iter.exit_array().unwrap();
        out == values
    }
}
