use super::Signature;

#[test]
fn accepts_primitives() {
    for sig in ["y", "b", "n", "q", "i", "u", "x", "t", "d", "s", "o", "g", "v"] {
        assert!(Signature::new(sig.as_bytes()).is_ok(), "{sig} should be valid");
    }
}

#[test]
fn accepts_empty() {
    assert!(Signature::new(b"").is_ok());
}

#[test]
fn accepts_nested_struct_and_array() {
    assert!(Signature::new(b"a(yu)").is_ok());
    assert!(Signature::new(b"a{sv}").is_ok());
    assert!(Signature::new(b"(a{sv}as)").is_ok());
}

#[test]
fn rejects_unbalanced_struct() {
    assert!(Signature::new(b"(i").is_err());
    assert!(Signature::new(b"i)").is_err());
}

#[test]
fn rejects_dict_entry_outside_array() {
    assert!(Signature::new(b"{sv}").is_err());
    assert!(Signature::new(b"({sv})").is_err());
}

#[test]
fn rejects_dict_entry_with_container_key() {
    assert!(Signature::new(b"a{(i)v}").is_err());
}

#[test]
fn rejects_trailing_array_specifier() {
    assert!(Signature::new(b"a").is_err());
}

#[test]
fn rejects_empty_struct() {
    assert!(Signature::new(b"()").is_err());
}

#[test]
fn validates_single_complete_type() {
    let sig = Signature::new(b"i").unwrap();
    assert!(sig.validate_single().is_ok());

    let sig = Signature::new(b"ii").unwrap();
    assert!(sig.validate_single().is_err());

    assert!(Signature::EMPTY.validate_single().is_err());
}

#[test]
fn splits_first_complete_type() {
    let sig = Signature::new(b"ii").unwrap();
    let (first, rest) = sig.split_first_type().unwrap();
    assert_eq!(first.as_bytes(), b"i");
    assert_eq!(rest.as_bytes(), b"i");

    let sig = Signature::new(b"(yu)s").unwrap();
    let (first, rest) = sig.split_first_type().unwrap();
    assert_eq!(first.as_bytes(), b"(yu)");
    assert_eq!(rest.as_bytes(), b"s");
}
