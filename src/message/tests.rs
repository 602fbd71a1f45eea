use super::header::{decode, encode};
use crate::body::Builder;
use crate::message::Message;
use crate::object_path::OwnedObjectPath;
use crate::signature::Signature;

#[test]
fn round_trips_method_call_with_one_argument() {
    let message = Message::method_call(
        OwnedObjectPath::new("/com/example").unwrap(),
        "Do",
        1,
    )
    .with_interface("com.example.Iface")
    .with_destination("com.example.Service")
    .build_body(Signature::new_const("u"), |b| b.append_u32(0x4433_2211))
    .unwrap();

    let bytes = encode(&message).unwrap();
    let (decoded, consumed) = decode(&bytes).unwrap();

    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded.kind().path().unwrap().as_str(), "/com/example");
    assert_eq!(decoded.kind().member(), Some("Do"));
    assert_eq!(decoded.interface(), Some("com.example.Iface"));
    assert_eq!(decoded.destination(), Some("com.example.Service"));
    assert_eq!(decoded.signature().as_str(), "u");

    let mut iter = decoded.iter_body();
    assert_eq!(iter.next_u32().unwrap(), 0x4433_2211);
}

#[test]
fn round_trips_method_return_and_error() {
    let call = Message::method_call(OwnedObjectPath::new("/a").unwrap(), "M", 5)
        .with_sender(":1.1")
        .with_destination(":1.2");

    let reply = call.method_return(6);
    let bytes = encode(&reply).unwrap();
    let (decoded, _) = decode(&bytes).unwrap();
    assert_eq!(decoded.kind().reply_serial(), Some(5));
    // sender/destination swap across the reply boundary.
    assert_eq!(decoded.destination(), Some(":1.1"));
    assert_eq!(decoded.sender(), Some(":1.2"));

    let error = call.error("com.example.Failed", 7);
    let bytes = encode(&error).unwrap();
    let (decoded, _) = decode(&bytes).unwrap();
    assert_eq!(decoded.kind().error_name(), Some("com.example.Failed"));
    assert_eq!(decoded.kind().reply_serial(), Some(5));
}

#[test]
fn signal_requires_interface() {
    let signal = Message::signal(OwnedObjectPath::new("/a").unwrap(), "Changed", 1);
    assert!(encode(&signal).is_err());

    let signal = signal.with_interface("org.example.I");
    assert!(encode(&signal).is_ok());
}

#[test]
fn empty_body_round_trips_with_empty_signature() {
    let message = Message::method_call(OwnedObjectPath::new("/").unwrap(), "Ping", 1);
    let bytes = encode(&message).unwrap();
    let (decoded, _) = decode(&bytes).unwrap();
    assert!(decoded.signature().is_empty());
    assert!(decoded.body_bytes().is_empty());
}

#[test]
fn rejects_zero_serial() {
    let message = Message::method_call(OwnedObjectPath::new("/").unwrap(), "Ping", 0);
    let bytes = encode(&message).unwrap();
    assert!(decode(&bytes).is_err());
}

#[test]
fn unknown_header_field_is_skipped() {
    // Hand-assemble a message whose header-field array carries an extra,
    // unrecognized field code (99) ahead of the required PATH/MEMBER pair.
    let mut builder = Builder::new();
    builder.write_raw(&[b'l', 1, 0, 1]).unwrap();
    let body_length_offset = builder.len();
    builder.write_raw(&0u32.to_ne_bytes()).unwrap();
    builder.write_raw(&1u32.to_ne_bytes()).unwrap();

    builder.set_signature(Signature::new_const("a(yv)")).unwrap();
    builder.begin_array().unwrap();

    builder.begin_struct().unwrap();
    builder.append_u8(99).unwrap();
    builder.begin_variant(Signature::new_const("u")).unwrap();
    builder.append_u32(0xdead_beef).unwrap();
    builder.end_variant().unwrap();
    builder.end_struct().unwrap();

    builder.begin_struct().unwrap();
    builder.append_u8(1).unwrap();
    builder.begin_variant(Signature::new_const("o")).unwrap();
    builder.append_object_path("/").unwrap();
    builder.end_variant().unwrap();
    builder.end_struct().unwrap();

    builder.begin_struct().unwrap();
    builder.append_u8(3).unwrap();
    builder.begin_variant(Signature::new_const("s")).unwrap();
    builder.append_str("Ping").unwrap();
    builder.end_variant().unwrap();
    builder.end_struct().unwrap();

    builder.end_array().unwrap();
    builder.align_raw(8).unwrap();
    builder.patch_u32(body_length_offset, 0);

    let bytes = builder.finish().unwrap();
    let (decoded, consumed) = decode(&bytes).unwrap();

    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded.kind().member(), Some("Ping"));
    assert_eq!(decoded.kind().path().unwrap().as_str(), "/");
}
