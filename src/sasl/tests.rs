use super::{split_line, ClientHandshake, External, HandshakeEvent};

#[test]
fn start_emits_nul_and_auth_line() {
    let mut handshake = ClientHandshake::new(External::new(1000));
    let out = handshake.start().unwrap();
    assert_eq!(out[0], 0);
    assert_eq!(&out[1..], b"AUTH EXTERNAL 31303030\r\n");
}

#[test]
fn ok_transitions_to_done_and_begin_is_available() {
    let mut handshake = ClientHandshake::new(External::new(0));
    handshake.start().unwrap();

    let event = handshake.receive_line(b"OK 1234deadbeef").unwrap();
    let HandshakeEvent::Accepted { guid } = event else {
        panic!("expected Accepted");
    };
    assert_eq!(&*guid, b"1234deadbeef");
    assert!(handshake.is_done());
    assert_eq!(handshake.begin().unwrap(), b"BEGIN\r\n");
}

#[test]
fn rejected_is_fatal() {
    let mut handshake = ClientHandshake::new(External::new(0));
    handshake.start().unwrap();
    assert!(handshake.receive_line(b"REJECTED EXTERNAL").is_err());
}

#[test]
fn begin_before_accepted_is_an_error() {
    let mut handshake = ClientHandshake::new(External::new(0));
    assert!(handshake.begin().is_err());
}

#[test]
fn split_line_buffers_partial_lines() {
    assert_eq!(split_line(b"no newline yet"), None);
    assert_eq!(
        split_line(b"OK guid\r\nextra"),
        Some((&b"OK guid\r"[..], &b"extra"[..]))
    );
}
