//! Encoding and decoding of the fixed 12-byte header, the header-field
//! array, and the pad-to-8 that precedes the body (`spec.md` §3, §4.4 step
//! 3/5/6).

use crate::body::{flip_in_place, flip_in_place_from, Builder, Iter};
use crate::buf::padding_to;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::Frame;
use crate::message::kind::MessageKind;
use crate::message::Message;
use crate::object_path::OwnedObjectPath;
use crate::protocol::{
    Endianness, Flags, HeaderField, MessageType, MAX_ARRAY_LENGTH, MAX_MESSAGE_LENGTH,
};
use crate::signature::{OwnedSignature, Signature};

const FIXED_HEADER_LEN: usize = 12;
const HEADER_FIELDS_SIGNATURE: &Signature = Signature::new_const("a(yv)");

/// The fields read out of a message's start before it's known whether the
/// whole message has arrived yet (`spec.md` §4.4 step 3).
pub(crate) struct Peeked {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    /// Total byte length of the message, fixed header through body.
    pub(crate) total_len: usize,
}

/// Inspect the start of `data`. Returns `Ok(None)` if fewer than the fixed
/// header plus the header-field array's length prefix have arrived.
pub(crate) fn peek(data: &[u8]) -> Result<Option<Peeked>> {
    if data.len() < FIXED_HEADER_LEN + 4 {
        return Ok(None);
    }

    let endianness = Endianness(data[0]);

    if endianness != Endianness::LITTLE && endianness != Endianness::BIG {
        return Err(Error::new(ErrorKind::InvalidEndianness(data[0])));
    }

    let message_type = MessageType(data[1]);

    if !matches!(
        message_type,
        MessageType::METHOD_CALL
            | MessageType::METHOD_RETURN
            | MessageType::ERROR
            | MessageType::SIGNAL
    ) {
        return Err(Error::new(ErrorKind::InvalidMessageType(data[1])));
    }

    let version = data[3];

    if version != 1 {
        return Err(Error::new(ErrorKind::InvalidProtocolVersion(version)));
    }

    let mut body_length = u32::from_ne_bytes(data[4..8].try_into().unwrap());
    body_length.adjust(endianness);

    let mut header_fields_len = u32::from_ne_bytes(data[12..16].try_into().unwrap());
    header_fields_len.adjust(endianness);

    if header_fields_len > MAX_ARRAY_LENGTH {
        return Err(Error::new(ErrorKind::ArrayTooLong(header_fields_len)));
    }

    let header_fields_end = FIXED_HEADER_LEN + 4 + header_fields_len as usize;
    let body_start = header_fields_end + padding_to(header_fields_end, 8);
    let total_len = body_start + body_length as usize;

    let total_len_u32 =
        u32::try_from(total_len).map_err(|_| Error::new(ErrorKind::MessageTooLong(u32::MAX)))?;

    if total_len_u32 > MAX_MESSAGE_LENGTH {
        return Err(Error::new(ErrorKind::MessageTooLong(total_len_u32)));
    }

    Ok(Some(Peeked {
        endianness,
        message_type,
        total_len,
    }))
}

/// Build the complete wire bytes for `message`, native endianness
/// (`spec.md` §4.1, §4.5).
///
/// Assembled in a single [`Builder`] so every alignment call inside the
/// header-field array and the body's leading pad is computed relative to
/// the true start of the message, not a locally-0-based sub-buffer.
pub(crate) fn encode(message: &Message) -> Result<Vec<u8>> {
    message.validate_required()?;

    let endianness = Endianness::NATIVE;
    let message_type = message.kind().message_type();

    let mut builder = Builder::new();
    builder.write_raw(&[endianness.0, message_type.0, message.flags().0, 1])?;
    let body_length_offset = builder.len();
    builder.write_raw(&0u32.to_ne_bytes())?;
    builder.write_raw(&message.serial().to_ne_bytes())?;

    builder.set_signature(HEADER_FIELDS_SIGNATURE)?;
    builder.begin_array()?;
    write_header_fields(&mut builder, message)?;
    builder.end_array()?;

    builder.align_raw(8)?;

    let body = message.body_bytes();
    let body_len =
        u32::try_from(body.len()).map_err(|_| Error::new(ErrorKind::MessageTooLong(u32::MAX)))?;
    builder.write_raw(body)?;
    builder.patch_u32(body_length_offset, body_len);

    let bytes = builder.finish()?;

    let total_len =
        u32::try_from(bytes.len()).map_err(|_| Error::new(ErrorKind::MessageTooLong(u32::MAX)))?;

    if total_len > MAX_MESSAGE_LENGTH {
        return Err(Error::new(ErrorKind::MessageTooLong(total_len)));
    }

    Ok(bytes)
}

fn write_header_fields(builder: &mut Builder, message: &Message) -> Result<()> {
    if let Some(path) = message.kind().path() {
        push_field(builder, HeaderField::PATH, Signature::new_const("o"), |b| {
            b.append_object_path(path.as_str())
        })?;
    }

    if let Some(interface) = message.interface() {
        push_field(builder, HeaderField::INTERFACE, Signature::new_const("s"), |b| {
            b.append_str(interface)
        })?;
    }

    if let Some(member) = message.kind().member() {
        push_field(builder, HeaderField::MEMBER, Signature::new_const("s"), |b| {
            b.append_str(member)
        })?;
    }

    if let Some(error_name) = message.kind().error_name() {
        push_field(builder, HeaderField::ERROR_NAME, Signature::new_const("s"), |b| {
            b.append_str(error_name)
        })?;
    }

    if let Some(reply_serial) = message.kind().reply_serial() {
        push_field(builder, HeaderField::REPLY_SERIAL, Signature::new_const("u"), |b| {
            b.append_u32(reply_serial)
        })?;
    }

    if let Some(destination) = message.destination() {
        push_field(builder, HeaderField::DESTINATION, Signature::new_const("s"), |b| {
            b.append_str(destination)
        })?;
    }

    if let Some(sender) = message.sender() {
        push_field(builder, HeaderField::SENDER, Signature::new_const("s"), |b| {
            b.append_str(sender)
        })?;
    }

    if !message.signature().is_empty() {
        push_field(builder, HeaderField::SIGNATURE, Signature::new_const("g"), |b| {
            b.append_signature_value(message.signature())
        })?;
    }

    Ok(())
}

fn push_field<F>(
    builder: &mut Builder,
    field: HeaderField,
    inner: &Signature,
    write: F,
) -> Result<()>
where
    F: FnOnce(&mut Builder) -> Result<()>,
{
    builder.begin_struct()?;
    builder.append_u8(field.0)?;
    builder.begin_variant(inner)?;
    write(builder)?;
    builder.end_variant()?;
    builder.end_struct()?;
    Ok(())
}

/// Parse one complete message out of `data`, returning it along with the
/// number of bytes consumed. Callers must have already confirmed via
/// [`peek`] that `data` holds at least `total_len` bytes.
pub(crate) fn decode(data: &[u8]) -> Result<(Message, usize)> {
    let Some(peeked) = peek(data)? else {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    };

    if data.len() < peeked.total_len {
        return Err(Error::new(ErrorKind::BufferUnderflow));
    }

    let mut bytes = data[..peeked.total_len].to_vec();

    if peeked.endianness != Endianness::NATIVE {
        flip_in_place_from(
            &mut bytes,
            FIXED_HEADER_LEN,
            HEADER_FIELDS_SIGNATURE,
            peeked.endianness,
        )?;
    }

    let mut serial = u32::from_ne_bytes(bytes[8..12].try_into().unwrap());
    serial.adjust(peeked.endianness);

    if serial == 0 {
        return Err(Error::new(ErrorKind::ZeroSerial));
    }

    let flags = Flags(bytes[2]);

    let mut path = None;
    let mut interface = None;
    let mut member = None;
    let mut error_name = None;
    let mut reply_serial = None;
    let mut destination = None;
    let mut sender = None;
    let mut signature = OwnedSignature::new();

    let mut iter = Iter::new_at(&bytes, FIXED_HEADER_LEN, HEADER_FIELDS_SIGNATURE)?;
    iter.enter_array()?;

    while iter.in_array() {
        iter.enter_struct()?;
        let code = iter.next_u8()?;
        iter.enter_variant()?;

        match code {
            c if c == HeaderField::PATH.0 => {
                path = Some(OwnedObjectPath::new(iter.next_object_path()?)?);
            }
            c if c == HeaderField::INTERFACE.0 => {
                interface = Some(iter.next_str()?.to_owned());
            }
            c if c == HeaderField::MEMBER.0 => {
                member = Some(iter.next_str()?.to_owned());
            }
            c if c == HeaderField::ERROR_NAME.0 => {
                error_name = Some(iter.next_str()?.to_owned());
            }
            c if c == HeaderField::REPLY_SERIAL.0 => {
                reply_serial = Some(iter.next_u32()?);
            }
            c if c == HeaderField::DESTINATION.0 => {
                destination = Some(iter.next_str()?.to_owned());
            }
            c if c == HeaderField::SENDER.0 => {
                sender = Some(iter.next_str()?.to_owned());
            }
            c if c == HeaderField::SIGNATURE.0 => {
                signature = iter.next_signature_value()?.to_owned();
            }
            // Unknown header field codes are skipped, value included
            // (`spec.md` §6).
            _ => iter.skip_value()?,
        }

        iter.exit_variant()?;
        iter.exit_struct()?;
    }

    iter.exit_array()?;

    let header_fields_end = iter.pos();
    let body_start = header_fields_end + padding_to(header_fields_end, 8);
    let mut body = bytes[body_start..].to_vec();

    if peeked.endianness != Endianness::NATIVE {
        flip_in_place(&mut body, &signature, peeked.endianness)?;
    }

    let kind = match peeked.message_type {
        MessageType::METHOD_CALL => MessageKind::MethodCall {
            path: path.ok_or_else(|| Error::new(ErrorKind::MissingPath))?,
            member: member
                .ok_or_else(|| Error::new(ErrorKind::MissingMember))?
                .into(),
        },
        MessageType::METHOD_RETURN => MessageKind::MethodReturn {
            reply_serial: reply_serial.ok_or_else(|| Error::new(ErrorKind::MissingReplySerial))?,
        },
        MessageType::ERROR => MessageKind::Error {
            error_name: error_name
                .ok_or_else(|| Error::new(ErrorKind::MissingErrorName))?
                .into(),
            reply_serial: reply_serial.ok_or_else(|| Error::new(ErrorKind::MissingReplySerial))?,
        },
        MessageType::SIGNAL => MessageKind::Signal {
            path: path.ok_or_else(|| Error::new(ErrorKind::MissingPath))?,
            member: member
                .ok_or_else(|| Error::new(ErrorKind::MissingMember))?
                .into(),
        },
        _ => unreachable!("message type validated in peek()"),
    };

    if matches!(kind, MessageKind::Signal { .. }) && interface.is_none() {
        return Err(Error::new(ErrorKind::MissingInterface));
    }

    if let Some(iface) = &interface {
        crate::names::validate_interface_name(iface)?;
    }

    if let Some(member) = kind.member() {
        crate::names::validate_member_name(member)?;
    }

    if let Some(error_name) = kind.error_name() {
        crate::names::validate_interface_name(error_name)?;
    }

    if let Some(destination) = &destination {
        crate::names::validate_bus_name(destination)?;
    }

    if let Some(sender) = &sender {
        crate::names::validate_bus_name(sender)?;
    }

    let message = Message::from_parts(
        kind,
        serial,
        flags,
        interface.map(Box::from),
        destination.map(Box::from),
        sender.map(Box::from),
        signature,
        body,
    );

    Ok((message, peeked.total_len))
}
