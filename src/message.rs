//! # BitTorrent Peer Wire Messages
//!
//! Every message after the handshake follows the same format:
//!
//! ```text
//! <length prefix><message ID><payload>
//! ```
//!
//! - **Length Prefix**: 4 bytes (big-endian u32), length of message ID + payload
//! - **Message ID**: 1 byte
//! - **Payload**: Variable length
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | CHOKE | none |
//! | 1 | UNCHOKE | none |
//! | 2 | INTERESTED | none |
//! | 3 | NOT INTERESTED | none |
//! | 4 | HAVE | piece index |
//! | 5 | BITFIELD | bitfield |
//! | 6 | REQUEST | index, begin, length |
//! | 7 | PIECE | index, begin, block |
//! | 8 | CANCEL | index, begin, length |
//!
//! A length prefix of 0 is a keep-alive: no ID, no payload.

use crate::error::{Error, Result};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::io::{Cursor, Read, Write};

pub type MessageId = u8;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
pub const MESSAGE_CANCEL: MessageId = 8;

/// Length of a PIECE header after the length prefix: id, index, begin.
pub const PIECE_HEADER_LEN: usize = 9;

// Upper bound on any message we accept (a block is at most 128KB in practice)
pub const MAX_MESSAGE_LEN: u32 = 1 << 21;

/// Display name of a message id, for logs and errors.
pub fn message_name(id: MessageId) -> &'static str {
    match id {
        MESSAGE_CHOKE => "CHOKE",
        MESSAGE_UNCHOKE => "UNCHOKE",
        MESSAGE_INTERESTED => "INTERESTED",
        MESSAGE_NOT_INTERESTED => "NOT_INTERESTED",
        MESSAGE_HAVE => "HAVE",
        MESSAGE_BITFIELD => "BITFIELD",
        MESSAGE_REQUEST => "REQUEST",
        MESSAGE_PIECE => "PIECE",
        MESSAGE_CANCEL => "CANCEL",
        _ => "UNKNOWN",
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a new message without payload.
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    pub fn new_with_payload(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    /// REQUEST for `length` bytes at `begin` within piece `index`.
    pub fn request(index: u32, begin: u32, length: u32) -> Result<Self> {
        let mut payload = Vec::with_capacity(12);
        payload.write_u32::<BigEndian>(index)?;
        payload.write_u32::<BigEndian>(begin)?;
        payload.write_u32::<BigEndian>(length)?;
        Ok(Message::new_with_payload(MESSAGE_REQUEST, payload))
    }

    /// Serialize message with its length prefix.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let message_len = 1 + self.payload.len();

        let mut serialized = Vec::with_capacity(4 + message_len);
        serialized.write_u32::<BigEndian>(message_len as u32)?;
        serialized.push(self.id);
        serialized.extend_from_slice(&self.payload);

        Ok(serialized)
    }

    /// Parse the `(index, begin, length)` triple of a REQUEST or CANCEL.
    pub fn parse_request(&self) -> Result<(u32, u32, u32)> {
        if self.payload.len() != 12 {
            return Err(Error::ProtocolViolation(format!(
                "{} payload of {} bytes",
                message_name(self.id),
                self.payload.len()
            )));
        }
        let mut cursor = Cursor::new(&self.payload);
        Ok((
            cursor.read_u32::<BigEndian>()?,
            cursor.read_u32::<BigEndian>()?,
            cursor.read_u32::<BigEndian>()?,
        ))
    }
}

/// Read the 4-byte length prefix of the next message.
pub fn read_message_len<R: Read>(reader: &mut R) -> Result<u32> {
    let message_len = reader.read_u32::<BigEndian>()?;
    if message_len > MAX_MESSAGE_LEN {
        return Err(Error::ProtocolViolation(format!(
            "message length {} exceeds {}",
            message_len, MAX_MESSAGE_LEN
        )));
    }
    Ok(message_len)
}

/// Read one message. Keep-alives are returned as `None`.
///
/// The body is read into a buffer sized from the length prefix.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<Message>> {
    let message_len = read_message_len(reader)?;
    if message_len == 0 {
        return Ok(None);
    }

    let mut message_buf = vec![0; message_len as usize];
    reader.read_exact(&mut message_buf)?;

    let payload = message_buf.split_off(1);
    Ok(Some(Message::new_with_payload(message_buf[0], payload)))
}

/// Write one message.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    writer.write_all(&message.serialize()?)?;
    Ok(())
}
