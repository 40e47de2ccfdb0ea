//! # Peer Wire Messages
//!
//! Everything after the handshake is length-prefixed:
//!
//! ```text
//! <length: u32 big-endian><id: u8><payload>
//! ```
//!
//! A length of zero is a keep-alive with no id and no payload.
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | choke | none |
//! | 1 | unchoke | none |
//! | 2 | interested | none |
//! | 3 | not interested | none |
//! | 4 | have | piece index |
//! | 5 | bitfield | raw bitfield bytes |
//! | 6 | request | index, begin, length |
//! | 7 | piece | index, begin, block bytes |
//! | 8 | cancel | index, begin, length |

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::io::Cursor;

pub type MessageId = u8;
pub type MessagePayload = Vec<u8>;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
pub const MESSAGE_CANCEL: MessageId = 8;
// Sentinel for the zero-length keep-alive frame, which carries no id byte.
pub const MESSAGE_KEEPALIVE: MessageId = 255;

/// A peer wire message, tagged by id.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: MessagePayload,
}

impl Message {
    /// Build a message without a payload.
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    /// Build a message with a payload.
    pub fn new_with_payload(id: MessageId, payload: MessagePayload) -> Self {
        Message { id, payload }
    }

    /// Serialize the message into its length-prefixed wire form.
    ///
    /// A keep-alive serializes to the bare zero length prefix.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.id == MESSAGE_KEEPALIVE {
            return Ok(vec![0; 4]);
        }

        let message_len = 1 + self.payload.len();
        let mut serialized: Vec<u8> = Vec::with_capacity(4 + message_len);

        serialized.write_u32::<BigEndian>(message_len as u32)?;
        serialized.push(self.id);
        serialized.extend_from_slice(&self.payload);

        Ok(serialized)
    }
}

/// Deserialize the body of a message, the bytes following the length prefix.
///
/// An empty body is the keep-alive frame.
pub fn deserialize_message(message_buf: &[u8]) -> Result<Message> {
    if message_buf.is_empty() {
        return Ok(Message::new(MESSAGE_KEEPALIVE));
    }

    let id: MessageId = message_buf[0];
    let payload: MessagePayload = message_buf[1..].to_vec();

    Ok(Message::new_with_payload(id, payload))
}

/// Extract the piece index from a `have` message.
pub fn parse_have(message: &Message) -> Result<u32> {
    if message.id != MESSAGE_HAVE || message.payload.len() != 4 {
        return Err(anyhow!("received invalid have message from peer"));
    }

    let mut payload_cursor = Cursor::new(&message.payload);
    let index = payload_cursor.read_u32::<BigEndian>()?;

    Ok(index)
}

/// Copy the block carried by a `piece` message into a piece buffer.
///
/// The payload is the piece index, the byte offset of the block within the
/// piece, and the block itself. The message is rejected when its index does
/// not match `index` or when the block falls outside `buf`; nothing is
/// written in either case. Returns the number of bytes copied.
pub fn parse_piece(index: u32, buf: &mut [u8], message: &Message) -> Result<u32> {
    if message.id != MESSAGE_PIECE || message.payload.len() < 8 {
        return Err(anyhow!("received invalid piece message from peer"));
    }

    let mut payload_cursor = Cursor::new(&message.payload[0..8]);
    let piece_index = payload_cursor.read_u32::<BigEndian>()?;
    let begin = payload_cursor.read_u32::<BigEndian>()? as usize;

    if piece_index != index {
        return Err(anyhow!(
            "received block for piece {} while downloading piece {}",
            piece_index,
            index
        ));
    }

    let block = &message.payload[8..];
    if begin + block.len() > buf.len() {
        return Err(anyhow!("received block outside piece bounds from peer"));
    }

    buf[begin..begin + block.len()].copy_from_slice(block);

    Ok(block.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_layout() {
        let message = Message::new_with_payload(MESSAGE_HAVE, vec![0, 0, 0, 7]);
        let serialized = message.serialize().unwrap();
        assert_eq!(serialized, vec![0, 0, 0, 5, 4, 0, 0, 0, 7]);
    }

    #[test]
    fn serialize_deserialize_round_trips() {
        let messages = [
            Message::new(MESSAGE_CHOKE),
            Message::new(MESSAGE_UNCHOKE),
            Message::new(MESSAGE_INTERESTED),
            Message::new(MESSAGE_NOT_INTERESTED),
            Message::new_with_payload(MESSAGE_HAVE, vec![0, 0, 0, 1]),
            Message::new_with_payload(MESSAGE_BITFIELD, vec![0xC0, 0x01]),
            Message::new_with_payload(MESSAGE_REQUEST, vec![0; 12]),
            Message::new_with_payload(MESSAGE_PIECE, vec![0, 0, 0, 2, 0, 0, 0, 0, 0xAA]),
            Message::new_with_payload(MESSAGE_CANCEL, vec![0; 12]),
        ];

        for message in messages {
            let serialized = message.serialize().unwrap();
            let decoded = deserialize_message(&serialized[4..]).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn zero_length_frame_is_keepalive() {
        let keepalive = Message::new(MESSAGE_KEEPALIVE);
        let serialized = keepalive.serialize().unwrap();
        assert_eq!(serialized, vec![0; 4]);

        let decoded = deserialize_message(&[]).unwrap();
        assert_eq!(decoded.id, MESSAGE_KEEPALIVE);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn parse_have_extracts_index() {
        let message = Message::new_with_payload(MESSAGE_HAVE, vec![0, 0, 1, 2]);
        assert_eq!(parse_have(&message).unwrap(), 258);
    }

    #[test]
    fn parse_have_rejects_bad_payload() {
        let short = Message::new_with_payload(MESSAGE_HAVE, vec![0, 0, 1]);
        assert!(parse_have(&short).is_err());

        let long = Message::new_with_payload(MESSAGE_HAVE, vec![0, 0, 1, 2, 3]);
        assert!(parse_have(&long).is_err());

        let wrong_id = Message::new_with_payload(MESSAGE_PIECE, vec![0, 0, 1, 2]);
        assert!(parse_have(&wrong_id).is_err());
    }

    fn piece_message(index: u32, begin: u32, block: &[u8]) -> Message {
        let mut payload = Vec::new();
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(block);
        Message::new_with_payload(MESSAGE_PIECE, payload)
    }

    #[test]
    fn parse_piece_copies_block_at_offset() {
        let mut buf = vec![0; 10];
        let message = piece_message(4, 2, &[0xAA, 0xBB, 0xCC]);

        let n = parse_piece(4, &mut buf, &message).unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf, vec![0, 0, 0xAA, 0xBB, 0xCC, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn parse_piece_rejects_wrong_index() {
        let mut buf = vec![0; 10];
        let message = piece_message(5, 0, &[0xAA]);

        assert!(parse_piece(4, &mut buf, &message).is_err());
        assert_eq!(buf, vec![0; 10]);
    }

    #[test]
    fn parse_piece_rejects_block_past_piece_end() {
        let mut buf = vec![0; 10];
        let message = piece_message(4, 8, &[0xAA, 0xBB, 0xCC]);

        assert!(parse_piece(4, &mut buf, &message).is_err());
        assert_eq!(buf, vec![0; 10]);
    }

    #[test]
    fn parse_piece_rejects_truncated_payload() {
        let mut buf = vec![0; 10];
        let message = Message::new_with_payload(MESSAGE_PIECE, vec![0, 0, 0, 4]);

        assert!(parse_piece(4, &mut buf, &message).is_err());
    }
}
