//! # BitTorrent Handshake
//!
//! The handshake is the fixed-format message both sides exchange immediately
//! after the TCP connection is established:
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte, length of the protocol string (19)
//! - **pstr**: protocol identifier, "BitTorrent protocol"
//! - **reserved**: 8 bytes, all zero
//! - **info_hash**: 20 bytes, SHA-1 of the bencoded info dictionary
//! - **peer_id**: 20 bytes, the sender's identity
//!
//! The info hash gates the whole connection: a remote handshake carrying a
//! different info hash means the peer is serving another torrent and the
//! connection must be dropped.

use anyhow::{anyhow, Result};

const PROTOCOL_ID: &str = "BitTorrent protocol";

/// A peer protocol handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier bytes ("BitTorrent protocol")
    pub pstr: Vec<u8>,
    /// SHA-1 hash of the torrent's info dictionary
    pub info_hash: [u8; 20],
    /// Identity of the sending peer
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Build a handshake for the standard protocol string.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        Handshake {
            pstr: PROTOCOL_ID.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }

    /// Serialize the handshake into its wire form.
    ///
    /// The result is `49 + pstrlen` bytes: the length byte, the protocol
    /// string, 8 zeroed reserved bytes, the info hash and the peer id.
    pub fn serialize(&self) -> Vec<u8> {
        let mut serialized: Vec<u8> = Vec::with_capacity(49 + self.pstr.len());

        serialized.push(self.pstr.len() as u8);
        serialized.extend_from_slice(&self.pstr);
        serialized.extend_from_slice(&[0; 8]);
        serialized.extend_from_slice(&self.info_hash);
        serialized.extend_from_slice(&self.peer_id);

        serialized
    }
}

/// Deserialize a handshake from the bytes following the length byte.
///
/// `buf` holds the `48 + pstrlen` bytes read after the initial length byte,
/// laid out as protocol string, reserved bytes, info hash and peer id.
/// Validation of the info hash is left to the caller.
pub fn deserialize_handshake(buf: &[u8], pstrlen: usize) -> Result<Handshake> {
    if buf.len() < pstrlen + 48 {
        return Err(anyhow!("received truncated handshake from peer"));
    }

    let pstr = buf[0..pstrlen].to_vec();
    let info_hash: [u8; 20] = buf[(pstrlen + 8)..(pstrlen + 28)].try_into()?;
    let peer_id: [u8; 20] = buf[(pstrlen + 28)..(pstrlen + 48)].try_into()?;

    Ok(Handshake {
        pstr,
        info_hash,
        peer_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_layout() {
        let handshake = Handshake::new([0xAB; 20], [0xCD; 20]);
        let serialized = handshake.serialize();

        assert_eq!(serialized.len(), 68);
        assert_eq!(serialized[0], 19);
        assert_eq!(&serialized[1..20], b"BitTorrent protocol");
        assert_eq!(&serialized[20..28], &[0; 8]);
        assert_eq!(&serialized[28..48], &[0xAB; 20]);
        assert_eq!(&serialized[48..68], &[0xCD; 20]);
    }

    #[test]
    fn deserialize_round_trips() {
        let handshake = Handshake::new([0x11; 20], [0x22; 20]);
        let serialized = handshake.serialize();

        let pstrlen = serialized[0] as usize;
        let decoded = deserialize_handshake(&serialized[1..], pstrlen).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn deserialize_rejects_truncated_buffer() {
        let handshake = Handshake::new([0x11; 20], [0x22; 20]);
        let serialized = handshake.serialize();

        assert!(deserialize_handshake(&serialized[1..40], 19).is_err());
    }
}
