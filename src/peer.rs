//! # Peer Endpoints
//!
//! Trackers return the swarm in a compact binary format, 6 bytes per peer:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are big-endian. This module decodes that format into the
//! `Peer` endpoints the download workers connect to.

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const COMPACT_PEER_SIZE: usize = 6;

/// A TCP endpoint of a peer in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    /// IPv4 address of the peer
    pub ip: Ipv4Addr,
    /// Port the peer listens on
    pub port: u16,
}

impl Peer {
    /// Return the socket address to dial.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Decode a compact peer list from a tracker response.
///
/// The buffer must be a whole number of 6-byte entries.
pub fn unmarshal_peers(buf: &[u8]) -> Result<Vec<Peer>> {
    if !buf.len().is_multiple_of(COMPACT_PEER_SIZE) {
        return Err(anyhow!("received invalid peers from tracker"));
    }

    let nb_peers = buf.len() / COMPACT_PEER_SIZE;
    let mut peers: Vec<Peer> = Vec::with_capacity(nb_peers);

    for i in 0..nb_peers {
        let offset = i * COMPACT_PEER_SIZE;

        let ip = Ipv4Addr::new(
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        );

        let mut port_cursor = Cursor::new(&buf[offset + 4..offset + 6]);
        let port = port_cursor.read_u16::<BigEndian>()?;

        peers.push(Peer { ip, port });
    }

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarshal_decodes_compact_entries() {
        let buf = vec![192, 168, 1, 1, 0x1A, 0xE1, 10, 0, 0, 2, 0x00, 0x50];
        let peers = unmarshal_peers(&buf).unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(peers[0].port, 6881);
        assert_eq!(peers[1].ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(peers[1].port, 80);
    }

    #[test]
    fn unmarshal_accepts_empty_list() {
        assert!(unmarshal_peers(&[]).unwrap().is_empty());
    }

    #[test]
    fn unmarshal_rejects_ragged_buffer() {
        let buf = vec![192, 168, 1, 1, 0x1A];
        assert!(unmarshal_peers(&buf).is_err());
    }
}
