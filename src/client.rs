//! # Peer Connection
//!
//! One `Client` owns one TCP connection to one remote peer and carries the
//! session state that matters for downloading: the peer's bitfield and
//! whether the peer currently chokes us.
//!
//! ## Connection Establishment
//!
//! 1. Dial the peer with a 3 second connect timeout
//! 2. Exchange handshakes under a 3 second socket deadline and verify the
//!    remote info hash
//! 3. Read exactly one message under a 5 second socket deadline and require
//!    it to be the peer's bitfield
//!
//! Any failure drops the connection. A fresh session always starts choked;
//! requests may only be pipelined once the peer sends `unchoke`.
//!
//! ## Deadlines
//!
//! Socket deadlines are scoped: set before a bounded exchange and cleared
//! once it completes. The piece downloader installs its own 30 second
//! deadline around each piece transfer.

use crate::bitfield::Bitfield;
use crate::handshake::{deserialize_handshake, Handshake};
use crate::message::*;
use crate::peer::Peer;

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);

/// An established session with a remote peer.
pub struct Client {
    /// Endpoint of the remote peer
    peer: Peer,
    /// TCP stream to the peer
    conn: TcpStream,
    /// Pieces the peer claims to have
    bitfield: Bitfield,
    /// Whether the peer currently chokes us
    choked: bool,
}

impl Client {
    /// Open a session with a peer.
    ///
    /// Dials the endpoint, exchanges handshakes and reads the mandatory
    /// bitfield message. Returns an error if any step fails or times out,
    /// or if the remote handshake carries a different info hash.
    pub fn start(peer: Peer, peer_id: [u8; 20], info_hash: [u8; 20]) -> Result<Client> {
        let conn = match TcpStream::connect_timeout(&peer.socket_addr(), CONNECT_TIMEOUT) {
            Ok(conn) => conn,
            Err(_) => return Err(anyhow!("could not connect to peer {}", peer)),
        };

        let mut client = Client {
            peer,
            conn,
            bitfield: Bitfield::default(),
            choked: true,
        };

        client.exchange_handshake(info_hash, peer_id)?;
        client.recv_bitfield()?;

        info!("Established session with peer {}", client.peer);

        Ok(client)
    }

    /// Whether the peer currently chokes us.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Record a `choke` from the peer.
    pub fn read_choke(&mut self) {
        debug!("Receive choke from peer {}", self.peer);
        self.choked = true
    }

    /// Record an `unchoke` from the peer.
    pub fn read_unchoke(&mut self) {
        debug!("Receive unchoke from peer {}", self.peer);
        self.choked = false
    }

    /// Check whether the peer has a piece.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has_piece(index)
    }

    /// Record a piece the peer announced with `have`.
    pub fn record_have(&mut self, index: u32) {
        self.bitfield.set_piece(index);
    }

    /// Set or clear the read and write timeouts on the connection.
    pub fn set_connection_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        if self.conn.set_write_timeout(timeout).is_err() {
            return Err(anyhow!("could not set write timeout"));
        }
        if self.conn.set_read_timeout(timeout).is_err() {
            return Err(anyhow!("could not set read timeout"));
        }

        Ok(())
    }

    /// Send our handshake and validate the peer's reply.
    ///
    /// The whole exchange runs under the handshake deadline, cleared on
    /// success. A remote info hash different from ours is fatal for the
    /// connection.
    fn exchange_handshake(&mut self, info_hash: [u8; 20], peer_id: [u8; 20]) -> Result<()> {
        self.set_connection_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let handshake = Handshake::new(info_hash, peer_id);
        if self.conn.write_all(&handshake.serialize()).is_err() {
            return Err(anyhow!("could not send handshake to peer"));
        }

        let pstrlen = self.read_handshake_len()?;
        let mut handshake_buf: Vec<u8> = vec![0; 48 + pstrlen];
        if self.conn.read_exact(&mut handshake_buf).is_err() {
            return Err(anyhow!("could not read handshake received from peer"));
        }

        let remote = deserialize_handshake(&handshake_buf, pstrlen)?;
        if remote.info_hash != info_hash {
            return Err(anyhow!("peer {} serves a different torrent", self.peer));
        }

        self.set_connection_timeout(None)?;

        debug!("Completed handshake with peer {}", self.peer);

        Ok(())
    }

    /// Read the first byte of the peer's handshake, its protocol string
    /// length. A zero length is invalid.
    fn read_handshake_len(&mut self) -> Result<usize> {
        let mut buf = [0; 1];
        if self.conn.read_exact(&mut buf).is_err() {
            return Err(anyhow!(
                "could not read handshake length received from peer"
            ));
        }

        let pstrlen = buf[0];
        if pstrlen == 0 {
            return Err(anyhow!("invalid handshake length received from peer"));
        }

        Ok(pstrlen as usize)
    }

    /// Read the mandatory bitfield that opens the session.
    ///
    /// Exactly one message is read under the bitfield deadline; anything
    /// other than a `bitfield` message, keep-alives included, is an error.
    fn recv_bitfield(&mut self) -> Result<()> {
        self.set_connection_timeout(Some(BITFIELD_TIMEOUT))?;

        let message = self.recv()?;
        if message.id != MESSAGE_BITFIELD {
            return Err(anyhow!(
                "expected bitfield from peer but got message id {}",
                message.id
            ));
        }
        self.bitfield = Bitfield::new(message.payload);

        self.set_connection_timeout(None)?;

        Ok(())
    }

    /// Read one message from the peer, blocking until it is complete.
    ///
    /// Keep-alives come back with the keep-alive sentinel id; the caller
    /// discards them.
    pub fn recv(&mut self) -> Result<Message> {
        let message_len = self.read_message_len()?;

        if message_len == 0 {
            debug!("Receive keep-alive from peer {}", self.peer);
            return Ok(Message::new(MESSAGE_KEEPALIVE));
        }

        let mut message_buf: Vec<u8> = vec![0; message_len];
        if self.conn.read_exact(&mut message_buf).is_err() {
            return Err(anyhow!("could not read message received from peer"));
        }

        deserialize_message(&message_buf)
    }

    /// Read the 4-byte big-endian length prefix of an incoming message.
    fn read_message_len(&mut self) -> Result<usize> {
        let mut buf = [0; 4];
        if self.conn.read_exact(&mut buf).is_err() {
            return Err(anyhow!("could not read message length received from peer"));
        }

        let mut cursor = Cursor::new(buf);
        let message_len = cursor.read_u32::<BigEndian>()?;

        Ok(message_len as usize)
    }

    /// Serialize and send a message to the peer.
    fn send_message(&mut self, message: Message) -> Result<()> {
        let serialized = message.serialize()?;
        if self.conn.write_all(&serialized).is_err() {
            return Err(anyhow!("could not send message to peer"));
        }

        Ok(())
    }

    /// Tell the peer we will answer its requests.
    pub fn send_unchoke(&mut self) -> Result<()> {
        debug!("Send unchoke to peer {}", self.peer);
        self.send_message(Message::new(MESSAGE_UNCHOKE))
    }

    /// Tell the peer we want pieces it has.
    pub fn send_interested(&mut self) -> Result<()> {
        debug!("Send interested to peer {}", self.peer);
        self.send_message(Message::new(MESSAGE_INTERESTED))
    }

    /// Announce a piece we now hold.
    pub fn send_have(&mut self, index: u32) -> Result<()> {
        let mut payload: Vec<u8> = vec![];
        payload.write_u32::<BigEndian>(index)?;

        debug!("Send have for piece {} to peer {}", index, self.peer);
        self.send_message(Message::new_with_payload(MESSAGE_HAVE, payload))
    }

    /// Request a block of a piece.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        let mut payload: Vec<u8> = vec![];
        payload.write_u32::<BigEndian>(index)?;
        payload.write_u32::<BigEndian>(begin)?;
        payload.write_u32::<BigEndian>(length)?;

        debug!(
            "Send request for piece {} [{}:{}] to peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        self.send_message(Message::new_with_payload(MESSAGE_REQUEST, payload))
    }
}
