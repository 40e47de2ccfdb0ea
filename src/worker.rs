//! # Peer Download Worker
//!
//! One worker per peer. A worker opens a session with its peer, then loops
//! on the work channel: take a piece ticket, download the piece over the
//! session, verify it and ship the result to the coordinator.
//!
//! ## Failure discipline
//!
//! The ticket in hand is always put back on the work channel before the
//! worker gives up on it, so another peer can fetch the piece:
//!
//! - Peer lacks the piece: requeue, take the next ticket
//! - Hash mismatch: requeue, keep the connection, take the next ticket
//! - I/O error mid-piece: requeue, drop the connection, exit
//!
//! A worker that cannot establish a session exits without touching the
//! work channel.
//!
//! ## Pipelining
//!
//! Blocks are requested 16 KiB at a time with up to 5 requests in flight.
//! One request per round trip starves the connection and too many
//! outstanding requests exhaust peer buffers, so the pipeline is capped.
//! Each piece transfer runs under a 30 second socket deadline to shake off
//! unresponsive peers.

use crate::client::Client;
use crate::message::*;
use crate::peer::Peer;
use crate::piece::{PieceProgress, PieceResult, PieceWork};

use anyhow::{anyhow, Result};
use boring::sha::Sha1;
use crossbeam_channel::{Receiver, Sender};

use std::cmp;
use std::time::Duration;

// Maximum number of unanswered block requests kept in flight per peer
const MAX_BACKLOG: u32 = 5;

// Largest number of bytes a single block request asks for (16 KiB)
const MAX_BLOCK_SIZE: u32 = 16384;

// Socket deadline covering one whole piece transfer
const PIECE_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads pieces from a single peer.
pub struct Worker {
    /// Endpoint of the remote peer
    peer: Peer,
    /// Our identity for the handshake
    peer_id: [u8; 20],
    /// Identity of the torrent being downloaded
    info_hash: [u8; 20],
    /// Producer side of the work channel, used to requeue tickets
    work_tx: Sender<PieceWork>,
    /// Consumer side of the work channel
    work_rx: Receiver<PieceWork>,
    /// Producer side of the result channel
    result_tx: Sender<PieceResult>,
}

impl Worker {
    /// Build a worker for one peer.
    pub fn new(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        work_tx: Sender<PieceWork>,
        work_rx: Receiver<PieceWork>,
        result_tx: Sender<PieceResult>,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            work_tx,
            work_rx,
            result_tx,
        }
    }

    /// Run the worker until the work channel closes or the peer fails.
    pub fn run(&self) {
        let mut client = match Client::start(self.peer, self.peer_id, self.info_hash) {
            Ok(client) => client,
            Err(error) => {
                debug!("Dropping peer {}: {}", self.peer, error);
                return;
            }
        };

        if client.send_unchoke().is_err() {
            return;
        }
        if client.send_interested().is_err() {
            return;
        }

        while let Ok(piece_work) = self.work_rx.recv() {
            if !client.has_piece(piece_work.index) {
                if self.requeue(piece_work).is_err() {
                    return;
                }
                continue;
            }

            let buf = match self.download_piece(&mut client, &piece_work) {
                Ok(buf) => buf,
                Err(error) => {
                    warn!("Disconnecting from peer {}: {}", self.peer, error);
                    let _ = self.requeue(piece_work);
                    return;
                }
            };

            if let Err(error) = verify_piece(&piece_work, &buf) {
                warn!("{}, retrying on another peer", error);
                if self.requeue(piece_work).is_err() {
                    return;
                }
                continue;
            }

            if client.send_have(piece_work.index).is_err() {
                debug!("Could not announce piece {} to peer {}", piece_work.index, self.peer);
            }

            let piece_result = PieceResult {
                index: piece_work.index,
                data: buf,
            };
            if self.result_tx.send(piece_result).is_err() {
                error!("Could not send piece to result channel");
                return;
            }
        }

        info!("Worker for peer {} exiting: no work left", self.peer);
    }

    /// Put a ticket back on the work channel.
    fn requeue(&self, piece_work: PieceWork) -> Result<()> {
        if self.work_tx.send(piece_work).is_err() {
            error!("Could not requeue piece to work channel");
            return Err(anyhow!("work channel closed"));
        }

        Ok(())
    }

    /// Download one piece over the session.
    ///
    /// Keeps the request pipeline full while the peer leaves us unchoked
    /// and reads messages until every byte of the piece has arrived. Any
    /// read or write failure aborts the transfer.
    fn download_piece(&self, client: &mut Client, piece_work: &PieceWork) -> Result<Vec<u8>> {
        client.set_connection_timeout(Some(PIECE_TIMEOUT))?;

        let mut progress = PieceProgress::new(piece_work.length);

        while progress.downloaded < piece_work.length {
            if !client.is_choked() {
                while progress.backlog < MAX_BACKLOG && progress.requested < piece_work.length {
                    let block_size =
                        cmp::min(MAX_BLOCK_SIZE, piece_work.length - progress.requested);

                    client.send_request(piece_work.index, progress.requested, block_size)?;

                    progress.backlog += 1;
                    progress.requested += block_size;
                }
            }

            self.read_piece_message(client, piece_work, &mut progress)?;
        }

        client.set_connection_timeout(None)?;

        debug!("Downloaded piece {} from peer {}", piece_work.index, self.peer);

        Ok(progress.buf)
    }

    /// Read one message during a piece transfer and fold it into the
    /// download state. Unknown ids and keep-alives are ignored.
    fn read_piece_message(
        &self,
        client: &mut Client,
        piece_work: &PieceWork,
        progress: &mut PieceProgress,
    ) -> Result<()> {
        let message = client.recv()?;

        match message.id {
            MESSAGE_CHOKE => client.read_choke(),
            MESSAGE_UNCHOKE => client.read_unchoke(),
            MESSAGE_HAVE => {
                // The peer keeps announcing pieces while we download, track
                // them for later tickets.
                let index = parse_have(&message)?;
                client.record_have(index);
            }
            MESSAGE_PIECE => {
                let n = parse_piece(piece_work.index, &mut progress.buf, &message)?;
                progress.downloaded += n;
                progress.backlog = progress.backlog.saturating_sub(1);
            }
            MESSAGE_KEEPALIVE => {}
            _ => debug!(
                "Ignoring message id {} from peer {}",
                message.id, self.peer
            ),
        }

        Ok(())
    }
}

/// Check a downloaded piece against its expected hash.
fn verify_piece(piece_work: &PieceWork, buf: &[u8]) -> Result<()> {
    let mut hasher = Sha1::new();
    hasher.update(buf);
    let hash = hasher.finish();

    if hash != piece_work.hash {
        return Err(anyhow!("piece {} failed integrity check", piece_work.index));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_piece_accepts_matching_hash() {
        let buf = vec![0xAB; 512];
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        let piece_work = PieceWork::new(0, hasher.finish(), 512);

        assert!(verify_piece(&piece_work, &buf).is_ok());
    }

    #[test]
    fn verify_piece_rejects_corrupted_data() {
        let buf = vec![0xAB; 512];
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        let piece_work = PieceWork::new(0, hasher.finish(), 512);

        let mut corrupted = buf.clone();
        corrupted[100] ^= 0xFF;
        assert!(verify_piece(&piece_work, &corrupted).is_err());
    }
}
