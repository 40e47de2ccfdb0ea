//! # Swarm Coordinator
//!
//! `Torrent` is the input to the download engine: the torrent identity, the
//! piece table and the peers to pull from. `Torrent::download` fans the
//! pieces out over the swarm and assembles the file in memory.
//!
//! ## Work distribution
//!
//! The coordinator seeds a bounded work channel with one ticket per piece
//! and spawns one worker thread per peer. Workers take tickets, download
//! and verify the piece, and send the bytes back on a result channel.
//! Tickets for pieces a worker cannot deliver go back on the work channel,
//! so every piece is eventually fetched as long as some connected peer has
//! it.
//!
//! The work channel capacity equals the piece count. Every ticket exists
//! exactly once, in the channel or held by a worker, so a requeue can never
//! block.
//!
//! ## Assembly
//!
//! Pieces complete in no particular order. The coordinator owns the output
//! buffer exclusively and writes each result at its piece offset, so no
//! ordering across workers is needed. The download is complete when as many
//! results arrived as there are pieces.

use crate::peer::Peer;
use crate::piece::{PieceResult, PieceWork};
use crate::worker::Worker;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;

use std::thread;

/// Port reported to trackers. The client never accepts inbound connections.
pub const CLIENT_PORT: u16 = 6881;

/// Everything the download engine needs to fetch one single-file torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Peers to download from
    pub peers: Vec<Peer>,
    /// Our identity in the swarm
    pub peer_id: [u8; 20],
    /// SHA-1 hash of the bencoded info dictionary
    pub info_hash: [u8; 20],
    /// Expected SHA-1 hash of every piece
    pub piece_hashes: Vec<[u8; 20]>,
    /// Nominal piece length in bytes; the last piece may be shorter
    pub piece_length: u32,
    /// Total file length in bytes
    pub length: u32,
    /// Suggested filename from the torrent metadata
    pub name: String,
}

impl Torrent {
    /// Download the whole file from the swarm.
    ///
    /// Spawns one worker per peer and blocks until every piece has been
    /// received and verified. Returns the assembled file, or an error if
    /// every worker died before the download completed.
    pub fn download(&self) -> Result<Vec<u8>> {
        let nb_pieces = self.piece_hashes.len();

        info!("Downloading {:?} ({} pieces)", self.name, nb_pieces);

        let (work_tx, work_rx) = bounded::<PieceWork>(nb_pieces);
        let (result_tx, result_rx) = unbounded::<PieceResult>();

        for (index, hash) in self.piece_hashes.iter().enumerate() {
            let index = index as u32;
            let piece_work = PieceWork::new(index, *hash, self.piece_length_at(index));

            if work_tx.send(piece_work).is_err() {
                return Err(anyhow!("could not seed work channel"));
            }
        }

        for peer in &self.peers {
            let worker = Worker::new(
                *peer,
                self.peer_id,
                self.info_hash,
                work_tx.clone(),
                work_rx.clone(),
                result_tx.clone(),
            );

            thread::spawn(move || worker.run());
        }

        // Only workers keep the channels open now. When the last worker
        // dies the result channel disconnects and the receive below turns
        // into an error instead of blocking forever.
        drop(work_tx);
        drop(work_rx);
        drop(result_tx);

        let pb = ProgressBar::new(self.length as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")?
                .progress_chars("#>-"),
        );

        let mut data: Vec<u8> = vec![0; self.length as usize];
        let mut nb_pieces_done = 0;

        while nb_pieces_done < nb_pieces {
            let piece_result = match result_rx.recv() {
                Ok(piece_result) => piece_result,
                Err(_) => return Err(anyhow!("all peers failed before the download completed")),
            };

            let begin = self.piece_offset(piece_result.index);
            let end = begin + piece_result.data.len();
            data[begin..end].copy_from_slice(&piece_result.data);

            pb.inc(piece_result.data.len() as u64);
            nb_pieces_done += 1;

            debug!(
                "Assembled piece {} ({}/{} pieces)",
                piece_result.index, nb_pieces_done, nb_pieces
            );
        }

        pb.finish_and_clear();

        Ok(data)
    }

    /// Length in bytes of the piece at `index`.
    ///
    /// Every piece has the nominal length except the last one, which covers
    /// whatever remains of the file.
    pub fn piece_length_at(&self, index: u32) -> u32 {
        let nb_pieces = self.piece_hashes.len() as u32;

        if index + 1 == nb_pieces {
            self.length - (nb_pieces - 1) * self.piece_length
        } else {
            self.piece_length
        }
    }

    /// Byte offset of the piece at `index` within the file.
    pub fn piece_offset(&self, index: u32) -> usize {
        index as usize * self.piece_length as usize
    }
}

/// Generate a random 20-byte peer identity for this run.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let mut rng = rand::thread_rng();
    for x in peer_id.iter_mut() {
        *x = rng.gen();
    }

    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent_with_pieces(nb_pieces: usize, piece_length: u32, length: u32) -> Torrent {
        Torrent {
            peers: vec![],
            peer_id: [0; 20],
            info_hash: [0; 20],
            piece_hashes: vec![[0; 20]; nb_pieces],
            piece_length,
            length,
            name: "fixture".to_string(),
        }
    }

    #[test]
    fn piece_lengths_with_short_last_piece() {
        let torrent = torrent_with_pieces(3, 16384, 16384 * 2 + 100);

        assert_eq!(torrent.piece_length_at(0), 16384);
        assert_eq!(torrent.piece_length_at(1), 16384);
        assert_eq!(torrent.piece_length_at(2), 100);
    }

    #[test]
    fn piece_lengths_with_exact_multiple() {
        let torrent = torrent_with_pieces(2, 16384, 16384 * 2);

        assert_eq!(torrent.piece_length_at(0), 16384);
        assert_eq!(torrent.piece_length_at(1), 16384);
    }

    #[test]
    fn single_piece_covers_whole_file() {
        // A lone piece spans the full file even past the nominal length.
        let torrent = torrent_with_pieces(1, 16384, 20000);

        assert_eq!(torrent.piece_length_at(0), 20000);
    }

    #[test]
    fn piece_offsets_are_positional() {
        let torrent = torrent_with_pieces(3, 16384, 16384 * 2 + 100);

        assert_eq!(torrent.piece_offset(0), 0);
        assert_eq!(torrent.piece_offset(1), 16384);
        assert_eq!(torrent.piece_offset(2), 32768);
    }

    #[test]
    fn peer_ids_are_20_bytes_and_vary() {
        let first = generate_peer_id();
        let second = generate_peer_id();

        assert_eq!(first.len(), 20);
        assert_ne!(first, second);
    }
}
