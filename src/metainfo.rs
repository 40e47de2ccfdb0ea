//! # Torrent Metainfo
//!
//! A `.torrent` file is a bencoded dictionary describing the download:
//!
//! - **announce**: tracker URL for peer discovery
//! - **info**: file name, length, piece length and the concatenated
//!   20-byte SHA-1 hashes of every piece
//!
//! The SHA-1 of the bencoded `info` dictionary is the info hash, the value
//! that identifies the torrent to trackers and peers. Only single-file
//! torrents are supported.

use anyhow::{anyhow, Result};
use boring::sha::Sha1;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;

use std::fs::File;
use std::io::Read;
use std::path::Path;

const SHA1_HASH_SIZE: usize = 20;

/// Parsed metadata of a single-file torrent.
#[derive(Debug, Clone)]
pub struct TorrentFile {
    /// Tracker URL
    pub announce: String,
    /// SHA-1 hash of the bencoded info dictionary
    pub info_hash: [u8; 20],
    /// SHA-1 hash of every piece, in piece order
    pub piece_hashes: Vec<[u8; 20]>,
    /// Nominal piece length in bytes
    pub piece_length: u32,
    /// Total file length in bytes
    pub length: u32,
    /// Suggested filename
    pub name: String,
}

#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    // Concatenation of all 20-byte SHA-1 piece hashes
    #[serde(rename = "pieces")]
    pieces: ByteBuf,
    // Size of each piece in bytes
    #[serde(rename = "piece length")]
    piece_length: u32,
    // Size of the file in bytes
    #[serde(rename = "length")]
    length: u32,
    // Suggested filename where to save the file
    #[serde(rename = "name")]
    name: String,
}

#[derive(Deserialize, Serialize)]
struct BencodeTorrent {
    // URL of the tracker
    #[serde(default)]
    announce: String,
    // Informations about the file
    info: BencodeInfo,
}

impl BencodeInfo {
    /// Hash the bencoded info dictionary to identify the torrent.
    fn hash(&self) -> Result<[u8; 20]> {
        let buf: Vec<u8> = ser::to_bytes::<BencodeInfo>(self)?;

        let mut hasher = Sha1::new();
        hasher.update(&buf);

        Ok(hasher.finish())
    }

    /// Split the concatenated piece hashes into one hash per piece.
    fn split_piece_hashes(&self) -> Result<Vec<[u8; 20]>> {
        if !self.pieces.len().is_multiple_of(SHA1_HASH_SIZE) {
            return Err(anyhow!("torrent has a malformed piece hash table"));
        }

        let mut hashes: Vec<[u8; 20]> = Vec::with_capacity(self.pieces.len() / SHA1_HASH_SIZE);
        for chunk in self.pieces.chunks_exact(SHA1_HASH_SIZE) {
            let mut hash = [0u8; SHA1_HASH_SIZE];
            hash.copy_from_slice(chunk);
            hashes.push(hash);
        }

        Ok(hashes)
    }
}

impl TorrentFile {
    /// Parse a torrent from a file on disk.
    pub fn open(path: &Path) -> Result<TorrentFile> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return Err(anyhow!("could not open torrent")),
        };

        let mut buf = vec![];
        if file.read_to_end(&mut buf).is_err() {
            return Err(anyhow!("could not read torrent"));
        }

        TorrentFile::from_bytes(&buf)
    }

    /// Parse a torrent from its raw bencoded bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<TorrentFile> {
        let bencode = match de::from_bytes::<BencodeTorrent>(buf) {
            Ok(bencode) => bencode,
            Err(_) => return Err(anyhow!("could not decode torrent")),
        };

        if bencode.announce.is_empty() {
            return Err(anyhow!("torrent has no announce URL"));
        }

        Ok(TorrentFile {
            announce: bencode.announce.to_owned(),
            info_hash: bencode.info.hash()?,
            piece_hashes: bencode.info.split_piece_hashes()?,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_bytes(pieces: Vec<u8>) -> Vec<u8> {
        let bencode = BencodeTorrent {
            announce: "http://tracker.example/announce".to_string(),
            info: BencodeInfo {
                pieces: ByteBuf::from(pieces),
                piece_length: 16384,
                length: 20000,
                name: "fixture.bin".to_string(),
            },
        };
        ser::to_bytes(&bencode).unwrap()
    }

    #[test]
    fn parses_single_file_torrent() {
        let torrent = TorrentFile::from_bytes(&fixture_bytes(vec![0xAB; 40])).unwrap();

        assert_eq!(torrent.announce, "http://tracker.example/announce");
        assert_eq!(torrent.piece_hashes, vec![[0xAB; 20]; 2]);
        assert_eq!(torrent.piece_length, 16384);
        assert_eq!(torrent.length, 20000);
        assert_eq!(torrent.name, "fixture.bin");
    }

    #[test]
    fn info_hash_covers_bencoded_info_dictionary() {
        let torrent = TorrentFile::from_bytes(&fixture_bytes(vec![0xAB; 20])).unwrap();

        let info = BencodeInfo {
            pieces: ByteBuf::from(vec![0xAB; 20]),
            piece_length: 16384,
            length: 20000,
            name: "fixture.bin".to_string(),
        };
        let mut hasher = Sha1::new();
        hasher.update(&ser::to_bytes(&info).unwrap());

        assert_eq!(torrent.info_hash, hasher.finish());
    }

    #[test]
    fn rejects_ragged_piece_hash_table() {
        assert!(TorrentFile::from_bytes(&fixture_bytes(vec![0xAB; 30])).is_err());
    }

    #[test]
    fn rejects_missing_announce() {
        let bencode = BencodeTorrent {
            announce: String::new(),
            info: BencodeInfo {
                pieces: ByteBuf::from(vec![0xAB; 20]),
                piece_length: 16384,
                length: 20000,
                name: "fixture.bin".to_string(),
            },
        };
        let buf = ser::to_bytes(&bencode).unwrap();

        assert!(TorrentFile::from_bytes(&buf).is_err());
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(TorrentFile::from_bytes(b"not a torrent").is_err());
    }
}
