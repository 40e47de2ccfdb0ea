//! # Piece Work Tickets
//!
//! A torrent is split into pieces, the unit of hash verification. The
//! coordinator turns every piece into a `PieceWork` ticket that circulates
//! through the work channel until some worker downloads and verifies it,
//! at which point a `PieceResult` travels back on the result channel.
//!
//! `PieceProgress` is the transient state a worker keeps while pulling one
//! piece over one connection: the assembly buffer and the request pipeline
//! counters.

/// An immutable work ticket for one piece.
#[derive(Debug, Clone)]
pub struct PieceWork {
    /// Zero-based index of the piece in the torrent
    pub index: u32,
    /// Expected SHA-1 hash of the piece
    pub hash: [u8; 20],
    /// Length of the piece in bytes
    pub length: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }
}

/// A downloaded and hash-verified piece.
#[derive(Debug, Clone)]
pub struct PieceResult {
    /// Zero-based index of the piece in the torrent
    pub index: u32,
    /// Verified piece data
    pub data: Vec<u8>,
}

/// Download state for one piece on one connection.
#[derive(Debug)]
pub struct PieceProgress {
    /// Assembly buffer, sized to the piece length
    pub buf: Vec<u8>,
    /// Bytes received so far
    pub downloaded: u32,
    /// Bytes requested so far
    pub requested: u32,
    /// Outstanding requests not yet answered
    pub backlog: u32,
}

impl PieceProgress {
    /// Start tracking a piece of `length` bytes.
    pub fn new(length: u32) -> PieceProgress {
        PieceProgress {
            buf: vec![0; length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_starts_zeroed() {
        let progress = PieceProgress::new(1024);
        assert_eq!(progress.buf, vec![0; 1024]);
        assert_eq!(progress.downloaded, 0);
        assert_eq!(progress.requested, 0);
        assert_eq!(progress.backlog, 0);
    }
}
