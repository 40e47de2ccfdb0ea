//! # Remora BitTorrent Client
//!
//! A leeching BitTorrent client for single-file torrents.
//!
//! ## Architecture
//!
//! The download runs as a swarm of independent peer workers coordinated
//! over channels:
//!
//! - **Coordinator**: seeds a work queue with one ticket per piece, collects
//!   verified pieces from a result channel and assembles the file in memory
//! - **Worker threads**: one per peer, each owning a single TCP connection
//! - **Channels**: crossbeam channels carry piece work tickets and results
//!
//! Pieces are downloaded in 16 KiB blocks with up to five requests in
//! flight per peer, verified against their SHA-1 hashes, and written to the
//! output buffer at their piece offset. A piece that fails on one peer is
//! put back on the work queue for another peer to pick up.

#[macro_use]
extern crate log;

pub mod bitfield;
pub mod client;
pub mod handshake;
pub mod message;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod torrent;
pub mod tracker;
pub mod worker;
