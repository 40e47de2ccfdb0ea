//! # Tracker Client
//!
//! The tracker is the rendezvous point of the swarm. One HTTP GET of the
//! announce URL, parameterized with the torrent identity and our transfer
//! state, returns a bencoded response carrying the peer list in compact
//! form.
//!
//! The `info_hash` and `peer_id` parameters are raw 20-byte values, so they
//! are percent-encoded byte by byte rather than as UTF-8 text.

use crate::peer::{self, Peer};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_bencode::de;
use serde_bytes::ByteBuf;
use url::Url;

use std::time::Duration;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, Serialize)]
struct BencodeTrackerResponse {
    // Seconds to wait before refreshing the peer list
    #[serde(default)]
    interval: u32,
    // Compact peer list, 6 bytes per peer
    peers: ByteBuf,
}

/// Ask the tracker for peers.
///
/// Announces our presence with zero progress and the full length left to
/// download, and decodes the compact peer list from the response. An empty
/// swarm is an error, there is nobody to download from.
pub fn request_peers(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    length: u32,
) -> Result<Vec<Peer>> {
    let tracker_url = build_tracker_url(announce, info_hash, peer_id, port, length)?;

    debug!("Announcing to tracker {}", announce);

    let client = match reqwest::blocking::Client::builder()
        .timeout(TRACKER_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(_) => return Err(anyhow!("could not build tracker client")),
    };

    let response = match client.get(&tracker_url).send() {
        Ok(response) => match response.bytes() {
            Ok(bytes) => bytes,
            Err(_) => return Err(anyhow!("could not read tracker response")),
        },
        Err(_) => return Err(anyhow!("could not contact tracker")),
    };

    let tracker = match de::from_bytes::<BencodeTrackerResponse>(&response) {
        Ok(tracker) => tracker,
        Err(_) => return Err(anyhow!("could not decode tracker response")),
    };

    debug!("Tracker refresh interval is {}s", tracker.interval);

    let peers = peer::unmarshal_peers(&tracker.peers)?;
    if peers.is_empty() {
        return Err(anyhow!("tracker returned no peers"));
    }

    info!("Tracker returned {} peers", peers.len());

    Ok(peers)
}

/// Build the announce URL with our transfer parameters.
fn build_tracker_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    length: u32,
) -> Result<String> {
    let base_url = match Url::parse(announce) {
        Ok(url) => url,
        Err(_) => return Err(anyhow!("could not parse tracker url")),
    };

    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        length
    );

    let mut url = base_url.to_string();
    if url.contains('?') {
        url.push('&');
    } else {
        url.push('?');
    }
    url.push_str(&query);

    Ok(url)
}

/// Percent-encode raw bytes, one %XX escape per byte.
fn percent_encode_binary(data: &[u8]) -> String {
    const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(data.len() * 3);

    for &byte in data {
        encoded.push('%');
        encoded.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        encoded.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }

    encoded
}
