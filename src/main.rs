use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;

use remora::metainfo::TorrentFile;
use remora::torrent::{self, Torrent};
use remora::tracker;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent client that downloads single-file torrents."
)]
struct Args {
    /// Path to the .torrent file
    torrent: String,

    /// Output filename (defaults to name from torrent)
    #[arg(short = 'o', long)]
    output: Option<String>,
}

/// Sanitize a filename to prevent path traversal and basic issues.
fn sanitize_filename(filename: &str) -> String {
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() {
        "download".to_string()
    } else {
        safe_name
    }
}

fn run(args: Args) -> Result<()> {
    if !Path::new(&args.torrent).exists() {
        return Err(anyhow!("could not find torrent file: {}", args.torrent));
    }

    let torrent_file = TorrentFile::open(Path::new(&args.torrent))?;

    // Determine output filename
    let default_filename = sanitize_filename(&torrent_file.name);
    let output_filename = args.output.as_deref().unwrap_or(&default_filename);
    let output_filepath = PathBuf::from(output_filename);

    // Ask before clobbering an existing file
    if output_filepath.exists() {
        println!("Output file '{}' already exists.", output_filename);
        print!("Do you want to overwrite it? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("Download cancelled.");
            return Ok(());
        }
    }

    let mut output_file = match File::create(&output_filepath) {
        Ok(file) => file,
        Err(e) => {
            return Err(anyhow!(
                "could not create output file '{}': {}",
                output_filename,
                e
            ))
        }
    };

    // Discover the swarm
    let peer_id = torrent::generate_peer_id();
    let peers = tracker::request_peers(
        &torrent_file.announce,
        &torrent_file.info_hash,
        &peer_id,
        torrent::CLIENT_PORT,
        torrent_file.length,
    )?;

    // Download torrent
    let torrent = Torrent {
        peers,
        peer_id,
        info_hash: torrent_file.info_hash,
        piece_hashes: torrent_file.piece_hashes,
        piece_length: torrent_file.piece_length,
        length: torrent_file.length,
        name: torrent_file.name,
    };
    let data: Vec<u8> = torrent.download()?;

    if let Err(e) = output_file.write_all(&data) {
        return Err(anyhow!(
            "could not write data to file '{}': {}",
            output_filename,
            e
        ));
    }

    println!("Saved in \"{}\".", output_filename);

    Ok(())
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    // Parse arguments
    let args = Args::parse();

    // Run program, eventually exit failure
    if let Err(error) = run(args) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    // Exit success
    std::process::exit(0);
}
