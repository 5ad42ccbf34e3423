//! # Leech
//!
//! Command-line front end of the leech BitTorrent client.
//!
//! ## Usage
//!
//! ```bash
//! leech decode <bencoded_value>
//! leech info <torrent_file>
//! leech peers <torrent_file>
//! leech handshake <torrent_file> <ip:port>
//! leech download_piece -o <output_file> <torrent_file> <piece_index>
//! leech download -o <output_file> <torrent_file>
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

#[macro_use]
extern crate log;

use leech::bencode;
use leech::client::PeerSession;
use leech::piece::PieceWork;
use leech::torrent::hex;
use leech::{tracker, ClientConfig, Downloader, Metainfo, Peer};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A minimal BitTorrent client, written in Rust."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// 20-byte peer id announced to trackers and peers
    #[arg(long, global = true, value_parser = parse_peer_id)]
    peer_id: Option<[u8; 20]>,

    /// Port reported to the tracker
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Peer connect and I/O timeout in seconds (0 disables timeouts)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Skip SHA-1 verification of downloaded pieces
    #[arg(long, global = true)]
    no_verify: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode { value: String },

    /// Print the metainfo of a torrent file
    Info { torrent: PathBuf },

    /// Print the peers returned by the tracker
    Peers { torrent: PathBuf },

    /// Handshake with a peer and print its peer id
    Handshake { torrent: PathBuf, peer: SocketAddrV4 },

    /// Download a single piece from the first peer
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short = 'o', long)]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },

    /// Download the whole torrent
    Download {
        #[arg(short = 'o', long)]
        output: PathBuf,
        torrent: PathBuf,
    },
}

fn parse_peer_id(s: &str) -> std::result::Result<[u8; 20], String> {
    s.as_bytes()
        .try_into()
        .map_err(|_| format!("peer id must be 20 bytes, got {}", s.len()))
}

impl Args {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default().with_verify_pieces(!self.no_verify);
        if let Some(peer_id) = self.peer_id {
            config = config.with_peer_id(peer_id);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(secs) = self.timeout {
            let timeout = (secs > 0).then(|| Duration::from_secs(secs));
            config = config
                .with_connect_timeout(timeout)
                .with_io_timeout(timeout);
        }
        config
    }
}

fn open_torrent(path: &Path) -> Result<Metainfo> {
    Metainfo::open(path).with_context(|| format!("could not open torrent file {:?}", path))
}

fn write_output(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("could not create output file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).with_context(|| format!("could not write data to file {:?}", path))?;
    writer
        .flush()
        .with_context(|| format!("could not write data to file {:?}", path))
}

fn decode(value: &str) -> Result<()> {
    let (decoded, _) = bencode::decode(value.as_bytes())?;
    println!("{}", serde_json::to_string(&decoded)?);
    Ok(())
}

fn info(torrent: &Path) -> Result<()> {
    let metainfo = open_torrent(torrent)?;

    println!("Tracker URL: {}", metainfo.announce());
    println!("Length: {}", metainfo.length());
    println!("Info Hash: {}", metainfo.info_hash_hex());
    println!("Piece Length: {}", metainfo.piece_length());
    println!("Piece Hashes:");
    for hash in metainfo.pieces_hashes() {
        println!("{}", hex(hash));
    }

    Ok(())
}

fn peers(torrent: &Path, config: &ClientConfig) -> Result<()> {
    let metainfo = open_torrent(torrent)?;
    for peer in tracker::announce(&metainfo, config)? {
        println!("{}", peer);
    }
    Ok(())
}

fn handshake(torrent: &Path, peer: SocketAddrV4, config: &ClientConfig) -> Result<()> {
    let metainfo = open_torrent(torrent)?;
    let mut session = PeerSession::connect(Peer::from(peer), *metainfo.info_hash(), config)?;
    let peer_id = session.handshake()?;
    println!("Peer ID: {}", hex(&peer_id));
    Ok(())
}

fn download_piece(output: &Path, torrent: &Path, index: u32, config: &ClientConfig) -> Result<()> {
    let metainfo = open_torrent(torrent)?;
    let work = PieceWork::from_metainfo(&metainfo, index).ok_or_else(|| {
        anyhow!(
            "piece {} out of range, torrent has {} pieces",
            index,
            metainfo.piece_count()
        )
    })?;

    let peers = tracker::announce(&metainfo, config)?;
    let peer = *peers.first().ok_or(leech::Error::NoPeers)?;

    let mut session = PeerSession::connect(peer, *metainfo.info_hash(), config)?;
    session.handshake()?;
    session.prepare()?;
    let data = session.download_piece(&work)?;
    if config.verify_pieces {
        work.verify(&data)?;
    }

    write_output(output, |writer| writer.write_all(&data))?;
    println!("Piece {} downloaded to {}.", index, output.display());

    Ok(())
}

fn download(output: &Path, torrent: &Path, config: ClientConfig) -> Result<()> {
    let metainfo = open_torrent(torrent)?;
    let peers = tracker::announce(&metainfo, &config)?;

    println!(
        "Downloading {:?} ({} pieces)",
        metainfo.name().unwrap_or_default(),
        metainfo.piece_count()
    );

    let progress = ProgressBar::new(metainfo.length());
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")?
            .progress_chars("#>-"),
    );

    let download = Downloader::new(&metainfo, peers, config)
        .with_progress(progress)
        .download()?;

    if !download.is_complete() {
        for failure in download.failures() {
            error!("{}", failure);
        }
        bail!(
            "{} pieces could not be downloaded: {:?}",
            download.missing_pieces().len(),
            download.missing_pieces()
        );
    }

    write_output(output, |writer| download.write_to(writer))?;
    println!("Downloaded {} to {}.", torrent.display(), output.display());

    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = args.config();

    match &args.command {
        Command::Decode { value } => decode(value),
        Command::Info { torrent } => info(torrent),
        Command::Peers { torrent } => peers(torrent, &config),
        Command::Handshake { torrent, peer } => handshake(torrent, *peer, &config),
        Command::DownloadPiece {
            output,
            torrent,
            index,
        } => download_piece(output, torrent, *index, &config),
        Command::Download { output, torrent } => download(output, torrent, config),
    }
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    // Parse arguments
    let args = Args::parse();

    // Run program, eventually exit failure
    if let Err(error) = run(args) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
