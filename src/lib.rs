//! # Leech
//!
//! A minimal BitTorrent download client.
//!
//! ## Components
//!
//! - **Bencode** ([`bencode`]): decode and canonically encode bencoded values
//! - **Metainfo** ([`torrent`]): parse `.torrent` files, compute the info hash
//! - **Tracker** ([`tracker`]): announce over HTTP, decode compact peer lists
//! - **Peer session** ([`client`]): handshake, message framing and the
//!   sequential block transfer loop over one connection
//! - **Orchestrator** ([`download`]): one thread per piece, a bounded pool of
//!   peer slots and per-piece retries
//!
//! ## Example
//!
//! ```no_run
//! use leech::{tracker, ClientConfig, Downloader, Metainfo};
//!
//! # fn main() -> leech::Result<()> {
//! let metainfo = Metainfo::open("sample.torrent")?;
//! let config = ClientConfig::default();
//! let peers = tracker::announce(&metainfo, &config)?;
//!
//! let download = Downloader::new(&metainfo, peers, config).download()?;
//! if download.is_complete() {
//!     let mut file = std::fs::File::create("sample.bin")?;
//!     download.write_to(&mut file)?;
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod bencode;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod piece;
pub mod pool;
pub mod torrent;
pub mod tracker;
pub mod worker;

pub use config::ClientConfig;
pub use download::{Download, Downloader};
pub use error::{Error, Result};
pub use peer::Peer;
pub use torrent::Metainfo;
