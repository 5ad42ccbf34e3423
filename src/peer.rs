//! # BitTorrent Peer Addresses
//!
//! Peers are discovered through the tracker, which responds with a compact
//! binary list of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! Both fields are in network byte order. Entries are kept in tracker order
//! and are not deduplicated.

use crate::error::{Error, Result};

use byteorder::{BigEndian, ReadBytesExt};

use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const PEER_SIZE: usize = 6;

/// Network address of a peer in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    /// IPv4 address of the peer
    pub ip: Ipv4Addr,
    /// Port number for connecting to the peer
    pub port: u16,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Peer {
        Peer { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for Peer {
    fn from(addr: SocketAddrV4) -> Self {
        Peer::new(*addr.ip(), addr.port())
    }
}

/// Parses a compact peer list into peers.
///
/// # Errors
///
/// Returns [`Error::TrackerProtocol`] if the list length is not a multiple of
/// 6 bytes.
///
/// # Example
///
/// ```rust
/// let peers = leech::peer::build_peers(&[192, 168, 1, 1, 0, 80, 192, 168, 1, 2, 0, 80])?;
/// assert_eq!(peers.len(), 2);
/// # Ok::<(), leech::Error>(())
/// ```
pub fn build_peers(tracker_peers: &[u8]) -> Result<Vec<Peer>> {
    if tracker_peers.len() % PEER_SIZE != 0 {
        return Err(Error::TrackerProtocol(format!(
            "compact peer list of {} bytes is not a multiple of {}",
            tracker_peers.len(),
            PEER_SIZE
        )));
    }

    tracker_peers
        .chunks_exact(PEER_SIZE)
        .map(|entry| {
            let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
            let port = Cursor::new(&entry[4..]).read_u16::<BigEndian>()?;
            Ok(Peer::new(ip, port))
        })
        .collect()
}
