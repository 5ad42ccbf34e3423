//! # Client Configuration
//!
//! Values that identify this client on the wire and tune the download. A
//! [`ClientConfig`] is handed to the tracker client, every peer session and
//! the download orchestrator, so no part of the library reads global state.

use std::time::Duration;

/// Peer id announced to trackers and peers unless overridden.
pub const DEFAULT_PEER_ID: [u8; 20] = *b"00112233445566778899";

/// Port announced to trackers. This client never accepts inbound connections.
pub const DEFAULT_PORT: u16 = 6881;

/// Standard block size for piece downloads (16KB)
pub const DEFAULT_BLOCK_SIZE: u32 = 16384;

/// Attempts per piece before it is given up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// 20-byte identifier sent in the handshake and the announce request
    pub peer_id: [u8; 20],
    /// Listening port reported to the tracker
    pub port: u16,
    /// Size of each block requested from a peer, 0 is used as 1
    pub block_size: u32,
    /// Number of attempts per piece, each against a randomly drawn peer; 0 is
    /// used as 1
    pub max_attempts: u32,
    /// Timeout for establishing a TCP connection, `None` blocks indefinitely
    pub connect_timeout: Option<Duration>,
    /// Read and write timeout on peer connections, `None` blocks indefinitely
    pub io_timeout: Option<Duration>,
    /// Check each downloaded piece against its SHA-1 digest
    pub verify_pieces: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            peer_id: DEFAULT_PEER_ID,
            port: DEFAULT_PORT,
            block_size: DEFAULT_BLOCK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
            verify_pieces: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_peer_id(mut self, peer_id: [u8; 20]) -> Self {
        self.peer_id = peer_id;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// A zero block size is bumped to 1 so the block loop always advances.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_verify_pieces(mut self, verify: bool) -> Self {
        self.verify_pieces = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = ClientConfig::default();
        assert_eq!(&config.peer_id, b"00112233445566778899");
        assert_eq!(config.port, 6881);
        assert_eq!(config.block_size, 16384);
        assert_eq!(config.max_attempts, 10);
        assert!(config.verify_pieces);
    }

    #[test]
    fn zero_block_size_is_clamped() {
        let config = ClientConfig::new().with_block_size(0);
        assert_eq!(config.block_size, 1);
    }

    #[test]
    fn zero_attempts_are_clamped() {
        let config = ClientConfig::new().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }
}
