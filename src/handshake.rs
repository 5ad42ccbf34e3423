//! # BitTorrent Handshake
//!
//! The handshake is the first exchange on a peer connection. Both sides send
//! a fixed 68-byte message:
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte, always 19
//! - **pstr**: 19 bytes, "BitTorrent protocol"
//! - **reserved**: 8 bytes, all zeros (no extensions are negotiated)
//! - **info_hash**: 20 bytes, SHA-1 hash of the torrent info dictionary
//! - **peer_id**: 20 bytes, identifier of the sender

use crate::error::{Error, Result};
use crate::torrent::InfoHash;

const PROTOCOL_ID: &[u8; 19] = b"BitTorrent protocol";

pub const HANDSHAKE_LEN: usize = 68;

/// Represents a BitTorrent handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// 8 reserved bytes for protocol extensions
    pub reserved: [u8; 8],
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    pub info_hash: InfoHash,
    /// 20-byte identifier of the sending peer
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Creates a handshake with the standard protocol string and no
    /// extension bits set.
    pub fn new(peer_id: [u8; 20], info_hash: InfoHash) -> Self {
        Handshake {
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serializes the handshake into its 68-byte wire form.
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut serialized = [0; HANDSHAKE_LEN];
        serialized[0] = PROTOCOL_ID.len() as u8;
        serialized[1..20].copy_from_slice(PROTOCOL_ID);
        serialized[20..28].copy_from_slice(&self.reserved);
        serialized[28..48].copy_from_slice(&self.info_hash);
        serialized[48..68].copy_from_slice(&self.peer_id);
        serialized
    }

    /// Parses a received handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the protocol identifier is not
    /// "BitTorrent protocol".
    pub fn deserialize(buf: &[u8; HANDSHAKE_LEN]) -> Result<Handshake> {
        if buf[0] as usize != PROTOCOL_ID.len() || &buf[1..20] != PROTOCOL_ID {
            return Err(Error::Handshake(format!(
                "unexpected protocol identifier {:?}",
                String::from_utf8_lossy(&buf[1..20])
            )));
        }

        let mut handshake = Handshake::new([0; 20], [0; 20]);
        handshake.reserved.copy_from_slice(&buf[20..28]);
        handshake.info_hash.copy_from_slice(&buf[28..48]);
        handshake.peer_id.copy_from_slice(&buf[48..68]);

        Ok(handshake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_68_bytes() {
        let handshake = Handshake::new(*b"00112233445566778899", [0xab; 20]);
        let bytes = handshake.serialize();
        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], b"BitTorrent protocol");
        assert_eq!(&bytes[20..28], &[0; 8]);
        assert_eq!(&bytes[28..48], &[0xab; 20]);
        assert_eq!(&bytes[48..68], b"00112233445566778899");
    }

    #[test]
    fn deserialize_reads_back_fields() {
        let mut original = Handshake::new([5; 20], [6; 20]);
        original.reserved[5] = 0x10;
        let parsed = Handshake::deserialize(&original.serialize()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn rejects_other_protocols() {
        let mut bytes = Handshake::new([5; 20], [6; 20]).serialize();
        bytes[1] = b'b';
        assert!(matches!(
            Handshake::deserialize(&bytes),
            Err(Error::Handshake(_))
        ));
    }
}
