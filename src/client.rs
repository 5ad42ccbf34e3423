//! # BitTorrent Peer Session
//!
//! This module implements the client side of the peer wire protocol for a
//! single connection. A session goes through these states:
//!
//! ```text
//! Connected -> HandshakeSent -> HandshakeVerified -> AwaitingBitfield
//!           -> Interested -> Unchoked -> Transferring -> Done
//! ```
//!
//! Any error moves the session to `Failed`, after which it must be dropped.
//!
//! ## Pre-transfer Sequence
//!
//! 1. **Handshake**: exchange 68-byte handshakes, check the info hash
//! 2. **Bitfield**: the first message from the peer must be BITFIELD; its
//!    content is not inspected
//! 3. **Interested**: tell the peer we want to download
//! 4. **Unchoke**: the next message from the peer must be UNCHOKE
//!
//! ## Block Transfer
//!
//! Blocks are requested strictly one at a time in ascending offset order: send
//! a REQUEST, wait for its PIECE, copy the block, move on. Keep-alives received
//! while waiting are skipped. Only one block is in flight per connection.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, HANDSHAKE_LEN};
use crate::message::*;
use crate::peer::Peer;
use crate::piece::{Block, PieceBuffer, PieceWork};
use crate::torrent::InfoHash;

use byteorder::{BigEndian, ReadBytesExt};

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;

/// Protocol state of a [`PeerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    HandshakeSent,
    HandshakeVerified,
    AwaitingBitfield,
    Interested,
    Unchoked,
    Transferring,
    Done,
    Failed,
}

/// A connection to a remote peer and its negotiated state.
///
/// Generic over the transport so the protocol can be driven over anything
/// that reads and writes bytes. Dropping the session closes the connection.
pub struct PeerSession<S = TcpStream> {
    /// Remote address, used for logging
    peer: String,
    /// Connection to the peer
    conn: S,
    /// 20-byte identifier of this client
    peer_id: [u8; 20],
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    info_hash: InfoHash,
    block_size: u32,
    state: SessionState,
    /// Peer id received in the handshake
    remote_peer_id: Option<[u8; 20]>,
}

impl PeerSession<TcpStream> {
    /// Opens a TCP connection to a peer.
    ///
    /// Timeouts from the configuration are applied to the connection attempt
    /// and to every read and write.
    pub fn connect(peer: Peer, info_hash: InfoHash, config: &ClientConfig) -> Result<Self> {
        let addr = peer.socket_addr();
        let conn = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| Error::Handshake(format!("could not connect to peer {}: {}", peer, e)))?;

        conn.set_read_timeout(config.io_timeout)?;
        conn.set_write_timeout(config.io_timeout)?;

        debug!("Connected to peer {}", peer);

        Ok(PeerSession::new(conn, peer.to_string(), info_hash, config))
    }
}

impl<S: Read + Write> PeerSession<S> {
    /// Wraps an established connection.
    pub fn new(conn: S, peer: String, info_hash: InfoHash, config: &ClientConfig) -> Self {
        PeerSession {
            peer,
            conn,
            peer_id: config.peer_id,
            info_hash,
            block_size: config.block_size.max(1),
            state: SessionState::Connected,
            remote_peer_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remote_peer_id(&self) -> Option<&[u8; 20]> {
        self.remote_peer_id.as_ref()
    }

    /// Performs the BitTorrent handshake and returns the remote peer id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if:
    /// - the handshake cannot be sent
    /// - fewer than 68 bytes come back
    /// - the response is not a BitTorrent handshake for our info hash
    pub fn handshake(&mut self) -> Result<[u8; 20]> {
        self.expect_state(&[SessionState::Connected], "handshake")?;
        self.guard(|session| {
            let handshake = Handshake::new(session.peer_id, session.info_hash);
            session.conn.write_all(&handshake.serialize()).map_err(|e| {
                Error::Handshake(format!("could not send handshake to peer {}: {}", session.peer, e))
            })?;
            session.state = SessionState::HandshakeSent;

            let mut handshake_buf = [0; HANDSHAKE_LEN];
            session.conn.read_exact(&mut handshake_buf).map_err(|e| {
                Error::Handshake(format!("could not read handshake from peer {}: {}", session.peer, e))
            })?;

            let received = Handshake::deserialize(&handshake_buf)?;
            if received.info_hash != session.info_hash {
                return Err(Error::Handshake(format!(
                    "peer {} answered for another torrent",
                    session.peer
                )));
            }

            session.remote_peer_id = Some(received.peer_id);
            session.state = SessionState::HandshakeVerified;
            info!("Handshake with peer {} verified", session.peer);

            Ok(received.peer_id)
        })
    }

    /// Runs the pre-transfer sequence: BITFIELD, INTERESTED, UNCHOKE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if the peer does not send BITFIELD
    /// first or does not answer INTERESTED with UNCHOKE.
    pub fn prepare(&mut self) -> Result<()> {
        self.expect_state(&[SessionState::HandshakeVerified], "prepare")?;
        self.guard(|session| {
            session.state = SessionState::AwaitingBitfield;
            let bitfield = session.read_expected(MESSAGE_BITFIELD)?;
            debug!(
                "Receive MESSAGE_BITFIELD ({} bytes) from peer {}",
                bitfield.payload.len(),
                session.peer
            );

            debug!("Send MESSAGE_INTERESTED to peer {}", session.peer);
            write_message(&mut session.conn, &Message::new(MESSAGE_INTERESTED))?;
            session.state = SessionState::Interested;

            session.read_expected(MESSAGE_UNCHOKE)?;
            debug!("Receive MESSAGE_UNCHOKE from peer {}", session.peer);
            session.state = SessionState::Unchoked;

            Ok(())
        })
    }

    /// Downloads one piece, block by block, and returns its content.
    ///
    /// The session must be unchoked. After success it is `Done` and may
    /// download another piece.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] if the peer answers a REQUEST with
    ///   anything but the matching PIECE
    /// - [`Error::Transport`] if the connection fails
    pub fn download_piece(&mut self, work: &PieceWork) -> Result<Vec<u8>> {
        self.expect_state(
            &[SessionState::Unchoked, SessionState::Done],
            "download a piece",
        )?;
        self.guard(|session| {
            session.state = SessionState::Transferring;
            let mut buffer = PieceBuffer::new(work, session.block_size);

            for block in work.blocks(session.block_size) {
                debug!(
                    "Send MESSAGE_REQUEST for piece {} [{}:{}] to peer {}",
                    work.index,
                    block.begin,
                    block.begin + block.length,
                    session.peer
                );
                let request = Message::request(work.index, block.begin, block.length)?;
                write_message(&mut session.conn, &request)?;

                let data = session.read_block(work.index, block)?;
                buffer.write_block(block.begin, &data)?;
            }

            if !buffer.is_complete() {
                return Err(Error::ProtocolViolation(format!(
                    "piece {} incomplete after all blocks",
                    work.index
                )));
            }

            session.state = SessionState::Done;
            info!("Downloaded piece {} from peer {}", work.index, session.peer);

            Ok(buffer.into_data())
        })
    }

    /// Read the PIECE answering `block`, skipping keep-alives.
    fn read_block(&mut self, index: u32, block: Block) -> Result<Vec<u8>> {
        let message_len = loop {
            match read_message_len(&mut self.conn)? {
                0 => debug!("Receive KEEP_ALIVE from peer {}", self.peer),
                len => break len as usize,
            }
        };

        let mut header = vec![0; message_len.min(PIECE_HEADER_LEN)];
        self.conn.read_exact(&mut header)?;
        if header[0] != MESSAGE_PIECE {
            return Err(Error::ProtocolViolation(format!(
                "expected PIECE from peer {}, got {}",
                self.peer,
                message_name(header[0])
            )));
        }
        if message_len < PIECE_HEADER_LEN {
            return Err(Error::ProtocolViolation(format!(
                "PIECE message of {} bytes from peer {}",
                message_len, self.peer
            )));
        }

        let mut cursor = Cursor::new(&header[1..]);
        let piece_index = cursor.read_u32::<BigEndian>()?;
        let begin = cursor.read_u32::<BigEndian>()?;
        let block_len = message_len - PIECE_HEADER_LEN;

        if piece_index != index || begin != block.begin || block_len != block.length as usize {
            return Err(Error::ProtocolViolation(format!(
                "peer {} sent piece {} [{}:{}], requested piece {} [{}:{}]",
                self.peer,
                piece_index,
                begin,
                begin as usize + block_len,
                index,
                block.begin,
                block.begin + block.length
            )));
        }

        let mut data = vec![0; block_len];
        self.conn.read_exact(&mut data)?;

        Ok(data)
    }

    /// Read the next message, which must have id `expected`.
    fn read_expected(&mut self, expected: MessageId) -> Result<Message> {
        let message = loop {
            if let Some(message) = read_message(&mut self.conn)? {
                break message;
            }
            debug!("Receive KEEP_ALIVE from peer {}", self.peer);
        };

        if message.id != expected {
            return Err(Error::ProtocolViolation(format!(
                "expected {} from peer {}, got {}",
                message_name(expected),
                self.peer,
                message_name(message.id)
            )));
        }

        Ok(message)
    }

    fn expect_state(&self, allowed: &[SessionState], action: &str) -> Result<()> {
        if !allowed.contains(&self.state) {
            return Err(Error::ProtocolViolation(format!(
                "cannot {} with peer {} in state {:?}",
                action, self.peer, self.state
            )));
        }
        Ok(())
    }

    /// Run a protocol step, marking the session failed if it errors.
    fn guard<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(e) = &result {
            warn!("Session with peer {} failed: {}", self.peer, e);
            self.state = SessionState::Failed;
        }
        result
    }
}
