//! # Piece Worker
//!
//! A worker owns exactly one piece and runs on its own thread. It keeps trying
//! until the piece is downloaded or its attempts run out:
//!
//! 1. **Acquire** a random free peer from the pool (waiting if all are busy)
//! 2. **Connect** and perform the full handshake and pre-transfer sequence
//! 3. **Download** every block of the piece over that one connection
//! 4. **Verify** the piece against its SHA-1 hash (if enabled)
//! 5. **Release** the peer, whatever the outcome
//!
//! A failed attempt restarts the piece from its first block against a freshly
//! drawn peer, which may be the one that just failed. The connection of an
//! attempt is closed before its slot is released.

use crate::client::PeerSession;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::piece::{PieceResult, PieceWork};
use crate::pool::PeerPool;
use crate::torrent::InfoHash;

use std::sync::Arc;

/// Final outcome of a piece worker.
pub type PieceOutcome = std::result::Result<PieceResult, PieceFailure>;

/// A piece that could not be downloaded.
#[derive(Debug)]
pub struct PieceFailure {
    pub index: u32,
    pub attempts: u32,
    /// Error of the last attempt
    pub last_error: Error,
}

impl PieceFailure {
    /// Typed error for callers that want to propagate the failure.
    pub fn into_error(self) -> Error {
        Error::PieceDownloadFailed {
            index: self.index,
            attempts: self.attempts,
            last_error: Box::new(self.last_error),
        }
    }
}

/// Downloads a single piece with retries across the peer pool.
pub struct PieceWorker {
    work: PieceWork,
    info_hash: InfoHash,
    config: Arc<ClientConfig>,
    pool: Arc<PeerPool>,
}

impl PieceWorker {
    pub fn new(
        work: PieceWork,
        info_hash: InfoHash,
        config: Arc<ClientConfig>,
        pool: Arc<PeerPool>,
    ) -> PieceWorker {
        PieceWorker {
            work,
            info_hash,
            config,
            pool,
        }
    }

    /// Run attempts until one succeeds or `max_attempts` is reached.
    ///
    /// At least one attempt is made, even with `max_attempts` set to 0.
    pub fn run(&self) -> PieceOutcome {
        let index = self.work.index;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let slot = self.pool.acquire();
            let peer = slot.peer();

            match self.attempt(peer) {
                Ok(data) => {
                    debug!(
                        "Piece {} downloaded from peer {} (attempt {}/{})",
                        index, peer, attempt, max_attempts
                    );
                    return Ok(PieceResult::new(index, data));
                }
                Err(e) => {
                    warn!(
                        "Piece {} failed with peer {} (attempt {}/{}): {}",
                        index, peer, attempt, max_attempts, e
                    );
                    if attempt == max_attempts {
                        error!("Giving up on piece {} after {} attempts", index, max_attempts);
                        return Err(PieceFailure {
                            index,
                            attempts: max_attempts,
                            last_error: e,
                        });
                    }
                }
            }

            attempt += 1;
        }
    }

    /// One attempt against one peer, on a fresh connection.
    fn attempt(&self, peer: Peer) -> Result<Vec<u8>> {
        let mut session = PeerSession::connect(peer, self.info_hash, &self.config)?;
        session.handshake()?;
        session.prepare()?;
        let data = session.download_piece(&self.work)?;

        if self.config.verify_pieces {
            self.work.verify(&data)?;
            debug!("Verified integrity of piece {}", self.work.index);
        }

        Ok(data)
    }
}
