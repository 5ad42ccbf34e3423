//! # Error Taxonomy
//!
//! Every fallible operation of the library returns [`Result`], whose error type
//! separates failures by the layer that detected them:
//!
//! - **Codec**: `MalformedEncoding`
//! - **Metainfo**: `InvalidTorrentFile`
//! - **Tracker**: `TrackerFailure`, `TrackerProtocol`, `Http`
//! - **Peer wire**: `Handshake`, `ProtocolViolation`, `Transport`, `PieceHashMismatch`
//! - **Orchestrator**: `NoPeers`, `WorkerLost`, `PieceDownloadFailed`
//!
//! Codec, metainfo and tracker errors abort a download. Peer wire errors are
//! absorbed by the piece workers and turned into retries.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The input is not structurally valid bencode.
    #[error("malformed bencode at byte {offset}: {reason}")]
    MalformedEncoding { offset: usize, reason: String },

    /// A required metainfo field is missing or has the wrong type.
    #[error("invalid torrent file: {0}")]
    InvalidTorrentFile(String),

    /// The tracker answered with a `failure reason`.
    #[error("tracker rejected announce: {0}")]
    TrackerFailure(String),

    /// The tracker answered with something that is not a valid announce response.
    #[error("unexpected tracker response: {0}")]
    TrackerProtocol(String),

    /// The HTTP round trip to the tracker failed.
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The peer handshake was short, malformed or for another torrent.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer sent a message out of the expected sequence.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// I/O failure on an open connection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A fully assembled piece did not match its expected SHA-1 digest.
    #[error("piece {index} failed hash verification")]
    PieceHashMismatch { index: u32 },

    /// The tracker returned an empty peer list.
    #[error("no peers available")]
    NoPeers,

    /// The thread downloading a piece ended without reporting an outcome.
    #[error("worker for piece {index} stopped without a result")]
    WorkerLost { index: u32 },

    /// A piece exhausted all of its download attempts.
    #[error("piece {index} failed after {attempts} attempts: {last_error}")]
    PieceDownloadFailed {
        index: u32,
        attempts: u32,
        last_error: Box<Error>,
    },
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedEncoding {
            offset,
            reason: reason.into(),
        }
    }
}
