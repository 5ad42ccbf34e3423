//! # Pieces and Blocks
//!
//! Pieces are the verification units of a torrent. They are transferred in
//! smaller blocks (16KB by default), requested one at a time in ascending
//! offset order. The last block of a piece is shortened to fit.
//!
//! - [`PieceWork`]: what to download (index, expected hash, length)
//! - [`Block`]: one request within a piece
//! - [`PieceBuffer`]: assembles blocks at their offsets and knows when it is full
//! - [`PieceResult`]: a completed piece handed back to the orchestrator

use crate::error::{Error, Result};
use crate::torrent::{Metainfo, SHA1_HASH_SIZE};

use sha1::{Digest, Sha1};

/// A piece to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 hash of the piece content
    pub hash: [u8; SHA1_HASH_SIZE],
    /// Total length of the piece in bytes
    pub length: u32,
}

/// A block request within a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Byte offset within the piece
    pub begin: u32,
    /// Number of bytes requested
    pub length: u32,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; SHA1_HASH_SIZE], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
        }
    }

    /// Piece `index` of a torrent, or `None` past the last piece.
    pub fn from_metainfo(metainfo: &Metainfo, index: u32) -> Option<PieceWork> {
        let hash = *metainfo.piece_hash(index)?;
        let length = metainfo.piece_size(index)?;
        Some(PieceWork::new(index, hash, length))
    }

    /// Number of blocks needed for this piece. A zero block size counts as 1.
    pub fn block_count(&self, block_size: u32) -> u32 {
        self.length.div_ceil(block_size.max(1))
    }

    /// Blocks covering the piece, in ascending offset order.
    pub fn blocks(&self, block_size: u32) -> impl Iterator<Item = Block> {
        let block_size = block_size.max(1);
        let length = self.length;
        (0..self.block_count(block_size)).map(move |i| {
            let begin = i * block_size;
            Block {
                begin,
                length: block_size.min(length - begin),
            }
        })
    }

    /// Verify the integrity of downloaded piece data.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let hash: [u8; SHA1_HASH_SIZE] = hasher.finalize().into();

        if hash != self.hash {
            return Err(Error::PieceHashMismatch { index: self.index });
        }

        Ok(())
    }
}

/// Buffer assembling the blocks of one piece.
///
/// Sized to the piece length up front. Each block of the configured size must
/// be written exactly at its offset before the buffer counts as complete.
#[derive(Debug)]
pub struct PieceBuffer {
    index: u32,
    block_size: u32,
    data: Vec<u8>,
    written: Vec<bool>,
}

impl PieceBuffer {
    pub fn new(work: &PieceWork, block_size: u32) -> PieceBuffer {
        let block_size = block_size.max(1);
        PieceBuffer {
            index: work.index,
            block_size,
            data: vec![0; work.length as usize],
            written: vec![false; work.block_count(block_size) as usize],
        }
    }

    /// Copy a block at `begin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if `begin` is not a block boundary
    /// or the block does not fit in the piece.
    pub fn write_block(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        let start = begin as usize;
        let end = start + block.len();
        if begin % self.block_size != 0 || end > self.data.len() {
            return Err(Error::ProtocolViolation(format!(
                "block [{}:{}] does not fit piece {} of {} bytes",
                start,
                end,
                self.index,
                self.data.len()
            )));
        }

        self.data[start..end].copy_from_slice(block);
        self.written[(begin / self.block_size) as usize] = true;

        Ok(())
    }

    /// Whether every block offset has been written.
    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|&w| w)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// A completed piece, ready to be placed in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Complete piece data buffer
    pub data: Vec<u8>,
}

impl PieceResult {
    pub fn new(index: u32, data: Vec<u8>) -> PieceResult {
        PieceResult { index, data }
    }
}
