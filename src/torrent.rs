//! # Torrent Metainfo
//!
//! This module turns a torrent file into a typed [`Metainfo`].
//!
//! ## Torrent File Format
//!
//! Torrent files contain metadata in bencoded format:
//!
//! - **announce**: Tracker URL for peer discovery
//! - **info**: Dictionary with file information and piece hashes
//!   - **length**: Total file size
//!   - **piece length**: Size of each piece (the last one may be shorter)
//!   - **pieces**: Concatenated 20-byte SHA-1 hashes, one per piece
//!   - **name**: Suggested filename (optional)
//!
//! ## Info Hash
//!
//! The info hash identifies the torrent on trackers and peers. It is the SHA-1
//! digest of the `info` dictionary re-encoded canonically, not a slice of the
//! original file.

use crate::bencode::{self, Dictionary, Value};
use crate::error::{Error, Result};

use sha1::{Digest, Sha1};

use std::fs;
use std::path::Path;

// Size of SHA-1 hash in bytes
pub const SHA1_HASH_SIZE: usize = 20;

pub type InfoHash = [u8; SHA1_HASH_SIZE];

/// Metadata of a single-file torrent.
///
/// Immutable once parsed. Piece geometry helpers derive each piece's length
/// and offset from `length` and `piece_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    /// URL of the tracker
    announce: String,
    /// Total size of the file in bytes
    length: u64,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// 20-byte SHA-1 hashes, one for each piece
    pieces_hashes: Vec<[u8; SHA1_HASH_SIZE]>,
    /// SHA-1 hash of the bencoded info dictionary
    info_hash: InfoHash,
    /// Suggested filename from torrent metadata
    name: Option<String>,
}

impl Metainfo {
    /// Read and parse a torrent file from disk.
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Metainfo> {
        let buf = fs::read(filepath)?;
        parse_torrent_file(&buf)
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Nominal piece length. Use [`Metainfo::piece_size`] for a given index.
    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    pub fn info_hash_hex(&self) -> String {
        hex(&self.info_hash)
    }

    pub fn pieces_hashes(&self) -> &[[u8; SHA1_HASH_SIZE]] {
        &self.pieces_hashes
    }

    pub fn piece_hash(&self, index: u32) -> Option<&[u8; SHA1_HASH_SIZE]> {
        self.pieces_hashes.get(index as usize)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn piece_count(&self) -> u32 {
        self.pieces_hashes.len() as u32
    }

    /// Length of piece `index`.
    ///
    /// Every piece has the nominal length except the last one, which holds
    /// `length - (count - 1) * piece_length` bytes. Returns `None` for an index
    /// past the last piece.
    pub fn piece_size(&self, index: u32) -> Option<u32> {
        if index >= self.piece_count() {
            return None;
        }
        let begin = self.piece_offset(index);
        let end = (begin + self.piece_length as u64).min(self.length);
        Some((end - begin) as u32)
    }

    /// Byte offset of piece `index` in the file.
    pub fn piece_offset(&self, index: u32) -> u64 {
        index as u64 * self.piece_length as u64
    }
}

/// Parse the content of a torrent file.
///
/// # Errors
///
/// - [`Error::MalformedEncoding`] if the file is not bencode
/// - [`Error::InvalidTorrentFile`] if a required field is missing, mistyped or
///   inconsistent with the others
pub fn parse_torrent_file(buf: &[u8]) -> Result<Metainfo> {
    let (root, _) = bencode::decode(buf)?;
    let root = root
        .as_dict()
        .ok_or_else(|| invalid("top-level value is not a dictionary"))?;

    let announce = required(root, "announce")?
        .as_str()
        .ok_or_else(|| invalid("'announce' is not a UTF-8 byte string"))?
        .to_string();

    let info = required(root, "info")?
        .as_dict()
        .ok_or_else(|| invalid("'info' is not a dictionary"))?;

    let length = required_integer(info, "length")?;
    let length = u64::try_from(length).map_err(|_| invalid("'length' is negative"))?;

    let piece_length = required_integer(info, "piece length")?;
    let piece_length = u32::try_from(piece_length)
        .ok()
        .filter(|&len| len > 0)
        .ok_or_else(|| invalid("'piece length' must be a positive 32-bit integer"))?;

    let pieces = required(info, "pieces")?
        .as_bytes()
        .ok_or_else(|| invalid("'pieces' is not a byte string"))?;
    let pieces_hashes = split_pieces_hashes(pieces)?;

    let expected = length.div_ceil(piece_length as u64);
    if pieces_hashes.len() as u64 != expected {
        return Err(invalid(format!(
            "{} piece hashes for {} pieces",
            pieces_hashes.len(),
            expected
        )));
    }

    let name = info.get(b"name".as_slice()).and_then(Value::as_str).map(String::from);

    // Hash the canonical re-encoding of the info dictionary
    let info_hash = hash_info(info);

    Ok(Metainfo {
        announce,
        length,
        piece_length,
        pieces_hashes,
        info_hash,
        name,
    })
}

/// Hash bencoded informations to uniquely identify a torrent.
fn hash_info(info: &Dictionary) -> InfoHash {
    let mut buf = Vec::new();
    Value::Dict(info.clone()).encode_into(&mut buf);

    let mut hasher = Sha1::new();
    hasher.update(&buf);
    hasher.finalize().into()
}

/// Split bencoded pieces into SHA-1 hashes.
fn split_pieces_hashes(pieces: &[u8]) -> Result<Vec<[u8; SHA1_HASH_SIZE]>> {
    if pieces.len() % SHA1_HASH_SIZE != 0 {
        return Err(invalid(format!(
            "'pieces' length {} is not a multiple of {}",
            pieces.len(),
            SHA1_HASH_SIZE
        )));
    }

    let hashes = pieces
        .chunks_exact(SHA1_HASH_SIZE)
        .map(|chunk| {
            let mut hash = [0; SHA1_HASH_SIZE];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    Ok(hashes)
}

fn required<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a Value> {
    dict.get(key.as_bytes())
        .ok_or_else(|| invalid(format!("missing '{}'", key)))
}

fn required_integer(dict: &Dictionary, key: &str) -> Result<i64> {
    required(dict, key)?
        .as_integer()
        .ok_or_else(|| invalid(format!("'{}' is not an integer", key)))
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidTorrentFile(reason.into())
}

/// Lowercase hexadecimal rendering of raw bytes.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
