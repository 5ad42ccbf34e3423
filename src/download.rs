//! # Download Orchestrator
//!
//! Downloads every piece of a torrent from a set of peers.
//!
//! ## Process
//!
//! 1. **Build a peer pool** with one slot per peer
//! 2. **Spawn one thread per piece**, each running a [`PieceWorker`]
//! 3. **Collect outcomes** from a crossbeam channel, one per piece
//! 4. **Join** every worker thread
//! 5. **Assemble** pieces in index order
//!
//! The pool is the only concurrency limit: at most one attempt runs per peer,
//! the other workers wait for a free slot.
//!
//! A piece that exhausts its attempts does not abort the download. It stays
//! unset and its [`Error::PieceDownloadFailed`] is recorded on the returned
//! [`Download`].

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::piece::PieceWork;
use crate::pool::PeerPool;
use crate::torrent::Metainfo;
use crate::worker::{PieceOutcome, PieceWorker};

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::ProgressBar;

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send>;
type Spawner = fn(thread::Builder, Job) -> io::Result<JoinHandle<()>>;

fn spawn_thread(builder: thread::Builder, job: Job) -> io::Result<JoinHandle<()>> {
    builder.spawn(job)
}

pub struct Downloader<'a> {
    metainfo: &'a Metainfo,
    peers: Vec<Peer>,
    config: Arc<ClientConfig>,
    progress: ProgressBar,
    spawn: Spawner,
}

impl<'a> Downloader<'a> {
    pub fn new(metainfo: &'a Metainfo, peers: Vec<Peer>, config: ClientConfig) -> Self {
        Downloader {
            metainfo,
            peers,
            config: Arc::new(config),
            progress: ProgressBar::hidden(),
            spawn: spawn_thread,
        }
    }

    /// Report progress on `progress`, incremented by the length of each
    /// completed piece.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Download all pieces.
    ///
    /// # Errors
    ///
    /// - [`Error::NoPeers`] if there are pieces to download but no peers
    /// - [`Error::Transport`] if a worker thread cannot be spawned; workers
    ///   already started are joined first
    ///
    /// Pieces that fail are reported on the returned [`Download`], not here.
    pub fn download(self) -> Result<Download> {
        let piece_count = self.metainfo.piece_count();
        if piece_count == 0 {
            return Ok(Download::new(0));
        }
        if self.peers.is_empty() {
            return Err(Error::NoPeers);
        }

        info!(
            "Downloading {} ({} pieces) from {} peers",
            self.metainfo.name().unwrap_or("<unnamed>"),
            piece_count,
            self.peers.len()
        );

        let pool = Arc::new(PeerPool::new(self.peers));
        let (result_tx, result_rx): (Sender<PieceOutcome>, Receiver<PieceOutcome>) = unbounded();

        let works = (0..piece_count)
            .map(|index| {
                PieceWork::from_metainfo(self.metainfo, index).ok_or_else(|| {
                    Error::InvalidTorrentFile(format!("piece {} out of range", index))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut handles = Vec::with_capacity(works.len());
        for work in works {
            let index = work.index;
            let worker = PieceWorker::new(
                work,
                *self.metainfo.info_hash(),
                Arc::clone(&self.config),
                Arc::clone(&pool),
            );
            let result_tx = result_tx.clone();
            let job: Job = Box::new(move || {
                // Receiver outlives every worker
                let _ = result_tx.send(worker.run());
            });

            let builder = thread::Builder::new().name(format!("piece-{}", index));
            match (self.spawn)(builder, job) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!("Could not spawn worker for piece {}: {}", index, e);
                    join_workers(handles);
                    return Err(e.into());
                }
            }
        }
        // Only workers hold senders now
        drop(result_tx);

        let mut download = Download::new(piece_count as usize);
        let mut reported = vec![false; piece_count as usize];
        for outcome in result_rx.iter() {
            match outcome {
                Ok(piece) => {
                    self.progress.inc(piece.data.len() as u64);
                    reported[piece.index as usize] = true;
                    download.pieces[piece.index as usize] = Some(piece.data);
                }
                Err(failure) => {
                    reported[failure.index as usize] = true;
                    download.failures.push(failure.into_error());
                }
            }
        }

        join_workers(handles);

        // A worker that died before sending still leaves its piece missing
        for index in (0..piece_count).filter(|&i| !reported[i as usize]) {
            download.failures.push(Error::PieceDownloadFailed {
                index,
                attempts: 0,
                last_error: Box::new(Error::WorkerLost { index }),
            });
        }

        download.failures.sort_by_key(failed_index);
        self.progress.finish();

        if download.is_complete() {
            info!("Downloaded all {} pieces", piece_count);
        } else {
            warn!(
                "{} of {} pieces could not be downloaded",
                download.missing_pieces().len(),
                piece_count
            );
        }

        Ok(download)
    }
}

fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("A piece worker panicked");
        }
    }
}

fn failed_index(error: &Error) -> u32 {
    match error {
        Error::PieceDownloadFailed { index, .. } => *index,
        _ => u32::MAX,
    }
}

/// Pieces collected by [`Downloader::download`], indexed by piece.
#[derive(Debug)]
pub struct Download {
    pieces: Vec<Option<Vec<u8>>>,
    failures: Vec<Error>,
}

impl Download {
    fn new(piece_count: usize) -> Download {
        Download {
            pieces: vec![None; piece_count],
            failures: vec![],
        }
    }

    /// Whether every piece was downloaded.
    pub fn is_complete(&self) -> bool {
        self.pieces.iter().all(Option::is_some)
    }

    pub fn piece(&self, index: u32) -> Option<&[u8]> {
        self.pieces.get(index as usize)?.as_deref()
    }

    /// Indices of pieces that are not set.
    pub fn missing_pieces(&self) -> Vec<u32> {
        self.pieces
            .iter()
            .enumerate()
            .filter(|(_, piece)| piece.is_none())
            .map(|(index, _)| index as u32)
            .collect()
    }

    /// One [`Error::PieceDownloadFailed`] per missing piece, by index.
    ///
    /// A piece whose worker thread died carries [`Error::WorkerLost`] and no
    /// attempt count.
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    /// Write the downloaded pieces in index order. Missing pieces are skipped.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for piece in self.pieces.iter().flatten() {
            writer.write_all(piece)?;
        }
        writer.flush()
    }

    /// Concatenation of the downloaded pieces in index order.
    pub fn into_bytes(self) -> Vec<u8> {
        self.pieces.into_iter().flatten().flatten().collect()
    }
}
