//! # Peer Slot Pool
//!
//! Bounded pool of peers available for a piece attempt. A piece worker
//! acquires a slot before connecting and holds it for the whole attempt; the
//! slot goes back to the pool when the returned [`PeerSlot`] is dropped.
//!
//! - `acquire` blocks while every peer is busy and then picks a uniformly
//!   random free peer
//! - releasing never blocks
//!
//! The pool is the only concurrency limit on downloads: at most one attempt
//! runs against each peer at any time.

use crate::peer::Peer;

use rand::Rng;

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct PeerPool {
    peers: Vec<Peer>,
    /// Indices into `peers` that are not in use
    available: Mutex<Vec<usize>>,
    released: Condvar,
}

impl PeerPool {
    /// Creates a pool with one slot per peer, all free.
    pub fn new(peers: Vec<Peer>) -> PeerPool {
        let available = (0..peers.len()).collect();
        PeerPool {
            peers,
            available: Mutex::new(available),
            released: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of peers not currently in use.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Takes a random free peer, waiting until one is released if necessary.
    ///
    /// Blocks forever on an empty pool; callers check [`PeerPool::is_empty`].
    pub fn acquire(&self) -> PeerSlot<'_> {
        let mut available = self.lock();
        while available.is_empty() {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let pick = rand::thread_rng().gen_range(0..available.len());
        let index = available.swap_remove(pick);

        PeerSlot { pool: self, index }
    }

    fn release(&self, index: usize) {
        self.lock().push(index);
        self.released.notify_one();
    }

    // A worker panicking mid-attempt must not wedge the other workers
    fn lock(&self) -> MutexGuard<'_, Vec<usize>> {
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A peer checked out of a [`PeerPool`]. Returned to the pool on drop.
pub struct PeerSlot<'a> {
    pool: &'a PeerPool,
    index: usize,
}

impl PeerSlot<'_> {
    pub fn peer(&self) -> Peer {
        self.pool.peers[self.index]
    }
}

impl Drop for PeerSlot<'_> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
