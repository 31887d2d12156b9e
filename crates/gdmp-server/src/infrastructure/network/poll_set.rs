//! PollSet: the bookkeeping mirror of what the readiness poller watches.
//!
//! The OS poller (epoll/kqueue via `mio`) keeps its own interest list; the
//! `PollSet` is the relay's view of it, used to enforce capacity and to
//! answer "is this connection pollable right now?" under the registry lock.
//!
//! Entries are unordered.  Removal swaps the last entry into the vacated
//! slot, so both insertion and removal keep the vector dense.

use mio::{Interest, Token};

/// One watched descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEntry {
    pub token: Token,
    pub interest: Interest,
}

/// Bounded set of watched descriptors; each token appears at most once.
#[derive(Debug)]
pub struct PollSet {
    entries: Vec<PollEntry>,
    capacity: usize,
}

impl PollSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds `token`.  Returns `false` if it is already present or the set is
    /// full.
    pub fn insert(&mut self, token: Token, interest: Interest) -> bool {
        if self.is_full() || self.contains(token) {
            return false;
        }
        self.entries.push(PollEntry { token, interest });
        true
    }

    /// Removes `token` by swapping the last entry into its slot.
    pub fn remove(&mut self, token: Token) -> bool {
        match self.entries.iter().position(|e| e.token == token) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.iter().any(|e| e.token == token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
