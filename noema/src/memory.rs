//! Ordered conversation log with snapshot-before-append semantics.
//!
//! Grounded on the teacher's `InMemorySession` (`RwLock` over a bounded
//! sequence, clone-under-lock reads), generalized to FIFO eviction and a
//! snapshot mechanism so "what did I just ask" queries never see the
//! in-flight question.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::types::{ConversationEntry, MemorySnapshot};

/// Ordered, bounded conversation log.
#[derive(Debug)]
pub struct Memory {
    capacity: usize,
    entries: RwLock<VecDeque<ConversationEntry>>,
    snapshot: RwLock<Option<MemorySnapshot>>,
}

impl Memory {
    /// Build an empty log bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::new()),
            snapshot: RwLock::new(None),
        }
    }

    /// Append an entry, evicting the oldest if over capacity.
    pub async fn append(&self, entry: ConversationEntry) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Number of entries currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Take a shallow copy of the current sequence as the active snapshot.
    /// A second call overwrites the first; at most one snapshot is active.
    pub async fn create_snapshot(&self) {
        let entries = self.entries.read().await;
        let copy: MemorySnapshot = entries.iter().cloned().collect();
        *self.snapshot.write().await = Some(copy);
    }

    /// Release the active snapshot, if any.
    pub async fn clear_snapshot(&self) {
        *self.snapshot.write().await = None;
    }

    /// The last `n` entries, from the snapshot if `use_snapshot` and one is
    /// active, else from the live sequence.
    pub async fn recent(&self, n: usize, use_snapshot: bool) -> Vec<ConversationEntry> {
        if use_snapshot {
            if let Some(snap) = self.snapshot.read().await.as_ref() {
                return tail(snap, n);
            }
        }
        let mut entries = self.entries.write().await;
        tail(entries.make_contiguous(), n)
    }

    /// Whether a snapshot is currently active.
    pub async fn has_snapshot(&self) -> bool {
        self.snapshot.read().await.is_some()
    }
}

fn tail<T: Clone>(seq: &[T], n: usize) -> Vec<T> {
    let start = seq.len().saturating_sub(n);
    seq[start..].to_vec()
}
