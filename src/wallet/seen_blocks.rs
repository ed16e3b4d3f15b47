use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

/// Default number of notification digests remembered.
pub const SEEN_BLOCK_CAPACITY: usize = 10_000;

pub type BlockDigest = [u8; 32];

/// Content digest of a normalized notification payload.
pub fn digest(payload: &str) -> BlockDigest {
    Sha256::digest(payload.as_bytes()).into()
}

/// Bounded set of recently seen notification digests with FIFO eviction.
///
/// Not synchronized; the owner wraps it in a lock so insert and evict happen together.
#[derive(Debug)]
pub struct SeenBlockCache {
    order: VecDeque<BlockDigest>,
    members: HashSet<BlockDigest>,
    capacity: usize,
}

impl SeenBlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `digest`. Returns false if it was already present.
    ///
    /// When the cache grows past capacity the oldest digest is evicted.
    pub fn insert(&mut self, digest: BlockDigest) -> bool {
        if !self.members.insert(digest) {
            return false;
        }
        self.order.push_back(digest);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl Default for SeenBlockCache {
    fn default() -> Self {
        Self::new(SEEN_BLOCK_CAPACITY)
    }
}
