use cordial_consensus_core::block::Block;
use cordial_hashes::Hash;
use indexmap::IndexMap;

/// Holds received, syntactically valid blocks whose DAG dependencies are not
/// yet satisfied: a missing parent or a pending cordiality condition. Entries
/// are retried on every admission pass; insertion order is preserved so the
/// passes are deterministic.
#[derive(Default)]
pub struct AdmissionBuffer {
    pending: IndexMap<Hash, Block>,
}

impl AdmissionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `block` keyed by its id. Re-receiving a buffered block is a
    /// no-op, keeping the original arrival position.
    pub fn insert(&mut self, block: Block) {
        self.pending.entry(block.hash).or_insert(block);
    }

    pub fn get(&self, hash: Hash) -> Option<&Block> {
        self.pending.get(&hash)
    }

    pub fn remove(&mut self, hash: Hash) -> Option<Block> {
        // shift_remove keeps the remaining entries in arrival order
        self.pending.shift_remove(&hash)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The ids currently buffered, in arrival order.
    pub fn keys(&self) -> Vec<Hash> {
        self.pending.keys().copied().collect()
    }

    /// Drops all entries below `min_depth` and returns how many were evicted.
    /// An adversarial block that can never become cordial ages out this way.
    pub fn evict_below(&mut self, min_depth: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, block| block.depth >= min_depth);
        before - self.pending.len()
    }
}
