use cordial_consensus_core::block::Block;
use cordial_consensus_core::{BlockHashMap, BlockHashSet, HashMapCustomHasher, MinerId};
use cordial_hashes::Hash;
use std::collections::BTreeMap;
use std::collections::btree_map::Range;

/// Read API for the blocklace.
///
/// All DAG predicates are pure functions of this view; only [`BlocklaceStore::accept_block`]
/// mutates it.
pub trait BlocklaceStoreReader {
    fn get(&self, hash: Hash) -> Option<&Block>;

    /// Returns the admitted block for `hash`.
    ///
    /// Panics if the block was never admitted. Admission guarantees that every
    /// pointer of an admitted block is itself admitted, so traversals that
    /// start from admitted ids may index freely.
    fn block(&self, hash: Hash) -> &Block;

    fn has(&self, hash: Hash) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The latest admitted block of each creator along its unforked chain.
    fn tips(&self) -> &BTreeMap<MinerId, Hash>;

    fn tip_of(&self, creator: MinerId) -> Option<Hash> {
        self.tips().get(&creator).copied()
    }

    /// Maximal observed fork tips of each creator proven to have equivocated.
    fn equivocators(&self) -> &BTreeMap<MinerId, BlockHashSet>;

    fn equivocator_tips(&self, creator: MinerId) -> Option<&BlockHashSet> {
        self.equivocators().get(&creator)
    }

    fn is_equivocator(&self, creator: MinerId) -> bool {
        self.equivocators().contains_key(&creator)
    }

    /// Admitted ids at exactly `depth`, in admission order.
    fn blocks_at_depth(&self, depth: u64) -> &[Hash];

    /// Number of distinct creators with an admitted block at `depth`.
    fn creators_at_depth(&self, depth: u64) -> usize;

    /// Admitted ids with depth in `(above, up_to]`, grouped by ascending depth,
    /// admission order within a depth.
    fn ids_in_depth_range(&self, above: u64, up_to: u64) -> Vec<Hash>;

    fn blocks(&self) -> impl Iterator<Item = &Block>;
}

#[derive(Default)]
struct DepthEntry {
    ids: Vec<Hash>,
    creators: std::collections::HashSet<MinerId>,
}

/// In-memory implementation of the blocklace. A single store owns all block
/// records; tips, equivocators and the depth index hold ids only.
#[derive(Default)]
pub struct BlocklaceStore {
    blocks: BlockHashMap<Block>,
    tips: BTreeMap<MinerId, Hash>,
    equivocators: BTreeMap<MinerId, BlockHashSet>,
    depth_index: BTreeMap<u64, DepthEntry>,
}

impl BlocklaceStore {
    pub fn new() -> Self {
        Self {
            blocks: BlockHashMap::new(),
            tips: BTreeMap::new(),
            equivocators: BTreeMap::new(),
            depth_index: BTreeMap::new(),
        }
    }

    /// Installs `block` and maintains the tips/equivocators bookkeeping for
    /// its creator. Returns false if the block was already admitted.
    ///
    /// The caller is expected to have verified that all pointers are admitted
    /// and that the block is cordial. Pointers are normalized to ascending
    /// order so that every downstream traversal is deterministic.
    pub fn accept_block(&mut self, mut block: Block) -> bool {
        let key = block.hash;
        if self.blocks.contains_key(&key) {
            return false;
        }
        block.pointers.sort_unstable();

        let creator = block.creator;
        if let Some(tip) = self.tips.get(&creator).copied() {
            if block.pointers.binary_search(&tip).is_ok() {
                // The good chain continues
                self.tips.insert(creator, key);
            } else {
                // Two chain heads, neither observing the other: the creator equivocated
                self.tips.remove(&creator);
                let mut forks = BlockHashSet::new();
                forks.insert(tip);
                forks.insert(key);
                self.equivocators.insert(creator, forks);
            }
        } else if let Some(forks) = self.equivocators.get_mut(&creator) {
            // Fork tips covered by the new block are no longer maximal
            forks.retain(|tip| block.pointers.binary_search(tip).is_err());
            forks.insert(key);
        } else {
            self.tips.insert(creator, key);
        }

        let entry = self.depth_index.entry(block.depth).or_default();
        entry.ids.push(key);
        entry.creators.insert(creator);

        self.blocks.insert(key, block);
        true
    }

    fn depth_range(&self, above: u64, up_to: u64) -> Range<'_, u64, DepthEntry> {
        use std::ops::Bound::{Excluded, Included};
        self.depth_index.range((Excluded(above), Included(up_to)))
    }
}

impl BlocklaceStoreReader for BlocklaceStore {
    fn get(&self, hash: Hash) -> Option<&Block> {
        self.blocks.get(&hash)
    }

    fn block(&self, hash: Hash) -> &Block {
        self.blocks.get(&hash).expect("pointer of an admitted block is admitted")
    }

    fn has(&self, hash: Hash) -> bool {
        self.blocks.contains_key(&hash)
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn tips(&self) -> &BTreeMap<MinerId, Hash> {
        &self.tips
    }

    fn equivocators(&self) -> &BTreeMap<MinerId, BlockHashSet> {
        &self.equivocators
    }

    fn blocks_at_depth(&self, depth: u64) -> &[Hash] {
        self.depth_index.get(&depth).map(|entry| entry.ids.as_slice()).unwrap_or_default()
    }

    fn creators_at_depth(&self, depth: u64) -> usize {
        self.depth_index.get(&depth).map(|entry| entry.creators.len()).unwrap_or_default()
    }

    fn ids_in_depth_range(&self, above: u64, up_to: u64) -> Vec<Hash> {
        self.depth_range(above, up_to).flat_map(|(_, entry)| entry.ids.iter().copied()).collect()
    }

    fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}
