use crate::model::stores::blocklace::BlocklaceStoreReader;
use cordial_consensus_core::MinerId;
use cordial_consensus_core::block::Block;
use cordial_core::time::unix_now;
use cordial_hashes::Hash;
use serde_json::Value;

/// Authors new blocks for the local miner.
pub struct BlockBuilder {
    me: MinerId,
}

impl BlockBuilder {
    pub fn new(me: MinerId) -> Self {
        Self { me }
    }

    /// Builds the local block for `round`, pointing at the tip of every
    /// non-equivocating creator, each reduced along its own chain to the
    /// deepest ancestor below `round`. A fast miner keeps pointing at the
    /// same reduced tips of slower miners.
    pub fn build(&self, store: &impl BlocklaceStoreReader, round: u64, messages: Vec<Value>) -> Block {
        let pointers = store.tips().values().filter_map(|&tip| reduced_tip(store, tip, round)).collect();
        Block::new(self.me, unix_now().to_string(), messages, pointers, round)
    }
}

/// Walks `tip` down its creator's own chain until a block below `round` is
/// reached. None if the chain bottoms out first.
pub fn reduced_tip(store: &impl BlocklaceStoreReader, tip: Hash, round: u64) -> Option<Hash> {
    let mut cursor = Some(tip);
    while let Some(key) = cursor {
        let block = store.block(key);
        if block.depth < round {
            break;
        }
        cursor = block.pointers.iter().copied().find(|&kid| store.block(kid).creator == block.creator);
    }
    cursor
}
