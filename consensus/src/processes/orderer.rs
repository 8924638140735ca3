use crate::model::stores::blocklace::BlocklaceStoreReader;
use crate::processes::waves::WaveManager;
use cordial_consensus_core::{BlockHashSet, HashMapCustomHasher, MinerId};
use cordial_hashes::Hash;
use log::trace;
use serde_json::Value;

/// Receives the totally ordered payload stream, one client message at a time.
pub trait OrderedPayloadSink: Send {
    fn emit(&mut self, creator: MinerId, payload: &Value);
}

/// Extracts the total order over payloads: whenever a new final leader exists,
/// the chain of previously ratified leaders is replayed oldest-first and each
/// leader's unemitted past cone is flushed in a deterministic post-order.
///
/// The output set guards idempotence: a block id is emitted at most once
/// across all invocations.
pub struct Orderer {
    output: BlockHashSet,
    sink: Box<dyn OrderedPayloadSink>,
}

impl Orderer {
    pub fn new(sink: Box<dyn OrderedPayloadSink>) -> Self {
        Self { output: BlockHashSet::new(), sink }
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    pub fn is_output(&self, hash: Hash) -> bool {
        self.output.contains(&hash)
    }

    /// Finds the last final leader and emits everything it settles.
    pub fn run(&mut self, store: &impl BlocklaceStoreReader, waves: &mut WaveManager) {
        if let Some(final_leader) = waves.last_final_leader(store) {
            self.order_from(store, waves, final_leader);
        }
    }

    // Unrolls the recursion over previously ratified leaders into an explicit
    // chain. The chain length grows with depth, so the stack must not.
    fn order_from(&mut self, store: &impl BlocklaceStoreReader, waves: &WaveManager, final_leader: Hash) {
        let mut chain = Vec::new();
        let mut cursor = Some(final_leader);
        while let Some(key) = cursor {
            if self.is_output(key) {
                break;
            }
            chain.push(key);
            cursor = waves.previous_ratified_leader(store, key);
        }
        for key in chain.into_iter().rev() {
            for hash in self.x_sort(store, key) {
                let block = store.block(hash);
                trace!("emitting {} payloads of block {}", block.payload.len(), hash);
                for payload in &block.payload {
                    self.sink.emit(block.creator, payload);
                }
            }
        }
    }

    // Post-order DFS over `head`'s ancestors, descending only into blocks not
    // yet in the output set. Pointers are iterated in stored (ascending)
    // order so every miner emits the same sequence.
    fn x_sort(&mut self, store: &impl BlocklaceStoreReader, head: Hash) -> Vec<Hash> {
        let mut order = Vec::new();
        let mut stack = vec![(head, false)];
        while let Some((hash, expanded)) = stack.pop() {
            if expanded {
                // A diamond may queue a block twice; emit on first completion only
                if self.output.insert(hash) {
                    order.push(hash);
                }
                continue;
            }
            if self.output.contains(&hash) {
                continue;
            }
            stack.push((hash, true));
            for &kid in store.block(hash).pointers.iter().rev() {
                if !self.output.contains(&kid) {
                    stack.push((kid, false));
                }
            }
        }
        order
    }
}
