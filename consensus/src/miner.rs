use crate::model::stores::blocklace::{BlocklaceStore, BlocklaceStoreReader};
use crate::model::stores::buffer::AdmissionBuffer;
use crate::pipeline::ProcessingCounters;
use crate::processes::block_builder::BlockBuilder;
use crate::processes::orderer::{OrderedPayloadSink, Orderer};
use crate::processes::waves::WaveManager;
use cordial_consensus_core::block::Block;
use cordial_consensus_core::config::params::Params;
use cordial_consensus_core::errors::{BlockProcessResult, RuleError};
use log::{debug, trace};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Ships a freshly authored block to the other miners. Invoked before the
/// block is self-admitted; implementations must not call back into the miner.
pub trait BlockBroadcaster: Send {
    fn broadcast(&self, block: &Block);
}

/// The per-miner state machine.
///
/// Two ingress operations, [`Miner::deliver_payload`] and
/// [`Miner::deliver_block`], mutate the blocklace; ordered payloads leave
/// through the orderer's sink and authored blocks through the broadcaster.
/// All calls must come from a single driver thread.
pub struct Miner {
    params: Params,
    store: BlocklaceStore,
    buffer: AdmissionBuffer,
    waves: WaveManager,
    orderer: Orderer,
    builder: BlockBuilder,
    broadcaster: Box<dyn BlockBroadcaster>,
    counters: Arc<ProcessingCounters>,
    /// Current authoring depth; -1 until the local genesis block is built.
    round: i64,
    pending_messages: Vec<Value>,
}

impl Miner {
    pub fn new(
        params: Params,
        sink: Box<dyn OrderedPayloadSink>,
        broadcaster: Box<dyn BlockBroadcaster>,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        let waves = WaveManager::new(&params);
        let builder = BlockBuilder::new(params.me);
        Self {
            params,
            store: BlocklaceStore::new(),
            buffer: AdmissionBuffer::new(),
            waves,
            orderer: Orderer::new(sink),
            builder,
            broadcaster,
            counters,
            round: -1,
            pending_messages: Vec::new(),
        }
    }

    pub fn round(&self) -> i64 {
        self.round
    }

    pub fn store(&self) -> &BlocklaceStore {
        &self.store
    }

    pub fn orderer(&self) -> &Orderer {
        &self.orderer
    }

    pub fn completed_round(&self) -> i64 {
        self.waves.completed_round(&self.store)
    }

    /// Queues `message` (None requests a filler block) and authors the next
    /// block once every round up to the current one has completed.
    pub fn deliver_payload(&mut self, message: Option<Value>) {
        if let Some(message) = message {
            self.pending_messages.push(message);
        }
        let completed = self.waves.completed_round(&self.store);
        debug!("completed round {} while authoring round is {}", completed, self.round);
        if completed >= self.round {
            // The new depth strictly exceeds every prior local block
            self.round = completed + 1;
            let messages = std::mem::take(&mut self.pending_messages);
            let block = self.builder.build(&self.store, self.round as u64, messages);
            debug!("created block {} at depth {} with {} pointers", block.hash, block.depth, block.pointers.len());
            self.broadcaster.broadcast(&block);
            self.buffer.insert(block);
            self.drain_buffer();
        }
        self.update_counters();
    }

    /// Admits `block` if syntactically correct; malformed blocks are silently
    /// dropped. Pending payloads trigger authorship afterwards.
    pub fn deliver_block(&mut self, block: Block) {
        match self.check_correct(&block) {
            Ok(()) => {
                trace!("received block {} from {} at depth {}", block.hash, block.creator, block.depth);
                self.buffer.insert(block);
            }
            Err(err) => debug!("dropping malformed block {}: {}", block.hash, err),
        }
        self.drain_buffer();
        if !self.pending_messages.is_empty() {
            self.deliver_payload(None);
        }
        self.update_counters();
    }

    /// Whether some admitted block carries payloads the orderer has not yet
    /// emitted. Drives the idle filler-block injection.
    pub fn has_unemitted_payloads(&self) -> bool {
        self.store.blocks().any(|block| !block.payload.is_empty() && !self.orderer.is_output(block.hash))
    }

    // The syntactic correctness check. Field types are already enforced by
    // the wire parser; membership and pointer cardinality remain.
    fn check_correct(&self, block: &Block) -> BlockProcessResult<()> {
        if !self.params.is_member(block.creator) {
            return Err(RuleError::UnknownCreator(block.creator));
        }
        if block.depth == 0 {
            if !block.pointers.is_empty() {
                return Err(RuleError::NonEmptyGenesisPointers(block.pointers.len()));
            }
        } else if block.pointers.len() <= self.params.super_majority() {
            return Err(RuleError::InsufficientPointers {
                depth: block.depth,
                count: block.pointers.len(),
                required: self.params.super_majority(),
            });
        }
        Ok(())
    }

    // The structural cordiality check, assuming all parents are admitted.
    fn check_cordial(&self, block: &Block) -> BlockProcessResult<()> {
        if block.is_genesis() {
            return Ok(());
        }
        let mut creators = HashSet::new();
        let mut at_previous_depth = 0usize;
        for &pointer in &block.pointers {
            let parent = self.store.get(pointer).ok_or_else(|| RuleError::MissingParents(vec![pointer]))?;
            if !creators.insert(parent.creator) {
                return Err(RuleError::RepeatedPointerCreator(parent.creator));
            }
            if parent.depth + 1 == block.depth {
                at_previous_depth += 1;
            } else if parent.depth >= block.depth {
                return Err(RuleError::PointerDepthTooHigh(pointer, parent.depth, block.depth));
            }
        }
        if at_previous_depth <= self.params.super_majority() {
            return Err(RuleError::SparsePreviousDepth(at_previous_depth, self.params.super_majority()));
        }
        Ok(())
    }

    // Repeatedly sweeps the buffer, admitting every block whose parents are
    // all present and which passes the cordiality check, until a pass makes
    // no progress. Each admission may unlock further ones and may extend the
    // emitted order.
    fn drain_buffer(&mut self) {
        loop {
            let mut progressed = false;
            for key in self.buffer.keys() {
                let verdict = {
                    let Some(block) = self.buffer.get(key) else { continue };
                    if !block.pointers.iter().all(|&pointer| self.store.has(pointer)) {
                        continue;
                    }
                    self.check_cordial(block)
                };
                match verdict {
                    Ok(()) => {
                        let block = self.buffer.remove(key).expect("key was just read from the buffer");
                        if self.store.accept_block(block) {
                            trace!("admitted block {}", key);
                        }
                        self.orderer.run(&self.store, &mut self.waves);
                        progressed = true;
                    }
                    Err(err) => trace!("block {} is not yet cordial: {}", key, err),
                }
            }
            if !progressed || self.buffer.is_empty() {
                break;
            }
            debug!("{} blocks remain buffered", self.buffer.len());
        }

        let completed = self.waves.completed_round(&self.store);
        if completed > self.params.buffer_eviction_lag as i64 {
            let min_depth = completed as u64 - self.params.buffer_eviction_lag;
            let evicted = self.buffer.evict_below(min_depth);
            if evicted > 0 {
                debug!("evicted {} stale buffered blocks below depth {}", evicted, min_depth);
            }
        }
    }

    fn update_counters(&self) {
        self.counters.update(
            self.round,
            self.store.len(),
            self.orderer.output_len(),
            self.buffer.len(),
            self.store.equivocators(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::blocklace::BlocklaceStoreReader;
    use crate::testutils::{MinerHarness, gossip, payload_block};
    use serde_json::json;

    fn cluster() -> Vec<MinerHarness> {
        (0..4).map(|me| MinerHarness::new(vec![0, 1, 2, 3], me)).collect()
    }

    // Every miner authors its genesis block carrying one payload, then all
    // blocks are gossiped around.
    fn genesis_quorum(miners: &mut Vec<MinerHarness>) {
        for (index, harness) in miners.iter_mut().enumerate() {
            harness.deliver_payload(Some(json!(format!("g{index}"))));
        }
        gossip(miners);
    }

    // Advances the cluster by one authored round per miner.
    fn filler_round(miners: &mut Vec<MinerHarness>) {
        for harness in miners.iter_mut() {
            harness.deliver_payload(None);
        }
        gossip(miners);
    }

    #[test]
    fn test_genesis_quorum() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);

        for harness in &miners {
            let store = harness.miner.store();
            assert_eq!(store.len(), 4);
            assert_eq!(store.blocks_at_depth(0).len(), 4);
            assert_eq!(store.tips().len(), 4);
            assert!(store.equivocators().is_empty());
            assert_eq!(store.creators_at_depth(0), 4);
            assert_eq!(harness.miner.completed_round(), 0);
        }
    }

    #[test]
    fn test_first_authored_block_covers_the_genesis_row() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);

        miners[0].deliver_payload(Some(json!("x")));
        let store = miners[0].miner.store();
        assert_eq!(miners[0].miner.round(), 1);
        let depth1 = store.blocks_at_depth(1);
        assert_eq!(depth1.len(), 1);
        let block = store.block(depth1[0]);
        assert_eq!(block.pointers.len(), 4);
        assert_eq!(block.payload, vec![json!("x")]);
        let creators: std::collections::HashSet<_> =
            block.pointers.iter().map(|&pointer| store.block(pointer).creator).collect();
        assert_eq!(creators.len(), 4);
        // The new block is on its way to the other three miners.
        assert_eq!(miners[0].undelivered_len(), 1);
    }

    #[test]
    fn test_leader_finalization_emits_reachable_payloads() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);
        miners[0].deliver_payload(Some(json!("x")));
        gossip(&mut miners);
        for _ in 0..5 {
            filler_round(&mut miners);
        }

        // The depth-0 leader block of miner 0 has been finalized, so at least
        // the payloads of its past cone have been emitted everywhere.
        for harness in &miners {
            let emitted = harness.emitted();
            assert!(!emitted.is_empty(), "miner emitted nothing");
            assert!(emitted.contains(&json!("g0")));
        }
    }

    #[test]
    fn test_equivocation_is_detected_and_quarantined() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);

        let genesis_row: Vec<_> = miners[0].miner.store().blocks_at_depth(0).to_vec();
        let fork_a = payload_block(1, 1, genesis_row.clone(), vec![json!("a")]);
        let fork_b = payload_block(1, 1, genesis_row.clone(), vec![json!("b")]);
        assert_ne!(fork_a.hash, fork_b.hash);

        miners[0].deliver_block(fork_a.clone());
        miners[0].deliver_block(fork_b.clone());

        let store = miners[0].miner.store();
        assert!(store.tip_of(1).is_none());
        let forks = store.equivocator_tips(1).unwrap();
        assert!(forks.contains(&fork_a.hash) && forks.contains(&fork_b.hash));

        let counters = miners[0].counters();
        assert_eq!(counters.equivocators.get(&1).map(|tips| tips.len()), Some(2));
    }

    #[test]
    fn test_silent_peer_does_not_block_progress() {
        let mut miners = cluster();
        // Miner 3 stays silent; the other three author and gossip.
        let (active, silent) = miners.split_at_mut(3);
        for (index, harness) in active.iter_mut().enumerate() {
            harness.deliver_payload(Some(json!(format!("g{index}"))));
        }
        gossip(active);
        for harness in active.iter() {
            assert_eq!(harness.miner.store().len(), 3);
            assert_eq!(harness.miner.completed_round(), 0);
        }

        // A late genesis block from miner 3 is admitted retroactively.
        silent[0].deliver_payload(Some(json!("late")));
        let late = silent[0].take_undelivered();
        assert_eq!(late.len(), 1);
        for harness in active.iter_mut() {
            harness.deliver_block(late[0].clone());
            assert_eq!(harness.miner.store().len(), 4);
        }
    }

    #[test]
    fn test_malformed_blocks_are_dropped_silently() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);
        let genesis_row: Vec<_> = miners[0].miner.store().blocks_at_depth(0).to_vec();

        // Unknown creator
        miners[0].deliver_block(payload_block(9, 1, genesis_row.clone(), vec![]));
        // Genesis with pointers
        miners[0].deliver_block(payload_block(2, 0, genesis_row.clone(), vec![]));
        // Too few pointers for depth > 0
        miners[0].deliver_block(payload_block(2, 1, genesis_row[..2].to_vec(), vec![]));

        let store = miners[0].miner.store();
        assert_eq!(store.len(), 4);
        assert_eq!(miners[0].counters().buffer_size, 0);
    }

    #[test]
    fn test_missing_dependency_waits_in_buffer() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);

        // A depth-2 block arrives before its depth-1 parents exist locally.
        let genesis_row: Vec<_> = miners[1].miner.store().blocks_at_depth(0).to_vec();
        let row1: Vec<_> = (0..4).map(|creator| payload_block(creator, 1, genesis_row.clone(), vec![])).collect();
        let row1_ids: Vec<_> = row1.iter().map(|block| block.hash).collect();
        let early = payload_block(0, 2, row1_ids, vec![json!("early")]);

        miners[0].deliver_block(early.clone());
        assert_eq!(miners[0].counters().buffer_size, 1);
        assert!(!miners[0].miner.store().has(early.hash));

        for block in row1 {
            miners[0].deliver_block(block);
        }
        // The buffered block is admitted once its parents are present.
        assert!(miners[0].miner.store().has(early.hash));
        assert_eq!(miners[0].counters().buffer_size, 0);
    }

    #[test]
    fn test_admitted_parents_are_always_shallower() {
        let mut miners = cluster();
        genesis_quorum(&mut miners);
        miners[0].deliver_payload(Some(json!("x")));
        gossip(&mut miners);
        for _ in 0..4 {
            filler_round(&mut miners);
        }

        for harness in &miners {
            let store = harness.miner.store();
            for block in store.blocks() {
                for &pointer in &block.pointers {
                    let parent = store.get(pointer).expect("no dangling pointers after admission");
                    assert!(parent.depth < block.depth);
                }
            }
        }
    }

    #[test]
    fn test_identical_block_streams_yield_identical_output() {
        // Record one cluster run, then replay the block stream of miner 0
        // into two fresh observers in the same order.
        let mut miners = cluster();
        genesis_quorum(&mut miners);
        for index in 0..4 {
            miners[index].deliver_payload(Some(json!(format!("m{index}"))));
            gossip(&mut miners);
        }
        for _ in 0..5 {
            filler_round(&mut miners);
        }
        let stream = miners[0].delivered_blocks().to_vec();
        assert!(!stream.is_empty());

        let mut observer1 = MinerHarness::new(vec![0, 1, 2, 3], 0);
        let mut observer2 = MinerHarness::new(vec![0, 1, 2, 3], 0);
        for block in &stream {
            observer1.deliver_block(block.clone());
        }
        for block in &stream {
            observer2.deliver_block(block.clone());
        }

        let emitted1 = observer1.emitted();
        assert!(!emitted1.is_empty());
        assert_eq!(emitted1, observer2.emitted());
        // Byte-identical, not just structurally equal.
        assert_eq!(serde_json::to_string(&emitted1).unwrap(), serde_json::to_string(&observer2.emitted()).unwrap());
    }

    #[test]
    fn test_shuffled_delivery_converges_to_the_same_order() {
        use rand::SeedableRng;
        use rand::seq::SliceRandom;

        let mut miners = cluster();
        genesis_quorum(&mut miners);
        miners[2].deliver_payload(Some(json!("p")));
        gossip(&mut miners);
        for _ in 0..5 {
            filler_round(&mut miners);
        }
        let stream = miners[1].delivered_blocks().to_vec();

        let mut observer1 = MinerHarness::new(vec![0, 1, 2, 3], 3);
        for block in &stream {
            observer1.deliver_block(block.clone());
        }

        // Permuting arrival order must not change the emitted prefix common
        // to both observers; the buffer re-sequences out-of-order blocks.
        let mut shuffled = stream.clone();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        shuffled.shuffle(&mut rng);
        let mut observer2 = MinerHarness::new(vec![0, 1, 2, 3], 3);
        for block in &shuffled {
            observer2.deliver_block(block.clone());
        }

        let (emitted1, emitted2) = (observer1.emitted(), observer2.emitted());
        assert!(!emitted1.is_empty() && !emitted2.is_empty());
        let common = emitted1.len().min(emitted2.len());
        assert_eq!(&emitted1[..common], &emitted2[..common]);
    }
}
