//! Helpers for exercising the consensus state machine in tests: deterministic
//! block constructors, a collecting payload sink, a recording broadcaster and
//! a full miner harness with gossip between instances.

use crate::miner::{BlockBroadcaster, Miner};
use crate::pipeline::{ProcessingCounters, ProcessingCountersSnapshot};
use crate::processes::orderer::OrderedPayloadSink;
use cordial_consensus_core::MinerId;
use cordial_consensus_core::block::Block;
use cordial_consensus_core::config::params::Params;
use cordial_hashes::Hash;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// A depth-0 block of `creator` with a timestamp derived from the creator, so
/// repeated calls are reproducible.
pub fn genesis_block(creator: MinerId) -> Block {
    Block::new(creator, format!("t{creator}"), vec![], vec![], 0)
}

/// A payload-free block of `creator` at `depth` over `pointers`.
pub fn chained_block(creator: MinerId, depth: u64, pointers: Vec<Hash>) -> Block {
    Block::new(creator, format!("t{creator}-{depth}"), vec![], pointers, depth)
}

pub fn payload_block(creator: MinerId, depth: u64, pointers: Vec<Hash>, payload: Vec<Value>) -> Block {
    Block::new(creator, format!("t{creator}-{depth}"), payload, pointers, depth)
}

/// Sink that appends every emitted payload to a shared vector.
#[derive(Clone, Default)]
pub struct CollectingSink {
    emitted: Arc<Mutex<Vec<Value>>>,
}

impl CollectingSink {
    pub fn snapshot(&self) -> Vec<Value> {
        self.emitted.lock().clone()
    }

    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.emitted.lock())
    }
}

impl OrderedPayloadSink for CollectingSink {
    fn emit(&mut self, _creator: MinerId, payload: &Value) {
        self.emitted.lock().push(payload.clone());
    }
}

/// Broadcaster that records authored blocks instead of shipping them.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    sent: Arc<Mutex<Vec<Block>>>,
}

impl RecordingBroadcaster {
    pub fn take(&self) -> Vec<Block> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.sent.lock().clone()
    }
}

impl BlockBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, block: &Block) {
        self.sent.lock().push(block.clone());
    }
}

/// A miner wired to a collecting sink and a recording broadcaster.
pub struct MinerHarness {
    pub miner: Miner,
    pub outputs: CollectingSink,
    pub broadcasts: RecordingBroadcaster,
    counters: Arc<ProcessingCounters>,
    /// Broadcasts not yet gossiped to the other harnesses.
    undelivered: Vec<Block>,
    /// Every block this miner authored or received, in processing order.
    /// Replaying the stream into a fresh miner reproduces the blocklace.
    stream: Vec<Block>,
}

impl MinerHarness {
    pub fn new(everyone: Vec<MinerId>, me: MinerId) -> Self {
        Self::with_params(Params::new(everyone, me))
    }

    pub fn with_params(params: Params) -> Self {
        let outputs = CollectingSink::default();
        let broadcasts = RecordingBroadcaster::default();
        let counters = Arc::new(ProcessingCounters::default());
        let miner = Miner::new(params, Box::new(outputs.clone()), Box::new(broadcasts.clone()), counters.clone());
        Self { miner, outputs, broadcasts, counters, undelivered: Vec::new(), stream: Vec::new() }
    }

    pub fn deliver_payload(&mut self, message: Option<Value>) {
        self.miner.deliver_payload(message);
        self.collect_authored();
    }

    pub fn deliver_block(&mut self, block: Block) {
        self.stream.push(block.clone());
        self.miner.deliver_block(block);
        self.collect_authored();
    }

    fn collect_authored(&mut self) {
        let authored = self.broadcasts.take();
        self.stream.extend(authored.iter().cloned());
        self.undelivered.extend(authored);
    }

    pub fn undelivered_len(&self) -> usize {
        self.undelivered.len()
    }

    pub fn take_undelivered(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.undelivered)
    }

    pub fn delivered_blocks(&self) -> &[Block] {
        &self.stream
    }

    pub fn counters(&self) -> ProcessingCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn emitted(&self) -> Vec<Value> {
        self.outputs.snapshot()
    }
}

/// Cross-delivers every authored block to all other harnesses until no new
/// blocks appear. Delivery order follows authoring order per miner.
pub fn gossip(miners: &mut [MinerHarness]) {
    loop {
        let mut in_flight: Vec<(usize, Block)> = Vec::new();
        for (index, harness) in miners.iter_mut().enumerate() {
            for block in std::mem::take(&mut harness.undelivered) {
                in_flight.push((index, block));
            }
        }
        if in_flight.is_empty() {
            return;
        }
        for (source, block) in in_flight {
            for (index, harness) in miners.iter_mut().enumerate() {
                if index != source {
                    harness.deliver_block(block.clone());
                }
            }
        }
    }
}
