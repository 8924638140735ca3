use crate::miner::Miner;
use cordial_consensus_core::block::Block;
use cordial_core::runtime::{Service, ShutdownToken};
use crossbeam_channel::Receiver;
use log::{info, trace};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

const MINER_PROCESSOR: &str = "miner-processor";

/// Poll cycles with neither queue yielding work before a filler block is
/// considered.
pub const IDLE_POLLS_BEFORE_FILLER: u32 = 10;
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Orders buffered future blocks by depth (then arrival) inside the holding
// pen, min-first via `Reverse`.
struct PendingBlock {
    depth: u64,
    seq: u64,
    block: Block,
}

impl PartialEq for PendingBlock {
    fn eq(&self, other: &Self) -> bool {
        (self.depth, self.seq) == (other.depth, other.seq)
    }
}

impl Eq for PendingBlock {}

impl PartialOrd for PendingBlock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingBlock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.depth, self.seq).cmp(&(other.depth, other.seq))
    }
}

/// The single consumer of both ingress queues. All consensus state mutation
/// happens on this service's one worker thread.
///
/// Blocks whose depth does not exceed the local round are prioritized over
/// payloads so the miner keeps pace with its peers; blocks from the future
/// wait in a depth-ordered holding pen. When both queues stay silent for
/// [`IDLE_POLLS_BEFORE_FILLER`] polls and admitted blocks still hold
/// unemitted payloads, a null payload is injected to author a filler block
/// and unstick the ordering wavefront.
pub struct MinerProcessor {
    miner: Mutex<Miner>,
    payload_receiver: Receiver<Option<Value>>,
    block_receiver: Receiver<Block>,
}

impl MinerProcessor {
    pub fn new(miner: Miner, payload_receiver: Receiver<Option<Value>>, block_receiver: Receiver<Block>) -> Self {
        Self { miner: Mutex::new(miner), payload_receiver, block_receiver }
    }

    fn worker(&self, shutdown: ShutdownToken) {
        // The worker is the sole lock holder for the lifetime of the service;
        // the façade observes the miner through the counters only.
        let mut miner = self.miner.lock();
        let mut pending: BinaryHeap<Reverse<PendingBlock>> = BinaryHeap::new();
        let mut seq = 0u64;
        let mut idle_polls = 0u32;
        while !shutdown.is_triggered() {
            for block in self.block_receiver.try_iter() {
                pending.push(Reverse(PendingBlock { depth: block.depth, seq, block }));
                seq += 1;
            }
            let prioritize_block = pending.peek().is_some_and(|Reverse(next)| next.depth as i64 <= miner.round());
            let message = if prioritize_block { None } else { self.payload_receiver.try_recv().ok() };

            if let Some(message) = message {
                miner.deliver_payload(message);
                idle_polls = 0;
            } else if let Some(Reverse(next)) = pending.pop() {
                miner.deliver_block(next.block);
                idle_polls = 0;
            } else {
                idle_polls += 1;
                if idle_polls >= IDLE_POLLS_BEFORE_FILLER {
                    idle_polls = 0;
                    if miner.has_unemitted_payloads() {
                        info!("blocks with unemitted payloads are waiting, authoring a filler block");
                        miner.deliver_payload(None);
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            trace!("{} queued payloads, {} pending blocks", self.payload_receiver.len(), pending.len());
        }
        trace!("{} thread exiting", MINER_PROCESSOR);
    }
}

impl Service for MinerProcessor {
    fn name(&self) -> &'static str {
        MINER_PROCESSOR
    }

    fn run(self: Arc<Self>, shutdown: ShutdownToken) {
        self.worker(shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProcessingCounters;
    use crate::testutils::{CollectingSink, RecordingBroadcaster, genesis_block};
    use cordial_consensus_core::config::params::Params;
    use crossbeam_channel::unbounded;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn test_processor_consumes_both_queues() {
        let params = Params::new(vec![0, 1, 2, 3], 0);
        let counters = Arc::new(ProcessingCounters::default());
        let sink = CollectingSink::default();
        let broadcaster = RecordingBroadcaster::default();
        let miner = Miner::new(params, Box::new(sink.clone()), Box::new(broadcaster.clone()), counters.clone());

        let (payload_sender, payload_receiver) = unbounded();
        let (block_sender, block_receiver) = unbounded();
        let processor = Arc::new(MinerProcessor::new(miner, payload_receiver, block_receiver));
        let shutdown = ShutdownToken::new();
        let worker = {
            let processor = processor.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || processor.run(shutdown))
        };

        payload_sender.send(Some(json!("x"))).unwrap();
        for creator in 1..4 {
            block_sender.send(genesis_block(creator)).unwrap();
        }

        // The local genesis plus the three peer blocks must all be admitted;
        // idle filler injection may author more on top.
        let deadline = Instant::now() + Duration::from_secs(10);
        while counters.snapshot().blocklace_size < 4 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(counters.snapshot().blocklace_size >= 4);
        assert!(!broadcaster.snapshot().is_empty());

        shutdown.trigger();
        worker.join().unwrap();
    }

    #[test]
    fn test_pending_blocks_order_by_depth_then_arrival() {
        use crate::testutils::chained_block;
        let parent = crate::testutils::genesis_block(0).hash;
        let mut heap: BinaryHeap<Reverse<PendingBlock>> = BinaryHeap::new();
        let deep = chained_block(0, 9, vec![parent]);
        let shallow_late = chained_block(1, 2, vec![parent]);
        let shallow_early = chained_block(2, 2, vec![parent]);
        heap.push(Reverse(PendingBlock { depth: 9, seq: 0, block: deep }));
        heap.push(Reverse(PendingBlock { depth: 2, seq: 1, block: shallow_early.clone() }));
        heap.push(Reverse(PendingBlock { depth: 2, seq: 2, block: shallow_late.clone() }));

        assert_eq!(heap.pop().unwrap().0.block.hash, shallow_early.hash);
        assert_eq!(heap.pop().unwrap().0.block.hash, shallow_late.hash);
        assert_eq!(heap.pop().unwrap().0.depth, 9);
    }
}
