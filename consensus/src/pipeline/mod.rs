pub mod driver;

use cordial_consensus_core::{BlockHashSet, MinerId};
use cordial_hashes::Hash;
use itertools::Itertools;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Live diagnostics of the miner, updated by the driver thread and read by
/// the ingress façade without touching consensus state.
#[derive(Default)]
pub struct ProcessingCounters {
    pub round: AtomicI64,
    pub blocklace_size: AtomicU64,
    pub output_count: AtomicU64,
    pub buffer_size: AtomicU64,
    equivocators: RwLock<BTreeMap<MinerId, Vec<Hash>>>,
}

impl ProcessingCounters {
    pub fn update(
        &self,
        round: i64,
        blocklace_size: usize,
        output_count: usize,
        buffer_size: usize,
        equivocators: &BTreeMap<MinerId, BlockHashSet>,
    ) {
        self.round.store(round, Ordering::Relaxed);
        self.blocklace_size.store(blocklace_size as u64, Ordering::Relaxed);
        self.output_count.store(output_count as u64, Ordering::Relaxed);
        self.buffer_size.store(buffer_size as u64, Ordering::Relaxed);
        let snapshot =
            equivocators.iter().map(|(&creator, forks)| (creator, forks.iter().copied().sorted().collect_vec())).collect();
        *self.equivocators.write() = snapshot;
    }

    pub fn snapshot(&self) -> ProcessingCountersSnapshot {
        ProcessingCountersSnapshot {
            round: self.round.load(Ordering::Relaxed),
            blocklace_size: self.blocklace_size.load(Ordering::Relaxed),
            output_count: self.output_count.load(Ordering::Relaxed),
            buffer_size: self.buffer_size.load(Ordering::Relaxed),
            equivocators: self.equivocators.read().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingCountersSnapshot {
    pub round: i64,
    pub blocklace_size: u64,
    pub output_count: u64,
    pub buffer_size: u64,
    pub equivocators: BTreeMap<MinerId, Vec<Hash>>,
}
