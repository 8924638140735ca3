use crate::model::stores::blocklace::BlocklaceStoreReader;
use crate::processes::observation::ObservationKernel;
use cordial_consensus_core::config::params::{LeaderSchedule, Params};
use cordial_consensus_core::{BlockHashSet, HashMapCustomHasher, MinerId};
use cordial_hashes::Hash;
use log::debug;
use std::collections::HashMap;

/// Leader-by-depth selection, round completion and leader finalization.
///
/// Depths are grouped into waves of `wavelength` consecutive rounds; only the
/// first depth of a wave hosts a leader, chosen round-robin over the sorted
/// participant set. A leader block is final once a quorum of ratifications
/// exists within the wave directly above it.
pub struct WaveManager {
    everyone: Vec<MinerId>,
    wavelength: u64,
    schedule: LeaderSchedule,
    super_majority: usize,
    kernel: ObservationKernel,
    // Memoized final leaders by depth. Finality is monotone, so entries never
    // need invalidation.
    final_leaders: HashMap<u64, Hash>,
}

impl WaveManager {
    pub fn new(params: &Params) -> Self {
        Self {
            everyone: params.everyone.clone(),
            wavelength: params.wavelength,
            schedule: params.leader_schedule,
            super_majority: params.super_majority(),
            kernel: ObservationKernel::new(params.super_majority()),
            final_leaders: HashMap::new(),
        }
    }

    pub fn kernel(&self) -> &ObservationKernel {
        &self.kernel
    }

    pub fn wavelength(&self) -> u64 {
        self.wavelength
    }

    /// The designated leader of `depth`, or None for depths inside a wave.
    pub fn leader(&self, depth: u64) -> Option<MinerId> {
        if depth % self.wavelength != 0 {
            return None;
        }
        let n = self.everyone.len() as u64;
        let index = match self.schedule {
            LeaderSchedule::EventScheduled => (depth / self.wavelength) % n,
            LeaderSchedule::Async => (depth / n) % n,
        };
        Some(self.everyone[index as usize])
    }

    /// Whether more than a super-majority of distinct creators have an
    /// admitted block at `depth`.
    pub fn cordial_round(&self, store: &impl BlocklaceStoreReader, depth: u64) -> bool {
        let creators = store.creators_at_depth(depth);
        debug!("round {} has {} creators", depth, creators);
        creators > self.super_majority
    }

    /// The greatest depth d such that all of 0..=d are cordial, or -1 when
    /// even round 0 is not.
    pub fn completed_round(&self, store: &impl BlocklaceStoreReader) -> i64 {
        let mut cycle = 0u64;
        while self.cordial_round(store, cycle) {
            cycle += 1;
        }
        cycle as i64 - 1
    }

    /// Whether leader block `key` is super-ratified within the wave directly
    /// above it.
    pub fn final_leader(&self, store: &impl BlocklaceStoreReader, key: Hash) -> bool {
        let depth = store.block(key).depth;
        let heads = store.ids_in_depth_range(depth, depth + self.wavelength);
        self.kernel.super_ratifies(store, &heads, key)
    }

    /// The deepest admitted leader block satisfying [`Self::final_leader`],
    /// searching down from two rounds below the completed round.
    pub fn last_final_leader(&mut self, store: &impl BlocklaceStoreReader) -> Option<Hash> {
        let mut depth = self.completed_round(store) - 2;
        while depth >= 0 {
            let d = depth as u64;
            if let Some(&key) = self.final_leaders.get(&d) {
                return Some(key);
            }
            if let Some(leader) = self.leader(d) {
                let candidates: Vec<Hash> =
                    store.blocks_at_depth(d).iter().copied().filter(|&key| store.block(key).creator == leader).collect();
                if candidates.is_empty() {
                    debug!("no blocks for leader {} at depth {}", leader, d);
                }
                for key in candidates {
                    if self.final_leader(store, key) {
                        debug!("leader {} is final at depth {}", leader, d);
                        self.final_leaders.insert(d, key);
                        return Some(key);
                    }
                    debug!("leader {} at depth {} is not final", leader, d);
                }
            }
            depth -= 1;
        }
        None
    }

    /// Walks the DAG downward from `head` one depth at a time and returns the
    /// first ancestor leader block that `head` ratifies. The frontier expands
    /// in stored pointer order, which keeps tie-breaking deterministic.
    pub fn previous_ratified_leader(&self, store: &impl BlocklaceStoreReader, head: Hash) -> Option<Hash> {
        let head_block = store.block(head);
        let mut frontier: Vec<Hash> = head_block.pointers.clone();
        let mut seen: BlockHashSet = BlockHashSet::new();
        seen.extend(frontier.iter().copied());
        let mut depth = head_block.depth as i64 - 1;
        while depth >= 0 {
            let d = depth as u64;
            let (depth_keys, rest): (Vec<Hash>, Vec<Hash>) = frontier.into_iter().partition(|&key| store.block(key).depth == d);
            if let Some(leader) = self.leader(d) {
                for &key in &depth_keys {
                    if store.block(key).creator == leader && self.kernel.ratifies(store, head, key) {
                        debug!("found previous ratified leader {} at depth {}", leader, d);
                        return Some(key);
                    }
                }
            }
            frontier = rest;
            for &key in &depth_keys {
                for &kid in &store.block(key).pointers {
                    if seen.insert(kid) {
                        frontier.push(kid);
                    }
                }
            }
            depth -= 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::blocklace::BlocklaceStore;
    use crate::testutils::{chained_block, genesis_block};
    use cordial_consensus_core::config::params::Params;

    fn params4() -> Params {
        Params::new(vec![0, 1, 2, 3], 0)
    }

    // Builds `rows` fully connected rounds over four creators, starting at
    // genesis, and returns the ids per row.
    fn lattice(store: &mut BlocklaceStore, rows: u64) -> Vec<Vec<Hash>> {
        let mut all = Vec::new();
        let genesis: Vec<Hash> = (0..4)
            .map(|creator| {
                let block = genesis_block(creator);
                let hash = block.hash;
                store.accept_block(block);
                hash
            })
            .collect();
        all.push(genesis);
        for depth in 1..rows {
            let below = all.last().unwrap().clone();
            let row = (0..4)
                .map(|creator| {
                    let block = chained_block(creator, depth, below.clone());
                    let hash = block.hash;
                    store.accept_block(block);
                    hash
                })
                .collect();
            all.push(row);
        }
        all
    }

    #[test]
    fn test_leader_round_robin() {
        let waves = WaveManager::new(&params4());
        assert_eq!(waves.leader(0), Some(0));
        assert_eq!(waves.leader(1), None);
        assert_eq!(waves.leader(2), None);
        assert_eq!(waves.leader(3), Some(1));
        assert_eq!(waves.leader(6), Some(2));
        assert_eq!(waves.leader(9), Some(3));
        assert_eq!(waves.leader(12), Some(0));
    }

    #[test]
    fn test_async_leader_wraps() {
        let mut params = params4();
        params.leader_schedule = LeaderSchedule::Async;
        let waves = WaveManager::new(&params);
        assert_eq!(waves.leader(1), None);
        assert_eq!(waves.leader(0), Some(0));
        // Indexing must stay in bounds arbitrarily deep into the DAG.
        assert!(waves.leader(3 * 4 * 100).is_some());
    }

    #[test]
    fn test_completed_round_tracks_cordial_prefix() {
        let mut store = BlocklaceStore::new();
        let waves = WaveManager::new(&params4());
        assert_eq!(waves.completed_round(&store), -1);

        lattice(&mut store, 3);
        assert!(waves.cordial_round(&store, 0));
        assert!(waves.cordial_round(&store, 2));
        assert!(!waves.cordial_round(&store, 3));
        assert_eq!(waves.completed_round(&store), 2);
    }

    #[test]
    fn test_three_creators_complete_a_round_without_the_fourth() {
        // 3 of n=4 exceed the super-majority threshold of 2.
        let mut store = BlocklaceStore::new();
        let waves = WaveManager::new(&params4());
        for creator in 0..3 {
            store.accept_block(genesis_block(creator));
        }
        assert!(waves.cordial_round(&store, 0));
        assert_eq!(waves.completed_round(&store), 0);
    }

    #[test]
    fn test_no_final_leader_before_two_completed_rounds() {
        let mut store = BlocklaceStore::new();
        let mut waves = WaveManager::new(&params4());
        lattice(&mut store, 2);
        assert_eq!(waves.completed_round(&store), 1);
        assert_eq!(waves.last_final_leader(&store), None);
    }

    #[test]
    fn test_leader_finalization_over_one_wave() {
        let mut store = BlocklaceStore::new();
        let mut waves = WaveManager::new(&params4());
        // Rounds 0..=4 admitted: completed=4, search starts at depth 2 and
        // walks down to the depth-0 leader block of miner 0.
        let rows = lattice(&mut store, 5);
        let leader_block = rows[0][0];
        assert!(waves.final_leader(&store, leader_block));
        assert_eq!(waves.last_final_leader(&store), Some(leader_block));
        // Memoized on the second call.
        assert_eq!(waves.last_final_leader(&store), Some(leader_block));
    }

    #[test]
    fn test_previous_ratified_leader_walks_back() {
        let mut store = BlocklaceStore::new();
        let waves = WaveManager::new(&params4());
        let rows = lattice(&mut store, 7);
        // From the depth-3 block of the wave leader, the previous ratified
        // leader is the depth-0 block of miner 0.
        let head = rows[3][1];
        assert_eq!(waves.previous_ratified_leader(&store, head), Some(rows[0][0]));
        // From a genesis block there is nothing further down.
        assert_eq!(waves.previous_ratified_leader(&store, rows[0][0]), None);
    }
}
