use crate::model::stores::blocklace::BlocklaceStoreReader;
use cordial_consensus_core::{BlockHashSet, HashMapCustomHasher, MinerId};
use cordial_hashes::Hash;
use std::collections::HashSet;

/// The quorum predicates over the blocklace: observes, approves, ratifies and
/// super-ratifies. All are pure functions of the store; thresholds require
/// strictly more than `super_majority` distinct creators.
#[derive(Clone, Copy)]
pub struct ObservationKernel {
    super_majority: usize,
}

impl ObservationKernel {
    pub fn new(super_majority: usize) -> Self {
        Self { super_majority }
    }

    /// Whether `observed` is reachable from `observer` by zero or more pointer
    /// steps. Reflexive.
    pub fn observes(&self, store: &impl BlocklaceStoreReader, observer: Hash, observed: Hash) -> bool {
        let mut frontier = vec![observer];
        let mut seen = BlockHashSet::new();
        seen.insert(observer);
        while let Some(current) = frontier.pop() {
            if current == observed {
                return true;
            }
            for &kid in &store.block(current).pointers {
                if seen.insert(kid) {
                    frontier.push(kid);
                }
            }
        }
        false
    }

    /// From `head`, follows at each step the unique pointer sharing the head's
    /// creator, and returns the last block reached (possibly `head` itself).
    pub fn leaf_of_creator(&self, store: &impl BlocklaceStoreReader, head: Hash) -> Hash {
        let creator = store.block(head).creator;
        let mut reply = head;
        while let Some(kid) = store.block(reply).pointers.iter().copied().find(|&kid| store.block(kid).creator == creator) {
            reply = kid;
        }
        reply
    }

    /// Whether `head` observes `key` without observing any block equivocating
    /// with `key`. Holds reflexively for a head whose creator is honest.
    ///
    /// Instead of testing every block in the closure of `head` for
    /// equivocation with `key`, only the known fork tips of `key`'s creator
    /// are considered: a tip that observes `key` is consistent with it, and
    /// for the others it suffices to look for their same-creator leaf in the
    /// closure of `head`.
    pub fn approves(&self, store: &impl BlocklaceStoreReader, head: Hash, key: Hash) -> bool {
        let creator = store.block(key).creator;
        let mut equivocating = BlockHashSet::new();
        if let Some(forks) = store.equivocator_tips(creator) {
            for &tip in forks.iter() {
                if !self.observes(store, tip, key) {
                    equivocating.insert(self.leaf_of_creator(store, tip));
                }
            }
        }
        if equivocating.is_empty() {
            return self.observes(store, head, key);
        }

        let mut in_tree = false;
        let mut frontier = vec![head];
        let mut seen = BlockHashSet::new();
        seen.insert(head);
        while let Some(current) = frontier.pop() {
            if equivocating.contains(&current) {
                return false;
            }
            if current == key {
                in_tree = true;
            }
            for &kid in &store.block(current).pointers {
                if seen.insert(kid) {
                    frontier.push(kid);
                }
            }
        }
        in_tree
    }

    /// Whether more than a super-majority of distinct creators approve `key`
    /// from blocks reachable from `head`. The walk is pruned to blocks at
    /// depth >= `key`'s depth.
    pub fn ratifies(&self, store: &impl BlocklaceStoreReader, head: Hash, key: Hash) -> bool {
        let depth = store.block(key).depth;
        let mut approvers: HashSet<MinerId> = HashSet::new();
        let mut frontier = vec![head];
        let mut seen = BlockHashSet::new();
        seen.insert(head);
        while let Some(observer) = frontier.pop() {
            if self.approves(store, observer, key) {
                approvers.insert(store.block(observer).creator);
            }
            for &kid in &store.block(observer).pointers {
                if store.block(kid).depth >= depth && seen.insert(kid) {
                    frontier.push(kid);
                }
            }
        }
        approvers.len() > self.super_majority
    }

    /// Whether more than a super-majority of distinct creators ratify `key`
    /// from the `heads` set. The walk descends only through ratifying blocks,
    /// pruned to depth >= `key`'s depth.
    pub fn super_ratifies(&self, store: &impl BlocklaceStoreReader, heads: &[Hash], key: Hash) -> bool {
        let depth = store.block(key).depth;
        let mut ratifiers: HashSet<MinerId> = HashSet::new();
        let mut frontier: Vec<Hash> = Vec::new();
        let mut seen = BlockHashSet::new();
        for &head in heads {
            if seen.insert(head) {
                frontier.push(head);
            }
        }
        while let Some(observer) = frontier.pop() {
            if self.ratifies(store, observer, key) {
                ratifiers.insert(store.block(observer).creator);
                for &kid in &store.block(observer).pointers {
                    if store.block(kid).depth >= depth && seen.insert(kid) {
                        frontier.push(kid);
                    }
                }
            }
        }
        log::debug!("{} ratify {} at depth {}", ratifiers.len(), key, depth);
        ratifiers.len() > self.super_majority
    }
}
