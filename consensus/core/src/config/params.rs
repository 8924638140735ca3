use crate::MinerId;
use serde::{Deserialize, Serialize};

/// Number of consecutive depths forming one wave. Only depths divisible by
/// the wavelength can host a leader.
pub const DEFAULT_WAVELENGTH: u64 = 3;

/// How many rounds below the completed round a buffered block may lag before
/// it is garbage-collected.
pub const DEFAULT_BUFFER_EVICTION_LAG: u64 = 100;

/// Selects how leaders and completed rounds are derived. Both variants share
/// the cordial-round predicate; they differ in the round-robin indexing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderSchedule {
    Async,
    #[default]
    EventScheduled,
}

/// Consensus parameters of a single miner deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    /// The full participant set, sorted ascending. Fixed for the lifetime of
    /// the deployment.
    pub everyone: Vec<MinerId>,
    pub me: MinerId,
    pub wavelength: u64,
    pub leader_schedule: LeaderSchedule,
    pub buffer_eviction_lag: u64,
}

impl Params {
    pub fn new(mut everyone: Vec<MinerId>, me: MinerId) -> Self {
        everyone.sort_unstable();
        everyone.dedup();
        assert!(everyone.binary_search(&me).is_ok(), "local miner {} is not part of the participant set", me);
        Self {
            everyone,
            me,
            wavelength: DEFAULT_WAVELENGTH,
            leader_schedule: LeaderSchedule::default(),
            buffer_eviction_lag: DEFAULT_BUFFER_EVICTION_LAG,
        }
    }

    pub fn n(&self) -> usize {
        self.everyone.len()
    }

    /// f = ⌊(n−1)/3⌋, the number of tolerated Byzantine miners.
    pub fn max_faulty(&self) -> usize {
        (self.n() - 1) / 3
    }

    /// The super-majority threshold ⌊(n+f)/2⌋. Quorum predicates require
    /// strictly more than this many distinct creators.
    pub fn super_majority(&self) -> usize {
        (self.n() + self.max_faulty()) / 2
    }

    pub fn is_member(&self, id: MinerId) -> bool {
        self.everyone.binary_search(&id).is_ok()
    }

    pub fn others(&self) -> impl Iterator<Item = MinerId> + '_ {
        let me = self.me;
        self.everyone.iter().copied().filter(move |&id| id != me)
    }
}
