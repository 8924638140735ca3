use crate::MinerId;
use cordial_hashes::Hash;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("block creator {0} is not a known miner")]
    UnknownCreator(MinerId),

    #[error("genesis block carries {0} pointers")]
    NonEmptyGenesisPointers(usize),

    #[error("block at depth {depth} has {count} pointers when more than {required} are required")]
    InsufficientPointers { depth: u64, count: usize, required: usize },

    #[error("block has missing parents: {0:?}")]
    MissingParents(Vec<Hash>),

    #[error("two pointers share creator {0}")]
    RepeatedPointerCreator(MinerId),

    #[error("pointer {0} at depth {1} does not precede depth {2}")]
    PointerDepthTooHigh(Hash, u64, u64),

    #[error("only {0} pointers at the previous depth when more than {1} are required")]
    SparsePreviousDepth(usize, usize),
}

pub type BlockProcessResult<T> = std::result::Result<T, RuleError>;
