use crate::MinerId;
use crate::hashing;
use cordial_hashes::Hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single blocklace entry as it travels on the wire.
///
/// Blocks are content-addressed: `hash` (serialized as `hash_code`) is the
/// domain-separated SHA-256 of the remaining fields, with pointers taken in
/// ascending order. The struct is immutable once created; admission may only
/// re-sort `pointers`, which does not change the identity the hash commits to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub creator: MinerId,
    pub timestamp: String,
    pub payload: Vec<Value>,
    pub pointers: Vec<Hash>,
    pub depth: u64,
    #[serde(rename = "hash_code")]
    pub hash: Hash,
}

impl Block {
    pub fn new(creator: MinerId, timestamp: String, payload: Vec<Value>, mut pointers: Vec<Hash>, depth: u64) -> Self {
        pointers.sort_unstable();
        let hash = hashing::block::block_id(creator, &timestamp, &payload, &pointers, depth);
        Self { creator, timestamp, payload, pointers, depth, hash }
    }

    /// Recomputes the content id from the present field values (pointers in
    /// ascending order). Equal to `self.hash` for any honestly built block.
    pub fn compute_id(&self) -> Hash {
        let mut pointers = self.pointers.clone();
        pointers.sort_unstable();
        hashing::block::block_id(self.creator, &self.timestamp, &self.payload, &pointers, self.depth)
    }

    pub fn is_genesis(&self) -> bool {
        self.depth == 0
    }
}
