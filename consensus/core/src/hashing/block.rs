use super::HasherExtensions;
use crate::MinerId;
use cordial_hashes::{BlockIdHash, Hash};
use serde_json::Value;

/// Computes the canonical content id of a block.
///
/// Two miners that build the same logical block must derive the same id, so
/// every field is written in a fixed order with length prefixes. Payload
/// values are canonicalized as compact JSON with lexicographically sorted
/// object keys (serde_json's default map ordering). `pointers` must already
/// be sorted ascending; the pointer set is semantically unordered and the id
/// must not depend on arrival order.
pub fn block_id(creator: MinerId, timestamp: &str, payload: &[Value], pointers: &[Hash], depth: u64) -> Hash {
    debug_assert!(pointers.windows(2).all(|w| w[0] <= w[1]));
    let mut hasher = BlockIdHash::new();
    hasher.write_u16(creator).write_var_bytes(timestamp.as_bytes()).write_len(payload.len());
    for value in payload {
        hasher.write_var_bytes(&serde_json::to_vec(value).expect("JSON values always serialize"));
    }
    hasher.write_var_array(pointers).write_u64(depth);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_key_order_is_canonical() {
        // Two JSON texts spelling the same object must hash identically.
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": [2, 3]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": [2, 3], "x": 1}"#).unwrap();
        assert_eq!(block_id(0, "t", &[a], &[], 0), block_id(0, "t", &[b], &[], 0));
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Length prefixes must keep adjacent variable-size fields apart.
        let id1 = block_id(0, "ab", &[json!("c")], &[], 0);
        let id2 = block_id(0, "a", &[json!("bc")], &[], 0);
        assert_ne!(id1, id2);

        let id3 = block_id(0, "t", &[json!("x"), json!("y")], &[], 0);
        let id4 = block_id(0, "t", &[json!("xy")], &[], 0);
        assert_ne!(id3, id4);
    }
}
