//! Property-based roundtrip tests for the delta pipeline and patch codec.
//!
//! proptest generates arbitrary byte buffers and checks the invariants that
//! must hold for every input pair:
//!
//! - diff then apply reconstructs the target exactly
//! - the container codec is self-inverse and rejects corrupted headers
//! - the optimizer is idempotent and never changes the applied result
//! - output-producing operation lengths account for every target byte

use proptest::prelude::*;

use bindiff::{
    apply, apply_ops, decode, diff, diff_ops, encode, optimize_ops, ApplyOptions, DiffOptions,
    PatchOp,
};

fn buffers() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        proptest::collection::vec(any::<u8>(), 0..2048),
        proptest::collection::vec(any::<u8>(), 0..2048),
    )
}

/// Pairs that share structure, so copy runs actually appear.
fn related_buffers() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        proptest::collection::vec(any::<u8>(), 1..1024),
        proptest::collection::vec(any::<(prop::sample::Index, u8)>(), 0..16),
        0usize..64,
    )
        .prop_map(|(old, edits, grow)| {
            let mut new = old.clone();
            for (index, value) in edits {
                let i = index.index(new.len());
                new[i] = value;
            }
            new.extend(std::iter::repeat(0xA5u8).take(grow));
            (old, new)
        })
}

proptest! {
    /// apply(old, decode(encode(diff(old, new)))) == new for arbitrary pairs.
    #[test]
    fn diff_apply_roundtrip((old, new) in buffers()) {
        let patch = diff(&old, &new, &DiffOptions::default()).unwrap();
        let decoded = decode(&encode(&patch)).unwrap();
        prop_assert_eq!(&decoded, &patch);

        let result = apply(&old, &decoded, &ApplyOptions::default()).unwrap();
        prop_assert_eq!(result, new);
    }

    /// Same roundtrip over structurally related pairs, where copy and replace
    /// runs interleave.
    #[test]
    fn diff_apply_roundtrip_related((old, new) in related_buffers()) {
        let patch = diff(&old, &new, &DiffOptions::default()).unwrap();
        let result = apply(&old, &patch, &ApplyOptions::default()).unwrap();
        prop_assert_eq!(result, new);
    }

    /// The operation list covers the target exactly: output-producing lengths
    /// sum to |new|.
    #[test]
    fn size_differential((old, new) in buffers()) {
        let ops = diff_ops(&old, &new, &DiffOptions::default());
        let produced: i64 = ops.iter().map(PatchOp::output_len).sum();
        prop_assert_eq!(produced, new.len() as i64);
    }

    /// Operations arrive in strictly increasing offset order.
    #[test]
    fn ops_are_ordered((old, new) in buffers()) {
        let ops = diff_ops(&old, &new, &DiffOptions::default());
        for pair in ops.windows(2) {
            prop_assert!(pair[0].offset < pair[1].offset);
        }
    }

    /// optimize(optimize(ops)) == optimize(ops), and optimization never
    /// changes what the patch reconstructs.
    #[test]
    fn optimizer_idempotent_and_semantics_preserving((old, new) in related_buffers()) {
        let ops = diff_ops(&old, &new, &DiffOptions::default());
        let once = optimize_ops(ops.clone());
        let twice = optimize_ops(once.clone());
        prop_assert_eq!(&once, &twice);

        let raw = apply_ops(&old, &ops, &ApplyOptions::default());
        let optimized = apply_ops(&old, &once, &ApplyOptions::default());
        prop_assert_eq!(raw, optimized);
    }

    /// Deterministic: the same inputs always produce the same operation list.
    #[test]
    fn diff_is_deterministic((old, new) in buffers()) {
        let a = diff_ops(&old, &new, &DiffOptions::default());
        let b = diff_ops(&old, &new, &DiffOptions::default());
        prop_assert_eq!(a, b);
    }

    /// A corrupted magic or version field is always rejected.
    #[test]
    fn decode_rejects_corrupt_header(
        (old, new) in related_buffers(),
        byte in 0usize..8,
        xor in 1u8..=255,
    ) {
        let patch = diff(&old, &new, &DiffOptions::default()).unwrap();
        let mut encoded = encode(&patch);
        encoded[byte] ^= xor;
        prop_assert!(decode(&encoded).is_err());
    }

    /// Truncating the container anywhere is always rejected.
    #[test]
    fn decode_rejects_truncation((old, new) in related_buffers(), cut in any::<prop::sample::Index>()) {
        let patch = diff(&old, &new, &DiffOptions::default()).unwrap();
        let encoded = encode(&patch);
        let len = cut.index(encoded.len());
        prop_assert!(decode(&encoded[..len]).is_err());
    }
}
