use std::time::Instant;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::hash;
use crate::patch_format::{OpKind, PatchFile, PatchOp};
use crate::progress::ApplyOptions;

/// Apply a decoded patch to `old` with both integrity gates: the source
/// digest is checked before replay, and the result digest afterwards when
/// `verify_result` is set. Hash mismatches are fatal; no partial output
/// escapes them.
pub fn apply(old: &[u8], patch: &PatchFile, options: &ApplyOptions) -> Result<Vec<u8>> {
    let started = Instant::now();

    let old_hash = hash::sha256_with_progress(old, options.progress.as_ref());
    if !hash::hashes_equal(&old_hash, &patch.old_hash) {
        return Err(Error::hash_mismatch(&patch.old_hash, &old_hash));
    }

    let output = apply_ops(old, &patch.ops, options);
    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if options.verify_result {
        let new_hash = hash::sha256(&output);
        if !hash::hashes_equal(&new_hash, &patch.new_hash) {
            return Err(Error::hash_mismatch(&patch.new_hash, &new_hash));
        }
    }

    info!(
        ops = patch.ops.len(),
        bytes = output.len(),
        elapsed = ?started.elapsed(),
        "patch applied"
    );
    Ok(output)
}

/// Replay an operation list against `old`.
///
/// A read cursor walks `old` while operations append to the output. Gaps the
/// differ left unclaimed are preserved: when an operation starts beyond the
/// cursor the skipped window is copied through, and any source tail left
/// after the final operation is appended. Out-of-range operations are soft
/// errors: logged, then skipped or truncated.
pub fn apply_ops(old: &[u8], ops: &[PatchOp], options: &ApplyOptions) -> Vec<u8> {
    let estimated: i64 = ops.iter().map(PatchOp::output_len).sum();
    let mut output = Vec::with_capacity(estimated.max(0) as usize);
    let mut cursor = 0usize;

    for op in ops {
        if options.cancel.is_cancelled() {
            warn!("apply cancelled, returning partial output");
            return output;
        }
        if let Some(progress) = &options.progress {
            progress(output.len() as u64, estimated.max(0) as u64);
        }

        if op.offset < 0 || op.offset as usize > old.len() {
            warn!(
                offset = op.offset,
                old_len = old.len(),
                "operation offset out of range, skipping"
            );
            continue;
        }
        if op.length < 0 {
            warn!(length = op.length, "operation length is negative, skipping");
            continue;
        }

        let offset = op.offset as usize;
        if offset > cursor {
            output.extend_from_slice(&old[cursor..offset]);
            cursor = offset;
        }

        match op.kind {
            OpKind::Insert => {
                output.extend_from_slice(&op.data);
            }
            OpKind::Replace => {
                output.extend_from_slice(&op.data);
                cursor = cursor.saturating_add(op.length as usize);
            }
            OpKind::Delete => {
                cursor = cursor.saturating_add(op.length as usize);
            }
            OpKind::Copy | OpKind::Match => {
                let mut end = cursor.saturating_add(op.length as usize);
                if end > old.len() {
                    warn!(
                        length = op.length,
                        "copy window exceeds source bounds, truncating"
                    );
                    end = old.len();
                }
                if cursor < old.len() && end > cursor {
                    output.extend_from_slice(&old[cursor..end]);
                    cursor = end;
                }
            }
        }
    }

    if cursor < old.len() {
        output.extend_from_slice(&old[cursor..]);
    }

    output
}
