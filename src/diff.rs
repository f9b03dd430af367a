use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::align;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash;
use crate::patch_format::{OpKind, PatchFile, PatchOp};
use crate::progress::DiffOptions;

/// Cancellation and progress are observed at least this often, measured in
/// bytes of `new` scanned.
const CANCEL_POLL_BYTES: usize = 4 * 1024;

/// Floor for the streaming window size.
const STREAM_WINDOW_FLOOR: usize = 64 * 1024;

/// How the operation list is produced; chosen from input sizes and the
/// configured memory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Sequential,
    Parallel,
    Streaming,
}

fn select_strategy(old_len: usize, new_len: usize, config: &Config) -> Strategy {
    let total = old_len as u64 + new_len as u64;
    if total > config.max_memory_bytes {
        return Strategy::Streaming;
    }
    if config.use_parallel && config.max_workers > 1 && old_len > config.block_size * 10 {
        return Strategy::Parallel;
    }
    Strategy::Sequential
}

/// Compute the full patch container for `(old, new)`: alignment estimate
/// (when enabled), operation list, optimizer pass, and both digests.
pub fn diff(old: &[u8], new: &[u8], options: &DiffOptions) -> Result<PatchFile> {
    let started = Instant::now();

    let offset = if options.config.enable_fft {
        align::align(old, new)
    } else {
        0
    };

    let ops = diff_ops(old, new, options);
    if options.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let ops = optimize_ops(ops);

    let old_hash = hash::sha256_with_progress(old, options.progress.as_ref());
    let new_hash = hash::sha256_with_progress(new, options.progress.as_ref());

    info!(
        ops = ops.len(),
        offset,
        elapsed = ?started.elapsed(),
        "diff completed"
    );

    Ok(PatchFile {
        old_name: Vec::new(),
        new_name: Vec::new(),
        old_size: old.len() as u32,
        new_size: new.len() as u32,
        old_hash,
        new_hash,
        offset,
        ops,
    })
}

/// Produce the raw operation list. On cancellation the list is partial; the
/// caller must not encode it (the [`diff`] entry point surfaces
/// [`Error::Cancelled`] instead).
pub fn diff_ops(old: &[u8], new: &[u8], options: &DiffOptions) -> Vec<PatchOp> {
    match select_strategy(old.len(), new.len(), &options.config) {
        Strategy::Sequential => sequential_diff(old, new, options),
        Strategy::Parallel => parallel_diff(old, new, options),
        Strategy::Streaming => {
            warn!(
                total = old.len() + new.len(),
                limit = options.config.max_memory_bytes,
                "input exceeds memory ceiling, using streaming window diff"
            );
            streaming_diff(old, new, options)
        }
    }
}

/// Linear two-cursor scan emitting alternating maximal Copy (equal) and
/// Replace (unequal) runs, then one tail Insert or Delete when the lengths
/// differ.
fn sequential_diff(old: &[u8], new: &[u8], options: &DiffOptions) -> Vec<PatchOp> {
    let min_len = old.len().min(new.len());
    let mut ops = scan_range(old, new, 0, min_len, options);
    if options.cancel.is_cancelled() {
        return ops;
    }
    append_tail(&mut ops, old, new, min_len);
    ops
}

/// Scan `[start, end)` of the common prefix region, emitting maximal runs.
/// Run boundaries are determined solely by byte equality, so the same inputs
/// always yield the same operations.
fn scan_range(
    old: &[u8],
    new: &[u8],
    start: usize,
    end: usize,
    options: &DiffOptions,
) -> Vec<PatchOp> {
    let total = new.len() as u64;
    let mut ops = Vec::new();
    let mut i = start;
    let mut next_poll = start + CANCEL_POLL_BYTES;

    while i < end {
        let run_start = i;
        let equal = old[i] == new[i];
        while i < end && (old[i] == new[i]) == equal {
            i += 1;
            if i >= next_poll {
                next_poll = i + CANCEL_POLL_BYTES;
                if let Some(progress) = &options.progress {
                    progress(i as u64, total);
                }
                if options.cancel.is_cancelled() {
                    warn!("diff cancelled, returning partial operation list");
                    ops.push(make_run(equal, run_start, i, new));
                    return ops;
                }
            }
        }
        ops.push(make_run(equal, run_start, i, new));
    }

    ops
}

fn make_run(equal: bool, start: usize, end: usize, new: &[u8]) -> PatchOp {
    if equal {
        PatchOp::copy(start as i64, (end - start) as i64)
    } else {
        PatchOp::replace(start as i64, new[start..end].to_vec())
    }
}

fn append_tail(ops: &mut Vec<PatchOp>, old: &[u8], new: &[u8], min_len: usize) {
    if new.len() > min_len {
        ops.push(PatchOp::insert(min_len as i64, new[min_len..].to_vec()));
    } else if old.len() > min_len {
        ops.push(PatchOp::delete(min_len as i64, (old.len() - min_len) as i64));
    }
}

/// Range-partitioned parallel differ. The common prefix region is split into
/// one contiguous range per worker and each range is scanned independently;
/// the optimizer rejoins runs split at range boundaries. Applying the result
/// reproduces `new` bit-exactly, same as the sequential strategy.
fn parallel_diff(old: &[u8], new: &[u8], options: &DiffOptions) -> Vec<PatchOp> {
    let min_len = old.len().min(new.len());
    let workers = options.config.max_workers;
    let range_len = min_len.div_ceil(workers);

    if range_len < options.config.block_size {
        debug!("ranges below block size, degrading parallel diff to sequential");
        return sequential_diff(old, new, options);
    }

    debug!(workers, range_len, "running range-partitioned parallel diff");

    let ranges: Vec<(usize, usize)> = (0..min_len)
        .step_by(range_len)
        .map(|s| (s, (s + range_len).min(min_len)))
        .collect();

    let per_range: Vec<Vec<PatchOp>> = ranges
        .into_par_iter()
        .map(|(start, end)| scan_range(old, new, start, end, options))
        .collect();

    let mut ops = optimize_ops(per_range.into_iter().flatten().collect());
    if options.cancel.is_cancelled() {
        return ops;
    }
    append_tail(&mut ops, old, new, min_len);
    ops
}

/// Windowed differ for inputs above the memory ceiling: each window of `new`
/// is scanned against the corresponding region of `old`, bounding the
/// captured data held per step; window results are concatenated and
/// optimized. Compactness may be lower than whole-buffer diffing because
/// runs split at window boundaries are only rejoined when the optimizer's
/// merge rules allow.
fn streaming_diff(old: &[u8], new: &[u8], options: &DiffOptions) -> Vec<PatchOp> {
    let window = ((options.config.max_memory_bytes / 4) as usize).max(STREAM_WINDOW_FLOOR);
    info!(window, "streaming diff window size");

    let min_len = old.len().min(new.len());
    let mut ops = Vec::new();
    let mut window_start = 0;

    while window_start < min_len {
        let window_end = (window_start + window).min(min_len);
        ops.extend(scan_range(old, new, window_start, window_end, options));
        if options.cancel.is_cancelled() {
            return ops;
        }
        window_start = window_end;
    }

    let mut ops = optimize_ops(ops);
    append_tail(&mut ops, old, new, min_len);
    ops
}

/// Merge adjacent same-kind Copy/Insert pairs whose regions are contiguous.
/// Other kinds pass through untouched. Idempotent: a second pass finds
/// nothing left to merge.
pub fn optimize_ops(ops: Vec<PatchOp>) -> Vec<PatchOp> {
    if ops.len() <= 1 {
        return ops;
    }

    let mut optimized: Vec<PatchOp> = Vec::with_capacity(ops.len());
    for op in ops {
        if let Some(last) = optimized.last_mut() {
            if can_merge(last, &op) {
                last.length += op.length;
                last.data.extend_from_slice(&op.data);
                continue;
            }
        }
        optimized.push(op);
    }
    optimized
}

fn can_merge(p: &PatchOp, q: &PatchOp) -> bool {
    p.kind == q.kind
        && matches!(p.kind, OpKind::Copy | OpKind::Insert)
        && p.offset + p.length == q.offset
}
