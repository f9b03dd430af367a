use sha2::{Digest, Sha256};

use crate::progress::ProgressFn;

/// Chunk size for progress-reporting digests.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of the whole buffer.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 computed over 64 KiB chunks, reporting `(bytes_done, bytes_total)`
/// to the sink after each chunk.
pub fn sha256_with_progress(data: &[u8], progress: Option<&ProgressFn>) -> [u8; 32] {
    let Some(progress) = progress else {
        return sha256(data);
    };

    let total = data.len() as u64;
    let mut hasher = Sha256::new();
    let mut done = 0u64;
    for chunk in data.chunks(HASH_CHUNK_SIZE) {
        hasher.update(chunk);
        done += chunk.len() as u64;
        progress(done, total);
    }
    hasher.finalize().into()
}

/// Constant-time digest comparison.
pub fn hashes_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn hex(digest: &[u8; 32]) -> String {
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn known_vectors() {
        assert_eq!(
            hex(&sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn chunked_digest_matches_whole_buffer() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_in_sink = calls.clone();
        let sink: ProgressFn = Arc::new(move |done, total| {
            calls_in_sink.fetch_add(1, Ordering::Relaxed);
            assert!(done <= total);
        });
        let chunked = sha256_with_progress(&data, Some(&sink));
        assert_eq!(chunked, sha256(&data));
        // 200_000 bytes / 64 KiB chunks
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn digest_comparison() {
        let a = sha256(b"same");
        let b = sha256(b"same");
        let c = sha256(b"other");
        assert!(hashes_equal(&a, &b));
        assert!(!hashes_equal(&a, &c));
    }
}
