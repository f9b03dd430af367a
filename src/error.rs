use thiserror::Error;

/// Errors surfaced by the core diff/apply/codec pipeline.
///
/// Soft conditions (out-of-range operations, oversized inputs, unknown
/// operation tags) are recovered locally and logged; they never appear here.
#[derive(Debug, Error)]
pub enum Error {
    /// The patch container is malformed: wrong magic, unsupported version,
    /// truncated stream, or inconsistent length fields.
    #[error("bad patch: {0}")]
    BadPatch(String),

    /// A file digest disagrees with the one recorded in the patch header.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The cancellation handle fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn hash_mismatch(expected: &[u8; 32], actual: &[u8; 32]) -> Self {
        Error::HashMismatch {
            expected: hex(expected),
            actual: hex(actual),
        }
    }
}

fn hex(digest: &[u8; 32]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub type Result<T> = std::result::Result<T, Error>;
