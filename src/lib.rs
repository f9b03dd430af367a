//! FFT-assisted binary delta codec.
//!
//! Given two byte buffers, [`diff`] produces a compact patch such that
//! [`apply`] reconstructs the second from the first, with SHA-256 integrity
//! gates on both ends. An FFT cross-correlation [`align`] estimates the
//! global shift between the inputs and records it in the patch header.
//!
//! The core is synchronous and CPU-bound. Callers hand it a [`Config`], an
//! optional progress sink, and a [`CancelToken`]; it keeps no global state.

pub mod align;
pub mod apply;
pub mod config;
pub mod diff;
pub mod error;
pub mod fft;
pub mod hash;
pub mod patch_format;
pub mod progress;
pub mod util;

pub use align::align;
pub use apply::{apply, apply_ops};
pub use config::Config;
pub use diff::{diff, diff_ops, optimize_ops};
pub use error::{Error, Result};
pub use hash::sha256;
pub use patch_format::{decode, encode, OpKind, PatchFile, PatchOp};
pub use progress::{ApplyOptions, CancelToken, DiffOptions, ProgressFn};
