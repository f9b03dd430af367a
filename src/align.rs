use num_complex::Complex64;
use tracing::debug;

use crate::fft::{next_pow2, Fft};

/// Estimate the global shift between `old` and `new` by FFT cross-correlation
/// of `old` with the time-reversed `new`.
///
/// The returned shift means `new[i]` tends to equal `old[i + shift]`. It is
/// stored in the patch header for diagnostics; the differ itself is
/// positional and does not re-align.
pub fn align(old: &[u8], new: &[u8]) -> i32 {
    if old.is_empty() || new.is_empty() {
        return 0;
    }

    let len_a = old.len();
    let len_b = new.len();
    let n = next_pow2(len_a + len_b - 1);
    let fft = Fft::new(n);

    let mut a = vec![Complex64::default(); n];
    let mut b = vec![Complex64::default(); n];
    for (slot, &byte) in a.iter_mut().zip(old) {
        *slot = Complex64::new(byte as f64, 0.0);
    }
    for (slot, &byte) in b.iter_mut().zip(new.iter().rev()) {
        *slot = Complex64::new(byte as f64, 0.0);
    }

    let mut fa = vec![Complex64::default(); n];
    let mut fb = vec![Complex64::default(); n];
    fft.transform(&a, &mut fa, false);
    fft.transform(&b, &mut fb, false);

    let product: Vec<Complex64> = fa.iter().zip(&fb).map(|(x, y)| x * y).collect();

    let mut corr = vec![Complex64::default(); n];
    fft.transform(&product, &mut corr, true);

    let mut max_idx = 0;
    let mut max_val = corr[0].re;
    for (i, value) in corr.iter().enumerate().skip(1) {
        if value.re > max_val {
            max_val = value.re;
            max_idx = i;
        }
    }

    // wrap once: negative lags land in the top of the circular buffer
    let mut shift = max_idx as i64 - len_b as i64 + 1;
    if shift < -(len_b as i64) + 1 {
        shift += n as i64;
    }

    debug!(shift, peak = max_val, "alignment estimate");
    shift as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic byte pattern with a sharp autocorrelation peak.
    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn identical_buffers_align_at_zero() {
        let data = noise(512, 7);
        assert_eq!(align(&data, &data), 0);
    }

    #[test]
    fn detects_positive_shift() {
        // new[i] == old[i + 32]
        let old = noise(512, 21);
        let new = old[32..].to_vec();
        assert_eq!(align(&old, &new), 32);
    }

    #[test]
    fn detects_negative_shift() {
        // new is old delayed by 48 zeros: new[i + 48] == old[i]
        let old = noise(512, 3);
        let mut new = vec![0u8; 48];
        new.extend_from_slice(&old);
        assert_eq!(align(&old, &new), -48);
    }

    #[test]
    fn empty_inputs_align_at_zero() {
        assert_eq!(align(b"", b"data"), 0);
        assert_eq!(align(b"data", b""), 0);
        assert_eq!(align(b"", b""), 0);
    }

    #[test]
    fn single_byte_inputs() {
        assert_eq!(align(b"a", b"a"), 0);
    }
}
