use num_complex::Complex64;
use rayon::prelude::*;

/// Below this size the sequential path always wins; stage fork-join overhead
/// dominates the butterflies.
pub const PARALLEL_FFT_THRESHOLD: usize = 1024;

/// Radix-2 iterative Cooley-Tukey transform with precomputed twiddle factors
/// and bit-reversal permutation. The size must be a power of two; callers
/// round up with [`next_pow2`].
pub struct Fft {
    n: usize,
    roots: Vec<Complex64>,
    bit_reverse: Vec<usize>,
    threshold: usize,
}

impl Fft {
    pub fn new(n: usize) -> Self {
        Self::with_threshold(n, PARALLEL_FFT_THRESHOLD)
    }

    /// `threshold` is the minimum size at which [`Fft::parallel_transform`]
    /// actually forks workers.
    pub fn with_threshold(n: usize, threshold: usize) -> Self {
        assert!(
            n > 0 && n.is_power_of_two(),
            "FFT size must be a power of two, got {n}"
        );

        let angle = 2.0 * std::f64::consts::PI / n as f64;
        let roots: Vec<Complex64> = (0..n)
            .map(|k| Complex64::from_polar(1.0, angle * k as f64))
            .collect();

        let bits = n.trailing_zeros();
        let bit_reverse: Vec<usize> = (0..n).map(|i| reverse_bits(i, bits)).collect();

        Self {
            n,
            roots,
            bit_reverse,
            threshold,
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Forward (or inverse, with `1/n` scaling) transform of `input` into
    /// `output`. Both slices must match the configured size.
    pub fn transform(&self, input: &[Complex64], output: &mut [Complex64], inverse: bool) {
        self.check_lengths(input, output);

        if self.n == 1 {
            output[0] = input[0];
            return;
        }

        self.permute(input, output);

        let mut length = 2;
        while length <= self.n {
            let wlen = self.stage_root(length, inverse);
            for block in output.chunks_mut(length) {
                butterfly_block(block, wlen);
            }
            length <<= 1;
        }

        if inverse {
            self.normalize(output);
        }
    }

    /// Per-stage fork-join variant: the independent butterflies of each stage
    /// are partitioned across the rayon pool, joining before the next stage.
    /// Workers share the read-only twiddle and bit-reversal tables and write
    /// to disjoint blocks of `output`. Falls back to [`Fft::transform`] for
    /// `workers <= 1` or sizes below the threshold.
    pub fn parallel_transform(
        &self,
        input: &[Complex64],
        output: &mut [Complex64],
        inverse: bool,
        workers: usize,
    ) {
        if workers <= 1 || self.n < self.threshold {
            self.transform(input, output, inverse);
            return;
        }

        self.check_lengths(input, output);
        self.permute(input, output);

        let mut length = 2;
        while length <= self.n {
            let wlen = self.stage_root(length, inverse);
            output
                .par_chunks_mut(length)
                .for_each(|block| butterfly_block(block, wlen));
            length <<= 1;
        }

        if inverse {
            self.normalize(output);
        }
    }

    fn check_lengths(&self, input: &[Complex64], output: &[Complex64]) {
        assert_eq!(
            input.len(),
            self.n,
            "input length must match FFT size {}",
            self.n
        );
        assert_eq!(
            output.len(),
            self.n,
            "output length must match FFT size {}",
            self.n
        );
    }

    fn permute(&self, input: &[Complex64], output: &mut [Complex64]) {
        for (slot, &source) in output.iter_mut().zip(&self.bit_reverse) {
            *slot = input[source];
        }
    }

    /// Base root for a stage of the given butterfly length: `W[step]`
    /// forward, `W[n-step]` inverse.
    fn stage_root(&self, length: usize, inverse: bool) -> Complex64 {
        let step = self.n / length;
        if inverse {
            self.roots[self.n - step]
        } else {
            self.roots[step]
        }
    }

    fn normalize(&self, output: &mut [Complex64]) {
        let scale = 1.0 / self.n as f64;
        for value in output.iter_mut() {
            *value = value.scale(scale);
        }
    }
}

fn butterfly_block(block: &mut [Complex64], wlen: Complex64) {
    let half = block.len() / 2;
    let mut w = Complex64::new(1.0, 0.0);
    for j in 0..half {
        let u = block[j];
        let v = block[j + half] * w;
        block[j] = u + v;
        block[j + half] = u - v;
        w *= wlen;
    }
}

/// Smallest power of two >= `n`.
pub fn next_pow2(n: usize) -> usize {
    if n == 0 {
        1
    } else {
        n.next_power_of_two()
    }
}

/// Reverse the low `bits` bits of `value`.
pub fn reverse_bits(mut value: usize, bits: u32) -> usize {
    let mut result = 0;
    for _ in 0..bits {
        result = (result << 1) | (value & 1);
        value >>= 1;
    }
    result
}

/// Circular-free convolution of `a` and `b` via zero-padded FFT, truncated to
/// the `|a| + |b| - 1` meaningful samples.
pub fn convolve(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let out_len = a.len() + b.len() - 1;
    let n = next_pow2(out_len);
    let fft = Fft::new(n);

    let mut padded_a = vec![Complex64::default(); n];
    let mut padded_b = vec![Complex64::default(); n];
    padded_a[..a.len()].copy_from_slice(a);
    padded_b[..b.len()].copy_from_slice(b);

    let mut fa = vec![Complex64::default(); n];
    let mut fb = vec![Complex64::default(); n];
    fft.transform(&padded_a, &mut fa, false);
    fft.transform(&padded_b, &mut fb, false);

    let product: Vec<Complex64> = fa.iter().zip(&fb).map(|(x, y)| x * y).collect();

    let mut result = vec![Complex64::default(); n];
    fft.transform(&product, &mut result, true);
    result.truncate(out_len);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_error(a: &[Complex64], b: &[Complex64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn impulse_roundtrip_small_sizes() {
        for n in [2usize, 4, 8, 16, 32, 64] {
            let fft = Fft::new(n);
            let mut input = vec![Complex64::default(); n];
            input[0] = Complex64::new(1.0, 0.0);

            let mut freq = vec![Complex64::default(); n];
            fft.transform(&input, &mut freq, false);

            let mut recovered = vec![Complex64::default(); n];
            fft.transform(&freq, &mut recovered, true);

            assert!(
                max_error(&input, &recovered) < 1e-10,
                "round-trip error too large for n={n}"
            );
        }
    }

    #[test]
    fn sine_wave_peaks() {
        let n = 16;
        let fft = Fft::new(n);
        let freq = 2.0 * std::f64::consts::PI * 3.0 / n as f64;
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((freq * i as f64).sin(), 0.0))
            .collect();

        let mut output = vec![Complex64::default(); n];
        fft.transform(&input, &mut output, false);

        // a 3-cycle sine concentrates energy in bins 3 and n-3
        assert!(output[3].norm() > 5.0);
        assert!(output[n - 3].norm() > 5.0);
    }

    #[test]
    fn dc_component_is_input_sum() {
        let n = 32;
        let fft = Fft::new(n);
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((i % 7) as f64, (i % 5) as f64))
            .collect();

        let mut output = vec![Complex64::default(); n];
        fft.transform(&input, &mut output, false);

        let expected: Complex64 = input.iter().sum();
        assert!((output[0] - expected).norm() < 1e-10);
    }

    #[test]
    fn byte_magnitude_roundtrip_large() {
        let n = 1 << 14;
        let fft = Fft::new(n);
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((i.wrapping_mul(2654435761) % 256) as f64, 0.0))
            .collect();

        let mut freq = vec![Complex64::default(); n];
        let mut recovered = vec![Complex64::default(); n];
        fft.transform(&input, &mut freq, false);
        fft.transform(&freq, &mut recovered, true);

        assert!(max_error(&input, &recovered) < 1e-10);
    }

    #[test]
    fn parallel_matches_sequential() {
        let n = 4096;
        let fft = Fft::new(n);
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((2.0 * std::f64::consts::PI * i as f64 / 64.0).sin(), 0.0))
            .collect();

        let mut serial = vec![Complex64::default(); n];
        let mut parallel = vec![Complex64::default(); n];
        fft.transform(&input, &mut serial, false);
        fft.parallel_transform(&input, &mut parallel, false, 4);

        assert!(max_error(&serial, &parallel) < 1e-10);

        // inverse path as well
        let mut serial_inv = vec![Complex64::default(); n];
        let mut parallel_inv = vec![Complex64::default(); n];
        fft.transform(&serial, &mut serial_inv, true);
        fft.parallel_transform(&parallel, &mut parallel_inv, true, 4);
        assert!(max_error(&serial_inv, &parallel_inv) < 1e-10);
    }

    #[test]
    fn parallel_below_threshold_degrades() {
        let n = 64;
        let fft = Fft::new(n);
        let input: Vec<Complex64> = (0..n).map(|i| Complex64::new(i as f64, 0.0)).collect();

        let mut a = vec![Complex64::default(); n];
        let mut b = vec![Complex64::default(); n];
        fft.transform(&input, &mut a, false);
        fft.parallel_transform(&input, &mut b, false, 8);
        assert!(max_error(&a, &b) < 1e-12);
    }

    #[test]
    fn size_one_is_identity() {
        let fft = Fft::new(1);
        let input = [Complex64::new(4.2, -1.0)];
        let mut output = [Complex64::default()];
        fft.transform(&input, &mut output, false);
        assert_eq!(output[0], input[0]);
    }

    #[test]
    fn convolve_known_sequences() {
        let a: Vec<Complex64> = [1.0, 2.0, 3.0]
            .iter()
            .map(|&x| Complex64::new(x, 0.0))
            .collect();
        let b: Vec<Complex64> = [4.0, 5.0]
            .iter()
            .map(|&x| Complex64::new(x, 0.0))
            .collect();

        let c = convolve(&a, &b);
        let expected = [4.0, 13.0, 22.0, 15.0];
        assert_eq!(c.len(), expected.len());
        for (got, want) in c.iter().zip(expected) {
            assert!((got.re - want).abs() < 1e-10);
            assert!(got.im.abs() < 1e-10);
        }
    }

    #[test]
    fn convolve_empty_input() {
        assert!(convolve(&[], &[Complex64::new(1.0, 0.0)]).is_empty());
    }

    #[test]
    fn next_pow2_cases() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(1023), 1024);
        assert_eq!(next_pow2(1024), 1024);
        assert_eq!(next_pow2(1025), 2048);
    }

    #[test]
    fn reverse_bits_cases() {
        assert_eq!(reverse_bits(0b001, 3), 0b100);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(0b1011, 4), 0b1101);
        assert_eq!(reverse_bits(1, 10), 512);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two() {
        let _ = Fft::new(12);
    }
}
