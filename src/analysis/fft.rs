//! Spectral Analyzer
//!
//! Iterative radix-2 Cooley-Tukey FFT. Twiddle factors and the bit-reversal
//! permutation are computed once per size, so a transform does no
//! trigonometry.

use std::f64::consts::PI;

use crate::error::{Result, SpliceError};

/// Complex spectrum split into real and imaginary parts
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl Spectrum {
    /// Number of complex bins
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }
}

/// Power-of-two FFT with precomputed tables
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    size: usize,
    /// cos(2πk/n) for k in 0..n/2
    cos_table: Vec<f32>,
    /// sin(2πk/n) for k in 0..n/2
    sin_table: Vec<f32>,
    /// Bit-reversed index of every input position
    bit_reverse: Vec<usize>,
}

impl SpectralAnalyzer {
    /// Create an analyzer for transforms of `size` points
    ///
    /// Fails with `Validation` unless `size` is a power of two of at least 2.
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(SpliceError::validation(format!(
                "FFT size {} is not a power of two",
                size
            )));
        }

        let half = size / 2;
        let mut cos_table = Vec::with_capacity(half);
        let mut sin_table = Vec::with_capacity(half);
        for k in 0..half {
            let angle = 2.0 * PI * k as f64 / size as f64;
            cos_table.push(angle.cos() as f32);
            sin_table.push(angle.sin() as f32);
        }

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        Ok(Self {
            size,
            cos_table,
            sin_table,
            bit_reverse,
        })
    }

    /// Transform size in points
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform of a real signal
    ///
    /// `samples.len()` must equal the analyzer size.
    pub fn forward(&self, samples: &[f32]) -> Result<Spectrum> {
        self.check_len(samples.len())?;
        let mut real = vec![0.0; self.size];
        let mut imag = vec![0.0; self.size];
        for (i, &s) in samples.iter().enumerate() {
            real[self.bit_reverse[i]] = s;
        }
        self.butterflies(&mut real, &mut imag, false);
        Ok(Spectrum { real, imag })
    }

    /// Inverse transform, returning the real part scaled by 1/n
    pub fn inverse(&self, spectrum: &Spectrum) -> Result<Vec<f32>> {
        self.check_len(spectrum.real.len())?;
        self.check_len(spectrum.imag.len())?;
        let mut real = vec![0.0; self.size];
        let mut imag = vec![0.0; self.size];
        for i in 0..self.size {
            let j = self.bit_reverse[i];
            real[j] = spectrum.real[i];
            imag[j] = spectrum.imag[i];
        }
        self.butterflies(&mut real, &mut imag, true);
        let scale = 1.0 / self.size as f32;
        for v in &mut real {
            *v *= scale;
        }
        Ok(real)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size {
            if !len.is_power_of_two() {
                return Err(SpliceError::validation(format!(
                    "FFT input length {} is not a power of two",
                    len
                )));
            }
            return Err(SpliceError::validation(format!(
                "FFT input length {} does not match analyzer size {}",
                len, self.size
            )));
        }
        Ok(())
    }

    /// Butterfly passes over bit-reversed data, block size 2, 4, 8, ..., n
    fn butterflies(&self, real: &mut [f32], imag: &mut [f32], inverse: bool) {
        let n = self.size;
        let sign = if inverse { 1.0 } else { -1.0 };
        let mut block = 2;
        while block <= n {
            let half = block / 2;
            let stride = n / block;
            for start in (0..n).step_by(block) {
                for m in 0..half {
                    let w_re = self.cos_table[m * stride];
                    let w_im = sign * self.sin_table[m * stride];
                    let a = start + m;
                    let b = a + half;
                    let t_re = w_re * real[b] - w_im * imag[b];
                    let t_im = w_re * imag[b] + w_im * real[b];
                    real[b] = real[a] - t_re;
                    imag[b] = imag[a] - t_im;
                    real[a] += t_re;
                    imag[a] += t_im;
                }
            }
            block <<= 1;
        }
    }
}

/// Magnitude of the first half of a spectrum (real-signal symmetry)
pub fn magnitude(spectrum: &Spectrum) -> Vec<f32> {
    let half = spectrum.len() / 2;
    (0..half)
        .map(|i| (spectrum.real[i] * spectrum.real[i] + spectrum.imag[i] * spectrum.imag[i]).sqrt())
        .collect()
}

/// Power (squared magnitude) of the first half of a spectrum
pub fn power(spectrum: &Spectrum) -> Vec<f32> {
    let half = spectrum.len() / 2;
    (0..half)
        .map(|i| spectrum.real[i] * spectrum.real[i] + spectrum.imag[i] * spectrum.imag[i])
        .collect()
}

/// Hann window: `w[i] = 0.5 * (1 - cos(2πi / (n - 1)))`
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos())) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine_at_bin(n: usize, bin: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * bin as f64 * i as f64 / n as f64).sin() as f32)
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(SpectralAnalyzer::new(1000).is_err());
        assert!(SpectralAnalyzer::new(0).is_err());
        assert!(SpectralAnalyzer::new(1).is_err());
        assert!(SpectralAnalyzer::new(1024).is_ok());
    }

    #[test]
    fn test_forward_rejects_wrong_length() {
        let fft = SpectralAnalyzer::new(8).unwrap();
        let err = fft.forward(&[0.0; 6]).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(fft.forward(&[0.0; 16]).is_err());
    }

    #[test]
    fn test_sinusoid_peaks_at_its_bin() {
        for &(n, bin) in &[(64usize, 5usize), (256, 17), (1024, 100), (2048, 1)] {
            let fft = SpectralAnalyzer::new(n).unwrap();
            let mag = magnitude(&fft.forward(&sine_at_bin(n, bin)).unwrap());
            assert_eq!(mag.len(), n / 2);
            let peak = argmax(&mag);
            assert!(
                (peak as i64 - bin as i64).abs() <= 1,
                "n={} expected bin {}, got {}",
                n,
                bin,
                peak
            );
        }
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let fft = SpectralAnalyzer::new(16).unwrap();
        let mut impulse = vec![0.0; 16];
        impulse[0] = 1.0;
        let mag = magnitude(&fft.forward(&impulse).unwrap());
        for m in mag {
            assert_abs_diff_eq!(m, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_inverse_restores_signal() {
        let fft = SpectralAnalyzer::new(128).unwrap();
        let signal: Vec<f32> = (0..128).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        let restored = fft.inverse(&fft.forward(&signal).unwrap()).unwrap();
        for (a, b) in signal.iter().zip(restored.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_power_is_squared_magnitude() {
        let fft = SpectralAnalyzer::new(32).unwrap();
        let spectrum = fft.forward(&sine_at_bin(32, 3)).unwrap();
        let mag = magnitude(&spectrum);
        let pow = power(&spectrum);
        for (m, p) in mag.iter().zip(pow.iter()) {
            assert_abs_diff_eq!(m * m, *p, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[2], 1.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[4], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[1], w[3], epsilon = 1e-7);
    }
}
