//! Frequency-domain low-pass used by detail-preserving smoothing.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Attenuate high spatial frequencies of a row-major `width` x `height`
/// field and blend the result back by `apply_ratio`.
///
/// `detail_scale` picks the cutoff: values toward 1 remove progressively
/// more detail, 0 barely filters. The zero-frequency bin passes unchanged so
/// the field's mean is preserved.
pub fn low_pass(width: usize, height: usize, data: &mut [f32], detail_scale: f32, apply_ratio: f32) {
    if width < 2 || height < 2 || data.len() != width * height || apply_ratio <= 0.0 {
        return;
    }

    let mut planner = FftPlanner::<f32>::new();
    let mut buf: Vec<Complex<f32>> = data.iter().map(|&v| Complex::new(v, 0.0)).collect();

    planner.plan_fft_forward(width).process(&mut buf);
    let mut cols = transpose(&buf, width, height);
    planner.plan_fft_forward(height).process(&mut cols);

    // quadrant-folded frequency distance against a first-order rolloff
    let cutoff = (width.min(height) as f32 * (1.0 - detail_scale.clamp(0.0, 1.0))).max(1.0);
    let cutoff_sq = cutoff * cutoff;
    for x in 0..width {
        let dx = x.min(width - x) as f32;
        for y in 0..height {
            let dy = y.min(height - y) as f32;
            let coef = 1.0 / (1.0 + (dx * dx + dy * dy) / cutoff_sq);
            cols[x * height + y] *= coef;
        }
    }

    planner.plan_fft_inverse(height).process(&mut cols);
    let mut buf = transpose_back(&cols, width, height);
    planner.plan_fft_inverse(width).process(&mut buf);

    let norm = 1.0 / (width * height) as f32;
    let ratio = apply_ratio.min(1.0);
    for (v, c) in data.iter_mut().zip(buf.iter()) {
        *v += (c.re * norm - *v) * ratio;
    }
}

fn transpose(src: &[Complex<f32>], width: usize, height: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); src.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = src[y * width + x];
        }
    }
    out
}

fn transpose_back(src: &[Complex<f32>], width: usize, height: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); src.len()];
    for x in 0..width {
        for y in 0..height {
            out[y * width + x] = src[x * height + y];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variance(data: &[f32]) -> f32 {
        let mean = data.iter().sum::<f32>() / data.len() as f32;
        data.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / data.len() as f32
    }

    #[test]
    fn test_constant_field_preserved() {
        let mut data = vec![1234.5f32; 16 * 16];
        low_pass(16, 16, &mut data, 0.2, 1.0);
        for v in &data {
            assert!((v - 1234.5).abs() < 1e-2, "{}", v);
        }
    }

    #[test]
    fn test_checkerboard_attenuated() {
        let mut data: Vec<f32> = (0..16 * 16)
            .map(|i| if (i / 16 + i % 16) % 2 == 0 { 100.0 } else { -100.0 })
            .collect();
        let before = variance(&data);
        low_pass(16, 16, &mut data, 0.8, 1.0);
        assert!(variance(&data) < before * 0.2);
        // mean stays at zero
        let mean = data.iter().sum::<f32>() / data.len() as f32;
        assert!(mean.abs() < 1e-2);
    }

    #[test]
    fn test_zero_ratio_is_noop() {
        let mut data: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let orig = data.clone();
        low_pass(8, 8, &mut data, 0.5, 0.0);
        assert_eq!(data, orig);
    }

    #[test]
    fn test_degenerate_sizes_ignored() {
        let mut data = vec![5.0f32; 7];
        low_pass(7, 1, &mut data, 0.5, 1.0);
        assert_eq!(data, vec![5.0f32; 7]);
    }

    #[test]
    fn test_low_frequency_survives() {
        // a broad ramp keeps most of its shape
        let mut data: Vec<f32> = (0..32 * 32).map(|i| (i % 32) as f32).collect();
        let orig = data.clone();
        low_pass(32, 32, &mut data, 0.5, 1.0);
        let diff: f32 = data
            .iter()
            .zip(orig.iter())
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / data.len() as f32;
        assert!(diff < 4.0, "average drift {}", diff);
    }
}
