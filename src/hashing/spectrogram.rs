//! Log-mel spectrograms for audio hashing.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

pub const FFT_SIZE: usize = 1024;
pub const HOP_SIZE: usize = 512;
pub const MEL_BANDS: usize = 64;

/// Short-time Fourier transform with a periodic Hann window.
pub struct Spectrogram {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Spectrogram {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            fft,
            fft_size,
            hop_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Frames per second of audio at `sample_rate`.
    pub fn frame_rate(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / self.hop_size as f64
    }

    /// Magnitude frames, each with `fft_size / 2 + 1` bins.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        if samples.len() < self.fft_size {
            return Vec::new();
        }
        let frames = (samples.len() - self.fft_size) / self.hop_size + 1;
        let bins = self.fft_size / 2 + 1;

        (0..frames)
            .map(|frame| {
                let start = frame * self.hop_size;
                for (i, slot) in self.buffer.iter_mut().enumerate() {
                    *slot = Complex::new(samples[start + i] * self.window[i], 0.0);
                }
                self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
                self.buffer[..bins].iter().map(|c| c.norm()).collect()
            })
            .collect()
    }

    /// Log-mel frames, each with `mel_bands` values.
    pub fn log_mel(&mut self, samples: &[f32], sample_rate: u32, mel_bands: usize) -> Vec<Vec<f32>> {
        let frames = self.magnitudes(samples);
        if frames.is_empty() {
            return frames;
        }
        let bins = self.fft_size / 2 + 1;
        let filterbank = mel_filterbank(sample_rate, self.fft_size, mel_bands);

        frames
            .iter()
            .map(|frame| {
                filterbank
                    .chunks(bins)
                    .map(|weights| {
                        let energy: f32 = weights.iter().zip(frame).map(|(w, m)| w * m).sum();
                        energy.max(1e-10).ln()
                    })
                    .collect()
            })
            .collect()
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters, row-major `[mel_bands x bins]`.
fn mel_filterbank(sample_rate: u32, fft_size: usize, mel_bands: usize) -> Vec<f32> {
    let bins = fft_size / 2 + 1;
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);
    let edges: Vec<f32> = (0..mel_bands + 2)
        .map(|i| mel_max * i as f32 / (mel_bands + 1) as f32)
        .map(|mel| mel_to_hz(mel) * fft_size as f32 / sample_rate as f32)
        .collect();

    let mut filterbank = vec![0.0f32; mel_bands * bins];
    for (band, window) in edges.windows(3).enumerate() {
        let (left, center, right) = (window[0], window[1], window[2]);
        for bin in 0..bins {
            let f = bin as f32;
            filterbank[band * bins + bin] = if f >= left && f <= center {
                (f - left) / (center - left + 1e-10)
            } else if f > center && f <= right {
                (right - f) / (right - center + 1e-10)
            } else {
                0.0
            };
        }
    }
    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        (0..(sample_rate as f32 * seconds) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_magnitudes_peak_at_tone() {
        let mut spec = Spectrogram::new(FFT_SIZE, HOP_SIZE);
        let frames = spec.magnitudes(&sine(1000.0, 16000, 0.5));
        assert_eq!(frames.len(), (8000 - FFT_SIZE) / HOP_SIZE + 1);

        let frame = &frames[2];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // 1000 Hz at 16 kHz with 1024 bins lands on bin 64.
        assert!((63..=65).contains(&peak), "peak at {peak}");
    }

    #[test]
    fn test_log_mel_shape() {
        let mut spec = Spectrogram::new(FFT_SIZE, HOP_SIZE);
        let frames = spec.log_mel(&sine(440.0, 16000, 1.0), 16000, MEL_BANDS);
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.len() == MEL_BANDS));
        assert!(frames.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_input_has_no_frames() {
        let mut spec = Spectrogram::new(FFT_SIZE, HOP_SIZE);
        assert!(spec.magnitudes(&[0.0; 100]).is_empty());
        assert!(spec.log_mel(&[0.0; 100], 16000, MEL_BANDS).is_empty());
    }
}
