// Byte-spectrum analyser over the engine's sample tap.
//
// Mirrors the browser analyser-node contract the visualizer was written
// against: fixed fft size, 0-255 energy bytes per bin, dB range -100..-30,
// smoothing constant 0.8.

use std::f32::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::audio::engine::SampleTap;

pub const FFT_SIZE: usize = 2048;

const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

pub struct Analyser {
    tap: SampleTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(tap: SampleTap) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                let phase = i as f32 / (FFT_SIZE - 1) as f32;
                0.5 * (1.0 - (2.0 * PI * phase).cos())
            })
            .collect();
        Self {
            tap,
            fft,
            window,
            scratch: Vec::with_capacity(FFT_SIZE),
            smoothed: vec![0.0; FFT_SIZE / 2],
        }
    }

    pub fn frequency_bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    /// Fill `out` with the current spectrum as 0-255 energy bytes, one per
    /// bin. Samples the freshest window of the tap; a tap that has not
    /// filled yet is padded with leading silence.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.scratch.clear();
        {
            let samples = self.tap.lock().unwrap();
            let start = samples.len().saturating_sub(FFT_SIZE);
            let fresh = &samples[start..];
            let pad = FFT_SIZE - fresh.len();
            self.scratch
                .extend(std::iter::repeat_n(Complex::new(0.0, 0.0), pad));
            self.scratch.extend(
                fresh
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| Complex::new(s * self.window[pad + i], 0.0)),
            );
        }

        self.fft.process(&mut self.scratch);

        let norm = 1.0 / FFT_SIZE as f32;
        let scale = 255.0 / (MAX_DB - MIN_DB);
        let bins = self.frequency_bin_count().min(out.len());
        for i in 0..bins {
            let magnitude = self.scratch[i].norm() * norm;
            let smoothed = SMOOTHING * self.smoothed[i] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[i] = smoothed;
            let db = 20.0 * smoothed.max(1e-10).log10();
            out[i] = ((db - MIN_DB) * scale).clamp(0.0, 255.0) as u8;
        }
    }
}
