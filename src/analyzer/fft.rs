use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{AnalyzerError, AnalyzerParams, SpectrumAnalyzer};

const FFT_SIZE: usize = 4096;
const AUTOSENS_DECAY: f64 = 0.98;
const AUTOSENS_RISE: f64 = 1.001;
const AUTOSENS_MAX: f64 = 50.0;
const SILENCE: f64 = 1e-4;

/// In-process analyzer with the same contract as cavacore: log-spaced bands
/// between the cut-offs, one set of bars per channel.
pub struct FftAnalyzer {
    params: AnalyzerParams,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Most recent `fft_size` samples per channel, oldest first.
    history: Vec<Vec<f32>>,
    /// `(first_bin, end_bin)` per bar.
    bands: Vec<(usize, usize)>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f64>,
    sens: f64,
}

impl FftAnalyzer {
    pub fn new(params: AnalyzerParams, buffer_samples: usize) -> Result<Self, AnalyzerError> {
        params.validate()?;
        let channels = params.channels as usize;
        let fft_size = FFT_SIZE.max((buffer_samples / channels).next_power_of_two());

        let bands = band_bins(&params, fft_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        log::debug!(
            "builtin analyzer: fft_size={} resolution={:.2} Hz",
            fft_size,
            params.sample_rate as f32 / fft_size as f32
        );

        Ok(Self {
            fft,
            window: hann_window(fft_size),
            history: vec![vec![0.0; fft_size]; channels],
            bands,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; params.output_len()],
            sens: 1.0,
            params,
        })
    }

    fn push_samples(&mut self, input: &[f64]) {
        let channels = self.history.len();
        let frames = input.len() / channels;
        for (c, history) in self.history.iter_mut().enumerate() {
            let size = history.len();
            let incoming = input.iter().skip(c).step_by(channels).take(frames);
            if frames >= size {
                let skip = frames - size;
                for (dst, &s) in history.iter_mut().zip(incoming.skip(skip)) {
                    *dst = s as f32;
                }
            } else {
                history.copy_within(frames.., 0);
                for (dst, &s) in history[size - frames..].iter_mut().zip(incoming) {
                    *dst = s as f32;
                }
            }
        }
    }

    fn analyze_channel(&mut self, channel: usize, out: &mut [f64]) {
        for ((slot, &s), &w) in self
            .scratch
            .iter_mut()
            .zip(self.history[channel].iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        // A full-scale sine under a Hann window peaks at fft_size / 4.
        let norm = self.scratch.len() as f32 / 4.0;
        for (value, &(lo, hi)) in out.iter_mut().zip(self.bands.iter()) {
            let peak = self.scratch[lo..hi]
                .iter()
                .map(|c| c.norm())
                .fold(0.0f32, f32::max);
            *value = (peak / norm) as f64;
        }
    }
}

impl SpectrumAnalyzer for FftAnalyzer {
    fn params(&self) -> &AnalyzerParams {
        &self.params
    }

    fn execute(&mut self, input: &[f64], output: &mut [f64]) {
        assert_eq!(output.len(), self.params.output_len(), "output must hold bars * channels values");
        self.push_samples(input);

        let bars = self.params.bar_count as usize;
        for channel in 0..self.history.len() {
            let (start, end) = (channel * bars, (channel + 1) * bars);
            self.analyze_channel(channel, &mut output[start..end]);
        }

        let nr = self.params.noise_reduction;
        let mut overshoot = false;
        let mut loudest = 0.0f64;
        for (out, smooth) in output.iter_mut().zip(self.smoothed.iter_mut()) {
            *smooth = *smooth * nr + *out * (1.0 - nr);
            *out = *smooth * self.sens;
            overshoot |= *out > 1.0;
            loudest = loudest.max(*smooth);
        }

        if self.params.autosens {
            if overshoot {
                self.sens *= AUTOSENS_DECAY;
            } else if loudest > SILENCE {
                self.sens = (self.sens * AUTOSENS_RISE).min(AUTOSENS_MAX);
            }
        }
    }
}

/// Log-spaced band edges between the cut-offs, mapped to FFT bins. Every band
/// covers at least one bin.
fn band_bins(params: &AnalyzerParams, fft_size: usize) -> Vec<(usize, usize)> {
    let bars = params.bar_count as usize;
    let low = params.low_cut_off as f64;
    let high = params.high_cut_off as f64;
    let hz_per_bin = params.sample_rate as f64 / fft_size as f64;
    let max_bin = fft_size / 2;

    let edge = |k: usize| -> usize {
        let hz = low * (high / low).powf(k as f64 / bars as f64);
        ((hz / hz_per_bin).round() as usize).min(max_bin)
    };

    (0..bars)
        .map(|k| {
            let lo = edge(k).min(max_bin - 1);
            let hi = edge(k + 1).max(lo + 1).min(max_bin);
            (lo, hi)
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::test_params;

    fn mono_params() -> AnalyzerParams {
        AnalyzerParams { channels: 1, ..test_params() }
    }

    fn sine_block(freq: f64, rate: u32, len: usize, offset: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = (offset + i) as f64 / rate as f64;
                0.8 * (2.0 * std::f64::consts::PI * freq * t).sin()
            })
            .collect()
    }

    fn loudest_bar(freq: f64) -> usize {
        let params = mono_params();
        let mut analyzer = FftAnalyzer::new(params.clone(), 1200).unwrap();
        let mut output = vec![0.0; params.output_len()];
        for block in 0..6 {
            let input = sine_block(freq, params.sample_rate, 1200, block * 1200);
            analyzer.execute(&input, &mut output);
        }
        output
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn low_tone_lands_in_low_bars() {
        assert!(loudest_bar(100.0) < 4);
    }

    #[test]
    fn high_tone_lands_in_high_bars() {
        assert!(loudest_bar(6000.0) > 11);
    }

    #[test]
    fn silence_stays_silent() {
        let params = test_params();
        let mut analyzer = FftAnalyzer::new(params.clone(), 2400).unwrap();
        let mut output = vec![1.0; params.output_len()];
        analyzer.execute(&vec![0.0; 2400], &mut output);
        assert!(output.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn stereo_output_is_channel_major() {
        let params = test_params();
        let mut analyzer = FftAnalyzer::new(params.clone(), 2400).unwrap();
        // Left channel carries a tone, right channel is silent.
        let tone = sine_block(200.0, params.sample_rate, 1200, 0);
        let mut input = Vec::with_capacity(2400);
        for &s in &tone {
            input.push(s);
            input.push(0.0);
        }
        let mut output = vec![0.0; params.output_len()];
        for _ in 0..4 {
            analyzer.execute(&input, &mut output);
        }
        let bars = params.bar_count as usize;
        assert!(output[..bars].iter().any(|&v| v > 0.05));
        assert!(output[bars..].iter().all(|&v| v < 1e-6));
    }

    #[test]
    fn every_band_covers_a_bin() {
        let params = AnalyzerParams { bar_count: 64, ..test_params() };
        for (lo, hi) in band_bins(&params, FFT_SIZE) {
            assert!(hi > lo);
            assert!(hi <= FFT_SIZE / 2);
        }
    }

    #[test]
    fn autosens_backs_off_when_clipping() {
        let params = AnalyzerParams { autosens: true, ..mono_params() };
        let mut analyzer = FftAnalyzer::new(params.clone(), 1200).unwrap();
        analyzer.sens = 10.0;
        let mut output = vec![0.0; params.output_len()];
        for block in 0..4 {
            let input = sine_block(300.0, params.sample_rate, 1200, block * 1200);
            analyzer.execute(&input, &mut output);
        }
        assert!(analyzer.sens < 10.0);
    }
}
