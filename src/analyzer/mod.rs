//! Spectrum analyzer sessions: raw PCM blocks in, per-band amplitudes out.

pub mod cava;
pub mod fft;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer rejected its configuration: {0}")]
    Init(String),
    #[error("failed to load analyzer library {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Immutable parameters of one analysis session.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerParams {
    pub bar_count: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub autosens: bool,
    pub noise_reduction: f64,
    pub low_cut_off: u32,
    pub high_cut_off: u32,
}

impl AnalyzerParams {
    /// Number of output values per execute call.
    pub fn output_len(&self) -> usize {
        self.bar_count as usize * self.channels as usize
    }

    /// The parameter rules both engines enforce.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.bar_count == 0 {
            return Err(AnalyzerError::Init("number of bars must be at least 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(AnalyzerError::Init("sample rate must be positive".into()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(AnalyzerError::Init(format!(
                "audio channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.low_cut_off == 0 || self.low_cut_off >= self.high_cut_off {
            return Err(AnalyzerError::Init(format!(
                "low cut-off ({} Hz) must be positive and below high cut-off ({} Hz)",
                self.low_cut_off, self.high_cut_off
            )));
        }
        if self.high_cut_off > self.sample_rate / 2 {
            return Err(AnalyzerError::Init(format!(
                "high cut-off ({} Hz) is above the Nyquist frequency of {} Hz",
                self.high_cut_off,
                self.sample_rate / 2
            )));
        }
        if !(0.0..=1.0).contains(&self.noise_reduction) {
            return Err(AnalyzerError::Init(format!(
                "noise reduction must be within 0.0-1.0, got {}",
                self.noise_reduction
            )));
        }
        Ok(())
    }
}

/// Which engine backs a session.
#[derive(Clone, Debug, PartialEq)]
pub enum Engine {
    /// The cavacore shared library, optionally at an explicit path.
    Cava { library: Option<PathBuf> },
    /// The in-process FFT engine.
    Builtin,
}

/// One configured analysis session.
///
/// Sessions keep adaptive state between calls (auto-sensitivity, smoothing),
/// so they take `&mut self` and are never shared between threads. Dropping a
/// session destroys it.
pub trait SpectrumAnalyzer: Send {
    fn params(&self) -> &AnalyzerParams;

    /// Analyze one block of interleaved samples into `output`, which must hold
    /// exactly `params().output_len()` values laid out channel by channel.
    fn execute(&mut self, input: &[f64], output: &mut [f64]);
}

impl<T: SpectrumAnalyzer + ?Sized> SpectrumAnalyzer for Box<T> {
    fn params(&self) -> &AnalyzerParams {
        (**self).params()
    }

    fn execute(&mut self, input: &[f64], output: &mut [f64]) {
        (**self).execute(input, output)
    }
}

/// Create a session. Errors here are fatal to startup.
pub fn init(
    params: &AnalyzerParams,
    engine: &Engine,
    buffer_samples: usize,
) -> Result<Box<dyn SpectrumAnalyzer>, AnalyzerError> {
    params.validate()?;
    match engine {
        Engine::Cava { library } => {
            let lib = cava::CavaLibrary::load(library.as_deref())?;
            let session = cava::CavaAnalyzer::new(lib, params.clone())?;
            log::info!(
                "cavacore session ready: {} bars x {} channels @ {} Hz",
                params.bar_count, params.channels, params.sample_rate
            );
            Ok(Box::new(session))
        }
        Engine::Builtin => {
            let session = fft::FftAnalyzer::new(params.clone(), buffer_samples)?;
            log::info!(
                "builtin analyzer ready: {} bars x {} channels @ {} Hz",
                params.bar_count, params.channels, params.sample_rate
            );
            Ok(Box::new(session))
        }
    }
}

#[cfg(test)]
pub(crate) fn test_params() -> AnalyzerParams {
    AnalyzerParams {
        bar_count: 16,
        sample_rate: 44100,
        channels: 2,
        autosens: false,
        noise_reduction: 0.0,
        low_cut_off: 50,
        high_cut_off: 10000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_parameters() {
        assert!(test_params().validate().is_ok());
        assert_eq!(test_params().output_len(), 32);
    }

    #[test]
    fn rejects_zero_bars() {
        let params = AnalyzerParams { bar_count: 0, ..test_params() };
        assert!(matches!(params.validate(), Err(AnalyzerError::Init(_))));
    }

    #[test]
    fn rejects_inverted_cutoffs() {
        let params = AnalyzerParams { low_cut_off: 5000, high_cut_off: 100, ..test_params() };
        assert!(matches!(params.validate(), Err(AnalyzerError::Init(_))));
    }

    #[test]
    fn rejects_cutoff_above_nyquist() {
        let params = AnalyzerParams { sample_rate: 16000, high_cut_off: 10000, ..test_params() };
        assert!(matches!(params.validate(), Err(AnalyzerError::Init(_))));
    }

    #[test]
    fn rejects_surround_channels() {
        let params = AnalyzerParams { channels: 6, ..test_params() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn builtin_engine_initializes() {
        let session = init(&test_params(), &Engine::Builtin, 2400).unwrap();
        assert_eq!(session.params().bar_count, 16);
    }
}
