//! Capture loop: pull raw PCM from the source subprocess, analyze each
//! chunk, hand the result to the renderer.

pub mod handoff;
pub mod source;

use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::analyzer::SpectrumAnalyzer;
use handoff::FrameHandoff;
use source::{NowPlaying, SourceProcess, SourceSpec};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture source '{command}' could not be started: {source}")]
    SourceUnavailable {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("capture source has no stdout pipe")]
    NoPipe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    ResolvingSource,
    Streaming,
    /// The source ended cleanly (EOF or a trailing partial chunk).
    Stopped,
    /// Read error, spawn failure or a failing exit status.
    Crashed,
}

/// Everything the loop needs to find and start its source.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub source: SourceSpec,
    pub command: String,
}

enum ChunkRead {
    Full,
    Short(usize),
    Eof,
}

/// Fill `buf` completely unless the stream ends first.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<ChunkRead> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(if filled == buf.len() {
        ChunkRead::Full
    } else if filled == 0 {
        ChunkRead::Eof
    } else {
        ChunkRead::Short(filled)
    })
}

pub struct CaptureLoop<A: SpectrumAnalyzer> {
    analyzer: A,
    handoff: Arc<FrameHandoff>,
    /// Sample frames per analyzer call; each call consumes
    /// `buffer_size * channels` interleaved samples.
    buffer_size: usize,
    state: CaptureState,
}

impl<A: SpectrumAnalyzer> CaptureLoop<A> {
    pub fn new(analyzer: A, handoff: Arc<FrameHandoff>, buffer_size: usize) -> Self {
        Self {
            analyzer,
            handoff,
            buffer_size,
            state: CaptureState::Idle,
        }
    }

    fn transition(&mut self, next: CaptureState) {
        log::debug!("capture: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Resolve the source, start it and stream until it ends.
    pub fn run(mut self, settings: &CaptureSettings, now_playing: &dyn NowPlaying) -> CaptureState {
        self.transition(CaptureState::ResolvingSource);
        let target = settings.source.resolve(now_playing);

        let params = self.analyzer.params().clone();
        let mut process = match SourceProcess::spawn(
            &settings.command,
            &target,
            params.sample_rate,
            params.channels,
        ) {
            Ok(process) => process,
            Err(err) => {
                log::error!("{}", err);
                self.transition(CaptureState::Crashed);
                return self.state;
            }
        };

        let Some(mut stdout) = process.take_stdout() else {
            log::error!("{}", CaptureError::NoPipe);
            process.abort();
            self.transition(CaptureState::Crashed);
            return self.state;
        };

        let mut state = self.stream(&mut stdout);
        drop(stdout);
        if !process.finish() && state == CaptureState::Stopped {
            log::error!("Capture source '{}' exited with a failure status", settings.command);
            state = CaptureState::Crashed;
        }
        self.transition(state);
        state
    }

    /// Blocking read-analyze-publish loop over an f32 PCM stream.
    pub fn stream<R: Read>(&mut self, reader: &mut R) -> CaptureState {
        self.transition(CaptureState::Streaming);

        let channels = self.analyzer.params().channels as usize;
        let mut samples = vec![0.0f32; self.buffer_size * channels];
        let mut input = vec![0.0f64; samples.len()];
        let output_len = self.analyzer.params().output_len();

        let end = loop {
            match read_chunk(reader, bytemuck::cast_slice_mut(&mut samples)) {
                Ok(ChunkRead::Full) => {}
                Ok(ChunkRead::Short(bytes)) => {
                    log::info!("Capture source ended mid-chunk ({} bytes dropped)", bytes);
                    break CaptureState::Stopped;
                }
                Ok(ChunkRead::Eof) => {
                    log::info!("Capture source ended");
                    break CaptureState::Stopped;
                }
                Err(err) => {
                    log::error!("Capture pipe read failed: {}", err);
                    break CaptureState::Crashed;
                }
            }

            for (dst, &s) in input.iter_mut().zip(samples.iter()) {
                *dst = s as f64;
            }
            let mut output = vec![0.0f64; output_len];
            self.analyzer.execute(&input, &mut output);
            self.handoff.publish(output);
        };

        self.transition(end);
        end
    }
}

impl<A: SpectrumAnalyzer + 'static> CaptureLoop<A> {
    /// Run on a named background thread. The handle is not meant to be joined;
    /// a blocked pipe read must not hold up shutdown.
    pub fn spawn(
        self,
        settings: CaptureSettings,
        now_playing: Box<dyn NowPlaying>,
    ) -> io::Result<JoinHandle<CaptureState>> {
        thread::Builder::new()
            .name("capture".into())
            .spawn(move || self.run(&settings, now_playing.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{test_params, AnalyzerParams};
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAnalyzer {
        params: AnalyzerParams,
        calls: Arc<AtomicUsize>,
        input_lens: Vec<usize>,
    }

    impl SpectrumAnalyzer for CountingAnalyzer {
        fn params(&self) -> &AnalyzerParams {
            &self.params
        }

        fn execute(&mut self, input: &[f64], output: &mut [f64]) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.input_lens.push(input.len());
            let peak = input.iter().fold(0.0f64, |m, s| m.max(s.abs()));
            output.fill(peak);
        }
    }

    struct NoPlayer;

    impl NowPlaying for NoPlayer {
        fn player_identity(&self) -> Option<String> {
            None
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    fn sine_pcm(frames: usize, channels: usize) -> Vec<u8> {
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5;
                std::iter::repeat(s).take(channels)
            })
            .collect();
        bytemuck::cast_slice(&samples).to_vec()
    }

    fn counting_loop() -> (CaptureLoop<CountingAnalyzer>, Arc<AtomicUsize>, Arc<FrameHandoff>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handoff = Arc::new(FrameHandoff::new());
        let analyzer = CountingAnalyzer {
            params: test_params(),
            calls: Arc::clone(&calls),
            input_lens: Vec::new(),
        };
        (CaptureLoop::new(analyzer, Arc::clone(&handoff), 1200), calls, handoff)
    }

    #[test]
    fn one_execute_and_publish_per_full_chunk() {
        let (mut capture, calls, handoff) = counting_loop();
        // Five full 1200-frame stereo chunks plus a partial one.
        let mut reader = Cursor::new(sine_pcm(1200 * 5 + 300, 2));

        let end = capture.stream(&mut reader);

        assert_eq!(end, CaptureState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(handoff.published(), 5);
        assert!(capture.analyzer.input_lens.iter().all(|&len| len == 2400));
        let frame = handoff.take_latest().unwrap();
        assert_eq!(frame.values.len(), 32);
        assert!(frame.values[0] > 0.4);
    }

    #[test]
    fn empty_stream_stops_without_publishing() {
        let (mut capture, calls, handoff) = counting_loop();
        let end = capture.stream(&mut Cursor::new(Vec::new()));
        assert_eq!(end, CaptureState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handoff.take_latest().is_none());
    }

    #[test]
    fn read_error_crashes_the_loop() {
        let (mut capture, _calls, _handoff) = counting_loop();
        assert_eq!(capture.stream(&mut FailingReader), CaptureState::Crashed);
        assert_eq!(capture.state, CaptureState::Crashed);
    }

    #[test]
    fn missing_source_command_crashes_without_frames() {
        let (capture, calls, handoff) = counting_loop();
        let settings = CaptureSettings {
            source: SourceSpec {
                input: "auto".into(),
                fallback: "auto".into(),
                players: BTreeMap::new(),
            },
            command: "/nonexistent/pw-cat".into(),
        };
        assert_eq!(capture.run(&settings, &NoPlayer), CaptureState::Crashed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handoff.published(), 0);
    }
}
