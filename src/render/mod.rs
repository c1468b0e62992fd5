//! Frame rendering. `Visualizer` owns one backend at a time and downgrades
//! from the GPU to the software rasterizer on the first GPU failure.

pub mod color;
pub mod cpu;
pub mod frame;
pub mod gpu;
pub mod gpu_backend;
pub mod layout;
pub mod pipeline;

use std::fmt;
use std::time::Instant;

use image::RgbaImage;

use crate::capture::handoff::AmplitudeFrame;
use crate::shaders::FragmentSource;
use color::{ColorMode, Rgba};
use cpu::CpuBackend;
use gpu_backend::GpuBackend;

/// Gradient stops the GPU uniform block can hold.
pub const MAX_GRADIENT_STOPS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),
    #[error("GPU rendering failed: {0}")]
    GpuRuntime(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Bars,
    Line,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// How every frame is drawn. Fixed for the life of a `Visualizer`.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub style: Style,
    pub fill: bool,
    pub bar_count: u32,
    pub color: ColorMode,
    pub background: Rgba,
    pub fragment: FragmentSource,
}

/// Per-frame inputs handed to a backend.
pub struct FrameData<'a> {
    /// Channel-major amplitudes; empty before the first frame arrives.
    pub values: &'a [f64],
    pub avg_height: f32,
    pub elapsed_secs: f32,
}

pub trait RenderBackend {
    /// Build everything sized to `size`. Called after `release` on resize.
    fn init(&mut self, size: SurfaceSize) -> Result<(), RenderError>;

    fn draw(&mut self, frame: &FrameData<'_>) -> Result<RgbaImage, RenderError>;

    /// Free size-dependent resources. Safe to call when nothing is allocated.
    fn release(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Cpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gpu => write!(f, "GPU"),
            BackendKind::Cpu => write!(f, "CPU"),
        }
    }
}

enum Backend<G> {
    Gpu(G),
    Cpu(CpuBackend),
}

pub struct Visualizer<G: RenderBackend = GpuBackend> {
    backend: Backend<G>,
    settings: RenderSettings,
    size: Option<SurfaceSize>,
    started: Instant,
}

impl Visualizer<GpuBackend> {
    pub fn new(settings: RenderSettings, force_cpu: bool) -> Self {
        let gpu = (!force_cpu).then(|| GpuBackend::new(settings.clone()));
        Self::with_backend(settings, gpu)
    }
}

impl<G: RenderBackend> Visualizer<G> {
    /// Start on `gpu` when given, on the CPU otherwise.
    pub fn with_backend(settings: RenderSettings, gpu: Option<G>) -> Self {
        let backend = match gpu {
            Some(gpu) => Backend::Gpu(gpu),
            None => Backend::Cpu(CpuBackend::new(settings.clone())),
        };
        Self {
            backend,
            settings,
            size: None,
            started: Instant::now(),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            Backend::Gpu(_) => BackendKind::Gpu,
            Backend::Cpu(_) => BackendKind::Cpu,
        }
    }

    /// Draw `frame` (or the empty state) at `size`. Never fails: GPU errors
    /// switch this visualizer to the CPU for good and the frame is redrawn there.
    pub fn draw(&mut self, frame: Option<&AmplitudeFrame>, size: SurfaceSize) -> RgbaImage {
        if size.is_empty() {
            return RgbaImage::new(size.width, size.height);
        }
        if self.size != Some(size) {
            self.resize(size);
        }

        let data = FrameData {
            values: frame.map(|f| f.values.as_slice()).unwrap_or(&[]),
            avg_height: frame.map(AmplitudeFrame::average).unwrap_or(0.0),
            elapsed_secs: self.started.elapsed().as_secs_f32(),
        };

        if let Backend::Gpu(gpu) = &mut self.backend {
            match gpu.draw(&data) {
                Ok(image) => return image,
                Err(err) => self.downgrade(err, size),
            }
        }

        match &mut self.backend {
            Backend::Cpu(cpu) => cpu.draw(&data).unwrap_or_else(|err| {
                log::error!("CPU rendering failed: {}", err);
                RgbaImage::new(size.width, size.height)
            }),
            Backend::Gpu(_) => RgbaImage::new(size.width, size.height),
        }
    }

    fn resize(&mut self, size: SurfaceSize) {
        log::debug!("Surface size {}x{}", size.width, size.height);
        self.size = Some(size);
        let result = match &mut self.backend {
            Backend::Gpu(gpu) => {
                gpu.release();
                gpu.init(size)
            }
            Backend::Cpu(cpu) => {
                cpu.release();
                cpu.init(size)
            }
        };
        if let Err(err) = result {
            self.downgrade(err, size);
        }
    }

    /// Give up on the GPU: free its resources once and continue on the CPU.
    fn downgrade(&mut self, err: RenderError, size: SurfaceSize) {
        log::error!("{}", err);
        if let Backend::Gpu(gpu) = &mut self.backend {
            gpu.release();
            log::warn!("Falling back to CPU rendering for the rest of this session");
        }
        let mut cpu = CpuBackend::new(self.settings.clone());
        if let Err(err) = cpu.init(size) {
            log::error!("CPU renderer failed to initialize: {}", err);
        }
        self.backend = Backend::Cpu(cpu);
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> RenderSettings {
    RenderSettings {
        style: Style::Bars,
        fill: true,
        bar_count: 8,
        color: ColorMode::Solid(Rgba::CYAN),
        background: Rgba::new(0.0, 0.0, 0.0, 0.5),
        fragment: FragmentSource::builtin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Stands in for the wgpu backend and counts what it holds.
    #[derive(Clone, Default)]
    struct Counters {
        live_sets: Arc<AtomicUsize>,
        init_attempts: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        draws: Arc<AtomicUsize>,
        fail_init: Arc<AtomicBool>,
        fail_draw: Arc<AtomicBool>,
    }

    struct FakeGpu {
        counters: Counters,
        allocated: bool,
    }

    impl FakeGpu {
        fn new(counters: &Counters) -> Self {
            Self { counters: counters.clone(), allocated: false }
        }
    }

    impl RenderBackend for FakeGpu {
        fn init(&mut self, size: SurfaceSize) -> Result<(), RenderError> {
            self.counters.init_attempts.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_init.load(Ordering::SeqCst) {
                return Err(RenderError::GpuInit(format!("no adapter for {}x{}", size.width, size.height)));
            }
            self.counters.live_sets.fetch_add(1, Ordering::SeqCst);
            self.allocated = true;
            Ok(())
        }

        fn draw(&mut self, _frame: &FrameData<'_>) -> Result<RgbaImage, RenderError> {
            self.counters.draws.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_draw.load(Ordering::SeqCst) {
                return Err(RenderError::GpuRuntime("device lost".into()));
            }
            Ok(RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 4])))
        }

        fn release(&mut self) {
            if self.allocated {
                self.allocated = false;
                self.counters.live_sets.fetch_sub(1, Ordering::SeqCst);
                self.counters.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn sample_frame() -> AmplitudeFrame {
        AmplitudeFrame { values: vec![0.5; 16], sequence: 1 }
    }

    #[test]
    fn repeated_resizes_keep_one_resource_set() {
        let counters = Counters::default();
        let mut vis = Visualizer::with_backend(test_settings(), Some(FakeGpu::new(&counters)));
        for i in 0..10 {
            vis.draw(Some(&sample_frame()), SurfaceSize::new(100 + i, 50));
            assert_eq!(counters.live_sets.load(Ordering::SeqCst), 1);
        }
        assert_eq!(counters.init_attempts.load(Ordering::SeqCst), 10);
        assert_eq!(vis.backend_kind(), BackendKind::Gpu);
    }

    #[test]
    fn same_size_does_not_reinitialize() {
        let counters = Counters::default();
        let mut vis = Visualizer::with_backend(test_settings(), Some(FakeGpu::new(&counters)));
        for _ in 0..5 {
            vis.draw(None, SurfaceSize::new(64, 32));
        }
        assert_eq!(counters.init_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.draws.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn failed_gpu_init_is_never_retried() {
        let counters = Counters::default();
        counters.fail_init.store(true, Ordering::SeqCst);
        let mut vis = Visualizer::with_backend(test_settings(), Some(FakeGpu::new(&counters)));

        let image = vis.draw(Some(&sample_frame()), SurfaceSize::new(64, 32));
        assert_eq!(image.dimensions(), (64, 32));
        assert_eq!(vis.backend_kind(), BackendKind::Cpu);

        vis.draw(Some(&sample_frame()), SurfaceSize::new(128, 32));
        vis.draw(Some(&sample_frame()), SurfaceSize::new(128, 64));
        assert_eq!(counters.init_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.draws.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gpu_draw_failure_downgrades_and_releases_once() {
        let counters = Counters::default();
        let mut vis = Visualizer::with_backend(test_settings(), Some(FakeGpu::new(&counters)));
        vis.draw(Some(&sample_frame()), SurfaceSize::new(64, 32));

        counters.fail_draw.store(true, Ordering::SeqCst);
        let image = vis.draw(Some(&sample_frame()), SurfaceSize::new(64, 32));
        assert_eq!(image.dimensions(), (64, 32));
        assert_eq!(vis.backend_kind(), BackendKind::Cpu);
        assert_eq!(counters.live_sets.load(Ordering::SeqCst), 0);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);

        vis.draw(Some(&sample_frame()), SurfaceSize::new(64, 32));
        assert_eq!(counters.draws.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_area_surface_skips_the_backend() {
        let counters = Counters::default();
        let mut vis = Visualizer::with_backend(test_settings(), Some(FakeGpu::new(&counters)));
        let image = vis.draw(Some(&sample_frame()), SurfaceSize::new(0, 40));
        assert_eq!(image.dimensions(), (0, 40));
        assert_eq!(counters.init_attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn forced_cpu_starts_on_cpu() {
        let vis = Visualizer::with_backend(test_settings(), None::<FakeGpu>);
        assert_eq!(vis.backend_kind(), BackendKind::Cpu);
    }

    #[test]
    fn empty_state_draws_background() {
        let mut vis = Visualizer::with_backend(test_settings(), None::<FakeGpu>);
        let image = vis.draw(None, SurfaceSize::new(32, 16));
        let background = test_settings().background.to_rgba8();
        assert!(image.pixels().all(|p| p.0 == background));
    }
}
