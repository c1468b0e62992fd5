mod analyzer;
mod capture;
mod cli;
mod config;
mod present;
mod render;
mod shaders;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};

use capture::handoff::FrameHandoff;
use capture::source::Playerctl;
use capture::CaptureLoop;
use cli::Cli;
use present::pipe::ViewerPipe;
use render::{RenderSettings, SurfaceSize, Visualizer};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let config = config::load(&cli).context("Failed to load configuration")?;
    log::info!("barglow - real-time audio visualizer");
    config.log_summary();

    // 1. Analyzer session (fatal on failure)
    let chunk_samples = config.buffer_size * config.analyzer.channels as usize;
    let analyzer = analyzer::init(&config.analyzer, &config.engine, chunk_samples)
        .context("Failed to start the spectrum analyzer")?;

    // 2. Capture thread. Never joined: a blocked pipe read must not hold up exit.
    let handoff = Arc::new(FrameHandoff::new());
    let capture = CaptureLoop::new(analyzer, Arc::clone(&handoff), config.buffer_size);
    let _capture_thread = capture
        .spawn(config.capture.clone(), Box::new(Playerctl))
        .context("Failed to start the capture thread")?;

    // 3. Renderer
    let fragment = shaders::loader::load_or_default(config.visual.fragment_shader.as_deref());
    let settings = RenderSettings {
        style: config.visual.style,
        fill: config.visual.fill,
        bar_count: config.analyzer.bar_count,
        color: config.visual.color.clone(),
        background: config.visual.background,
        fragment,
    };
    let mut visualizer = Visualizer::new(settings, config.visual.force_cpu);
    let size = SurfaceSize::new(config.output.width, config.output.height);
    if size.is_empty() {
        log::warn!("Surface is {}x{}; nothing will be drawn", size.width, size.height);
    }

    // 4. Host surface
    let mut viewer = match config.output.viewer.as_deref() {
        Some(program) => Some(ViewerPipe::spawn(program, size.width, size.height, config.output.fps)?),
        None => {
            log::info!("No viewer configured, rendering headless");
            None
        }
    };

    // 5. Render loop
    let frame_interval = Duration::from_secs_f64(1.0 / config.output.fps as f64);
    let mut next_tick = Instant::now();
    let mut ticks: u64 = 0;
    let mut drawn: u64 = 0;
    let mut image = None;

    loop {
        if cli.frames.is_some_and(|limit| ticks >= limit) {
            break;
        }

        if handoff.take_redraw_request() || image.is_none() {
            let frame = handoff.take_latest();
            image = Some(visualizer.draw(frame.as_deref(), size));
            if drawn == 0 {
                log::info!("Visualization acceleration: {}", visualizer.backend_kind());
            }
            drawn += 1;
        }

        if let (Some(pipe), Some(current)) = (viewer.as_mut(), image.as_ref()) {
            if let Err(err) = pipe.write_frame(current) {
                log::info!("Viewer closed ({:#}), stopping", err);
                break;
            }
        }

        ticks += 1;
        next_tick += frame_interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    log::info!(
        "Rendered {} frames over {} ticks ({} analyzer frames received)",
        drawn,
        ticks,
        handoff.published()
    );

    if let Some(pipe) = viewer {
        pipe.finish()?;
    }
    Ok(())
}
