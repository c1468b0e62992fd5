use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "barglow", about = "Real-time audio visualizer for whatever is playing")]
pub struct Cli {
    /// Config file (default: ./barglow.toml, then ~/.config/barglow/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Surface width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Surface height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Drawing style: bars or line
    #[arg(long)]
    pub style: Option<String>,

    /// Viewer that receives raw RGBA frames on stdin ("none" for headless)
    #[arg(long)]
    pub viewer: Option<String>,

    /// Spectrum engine: cava or builtin
    #[arg(long)]
    pub engine: Option<String>,

    /// Capture target, or "auto" to follow the active player
    #[arg(short, long)]
    pub source: Option<String>,

    /// Custom WGSL fragment shader
    #[arg(long)]
    pub shader: Option<PathBuf>,

    /// Skip the GPU and render in software
    #[arg(long)]
    pub force_cpu: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
