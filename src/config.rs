use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::analyzer::{AnalyzerParams, Engine};
use crate::capture::source::SourceSpec;
use crate::capture::CaptureSettings;
use crate::cli::Cli;
use crate::render::color::{ColorMode, Gradient, GradientAxis, Rgba};
use crate::render::{Style, MAX_GRADIENT_STOPS};

const DEFAULT_GRADIENT: &str = "1,0,0,1,0,1,0,1,0,0,1,1";
const DEFAULT_BACKGROUND: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ColorParseError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("expected {expected} components, got {got}")]
    WrongCount { expected: &'static str, got: usize },
    #[error("a gradient needs at least 2 colors, got {0}")]
    TooFewStops(usize),
}

#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub visual: VisualSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzerSection {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default = "default_bars")]
    pub bars: u32,
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
    #[serde(default = "default_true")]
    pub autosens: bool,
    #[serde(default = "default_noise_reduction")]
    pub noise_reduction: f64,
    #[serde(default = "default_low_cut_off")]
    pub low_cut_off: u32,
    #[serde(default = "default_high_cut_off")]
    pub high_cut_off: u32,
}

#[derive(Debug, Deserialize)]
pub struct CaptureSection {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_source")]
    pub input_source: String,
    #[serde(default = "default_source")]
    pub fallback_source: String,
    #[serde(default = "default_capture_command")]
    pub command: String,
    #[serde(default)]
    pub players: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualSection {
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_true")]
    pub fill: bool,
    #[serde(default = "default_true")]
    pub gradient: bool,
    #[serde(default = "default_color_gradient")]
    pub color_gradient: String,
    #[serde(default = "default_gradient_points")]
    pub gradient_points: String,
    #[serde(default = "default_color1")]
    pub color1: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default)]
    pub custom_shader: bool,
    #[serde(default)]
    pub fragment_shader: Option<PathBuf>,
    #[serde(default)]
    pub force_cpu: bool,
}

#[derive(Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_viewer")]
    pub viewer: String,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            library: None,
            bars: default_bars(),
            rate: default_rate(),
            channels: default_channels(),
            autosens: true,
            noise_reduction: default_noise_reduction(),
            low_cut_off: default_low_cut_off(),
            high_cut_off: default_high_cut_off(),
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            input_source: default_source(),
            fallback_source: default_source(),
            command: default_capture_command(),
            players: BTreeMap::new(),
        }
    }
}

impl Default for VisualSection {
    fn default() -> Self {
        Self {
            style: default_style(),
            fill: true,
            gradient: true,
            color_gradient: default_color_gradient(),
            gradient_points: default_gradient_points(),
            color1: default_color1(),
            background: default_background(),
            custom_shader: false,
            fragment_shader: None,
            force_cpu: false,
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            viewer: default_viewer(),
        }
    }
}

fn default_engine() -> String { "cava".into() }
fn default_bars() -> u32 { 50 }
fn default_rate() -> u32 { 44100 }
fn default_channels() -> u32 { 2 }
fn default_true() -> bool { true }
fn default_noise_reduction() -> f64 { 0.77 }
fn default_low_cut_off() -> u32 { 50 }
fn default_high_cut_off() -> u32 { 10000 }
fn default_buffer_size() -> usize { 1200 }
fn default_source() -> String { "auto".into() }
fn default_capture_command() -> String { "pw-cat".into() }
fn default_style() -> String { "bars".into() }
fn default_color_gradient() -> String { DEFAULT_GRADIENT.into() }
fn default_gradient_points() -> String { "0,0,1,1".into() }
fn default_color1() -> String { "0,1,1,1".into() }
fn default_background() -> String { "0,0,0,0.5".into() }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 360 }
fn default_fps() -> u32 { 60 }
fn default_viewer() -> String { "ffplay".into() }

impl RawConfig {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Command-line flags win over the file.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(width) = cli.width { self.output.width = width; }
        if let Some(height) = cli.height { self.output.height = height; }
        if let Some(fps) = cli.fps { self.output.fps = fps; }
        if let Some(ref viewer) = cli.viewer { self.output.viewer = viewer.clone(); }
        if let Some(ref style) = cli.style { self.visual.style = style.clone(); }
        if let Some(ref engine) = cli.engine { self.analyzer.engine = engine.clone(); }
        if let Some(ref source) = cli.source { self.capture.input_source = source.clone(); }
        if let Some(ref shader) = cli.shader {
            self.visual.custom_shader = true;
            self.visual.fragment_shader = Some(shader.clone());
        }
        if cli.force_cpu { self.visual.force_cpu = true; }
    }
}

/// Validated visual settings. The fragment shader is loaded separately so a
/// broken shader never fails configuration.
#[derive(Clone, Debug)]
pub struct VisualConfig {
    pub style: Style,
    pub fill: bool,
    pub color: ColorMode,
    pub background: Rgba,
    pub fragment_shader: Option<PathBuf>,
    pub force_cpu: bool,
}

#[derive(Clone, Debug)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// `None` runs headless.
    pub viewer: Option<String>,
}

/// The typed, validated configuration built once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub analyzer: AnalyzerParams,
    pub engine: Engine,
    pub buffer_size: usize,
    pub capture: CaptureSettings,
    pub visual: VisualConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let a = raw.analyzer;
        let engine = match a.engine.to_ascii_lowercase().as_str() {
            "cava" => Engine::Cava { library: a.library },
            "builtin" => Engine::Builtin,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown analyzer engine '{other}' (expected 'cava' or 'builtin')"
                )))
            }
        };
        let analyzer = AnalyzerParams {
            bar_count: a.bars,
            sample_rate: a.rate,
            channels: a.channels,
            autosens: a.autosens,
            noise_reduction: a.noise_reduction,
            low_cut_off: a.low_cut_off,
            high_cut_off: a.high_cut_off,
        };
        analyzer
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let c = raw.capture;
        if c.buffer_size == 0 {
            return Err(ConfigError::Invalid("capture buffer_size must be at least 1".into()));
        }
        let capture = CaptureSettings {
            source: SourceSpec {
                input: c.input_source,
                fallback: c.fallback_source,
                players: c.players,
            },
            command: c.command,
        };

        let visual = visual_config(raw.visual)?;

        let o = raw.output;
        if o.fps == 0 {
            return Err(ConfigError::Invalid("output fps must be at least 1".into()));
        }
        let viewer = match o.viewer.trim() {
            "" => None,
            v if v.eq_ignore_ascii_case("none") => None,
            v => Some(v.to_string()),
        };

        Ok(Self {
            analyzer,
            engine,
            buffer_size: c.buffer_size,
            capture,
            visual,
            output: OutputConfig {
                width: o.width,
                height: o.height,
                fps: o.fps,
                viewer,
            },
        })
    }

    pub fn log_summary(&self) {
        let a = &self.analyzer;
        log::info!(
            "Analyzer: {:?}, {} bars x {} ch @ {} Hz, cut-offs {}-{} Hz, noise reduction {}, autosens {}",
            self.engine, a.bar_count, a.channels, a.sample_rate, a.low_cut_off, a.high_cut_off,
            a.noise_reduction, a.autosens
        );
        log::info!(
            "Capture: '{}' via {} ({} frames per chunk)",
            self.capture.source.input, self.capture.command, self.buffer_size
        );
        let color = match &self.visual.color {
            ColorMode::Solid(_) => "solid".to_string(),
            ColorMode::Gradient(g) => format!("{}-stop gradient", g.stops().len()),
        };
        log::info!(
            "Visual: {:?} ({}), {}",
            self.visual.style,
            if self.visual.fill { "filled" } else { "outline" },
            color
        );
        log::info!(
            "Output: {}x{} @ {}fps -> {}",
            self.output.width,
            self.output.height,
            self.output.fps,
            self.output.viewer.as_deref().unwrap_or("headless")
        );
    }
}

fn visual_config(v: VisualSection) -> Result<VisualConfig, ConfigError> {
    let style = match v.style.to_ascii_lowercase().as_str() {
        "bars" => Style::Bars,
        "line" | "lines" => Style::Line,
        other => {
            return Err(ConfigError::Invalid(format!(
                "unknown style '{other}' (expected 'bars' or 'line')"
            )))
        }
    };

    let color = if v.gradient {
        let colors = parse_gradient(&v.color_gradient).unwrap_or_else(|err| {
            log::warn!("Invalid color_gradient '{}' ({}), using the default gradient", v.color_gradient, err);
            default_gradient_colors()
        });
        let axis = parse_gradient_points(&v.gradient_points).unwrap_or_else(|err| {
            log::warn!("Invalid gradient_points '{}' ({}), using 0,0,1,1", v.gradient_points, err);
            GradientAxis::default()
        });
        match Gradient::evenly_spaced(&colors, axis) {
            Ok(gradient) => ColorMode::Gradient(gradient),
            Err(err) => {
                log::warn!("Unusable gradient ({}), using solid cyan", err);
                ColorMode::Solid(Rgba::CYAN)
            }
        }
    } else {
        ColorMode::Solid(parse_color1(&v.color1).unwrap_or_else(|err| {
            log::warn!("Invalid color1 '{}' ({}), using cyan", v.color1, err);
            Rgba::CYAN
        }))
    };

    let background = parse_background(&v.background).unwrap_or_else(|err| {
        log::warn!("Invalid background '{}' ({}), using 0,0,0,0.5", v.background, err);
        DEFAULT_BACKGROUND
    });

    let fragment_shader = match (v.custom_shader, v.fragment_shader) {
        (true, Some(path)) => Some(path),
        (true, None) => {
            log::warn!("custom_shader is on but no fragment_shader is set, using the default shader");
            None
        }
        (false, _) => None,
    };

    Ok(VisualConfig {
        style,
        fill: v.fill,
        color,
        background,
        fragment_shader,
        force_cpu: v.force_cpu,
    })
}

fn parse_components(s: &str) -> Result<Vec<f32>, ColorParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .map_err(|_| ColorParseError::NotANumber(part.to_string()))
        })
        .collect()
}

/// `r,g,b[,a]`. Three components get alpha 1; extra components are ignored.
pub fn parse_color1(s: &str) -> Result<Rgba, ColorParseError> {
    let c = parse_components(s)?;
    match c.len() {
        0..=2 => Err(ColorParseError::WrongCount { expected: "3 or 4", got: c.len() }),
        3 => Ok(Rgba::new(c[0], c[1], c[2], 1.0)),
        _ => Ok(Rgba::new(c[0], c[1], c[2], c[3])),
    }
}

/// Flat list of RGBA quadruples, at least two, at most `MAX_GRADIENT_STOPS`.
pub fn parse_gradient(s: &str) -> Result<Vec<Rgba>, ColorParseError> {
    let c = parse_components(s)?;
    if c.len() % 4 != 0 {
        return Err(ColorParseError::WrongCount { expected: "a multiple of 4", got: c.len() });
    }
    let mut colors: Vec<Rgba> = c
        .chunks_exact(4)
        .map(|q| Rgba::new(q[0], q[1], q[2], q[3]))
        .collect();
    if colors.len() < 2 {
        return Err(ColorParseError::TooFewStops(colors.len()));
    }
    if colors.len() > MAX_GRADIENT_STOPS {
        log::warn!(
            "Gradient has {} colors, only the first {} are used",
            colors.len(),
            MAX_GRADIENT_STOPS
        );
        colors.truncate(MAX_GRADIENT_STOPS);
    }
    Ok(colors)
}

pub fn parse_background(s: &str) -> Result<Rgba, ColorParseError> {
    match parse_components(s)?.as_slice() {
        &[r, g, b, a] => Ok(Rgba::new(r, g, b, a)),
        other => Err(ColorParseError::WrongCount { expected: "4", got: other.len() }),
    }
}

pub fn parse_gradient_points(s: &str) -> Result<GradientAxis, ColorParseError> {
    match parse_components(s)?.as_slice() {
        &[x1, y1, x2, y2] => Ok(GradientAxis { x1, y1, x2, y2 }),
        other => Err(ColorParseError::WrongCount { expected: "4", got: other.len() }),
    }
}

fn default_gradient_colors() -> Vec<Rgba> {
    vec![
        Rgba::new(1.0, 0.0, 0.0, 1.0),
        Rgba::new(0.0, 1.0, 0.0, 1.0),
        Rgba::new(0.0, 0.0, 1.0, 1.0),
    ]
}

/// `--config`, then `./barglow.toml`, then `~/.config/barglow/config.toml`,
/// then the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("barglow.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barglow").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barglow").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Read the config file (if any), apply command-line overrides and validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    let mut raw = match find_config(cli.config.as_deref()) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let raw = RawConfig::from_toml(&content, &path)?;
            log::info!("Loaded config from {}", path.display());
            raw
        }
        None => {
            log::info!("No config file found, using defaults");
            RawConfig::default()
        }
    };
    raw.apply_overrides(cli);
    Config::from_raw(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        let raw = RawConfig::from_toml(toml, Path::new("test.toml")).unwrap();
        Config::from_raw(raw).unwrap()
    }

    #[test]
    fn two_quadruples_make_two_stops() {
        let colors = parse_gradient("1,0,0,1,0,1,0,1").unwrap();
        assert_eq!(colors, vec![Rgba::new(1.0, 0.0, 0.0, 1.0), Rgba::new(0.0, 1.0, 0.0, 1.0)]);

        let config = parse("[visual]\ngradient = true\ncolor_gradient = \"1,0,0,1,0,1,0,1\"\n");
        match config.visual.color {
            ColorMode::Gradient(g) => {
                assert_eq!(g.stops().len(), 2);
                assert_eq!(g.stops()[1].position, 1.0);
            }
            other => panic!("expected a gradient, got {other:?}"),
        }
    }

    #[test]
    fn short_color1_falls_back_to_cyan() {
        assert!(parse_color1("0,1").is_err());
        let config = parse("[visual]\ngradient = false\ncolor1 = \"0,1\"\n");
        assert_eq!(config.visual.color, ColorMode::Solid(Rgba::CYAN));
    }

    #[test]
    fn color1_component_counts() {
        assert_eq!(parse_color1("1, 0.5, 0").unwrap(), Rgba::new(1.0, 0.5, 0.0, 1.0));
        assert_eq!(parse_color1("1,0,0,0.25,9,9").unwrap(), Rgba::new(1.0, 0.0, 0.0, 0.25));
        assert_eq!(
            parse_color1("1,x,0"),
            Err(ColorParseError::NotANumber("x".into()))
        );
    }

    #[test]
    fn malformed_gradient_uses_default() {
        assert!(parse_gradient("1,0,0,1,0,1").is_err());
        assert!(parse_gradient("1,0,0,1").is_err());
        let config = parse("[visual]\ncolor_gradient = \"1,0,0\"\n");
        match config.visual.color {
            ColorMode::Gradient(g) => assert_eq!(g.stops().len(), 3),
            other => panic!("expected the default gradient, got {other:?}"),
        }
    }

    #[test]
    fn long_gradients_are_truncated() {
        let ten: Vec<String> = (0..10).map(|i| format!("{},0,0,1", i as f32 / 9.0)).collect();
        let colors = parse_gradient(&ten.join(",")).unwrap();
        assert_eq!(colors.len(), MAX_GRADIENT_STOPS);
    }

    #[test]
    fn background_and_points_need_four_numbers() {
        assert!(parse_background("0,0,0").is_err());
        assert_eq!(parse_background("0,0,0,0.5").unwrap(), DEFAULT_BACKGROUND);
        let axis = parse_gradient_points("0,0.5,1,0.5").unwrap();
        assert_eq!(axis, GradientAxis { x1: 0.0, y1: 0.5, x2: 1.0, y2: 0.5 });
        let config = parse("[visual]\nbackground = \"oops\"\n");
        assert_eq!(config.visual.background, DEFAULT_BACKGROUND);
    }

    #[test]
    fn defaults_without_a_file() {
        let config = Config::from_raw(RawConfig::default()).unwrap();
        assert_eq!(config.analyzer.bar_count, 50);
        assert_eq!(config.analyzer.sample_rate, 44100);
        assert_eq!(config.buffer_size, 1200);
        assert_eq!(config.engine, Engine::Cava { library: None });
        assert_eq!(config.visual.style, Style::Bars);
        assert_eq!(config.output.viewer.as_deref(), Some("ffplay"));
        assert_eq!(config.capture.source.input, "auto");
    }

    #[test]
    fn full_file_round_trips_into_typed_config() {
        let config = parse(
            r#"
[analyzer]
engine = "builtin"
bars = 32
channels = 1

[capture]
input_source = "alsa_output.monitor"
command = "/usr/bin/pw-cat"
[capture.players]
"Spotify" = "spotify"

[visual]
style = "line"
fill = false
custom_shader = true
fragment_shader = "shaders/custom/pulse.wgsl"

[output]
viewer = "none"
fps = 30
"#,
        );
        assert_eq!(config.engine, Engine::Builtin);
        assert_eq!(config.analyzer.output_len(), 32);
        assert_eq!(config.capture.source.players.get("Spotify").map(String::as_str), Some("spotify"));
        assert_eq!(config.visual.style, Style::Line);
        assert!(!config.visual.fill);
        assert_eq!(config.visual.fragment_shader, Some(PathBuf::from("shaders/custom/pulse.wgsl")));
        assert!(config.output.viewer.is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        let bad = [
            "[analyzer]\nengine = \"fftw\"\n",
            "[analyzer]\nbars = 0\n",
            "[analyzer]\nlow_cut_off = 20000\n",
            "[visual]\nstyle = \"circles\"\n",
            "[capture]\nbuffer_size = 0\n",
            "[output]\nfps = 0\n",
        ];
        for toml in bad {
            let raw = RawConfig::from_toml(toml, Path::new("bad.toml")).unwrap();
            assert!(matches!(Config::from_raw(raw), Err(ConfigError::Invalid(_))), "{toml}");
        }
    }

    #[test]
    fn command_line_overrides_the_file() {
        let mut raw = RawConfig::from_toml("[output]\nwidth = 800\nfps = 30\n", Path::new("cli.toml")).unwrap();
        let cli = Cli {
            fps: Some(120),
            style: Some("line".into()),
            shader: Some(PathBuf::from("glow.wgsl")),
            force_cpu: true,
            ..Cli::default()
        };
        raw.apply_overrides(&cli);
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.output.width, 800);
        assert_eq!(config.output.fps, 120);
        assert_eq!(config.visual.style, Style::Line);
        assert_eq!(config.visual.fragment_shader, Some(PathBuf::from("glow.wgsl")));
        assert!(config.visual.force_cpu);
    }

    #[test]
    fn shader_without_custom_flag_is_ignored() {
        let config = parse("[visual]\nfragment_shader = \"x.wgsl\"\n");
        assert!(config.visual.fragment_shader.is_none());
    }
}
