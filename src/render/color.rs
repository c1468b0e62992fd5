/// Linear RGBA color, each channel nominally in 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const CYAN: Rgba = Rgba::new(0.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn lerp(self, other: Rgba, t: f32) -> Rgba {
        Rgba {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    /// Quantize to 8-bit RGBA, clamping out-of-range channels.
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Source-over compositing, matching `wgpu::BlendState::ALPHA_BLENDING`.
    pub fn over(self, dst: Rgba) -> Rgba {
        let a = self.a.clamp(0.0, 1.0);
        Rgba {
            r: self.r * a + dst.r * (1.0 - a),
            g: self.g * a + dst.g * (1.0 - a),
            b: self.b * a + dst.b * (1.0 - a),
            a: a + dst.a * (1.0 - a),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub position: f32,
    pub color: Rgba,
}

/// Line segment in normalized surface coordinates (origin top-left) along
/// which gradient stops are projected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientAxis {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Default for GradientAxis {
    fn default() -> Self {
        Self { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 }
    }
}

impl GradientAxis {
    pub fn to_array(self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Project a normalized point onto the axis, clamped to 0.0-1.0.
    /// A zero-length axis projects everything to 0.
    pub fn project(&self, u: f32, v: f32) -> f32 {
        let dx = self.x2 - self.x1;
        let dy = self.y2 - self.y1;
        let len_sq = dx * dx + dy * dy;
        if len_sq <= f32::EPSILON {
            return 0.0;
        }
        (((u - self.x1) * dx + (v - self.y1) * dy) / len_sq).clamp(0.0, 1.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GradientError {
    #[error("a gradient needs at least 2 stops, got {0}")]
    TooFewStops(usize),
    #[error("gradient stop position {0} is outside 0.0-1.0")]
    PositionOutOfRange(f32),
    #[error("gradient stops are not ordered by position")]
    Unordered,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    stops: Vec<GradientStop>,
    axis: GradientAxis,
}

impl Gradient {
    pub fn new(stops: Vec<GradientStop>, axis: GradientAxis) -> Result<Self, GradientError> {
        if stops.len() < 2 {
            return Err(GradientError::TooFewStops(stops.len()));
        }
        if let Some(bad) = stops.iter().find(|s| !(0.0..=1.0).contains(&s.position)) {
            return Err(GradientError::PositionOutOfRange(bad.position));
        }
        if stops.windows(2).any(|w| w[1].position < w[0].position) {
            return Err(GradientError::Unordered);
        }
        Ok(Self { stops, axis })
    }

    /// Stops spread at `i / (n - 1)`, the layout used by configured gradients.
    pub fn evenly_spaced(colors: &[Rgba], axis: GradientAxis) -> Result<Self, GradientError> {
        if colors.len() < 2 {
            return Err(GradientError::TooFewStops(colors.len()));
        }
        let last = (colors.len() - 1) as f32;
        let stops = colors
            .iter()
            .enumerate()
            .map(|(i, &color)| GradientStop { position: i as f32 / last, color })
            .collect();
        Self::new(stops, axis)
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    pub fn axis(&self) -> GradientAxis {
        self.axis
    }

    pub fn sample(&self, t: f32) -> Rgba {
        let first = self.stops[0];
        if t <= first.position {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t <= hi.position {
                if t >= hi.position {
                    return hi.color;
                }
                let span = hi.position - lo.position;
                if span <= 0.0 {
                    return hi.color;
                }
                return lo.color.lerp(hi.color, (t - lo.position) / span);
            }
        }
        self.stops[self.stops.len() - 1].color
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColorMode {
    Solid(Rgba),
    Gradient(Gradient),
}

impl ColorMode {
    /// Color at a point in normalized surface coordinates.
    pub fn color_at(&self, u: f32, v: f32) -> Rgba {
        let t = match self {
            ColorMode::Solid(_) => 0.0,
            ColorMode::Gradient(gradient) => gradient.axis.project(u, v),
        };
        resolve_color(self, t)
    }
}

/// Color for a position `t` along the gradient axis. Solid colors ignore `t`.
pub fn resolve_color(mode: &ColorMode, t: f32) -> Rgba {
    match mode {
        ColorMode::Solid(color) => *color,
        ColorMode::Gradient(gradient) => gradient.sample(t),
    }
}
