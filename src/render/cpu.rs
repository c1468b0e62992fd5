use image::{GrayImage, Luma, Rgba as Pixel, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use super::layout::{bar_span, line_x, mirror_index, value_at, walk_order};
use super::{FrameData, RenderBackend, RenderError, RenderSettings, Style, SurfaceSize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathOp {
    MoveTo(f32, f32),
    LineTo(f32, f32),
}

impl PathOp {
    pub fn point(self) -> (f32, f32) {
        match self {
            PathOp::MoveTo(x, y) | PathOp::LineTo(x, y) => (x, y),
        }
    }
}

const COVERED: Luma<u8> = Luma([255]);

/// Software rasterizer. Always available; used when the GPU is not.
pub struct CpuBackend {
    settings: RenderSettings,
    size: SurfaceSize,
    pitch: f32,
    /// Background everywhere.
    backdrop: RgbaImage,
    /// Bar color composited over the background, per pixel.
    paint: RgbaImage,
}

impl CpuBackend {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            size: SurfaceSize::default(),
            pitch: 0.0,
            backdrop: RgbaImage::new(0, 0),
            paint: RgbaImage::new(0, 0),
        }
    }

    /// One continuous outline, left to right, in pixel coordinates with y down.
    pub fn build_path(&self, values: &[f64]) -> Vec<PathOp> {
        let bar_count = self.settings.bar_count as usize;
        let (width, height) = (self.size.width as f32, self.size.height as f32);
        let top = |v: f32| height * (1.0 - v);
        let mut path = Vec::with_capacity(bar_count * 4 + 4);

        match self.settings.style {
            Style::Bars => {
                path.push(PathOp::MoveTo(0.0, height));
                for i in walk_order(bar_count) {
                    let (slot, flip) = mirror_index(i, bar_count);
                    let (left, right) = bar_span(slot, flip, self.pitch);
                    let y = top(value_at(values, i, bar_count));
                    path.push(PathOp::LineTo(left, height));
                    path.push(PathOp::LineTo(left, y));
                    path.push(PathOp::LineTo(right, y));
                    path.push(PathOp::LineTo(right, height));
                }
                path.push(PathOp::LineTo(width, height));
            }
            Style::Line => {
                let mut points = walk_order(bar_count).map(|i| {
                    let (slot, _) = mirror_index(i, bar_count);
                    (line_x(slot, bar_count, width), top(value_at(values, i, bar_count)))
                });
                if self.settings.fill {
                    path.push(PathOp::MoveTo(0.0, height));
                    path.extend(points.map(|(x, y)| PathOp::LineTo(x, y)));
                    path.push(PathOp::LineTo(width, height));
                } else if let Some((x, y)) = points.next() {
                    path.push(PathOp::MoveTo(x, y));
                    path.extend(points.map(|(x, y)| PathOp::LineTo(x, y)));
                }
            }
        }
        path
    }

    fn coverage(&self, path: &[PathOp]) -> GrayImage {
        let mut mask = GrayImage::new(self.size.width, self.size.height);
        if self.settings.fill {
            let mut polygon: Vec<Point<i32>> = Vec::with_capacity(path.len());
            for op in path {
                let (x, y) = op.point();
                let p = Point::new(x.round() as i32, y.round() as i32);
                if polygon.last() != Some(&p) {
                    polygon.push(p);
                }
            }
            while polygon.len() > 1 && polygon.first() == polygon.last() {
                polygon.pop();
            }
            if polygon.len() >= 3 {
                draw_polygon_mut(&mut mask, &polygon, COVERED);
            }
        } else {
            for pair in path.windows(2) {
                if let PathOp::LineTo(x, y) = pair[1] {
                    let (px, py) = pair[0].point();
                    // Two pixels wide.
                    for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
                        draw_line_segment_mut(&mut mask, (px + dx, py + dy), (x + dx, y + dy), COVERED);
                    }
                }
            }
        }
        mask
    }
}

impl RenderBackend for CpuBackend {
    fn init(&mut self, size: SurfaceSize) -> Result<(), RenderError> {
        self.size = size;
        self.pitch = size.width as f32 / (2 * self.settings.bar_count) as f32;

        let background = self.settings.background;
        self.backdrop = RgbaImage::from_pixel(size.width, size.height, Pixel(background.to_rgba8()));

        let (w, h) = (size.width as f32, size.height as f32);
        let color = &self.settings.color;
        self.paint = RgbaImage::from_fn(size.width, size.height, |x, y| {
            let c = color.color_at((x as f32 + 0.5) / w, (y as f32 + 0.5) / h);
            Pixel(c.over(background).to_rgba8())
        });

        log::debug!("CPU renderer ready for {}x{} (pitch {:.2}px)", size.width, size.height, self.pitch);
        Ok(())
    }

    fn draw(&mut self, frame: &FrameData<'_>) -> Result<RgbaImage, RenderError> {
        let path = self.build_path(frame.values);
        let mask = self.coverage(&path);

        let mut image = self.backdrop.clone();
        for ((out, paint), cover) in image.pixels_mut().zip(self.paint.pixels()).zip(mask.pixels()) {
            if cover.0[0] != 0 {
                *out = *paint;
            }
        }
        Ok(image)
    }

    fn release(&mut self) {
        self.backdrop = RgbaImage::new(0, 0);
        self.paint = RgbaImage::new(0, 0);
    }
}
