use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::frame::{FrameTarget, TEXTURE_FORMAT};
use super::gpu::GpuContext;
use super::layout::{line_x, mirror_index, slot_heights, value_at, walk_order};
use super::pipeline::{DrawMode, Uniforms, VisualizerPipeline, UNIT_QUAD};
use super::{FrameData, RenderBackend, RenderError, RenderSettings, Style, SurfaceSize};
use crate::shaders;

/// `(height, display slot)` per bar, in left-to-right slot order.
pub fn bar_instances(values: &[f64], bar_count: usize) -> Vec<[f32; 2]> {
    walk_order(bar_count)
        .map(|i| {
            let (slot, _) = mirror_index(i, bar_count);
            [value_at(values, i, bar_count), slot as f32]
        })
        .collect()
}

/// Normalized x per line vertex. Filled lines repeat each x for the baseline.
pub fn line_x_positions(bar_count: usize, fill: bool) -> Vec<f32> {
    let xs = (0..bar_count * 2).map(|slot| line_x(slot, bar_count, 1.0));
    if fill {
        xs.flat_map(|x| [x, x]).collect()
    } else {
        xs.collect()
    }
}

/// Height per line vertex, matching `line_x_positions`.
pub fn line_heights(values: &[f64], bar_count: usize, fill: bool) -> Vec<f32> {
    let heights = slot_heights(values, bar_count);
    if fill {
        heights.into_iter().flat_map(|h| [h, 0.0]).collect()
    } else {
        heights
    }
}

enum Geometry {
    Bars {
        quad: wgpu::Buffer,
        indices: wgpu::Buffer,
        index_count: u32,
        instances: wgpu::Buffer,
    },
    Line {
        x_positions: wgpu::Buffer,
        heights: wgpu::Buffer,
        vertex_count: u32,
    },
}

impl Geometry {
    fn destroy(&self) {
        match self {
            Geometry::Bars { quad, indices, instances, .. } => {
                quad.destroy();
                indices.destroy();
                instances.destroy();
            }
            Geometry::Line { x_positions, heights, .. } => {
                x_positions.destroy();
                heights.destroy();
            }
        }
    }
}

/// Everything sized to one surface. Rebuilt on resize.
struct GpuResources {
    target: FrameTarget,
    pipeline: VisualizerPipeline,
    uniforms: Uniforms,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    geometry: Geometry,
}

pub struct GpuBackend {
    settings: RenderSettings,
    context: Option<GpuContext>,
    resources: Option<GpuResources>,
}

impl GpuBackend {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            context: None,
            resources: None,
        }
    }

    fn build_resources(&self, gpu: &GpuContext, size: SurfaceSize) -> GpuResources {
        let settings = &self.settings;
        let bar_count = settings.bar_count as usize;
        let mode = DrawMode { style: settings.style, fill: settings.fill };

        let source = shaders::compose(settings.style, &settings.fragment);
        let pipeline = VisualizerPipeline::new(&gpu.device, &source, mode, TEXTURE_FORMAT);

        let uniforms = Uniforms::new(size.width, size.height, settings.bar_count, &settings.color, settings.fill);
        let uniform_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniforms_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let geometry = match settings.style {
            Style::Bars => {
                let indices = mode.quad_indices();
                Geometry::Bars {
                    quad: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("unit_quad"),
                        contents: bytemuck::cast_slice(&UNIT_QUAD),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    indices: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("unit_quad_indices"),
                        contents: bytemuck::cast_slice(indices),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: indices.len() as u32,
                    instances: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("bar_instances"),
                        contents: bytemuck::cast_slice(&bar_instances(&[], bar_count)),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    }),
                }
            }
            Style::Line => {
                let xs = line_x_positions(bar_count, settings.fill);
                Geometry::Line {
                    x_positions: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("line_x_positions"),
                        contents: bytemuck::cast_slice(&xs),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    heights: gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("line_heights"),
                        contents: bytemuck::cast_slice(&line_heights(&[], bar_count, settings.fill)),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    }),
                    vertex_count: xs.len() as u32,
                }
            }
        };

        GpuResources {
            target: FrameTarget::new(gpu, size.width, size.height),
            pipeline,
            uniforms,
            uniform_buffer,
            bind_group,
            geometry,
        }
    }
}

impl RenderBackend for GpuBackend {
    fn init(&mut self, size: SurfaceSize) -> Result<(), RenderError> {
        if self.context.is_none() {
            let context = GpuContext::new()?;
            log::debug!("GPU context created on {}", context.adapter_name);
            self.context = Some(context);
        }
        let gpu = self
            .context
            .as_ref()
            .ok_or_else(|| RenderError::GpuInit("no GPU context".into()))?;
        let resources = gpu.scoped(RenderError::GpuInit, |gpu| Ok(self.build_resources(gpu, size)))?;
        log::debug!("GPU resources built for {}x{}", size.width, size.height);
        self.resources = Some(resources);
        Ok(())
    }

    fn draw(&mut self, frame: &FrameData<'_>) -> Result<RgbaImage, RenderError> {
        let (Some(gpu), Some(res)) = (self.context.as_ref(), self.resources.as_mut()) else {
            return Err(RenderError::GpuRuntime("draw before init".into()));
        };
        let bar_count = self.settings.bar_count as usize;
        let fill = self.settings.fill;
        let bg = self.settings.background;
        let background = wgpu::Color {
            r: bg.r as f64,
            g: bg.g as f64,
            b: bg.b as f64,
            a: bg.a as f64,
        };

        gpu.scoped(RenderError::GpuRuntime, |gpu| {
            res.uniforms.update(frame.avg_height, frame.elapsed_secs);
            gpu.queue.write_buffer(&res.uniform_buffer, 0, bytemuck::bytes_of(&res.uniforms));

            let (pipeline, bind_group) = (&res.pipeline.pipeline, &res.bind_group);
            match &res.geometry {
                Geometry::Bars { quad, indices, index_count, instances } => {
                    let data = bar_instances(frame.values, bar_count);
                    gpu.queue.write_buffer(instances, 0, bytemuck::cast_slice(&data));
                    res.target.render(gpu, background, |pass| {
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.set_vertex_buffer(0, quad.slice(..));
                        pass.set_vertex_buffer(1, instances.slice(..));
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                        pass.draw_indexed(0..*index_count, 0, 0..data.len() as u32);
                    })
                }
                Geometry::Line { x_positions, heights, vertex_count } => {
                    let data = line_heights(frame.values, bar_count, fill);
                    gpu.queue.write_buffer(heights, 0, bytemuck::cast_slice(&data));
                    res.target.render(gpu, background, |pass| {
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.set_vertex_buffer(0, x_positions.slice(..));
                        pass.set_vertex_buffer(1, heights.slice(..));
                        pass.draw(0..*vertex_count, 0..1);
                    })
                }
            }
        })
    }

    fn release(&mut self) {
        if let Some(res) = self.resources.take() {
            res.geometry.destroy();
            res.uniform_buffer.destroy();
            res.target.destroy();
            log::debug!("GPU resources released");
        }
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_instances_mirror_around_center() {
        let n = 4;
        let values = [0.1, 0.2, 0.3, 0.4, 0.1, 0.2, 0.3, 0.4];
        let instances = bar_instances(&values, n);
        assert_eq!(instances.len(), 2 * n);
        for (k, instance) in instances.iter().enumerate() {
            assert_eq!(instance[1], k as f32);
            assert_eq!(instance[0], instances[2 * n - 1 - k][0]);
        }
        assert_eq!(instances[n - 1][0], 0.1);
        assert_eq!(instances[n][0], 0.1);
    }

    #[test]
    fn filled_line_doubles_vertices_with_baseline() {
        let xs = line_x_positions(2, true);
        let hs = line_heights(&[0.5, 0.25, 0.5, 0.25], 2, true);
        assert_eq!(xs.len(), 8);
        assert_eq!(hs, vec![0.25, 0.0, 0.5, 0.0, 0.5, 0.0, 0.25, 0.0]);
        assert_eq!(xs[0], xs[1]);
        assert_eq!(xs[7], 1.0);
    }

    #[test]
    fn outlined_line_has_one_vertex_per_slot() {
        assert_eq!(line_x_positions(3, false).len(), 6);
        assert_eq!(line_heights(&[], 3, false), vec![0.0; 6]);
    }
}
