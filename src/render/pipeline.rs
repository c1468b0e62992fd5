use bytemuck::{Pod, Zeroable};

use super::color::{ColorMode, Rgba};
use super::{Style, MAX_GRADIENT_STOPS};

/// Uniform block shared by every program, laid out to match `Uniforms` in
/// `shaders/common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Uniforms {
    pub widget_width: f32,
    pub widget_height: f32,
    pub number_of_bars: u32,
    pub use_gradient: u32,
    pub gradient_points: [f32; 4],
    pub gradient_colors: [[f32; 4]; MAX_GRADIENT_STOPS],
    pub gradient_positions: [[f32; 4]; 2],
    pub solid_color: [f32; 4],
    pub num_gradient_colors: u32,
    pub avg_height: f32,
    pub i_time: f32,
    pub fill: u32,
    pub i_resolution: [f32; 2],
    pub _padding: [f32; 2],
}

impl Uniforms {
    pub fn new(width: u32, height: u32, bar_count: u32, color: &ColorMode, fill: bool) -> Self {
        let mut uniforms = Self {
            widget_width: width as f32,
            widget_height: height as f32,
            number_of_bars: bar_count,
            use_gradient: 0,
            gradient_points: [0.0, 0.0, 1.0, 1.0],
            gradient_colors: [[0.0; 4]; MAX_GRADIENT_STOPS],
            gradient_positions: [[0.0; 4]; 2],
            solid_color: Rgba::CYAN.to_array(),
            num_gradient_colors: 0,
            avg_height: 0.0,
            i_time: 0.0,
            fill: fill as u32,
            i_resolution: [width as f32, height as f32],
            _padding: [0.0; 2],
        };

        match color {
            ColorMode::Solid(c) => uniforms.solid_color = c.to_array(),
            ColorMode::Gradient(gradient) => {
                let stops = &gradient.stops()[..gradient.stops().len().min(MAX_GRADIENT_STOPS)];
                uniforms.use_gradient = 1;
                uniforms.gradient_points = gradient.axis().to_array();
                uniforms.num_gradient_colors = stops.len() as u32;
                for (i, stop) in stops.iter().enumerate() {
                    uniforms.gradient_colors[i] = stop.color.to_array();
                    uniforms.gradient_positions[i / 4][i % 4] = stop.position;
                }
            }
        }
        uniforms
    }

    /// Per-frame fields.
    pub fn update(&mut self, avg_height: f32, elapsed_secs: f32) {
        self.avg_height = avg_height;
        self.i_time = elapsed_secs;
    }
}

/// Which primitive a program draws and how it blends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMode {
    pub style: Style,
    pub fill: bool,
}

impl DrawMode {
    pub fn topology(self) -> wgpu::PrimitiveTopology {
        match (self.style, self.fill) {
            (Style::Bars, true) => wgpu::PrimitiveTopology::TriangleList,
            (Style::Bars, false) => wgpu::PrimitiveTopology::LineList,
            (Style::Line, true) => wgpu::PrimitiveTopology::TriangleStrip,
            (Style::Line, false) => wgpu::PrimitiveTopology::LineStrip,
        }
    }

    pub fn blend(self) -> wgpu::BlendState {
        if self.fill {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        }
    }

    /// Unit quad indices: two triangles when filled, the four edges otherwise.
    pub fn quad_indices(self) -> &'static [u16] {
        if self.fill {
            &[0, 1, 2, 0, 2, 3]
        } else {
            &[0, 1, 1, 2, 2, 3, 3, 0]
        }
    }
}

/// Corners of the unit quad, `(x, y)` with y = 1 at the bar's top.
pub const UNIT_QUAD: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

const BAR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const BAR_INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![1 => Float32, 2 => Float32];
const LINE_X_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32];
const LINE_HEIGHT_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32];

fn vertex_layouts(style: Style) -> Vec<wgpu::VertexBufferLayout<'static>> {
    match style {
        Style::Bars => vec![
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &BAR_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &BAR_INSTANCE_ATTRIBUTES,
            },
        ],
        Style::Line => vec![
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<f32>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &LINE_X_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<f32>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &LINE_HEIGHT_ATTRIBUTES,
            },
        ],
    }
}

pub struct VisualizerPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl VisualizerPipeline {
    pub fn new(
        device: &wgpu::Device,
        shader_source: &str,
        mode: DrawMode,
        texture_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("visualizer_shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniforms_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("visualizer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let buffers = vertex_layouts(mode.style);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("visualizer_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(mode.blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: mode.topology(),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }
}
