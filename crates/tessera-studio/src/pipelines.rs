use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tessera_engine::batch::{BatchVertex, ColoredVertex, MeshVertex};
use tessera_engine::render::TopologyPipelines;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub light_dir: [f32; 4],
}

impl CameraUniform {
    /// Camera looking at the origin from above one corner of the field.
    pub fn looking_at_field(half_extent: f32, aspect: f32) -> Self {
        let eye = Vec3::new(half_extent * 1.2, half_extent * 0.9, half_extent * 1.4);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, half_extent * 10.0);
        let light = Vec3::new(-0.4, -1.0, -0.3).normalize();

        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            light_dir: light.extend(0.0).to_array(),
        }
    }
}

/// GPU state shared by every batch draw: camera binding plus one pipeline per
/// topology the demo uses.
pub struct StudioPipelines {
    pub pipelines: TopologyPipelines,
    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,
}

impl StudioPipelines {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tessera batched shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batched.wgsl").into()),
        });

        let camera_size = std::mem::size_of::<CameraUniform>() as u64;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessera camera bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(camera_size),
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessera batched pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessera camera ubo"),
            size: camera_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessera camera bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let target = PipelineTarget {
            device,
            shader: &shader,
            layout: &layout,
            color_format,
        };

        let mut pipelines = TopologyPipelines::new();
        pipelines.insert(
            wgpu::PrimitiveTopology::TriangleList,
            target.build("mesh", MeshVertex::layout(), wgpu::PrimitiveTopology::TriangleList),
        );
        pipelines.insert(
            wgpu::PrimitiveTopology::LineList,
            target.build("line", ColoredVertex::layout(), wgpu::PrimitiveTopology::LineList),
        );

        Self {
            pipelines,
            camera_buffer,
            camera_bind_group,
        }
    }

    pub fn write_camera(&self, queue: &wgpu::Queue, camera: &CameraUniform) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(camera));
    }
}

struct PipelineTarget<'a> {
    device: &'a wgpu::Device,
    shader: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
}

impl PipelineTarget<'_> {
    /// Pipeline for entry points `vs_{stage}` / `fs_{stage}`.
    fn build(
        &self,
        stage: &str,
        vertex_layout: wgpu::VertexBufferLayout<'static>,
        topology: wgpu::PrimitiveTopology,
    ) -> wgpu::RenderPipeline {
        let label = format!("tessera {stage} pipeline");
        let vs = format!("vs_{stage}");
        let fs = format!("fs_{stage}");

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label.as_str()),
            layout: Some(self.layout),

            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some(vs.as_str()),
                compilation_options: Default::default(),
                buffers: &[vertex_layout],
            },

            fragment: Some(wgpu::FragmentState {
                module: self.shader,
                entry_point: Some(fs.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: match topology {
                    wgpu::PrimitiveTopology::TriangleList => Some(wgpu::Face::Back),
                    _ => None,
                },
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}
