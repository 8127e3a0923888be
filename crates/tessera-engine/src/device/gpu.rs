use anyhow::{Context, Result, ensure};

use super::{HeadlessInit, OffscreenFrame};
use crate::render::RenderCtx;

/// Owns wgpu core objects for rendering without a surface.
///
/// This type is the low-level rendering context:
/// - creates an Instance and stores the Adapter/Device/Queue
/// - allocates offscreen frames and submits them
pub struct HeadlessGpu {
    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Format of offscreen color targets.
    color_format: wgpu::TextureFormat,
}

impl HeadlessGpu {
    /// Creates a device with no surface attached.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: HeadlessInit) -> Result<Self> {
        let HeadlessInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
            color_format,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tessera-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?})", info.name, info.backend);

        Ok(Self {
            adapter,
            device,
            queue,
            color_format,
        })
    }

    /// Blocking variant of [`new`](Self::new).
    pub fn new_blocking(init: HeadlessInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Upload context for batch commits.
    pub fn render_ctx(&self) -> RenderCtx<'_> {
        RenderCtx::new(&self.device, &self.queue)
    }

    /// Allocates a color target of `width` x `height` and an encoder.
    pub fn begin_frame(&self, width: u32, height: u32) -> Result<OffscreenFrame> {
        let max = self.device.limits().max_texture_dimension_2d;
        ensure!(
            width > 0 && height > 0 && width <= max && height <= max,
            "offscreen frame {width}x{height} outside 1..={max}"
        );

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessera offscreen color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessera frame encoder"),
            });

        Ok(OffscreenFrame {
            texture,
            view,
            encoder,
            size: (width, height),
        })
    }

    /// Submits the recorded commands for the given frame and returns its
    /// color texture.
    pub fn submit(&self, frame: OffscreenFrame) -> wgpu::Texture {
        let OffscreenFrame {
            texture, encoder, ..
        } = frame;
        self.queue.submit(std::iter::once(encoder.finish()));
        texture
    }
}
