/// A single offscreen frame: color target plus the encoder recording into it.
///
/// Short-lived; finish it with [`HeadlessGpu::submit`](super::HeadlessGpu::submit).
pub struct OffscreenFrame {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
    pub size: (u32, u32),
}
