/// Initialization parameters for the headless GPU layer.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct HeadlessInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Adapter preference. Batching is upload-heavy, so the discrete GPU is
    /// preferred by default.
    pub power_preference: wgpu::PowerPreference,

    /// Allow falling back to a software adapter (useful on CI machines).
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Color format of offscreen frames.
    pub color_format: wgpu::TextureFormat,
}

impl Default for HeadlessInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}
