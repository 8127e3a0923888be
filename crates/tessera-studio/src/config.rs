use tessera_engine::batch::BatchConfig;
use tessera_engine::logging::LoggingConfig;

/// Knobs for the headless demo.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Offscreen target size in pixels.
    pub width: u32,
    pub height: u32,

    /// Cube field dimensions; `rows * cols` records in one mesh batch.
    pub rows: u32,
    pub cols: u32,
    /// Distance between neighbouring cube centers.
    pub spacing: f32,

    /// Frames rendered; the field is reshaped between frames.
    pub frames: u32,

    pub mesh_batch: BatchConfig,
    pub line_batch: BatchConfig,
    pub logging: LoggingConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            rows: 32,
            cols: 32,
            spacing: 2.5,
            frames: 3,
            mesh_batch: BatchConfig::labeled("cube field"),
            line_batch: BatchConfig::labeled("ground grid"),
            logging: LoggingConfig::with_filter(
                "info,tessera_engine=debug,wgpu_core=warn,wgpu_hal=warn",
            ),
        }
    }
}

impl StudioConfig {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Half the side length of the square the field occupies.
    pub fn half_extent(&self) -> f32 {
        self.rows.max(self.cols) as f32 * self.spacing * 0.5
    }
}
