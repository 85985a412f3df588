use std::path::PathBuf;
use std::time::Duration;

/// Contains configuration options for the renderer like vsync, asset locations and timeouts
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vsync: bool,
    pub asset_root: PathBuf,
    pub frame_fence_timeout: Duration,
    pub upload_fence_timeout: Duration,
    pub max_objects: usize,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            asset_root: PathBuf::from("_assets"),
            frame_fence_timeout: Duration::from_secs(1),
            upload_fence_timeout: Duration::from_secs(10),
            max_objects: 10_000,
            clear_color: [0.0, 0.0, 0.1, 1.0],
        }
    }
}

impl RenderConfig {
    pub fn shader_dir(&self) -> PathBuf {
        self.asset_root.join("shaders")
    }

    pub fn texture_dir(&self) -> PathBuf {
        self.asset_root.join("textures")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.asset_root.join("models")
    }
}
