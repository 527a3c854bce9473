//! Pipeline configuration, loaded from JSON.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::renderer::types::is_valid_resolution;
use crate::sensors::tag_state::UnmappedObjectPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Display resolution `[width, height]` every full-screen pipe is sized to.
    pub resolution: [u32; 2],
    /// When set, generated programs are written here on every shader reload.
    pub shader_dump_dir: Option<PathBuf>,
    pub instance_camera: InstanceCameraConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: [1280, 720],
            shader_dump_dir: None,
            instance_camera: InstanceCameraConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceCameraConfig {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub unmapped_objects: UnmappedObjectPolicy,
}

impl Default for InstanceCameraConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 128,
            fov_deg: 60.0,
            near: 0.1,
            far: 1000.0,
            unmapped_objects: UnmappedObjectPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(text).map_err(|e| anyhow!("invalid pipeline config json: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_resolution(self.resolution) {
            return Err(anyhow!("resolution {:?} must be non-zero", self.resolution));
        }
        let cam = &self.instance_camera;
        if !is_valid_resolution([cam.width, cam.height]) {
            return Err(anyhow!(
                "instance_camera size {}x{} must be non-zero",
                cam.width,
                cam.height
            ));
        }
        if !(cam.fov_deg > 0.0 && cam.fov_deg < 180.0) {
            return Err(anyhow!("instance_camera.fov_deg {} is out of range", cam.fov_deg));
        }
        if !(cam.near > 0.0 && cam.far > cam.near) {
            return Err(anyhow!(
                "instance_camera clip range {}..{} is invalid",
                cam.near,
                cam.far
            ));
        }
        Ok(())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {e}", path.display()))?;
    PipelineConfig::from_json_str(&text).map_err(|e| anyhow!("{}: {e:#}", path.display()))
}
