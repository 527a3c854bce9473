pub mod config;
pub mod renderer;
pub mod scene;
pub mod sensors;

pub use config::{InstanceCameraConfig, PipelineConfig, load_config_from_path};
