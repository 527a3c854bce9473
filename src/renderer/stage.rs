//! The stage interface driven by [`StageManager`](super::stage_manager::StageManager).

use anyhow::Result;
use thiserror::Error;

use super::device::RenderDevice;
use super::program::ProgramCache;
use super::texture_pool::TexturePool;
use super::types::{ResourceName, TextureFormat};
use crate::config::PipelineConfig;

/// Prefix of a pipe that holds the previous frame's content of another pipe.
pub const PREVIOUS_PIPE_PREFIX: &str = "Previous::";

/// Errors callers are expected to match on when building or resizing stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("{stage}: texture '{name}' does not exist")]
    MissingTexture { stage: String, name: ResourceName },

    #[error("{stage}: texture '{name}' has zero size")]
    ZeroSizedTexture { stage: String, name: ResourceName },

    #[error("{stage}: texture '{name}' is {actual:?} but the display resolution is {expected:?}")]
    ResolutionMismatch {
        stage: String,
        name: ResourceName,
        expected: [u32; 2],
        actual: [u32; 2],
    },

    #[error("invalid display resolution {0:?}")]
    InvalidResolution([u32; 2]),

    #[error("{stage} was already created, register transfers before create()")]
    AlreadyCreated { stage: String },

    #[error("{stage} holds at most {limit} transfers")]
    TooManyTransfers { stage: String, limit: usize },
}

/// A pipe a stage writes every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipeDesc {
    pub name: String,
    pub format: TextureFormat,
}

impl PipeDesc {
    pub fn new(name: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }
}

/// Everything a stage may touch while it is created, resized or run.
pub struct StageContext<'a> {
    pub pool: &'a mut TexturePool,
    pub programs: &'a mut ProgramCache,
    pub device: &'a RenderDevice,
    /// Display resolution, `[width, height]`.
    pub resolution: [u32; 2],
    pub config: &'a PipelineConfig,
}

pub trait RenderStage {
    fn name(&self) -> &str;

    /// Textures that must exist before `create`.
    fn required_inputs(&self) -> Vec<ResourceName> {
        Vec::new()
    }

    /// Pipes read by the stage. A `Previous::X` entry requests last frame's `X`.
    fn required_pipes(&self) -> Vec<String> {
        Vec::new()
    }

    fn produced_pipes(&self) -> Vec<PipeDesc> {
        Vec::new()
    }

    /// Called once per required or produced pipe with the texture backing it.
    fn bind_pipe(&mut self, _pipe: &str, _texture: &ResourceName) {}

    fn create(&mut self, ctx: &mut StageContext<'_>) -> Result<()>;

    fn reload_shaders(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    fn set_dimensions(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, ctx: &mut StageContext<'_>) -> Result<()>;
}
