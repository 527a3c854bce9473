//! Ordered execution of render stages and the pipes between them.
//!
//! Stages run in registration order. The [`UpdatePreviousPipesStage`] is owned
//! by the manager and always runs last, so every `Previous::X` pipe read
//! during frame N holds what `X` contained at the end of frame N-1.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use log::{debug, trace};

use super::device::RenderDevice;
use super::program::ProgramCache;
use super::stage::{PREVIOUS_PIPE_PREFIX, PipeDesc, RenderStage, StageContext, StageError};
use super::stages::UpdatePreviousPipesStage;
use super::texture_pool::{TextureDesc, TexturePool};
use super::types::{ResourceName, is_valid_resolution};
use crate::config::PipelineConfig;

pub struct StageManager {
    config: PipelineConfig,
    resolution: [u32; 2],
    stages: Vec<Box<dyn RenderStage>>,
    previous: UpdatePreviousPipesStage,
    pipes: BTreeMap<String, PipeDesc>,
    pool: TexturePool,
    programs: ProgramCache,
    device: RenderDevice,
    created: bool,
    frame: u64,
}

/// Build a [`StageContext`] from disjoint manager fields.
macro_rules! stage_ctx {
    ($self:ident) => {
        StageContext {
            pool: &mut $self.pool,
            programs: &mut $self.programs,
            device: &$self.device,
            resolution: $self.resolution,
            config: &$self.config,
        }
    };
}

impl StageManager {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if !is_valid_resolution(config.resolution) {
            return Err(StageError::InvalidResolution(config.resolution).into());
        }
        Ok(Self {
            resolution: config.resolution,
            config,
            stages: Vec::new(),
            previous: UpdatePreviousPipesStage::new(),
            pipes: BTreeMap::new(),
            pool: TexturePool::new(),
            programs: ProgramCache::new(),
            device: RenderDevice::new(),
            created: false,
            frame: 0,
        })
    }

    pub fn add_stage(&mut self, stage: Box<dyn RenderStage>) -> Result<()> {
        if self.created {
            bail!("cannot add stage '{}' after setup()", stage.name());
        }
        self.stages.push(stage);
        Ok(())
    }

    pub fn resolution(&self) -> [u32; 2] {
        self.resolution
    }

    /// Frames rendered since setup.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TexturePool {
        &mut self.pool
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn previous_pipes_stage(&self) -> &UpdatePreviousPipesStage {
        &self.previous
    }

    /// Texture backing `pipe`, once setup has allocated it.
    pub fn pipe(&self, pipe: &str) -> Option<ResourceName> {
        self.pipes.get(pipe).map(|_| ResourceName::from(pipe))
    }

    fn register_pipe(&mut self, desc: PipeDesc) -> Result<()> {
        if let Some(existing) = self.pipes.get(&desc.name) {
            if *existing != desc {
                bail!("pipe '{}' is produced with conflicting formats", desc.name);
            }
            return Ok(());
        }
        self.pool.create(TextureDesc::new(
            desc.name.as_str(),
            desc.format,
            self.resolution,
        ))?;
        self.pipes.insert(desc.name.clone(), desc);
        Ok(())
    }

    /// Allocate pipes, wire `Previous::` copies, then create every stage and
    /// compile its programs.
    pub fn setup(&mut self) -> Result<()> {
        if self.created {
            bail!("setup() was already called");
        }
        let produced: Vec<PipeDesc> = self.stages.iter().flat_map(|s| s.produced_pipes()).collect();
        for desc in produced {
            self.register_pipe(desc)?;
        }

        let required: Vec<String> = self.stages.iter().flat_map(|s| s.required_pipes()).collect();
        for pipe in required {
            if self.pipes.contains_key(&pipe) {
                continue;
            }
            let Some(current) = pipe.strip_prefix(PREVIOUS_PIPE_PREFIX) else {
                bail!("pipe '{pipe}' is required but no stage produces it");
            };
            let Some(current_desc) = self.pipes.get(current).cloned() else {
                bail!("pipe '{pipe}' refers to '{current}', which no stage produces");
            };
            self.register_pipe(PipeDesc::new(pipe.as_str(), current_desc.format))?;
            self.previous.add_transfer(current, pipe.as_str())?;
            debug!("storing '{current}' into '{pipe}' at the end of each frame");
        }

        for stage in &mut self.stages {
            let mut pipes: Vec<String> = stage.produced_pipes().into_iter().map(|p| p.name).collect();
            pipes.extend(stage.required_pipes());
            for pipe in &pipes {
                stage.bind_pipe(pipe, &ResourceName::from(pipe.as_str()));
            }
            for input in stage.required_inputs() {
                if !self.pool.contains(&input) {
                    return Err(StageError::MissingTexture {
                        stage: stage.name().to_string(),
                        name: input,
                    }
                    .into());
                }
            }
        }

        let mut ctx = stage_ctx!(self);
        for stage in &mut self.stages {
            stage.create(&mut ctx)?;
        }
        self.previous.create(&mut ctx)?;
        for stage in &mut self.stages {
            stage.reload_shaders(&mut ctx)?;
        }
        self.previous.reload_shaders(&mut ctx)?;
        self.created = true;
        debug!("stage manager set up {} stages", self.stages.len() + 1);
        Ok(())
    }

    pub fn handle_window_resize(&mut self, resolution: [u32; 2]) -> Result<()> {
        if !is_valid_resolution(resolution) {
            return Err(StageError::InvalidResolution(resolution).into());
        }
        if !self.created {
            self.resolution = resolution;
            return Ok(());
        }
        let previous_resolution = self.resolution;
        self.resolution = resolution;
        let mut ctx = stage_ctx!(self);
        // Previous pipes validate before resizing anything.
        if let Err(err) = self.previous.set_dimensions(&mut ctx) {
            self.resolution = previous_resolution;
            return Err(err);
        }
        for name in self.pipes.keys() {
            if !name.starts_with(PREVIOUS_PIPE_PREFIX) {
                ctx.pool.texture_mut(&ResourceName::from(name.as_str()))?.resize(resolution);
            }
        }
        for stage in &mut self.stages {
            stage.set_dimensions(&mut ctx)?;
        }
        debug!("resized pipeline to {resolution:?}");
        Ok(())
    }

    pub fn reload_shaders(&mut self) -> Result<()> {
        let mut ctx = stage_ctx!(self);
        for stage in &mut self.stages {
            stage.reload_shaders(&mut ctx)?;
        }
        self.previous.reload_shaders(&mut ctx)
    }

    /// Run every stage once, then store the previous pipes.
    pub fn render_frame(&mut self) -> Result<()> {
        if !self.created {
            bail!("render_frame() called before setup()");
        }
        let mut ctx = stage_ctx!(self);
        for stage in &mut self.stages {
            trace!("frame {}: {}", self.frame, stage.name());
            stage.update(&mut ctx)?;
        }
        self.previous.update(&mut ctx)?;
        self.frame += 1;
        Ok(())
    }
}
