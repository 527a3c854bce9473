//! Copies pipes into their `Previous::` counterparts at the end of a frame.

use std::fs;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, trace};

use crate::renderer::render_target::RenderTarget;
use crate::renderer::stage::{RenderStage, StageContext, StageError};
use crate::renderer::texture_pool::TexturePool;
use crate::renderer::types::{ResourceName, is_valid_resolution};
use crate::renderer::wgsl_templates::fullscreen::{
    FULLSCREEN_FRAGMENT_ENTRY, FULLSCREEN_VERTEX_ENTRY,
};
use crate::renderer::wgsl_templates::copy_pipes::{
    COPY_PROGRAM_NAME, MAX_TRANSFERS, TextureSignature, TransferSignature, build_copy_program_source,
    destination_binding_name, source_binding_name,
};

pub const STAGE_NAME: &str = "UpdatePreviousPipesStage";
const TARGET_NAME: &str = "StorePreviousPipes";

/// One registered copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub source: ResourceName,
    pub destination: ResourceName,
}

/// Copies every registered source texture into its destination once per
/// frame, through a program synthesized for the registered texture types.
#[derive(Debug, Default)]
pub struct UpdatePreviousPipesStage {
    transfers: Vec<Transfer>,
    target: Option<RenderTarget>,
}

impl UpdatePreviousPipesStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a copy. Only allowed before [`RenderStage::create`] and up to
    /// [`MAX_TRANSFERS`] pairs.
    pub fn add_transfer(
        &mut self,
        source: impl Into<ResourceName>,
        destination: impl Into<ResourceName>,
    ) -> Result<(), StageError> {
        if self.target.is_some() {
            return Err(StageError::AlreadyCreated {
                stage: STAGE_NAME.to_string(),
            });
        }
        if self.transfers.len() >= MAX_TRANSFERS {
            return Err(StageError::TooManyTransfers {
                stage: STAGE_NAME.to_string(),
                limit: MAX_TRANSFERS,
            });
        }
        self.transfers.push(Transfer {
            source: source.into(),
            destination: destination.into(),
        });
        Ok(())
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn is_created(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Source of the currently installed program, if any.
    pub fn active_source(&self) -> Option<&str> {
        self.target.as_ref()?.shader().map(|p| p.source())
    }

    fn missing(name: &ResourceName) -> StageError {
        StageError::MissingTexture {
            stage: STAGE_NAME.to_string(),
            name: name.clone(),
        }
    }

    fn check_resolution(resolution: [u32; 2]) -> Result<(), StageError> {
        if is_valid_resolution(resolution) {
            Ok(())
        } else {
            Err(StageError::InvalidResolution(resolution))
        }
    }

    /// Every destination must exist with a non-zero size. With
    /// `expected`, its size must also equal that resolution.
    fn check_destinations(
        &self,
        pool: &TexturePool,
        expected: Option<[u32; 2]>,
    ) -> Result<(), StageError> {
        for transfer in &self.transfers {
            let dest = pool
                .get(&transfer.destination)
                .ok_or_else(|| Self::missing(&transfer.destination))?;
            if dest.is_empty() {
                return Err(StageError::ZeroSizedTexture {
                    stage: STAGE_NAME.to_string(),
                    name: transfer.destination.clone(),
                });
            }
            if let Some(expected) = expected {
                if dest.size() != expected {
                    return Err(StageError::ResolutionMismatch {
                        stage: STAGE_NAME.to_string(),
                        name: transfer.destination.clone(),
                        expected,
                        actual: dest.size(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Texture signatures of every registered pair, in registration order.
    pub fn signatures(&self, pool: &TexturePool) -> Result<Vec<TransferSignature>, StageError> {
        let signature = |name: &ResourceName| {
            pool.get(name)
                .map(|t| TextureSignature {
                    kind: t.desc().kind,
                    format: t.desc().format,
                })
                .ok_or_else(|| Self::missing(name))
        };
        self.transfers
            .iter()
            .map(|t| {
                Ok(TransferSignature {
                    source: signature(&t.source)?,
                    destination: signature(&t.destination)?,
                })
            })
            .collect()
    }

    /// Synthesize the copy program for the current pair list.
    pub fn program_source(&self, pool: &TexturePool) -> Result<String> {
        build_copy_program_source(&self.signatures(pool)?)
    }

    /// The render target's color buffer must still be in the pool.
    fn check_target(&self, pool: &TexturePool) -> Result<(), StageError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let color = target
            .color_texture()
            .cloned()
            .unwrap_or_else(|| ResourceName::from(format!("{TARGET_NAME}.color")));
        if pool.contains(&color) {
            Ok(())
        } else {
            Err(Self::missing(&color))
        }
    }

    fn target_mut(&mut self) -> Result<&mut RenderTarget> {
        self.target
            .as_mut()
            .ok_or_else(|| anyhow!("{STAGE_NAME} used before create()"))
    }
}

impl RenderStage for UpdatePreviousPipesStage {
    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn create(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.target.is_some() {
            return Err(StageError::AlreadyCreated {
                stage: STAGE_NAME.to_string(),
            }
            .into());
        }
        Self::check_resolution(ctx.resolution)?;
        for transfer in &self.transfers {
            if !ctx.pool.contains(&transfer.source) {
                return Err(Self::missing(&transfer.source).into());
            }
        }
        self.check_destinations(ctx.pool, Some(ctx.resolution))?;

        let mut target = RenderTarget::new(TARGET_NAME);
        target.prepare_buffer(ctx.pool, ctx.resolution)?;
        for (i, transfer) in self.transfers.iter().enumerate() {
            target.set_shader_input(source_binding_name(i), transfer.source.clone());
            target.set_shader_input(destination_binding_name(i), transfer.destination.clone());
        }
        debug!(
            "created {STAGE_NAME} with {} transfers at {:?}",
            self.transfers.len(),
            ctx.resolution
        );
        self.target = Some(target);
        Ok(())
    }

    fn reload_shaders(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let source = self.program_source(ctx.pool)?;
        if let Some(dir) = &ctx.config.shader_dump_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create shader dump dir {}", dir.display()))?;
            let path = dir.join(format!("{COPY_PROGRAM_NAME}.wgsl"));
            fs::write(&path, &source)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        if self.active_source() == Some(source.as_str()) {
            debug!("{STAGE_NAME}: program unchanged, keeping it");
            return Ok(());
        }
        let program = ctx.programs.get_or_compile(COPY_PROGRAM_NAME, &source)?;
        if !program.has_entry_point(FULLSCREEN_VERTEX_ENTRY, naga::ShaderStage::Vertex)
            || !program.has_entry_point(FULLSCREEN_FRAGMENT_ENTRY, naga::ShaderStage::Fragment)
        {
            bail!("{COPY_PROGRAM_NAME} is missing its full-screen entry points");
        }
        self.target_mut()?.set_shader(program);
        debug!("{STAGE_NAME}: installed program for {} transfers", self.transfers.len());
        Ok(())
    }

    fn set_dimensions(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        Self::check_resolution(ctx.resolution)?;
        // Validate everything first so a failure resizes nothing.
        self.check_destinations(ctx.pool, None)?;
        self.check_target(ctx.pool)?;
        for transfer in &self.transfers {
            ctx.pool.texture_mut(&transfer.destination)?.resize(ctx.resolution);
        }
        if let Some(target) = self.target.as_mut() {
            target.set_dimensions(ctx.pool, ctx.resolution)?;
        }
        debug!("{STAGE_NAME}: resized to {:?}", ctx.resolution);
        Ok(())
    }

    fn update(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| anyhow!("{STAGE_NAME} used before create()"))?;
        ctx.device.execute_program(target, ctx.pool)?;
        trace!("{STAGE_NAME}: copied {} pipes", self.transfers.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::renderer::device::RenderDevice;
    use crate::renderer::program::ProgramCache;
    use crate::renderer::texture_pool::TextureDesc;
    use crate::renderer::types::TextureFormat;

    struct Fixture {
        pool: TexturePool,
        programs: ProgramCache,
        device: RenderDevice,
        config: PipelineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                pool: TexturePool::new(),
                programs: ProgramCache::new(),
                device: RenderDevice::new(),
                config: PipelineConfig::default(),
            }
        }

        fn ctx(&mut self, resolution: [u32; 2]) -> StageContext<'_> {
            StageContext {
                pool: &mut self.pool,
                programs: &mut self.programs,
                device: &self.device,
                resolution,
                config: &self.config,
            }
        }
    }

    #[test]
    fn add_transfer_after_create_is_rejected() {
        let mut fx = Fixture::new();
        let mut stage = UpdatePreviousPipesStage::new();
        stage.create(&mut fx.ctx([4, 4])).unwrap();
        assert_eq!(
            stage.add_transfer("a", "b"),
            Err(StageError::AlreadyCreated {
                stage: STAGE_NAME.to_string()
            })
        );
    }

    #[test]
    fn create_reports_mismatched_destination() {
        let mut fx = Fixture::new();
        fx.pool
            .create(TextureDesc::new("a", TextureFormat::Rgba8Unorm, [4, 4]))
            .unwrap();
        fx.pool
            .create(TextureDesc::new("b", TextureFormat::Rgba8Unorm, [2, 4]))
            .unwrap();
        let mut stage = UpdatePreviousPipesStage::new();
        stage.add_transfer("a", "b").unwrap();
        let err = stage.create(&mut fx.ctx([4, 4])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::ResolutionMismatch { actual: [2, 4], .. })
        ));
        assert!(!stage.is_created());
    }

    #[test]
    fn create_reports_missing_source_and_zero_size() {
        let mut fx = Fixture::new();
        fx.pool
            .create(TextureDesc::new("b", TextureFormat::Rgba8Unorm, [0, 0]))
            .unwrap();
        let mut stage = UpdatePreviousPipesStage::new();
        stage.add_transfer("a", "b").unwrap();
        let err = stage.create(&mut fx.ctx([4, 4])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::MissingTexture { .. })
        ));

        fx.pool
            .create(TextureDesc::new("a", TextureFormat::Rgba8Unorm, [4, 4]))
            .unwrap();
        let err = stage.create(&mut fx.ctx([4, 4])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::ZeroSizedTexture { .. })
        ));
    }

    #[test]
    fn reload_is_skipped_when_source_is_unchanged() {
        let mut fx = Fixture::new();
        for name in ["a", "b"] {
            fx.pool
                .create(TextureDesc::new(name, TextureFormat::Rgba16Float, [4, 4]))
                .unwrap();
        }
        let mut stage = UpdatePreviousPipesStage::new();
        stage.add_transfer("a", "b").unwrap();
        stage.create(&mut fx.ctx([4, 4])).unwrap();
        stage.reload_shaders(&mut fx.ctx([4, 4])).unwrap();
        stage.reload_shaders(&mut fx.ctx([4, 4])).unwrap();
        assert_eq!(fx.programs.compilations(), 1);
        assert!(stage.active_source().unwrap().contains("rgba16float"));
    }

    #[test]
    fn shader_source_is_dumped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new();
        fx.config.shader_dump_dir = Some(dir.path().join("shaders"));
        let mut stage = UpdatePreviousPipesStage::new();
        stage.create(&mut fx.ctx([2, 2])).unwrap();
        stage.reload_shaders(&mut fx.ctx([2, 2])).unwrap();
        let dumped =
            std::fs::read_to_string(dir.path().join("shaders/update_previous_pipes.wgsl")).unwrap();
        assert_eq!(Some(dumped.as_str()), stage.active_source());
    }

    #[test]
    fn add_transfer_stops_at_the_binding_limit() {
        let mut stage = UpdatePreviousPipesStage::new();
        for i in 0..MAX_TRANSFERS {
            stage.add_transfer(format!("p{i}"), format!("Previous::p{i}")).unwrap();
        }
        assert_eq!(
            stage.add_transfer("one", "too many"),
            Err(StageError::TooManyTransfers {
                stage: STAGE_NAME.to_string(),
                limit: MAX_TRANSFERS
            })
        );
        assert_eq!(stage.transfers().len(), MAX_TRANSFERS);
    }

    #[test]
    fn resize_without_target_buffer_changes_nothing() {
        let mut fx = Fixture::new();
        for name in ["a", "b"] {
            fx.pool
                .create(TextureDesc::new(name, TextureFormat::Rgba8Unorm, [4, 4]))
                .unwrap();
        }
        let mut stage = UpdatePreviousPipesStage::new();
        stage.add_transfer("a", "b").unwrap();
        stage.create(&mut fx.ctx([4, 4])).unwrap();
        let color = stage.target().unwrap().color_texture().unwrap().clone();
        assert_eq!(color.as_str(), "StorePreviousPipes.color");
        fx.pool.remove(&color);

        let err = stage.set_dimensions(&mut fx.ctx([8, 2])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StageError>(),
            Some(&StageError::MissingTexture {
                stage: STAGE_NAME.to_string(),
                name: color,
            })
        );
        assert_eq!(fx.pool.texture(&"b".into()).unwrap().size(), [4, 4]);
        assert_eq!(stage.target().unwrap().size(), [4, 4]);
    }
}
