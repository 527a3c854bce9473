//! Program execution and scene draws.
//!
//! Compiled programs run on the GPU as full-screen passes over the pool
//! textures bound to their reflected interface. Scene draws are rasterized on
//! the CPU.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use glam::Mat4;
use log::trace;

use super::fullscreen_pass::{self, BoundTexture};
use super::gpu::GpuContext;
use super::program::TextureAccess;
use super::raster::{DrawItem, Lighting, rasterize};
use super::render_target::RenderTarget;
use super::texture_pool::{Texture, TexturePool};
use super::types::LinearRgba;

#[derive(Clone, Debug)]
enum Backend {
    /// The process-wide headless device, requested on first program run.
    Shared,
    Gpu(Arc<GpuContext>),
    Software,
}

#[derive(Clone, Debug)]
pub struct RenderDevice {
    backend: Backend,
    lighting: Lighting,
}

impl Default for RenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice {
    pub fn new() -> Self {
        Self {
            backend: Backend::Shared,
            lighting: Lighting::default(),
        }
    }

    pub fn with_gpu(gpu: Arc<GpuContext>) -> Self {
        Self {
            backend: Backend::Gpu(gpu),
            lighting: Lighting::default(),
        }
    }

    /// A device that draws but cannot run programs.
    pub fn software() -> Self {
        Self {
            backend: Backend::Software,
            lighting: Lighting::default(),
        }
    }

    pub fn with_lighting(mut self, lighting: Lighting) -> Self {
        self.lighting = lighting;
        self
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn gpu(&self) -> Option<Arc<GpuContext>> {
        match &self.backend {
            Backend::Shared => GpuContext::shared(),
            Backend::Gpu(gpu) => Some(gpu.clone()),
            Backend::Software => None,
        }
    }

    /// Run the program installed on `target` as one full-screen pass.
    ///
    /// Every texture variable the program declares must be bound on the
    /// target. Written textures must match the declared storage format and
    /// the target size. All checks happen before the GPU is touched, and the
    /// pool only changes after every readback has completed.
    pub fn execute_program(&self, target: &RenderTarget, pool: &mut TexturePool) -> Result<()> {
        let program = target
            .shader()
            .ok_or_else(|| anyhow!("render target '{}' has no program", target.name()))?;
        let color_name = target
            .color_texture()
            .ok_or_else(|| anyhow!("render target '{}' has no buffer", target.name()))?;
        let color = pool.texture(color_name)?;

        let mut bound = Vec::with_capacity(program.textures().len());
        for binding in program.textures() {
            let name = target.shader_input(&binding.name).ok_or_else(|| {
                anyhow!(
                    "render target '{}' has no input bound to {}",
                    target.name(),
                    binding.name
                )
            })?;
            let texture = pool.texture(name)?;
            if let TextureAccess::StorageWrite { format } = binding.access {
                if texture.desc().format != format {
                    bail!(
                        "{} writes {format:?} but '{name}' is {:?}",
                        binding.name,
                        texture.desc().format
                    );
                }
                if texture.size() != target.size() {
                    bail!(
                        "'{name}' is {:?} but render target '{}' is {:?}",
                        texture.size(),
                        target.name(),
                        target.size()
                    );
                }
            }
            bound.push(BoundTexture { binding, texture });
        }

        let gpu = self
            .gpu()
            .ok_or_else(|| anyhow!("no GPU available to run '{}'", program.label()))?;
        let written = fullscreen_pass::run(&gpu, program, &bound, color)?;
        for (name, bytes) in &written {
            pool.texture_mut(name)?.write_bytes(bytes)?;
        }
        trace!(
            "executed '{}' on '{}': {} textures written",
            program.label(),
            target.name(),
            written.len()
        );
        Ok(())
    }

    /// Clear `target` and rasterize `items` with the given camera matrices.
    pub fn draw(
        &self,
        target: &mut Texture,
        clear: LinearRgba,
        view: Mat4,
        projection: Mat4,
        items: &[DrawItem<'_>],
    ) {
        rasterize(target, clear, view, projection, items, &self.lighting);
        trace!("drew {} items into '{}'", items.len(), target.desc().name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::can_run_headless;
    use crate::renderer::program::ProgramCache;
    use crate::renderer::texture_pool::TextureDesc;
    use crate::renderer::types::{TextureFormat, TextureKind};
    use crate::renderer::wgsl_templates::copy_pipes::{
        TextureSignature, TransferSignature, build_copy_program_source,
    };

    fn signature(format: TextureFormat) -> TransferSignature {
        let side = TextureSignature {
            kind: TextureKind::Tex2D,
            format,
        };
        TransferSignature {
            source: side,
            destination: side,
        }
    }

    fn setup(pool: &mut TexturePool, cache: &mut ProgramCache) -> RenderTarget {
        for name in ["a", "b"] {
            pool.create(TextureDesc::new(name, TextureFormat::Rgba32Float, [3, 2]))
                .unwrap();
        }
        let mut target = RenderTarget::new("copy");
        target.prepare_buffer(pool, [3, 2]).unwrap();
        let source = build_copy_program_source(&[signature(TextureFormat::Rgba32Float)]).unwrap();
        target.set_shader(cache.get_or_compile("copy", &source).unwrap());
        target.set_shader_input("SrcTex0", "a".into());
        target.set_shader_input("DestTex0", "b".into());
        target
    }

    #[test]
    fn copies_every_texel() {
        if !can_run_headless() {
            eprintln!("No adapter available; skipping copy program test.");
            return;
        }
        let mut pool = TexturePool::new();
        let mut cache = ProgramCache::new();
        let target = setup(&mut pool, &mut cache);
        let a = pool.texture_mut(&"a".into()).unwrap();
        a.write_texel(2, 1, [0.25, 0.5, 0.75, 1.0]);
        a.write_texel(0, 0, [-1.0, 2.0, 3.5, 0.0]);

        RenderDevice::new().execute_program(&target, &mut pool).unwrap();
        let b = pool.texture(&"b".into()).unwrap();
        assert_eq!(b.read_texel(2, 1), [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(b.read_texel(0, 0), [-1.0, 2.0, 3.5, 0.0]);
        assert_eq!(b.bytes(), pool.texture(&"a".into()).unwrap().bytes());
        let color = target.color_texture().unwrap();
        assert!(pool.texture(color).unwrap().bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn missing_destination_leaves_pool_untouched() {
        let mut pool = TexturePool::new();
        let mut cache = ProgramCache::new();
        let mut target = setup(&mut pool, &mut cache);
        target.set_shader_input("DestTex0", "gone".into());
        pool.texture_mut(&"a".into()).unwrap().fill(LinearRgba::WHITE);
        assert!(RenderDevice::new().execute_program(&target, &mut pool).is_err());
        assert_eq!(pool.texture(&"b".into()).unwrap().read_texel(0, 0), [0.0; 4]);
    }

    #[test]
    fn destination_format_must_match_declaration() {
        let mut pool = TexturePool::new();
        let mut cache = ProgramCache::new();
        let mut target = setup(&mut pool, &mut cache);
        pool.create(TextureDesc::new("ldr", TextureFormat::Rgba8Unorm, [3, 2]))
            .unwrap();
        target.set_shader_input("DestTex0", "ldr".into());
        let err = RenderDevice::new()
            .execute_program(&target, &mut pool)
            .unwrap_err();
        assert!(err.to_string().contains("DestTex0 writes Rgba32Float"));
    }

    #[test]
    fn destination_size_must_match_target() {
        let mut pool = TexturePool::new();
        let mut cache = ProgramCache::new();
        let target = setup(&mut pool, &mut cache);
        pool.texture_mut(&"b".into()).unwrap().resize([4, 4]);
        let err = RenderDevice::new()
            .execute_program(&target, &mut pool)
            .unwrap_err();
        assert!(err.to_string().contains("'b' is [4, 4]"));
    }

    #[test]
    fn software_device_cannot_run_programs() {
        let mut pool = TexturePool::new();
        let mut cache = ProgramCache::new();
        let target = setup(&mut pool, &mut cache);
        let err = RenderDevice::software()
            .execute_program(&target, &mut pool)
            .unwrap_err();
        assert!(err.to_string().contains("no GPU available"));
    }

    #[test]
    fn target_without_program_is_an_error() {
        let mut pool = TexturePool::new();
        let mut target = RenderTarget::new("t");
        target.prepare_buffer(&mut pool, [1, 1]).unwrap();
        assert!(RenderDevice::new().execute_program(&target, &mut pool).is_err());
    }
}
