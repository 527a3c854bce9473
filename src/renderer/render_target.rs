//! Off-screen render targets owned by stages.

use std::sync::Arc;

use anyhow::{Result, bail};

use super::program::CompiledProgram;
use super::texture_pool::{TextureDesc, TexturePool};
use super::types::{ResourceName, TextureFormat, is_valid_resolution};

/// A full-screen pass target: a color attachment, the textures bound as
/// shader inputs and the program drawn into it.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    name: String,
    size: [u32; 2],
    color: Option<ResourceName>,
    inputs: Vec<(String, ResourceName)>,
    program: Option<Arc<CompiledProgram>>,
}

impl RenderTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: [0, 0],
            color: None,
            inputs: Vec::new(),
            program: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Allocate the color attachment at `size`.
    pub fn prepare_buffer(&mut self, pool: &mut TexturePool, size: [u32; 2]) -> Result<()> {
        if !is_valid_resolution(size) {
            bail!("render target '{}' cannot use size {size:?}", self.name);
        }
        let color = ResourceName::from(format!("{}.color", self.name));
        match pool.get_mut(&color) {
            Some(existing) => existing.resize(size),
            None => {
                pool.create(TextureDesc::new(color.clone(), TextureFormat::Rgba8Unorm, size))?;
            }
        }
        self.color = Some(color);
        self.size = size;
        Ok(())
    }

    pub fn set_dimensions(&mut self, pool: &mut TexturePool, size: [u32; 2]) -> Result<()> {
        let Some(color) = &self.color else {
            bail!("render target '{}' has no buffer yet", self.name);
        };
        pool.texture_mut(color)?.resize(size);
        self.size = size;
        Ok(())
    }

    pub fn color_texture(&self) -> Option<&ResourceName> {
        self.color.as_ref()
    }

    /// Bind `texture` to the shader variable `name`, replacing an earlier
    /// binding of the same name.
    pub fn set_shader_input(&mut self, name: impl Into<String>, texture: ResourceName) {
        let name = name.into();
        match self.inputs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, bound)) => *bound = texture,
            None => self.inputs.push((name, texture)),
        }
    }

    pub fn shader_input(&self, name: &str) -> Option<&ResourceName> {
        self.inputs
            .iter()
            .find_map(|(n, texture)| (n == name).then_some(texture))
    }

    /// Inputs in binding order.
    pub fn shader_inputs(&self) -> &[(String, ResourceName)] {
        &self.inputs
    }

    pub fn set_shader(&mut self, program: Arc<CompiledProgram>) {
        self.program = Some(program);
    }

    pub fn shader(&self) -> Option<&Arc<CompiledProgram>> {
        self.program.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_and_resize_color_buffer() {
        let mut pool = TexturePool::new();
        let mut target = RenderTarget::new("Stage:Target");
        assert!(target.set_dimensions(&mut pool, [4, 4]).is_err());

        target.prepare_buffer(&mut pool, [8, 4]).unwrap();
        let color = target.color_texture().unwrap().clone();
        assert_eq!(pool.texture(&color).unwrap().size(), [8, 4]);

        target.set_dimensions(&mut pool, [2, 2]).unwrap();
        assert_eq!(pool.texture(&color).unwrap().size(), [2, 2]);
        assert_eq!(target.size(), [2, 2]);
    }

    #[test]
    fn rebinding_an_input_keeps_its_position() {
        let mut target = RenderTarget::new("t");
        target.set_shader_input("SrcTex0", "a".into());
        target.set_shader_input("DestTex0", "b".into());
        target.set_shader_input("SrcTex0", "c".into());
        assert_eq!(target.shader_inputs()[0].1.as_str(), "c");
        assert_eq!(target.shader_input("DestTex0").map(|t| t.as_str()), Some("b"));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut pool = TexturePool::new();
        assert!(RenderTarget::new("t").prepare_buffer(&mut pool, [0, 3]).is_err());
    }
}
