//! Compiled programs and the source-keyed program cache.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use super::types::{TextureFormat, TextureKind};
use super::validation::compile_wgsl;

/// How a program accesses a bound texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureAccess {
    Sampled,
    StorageWrite { format: TextureFormat },
}

/// A texture binding reflected from a compiled module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: TextureKind,
    pub access: TextureAccess,
}

/// A validated WGSL module together with its reflected texture interface.
#[derive(Debug)]
pub struct CompiledProgram {
    label: String,
    source: String,
    module: naga::Module,
    info: naga::valid::ModuleInfo,
    textures: Vec<TextureBinding>,
}

impl CompiledProgram {
    pub fn compile(label: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let source = source.into();
        let (module, info) =
            compile_wgsl(&source).with_context(|| format!("{label} generated invalid WGSL"))?;
        let textures = reflect_textures(&module);
        Ok(Self {
            label,
            source,
            module,
            info,
            textures,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn module(&self) -> &naga::Module {
        &self.module
    }

    pub fn info(&self) -> &naga::valid::ModuleInfo {
        &self.info
    }

    /// Texture bindings ordered by `(group, binding)`.
    pub fn textures(&self) -> &[TextureBinding] {
        &self.textures
    }

    pub fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn has_entry_point(&self, name: &str, stage: naga::ShaderStage) -> bool {
        self.module
            .entry_points
            .iter()
            .any(|ep| ep.name == name && ep.stage == stage)
    }
}

fn reflect_textures(module: &naga::Module) -> Vec<TextureBinding> {
    let mut out: Vec<TextureBinding> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            let name = var.name.clone()?;
            let naga::TypeInner::Image {
                dim,
                arrayed,
                class,
            } = &module.types[var.ty].inner
            else {
                return None;
            };
            let kind = match (dim, arrayed) {
                (naga::ImageDimension::D2, false) => TextureKind::Tex2D,
                (naga::ImageDimension::D2, true) => TextureKind::Tex2DArray,
                (naga::ImageDimension::D3, _) => TextureKind::Tex3D,
                (naga::ImageDimension::Cube, _) => TextureKind::Cube,
                (naga::ImageDimension::D1, _) => return None,
            };
            let access = match class {
                naga::ImageClass::Sampled { .. } => TextureAccess::Sampled,
                naga::ImageClass::Storage { format, .. } => TextureAccess::StorageWrite {
                    format: TextureFormat::from_naga_storage(*format)?,
                },
                naga::ImageClass::Depth { .. } => return None,
            };
            Some(TextureBinding {
                name,
                group: binding.group,
                binding: binding.binding,
                kind,
                access,
            })
        })
        .collect();
    out.sort_by_key(|t| (t.group, t.binding));
    out
}

/// Compiled programs keyed by their exact source text.
#[derive(Default, Debug)]
pub struct ProgramCache {
    programs: HashMap<String, Arc<CompiledProgram>>,
    compilations: usize,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached program for `source`, compiling it on first use.
    pub fn get_or_compile(&mut self, label: &str, source: &str) -> Result<Arc<CompiledProgram>> {
        if let Some(program) = self.programs.get(source) {
            debug!("reusing compiled program for {label}");
            return Ok(program.clone());
        }
        let program = Arc::new(CompiledProgram::compile(label, source)?);
        self.compilations += 1;
        debug!(
            "compiled {label} ({} texture bindings)",
            program.textures().len()
        );
        self.programs.insert(source.to_string(), program.clone());
        Ok(program)
    }

    /// Number of actual compilations performed (cache misses).
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }
}
