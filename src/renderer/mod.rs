//! Render pipeline plumbing: textures, WGSL program synthesis and compilation,
//! GPU execution, and the stage graph.
//!
//! This module is organized into several submodules:
//! - `types`: Core type definitions (resource names, texture kinds and formats, colors)
//! - `texture_pool`: CPU-resident textures addressed by name
//! - `validation`: WGSL validation using naga
//! - `wgsl_templates`: Generated WGSL modules (fullscreen pass, pipe copies)
//! - `program`: Compiled programs, their reflected bindings, and the program cache
//! - `render_state`: Render-state overrides and their composition
//! - `raster`: Depth-tested triangle rasterization with near-plane clipping
//! - `gpu`, `fullscreen_pass`: Headless wgpu device and full-screen program runs
//! - `device`: Executes programs and draws
//! - `stage`, `stages`, `stage_manager`: The ordered stage graph
//!
//! The main entry points are:
//! - `StageManager`: Owns the stages, pipes and `Previous::` copies
//! - `UpdatePreviousPipesStage`: Copies pipes into their previous-frame counterparts

pub mod device;
pub mod fullscreen_pass;
pub mod gpu;
pub mod program;
pub mod raster;
pub mod render_state;
pub mod render_target;
pub mod stage;
pub mod stage_manager;
pub mod stages;
pub mod texture_pool;
pub mod types;
pub mod validation;
pub mod wgsl_templates;

pub use device::RenderDevice;
pub use gpu::{GpuContext, can_run_headless};
pub use program::{CompiledProgram, ProgramCache, TextureAccess, TextureBinding};
pub use render_state::{
    ColorAttrib, LightAttrib, RenderState, ResolvedState, ShaderAttrib, TextureAttrib,
};
pub use render_target::RenderTarget;
pub use stage::{PipeDesc, RenderStage, StageContext, StageError};
pub use stage_manager::StageManager;
pub use stages::{Transfer, UpdatePreviousPipesStage};
pub use texture_pool::{Texture, TextureDesc, TexturePool};
pub use types::{LinearRgba, ResourceName, TextureFormat, TextureKind};
pub use validation::{validate_wgsl, validate_wgsl_with_context};
