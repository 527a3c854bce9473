//! Core type definitions for the renderer module.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of a texture (or other GPU-side resource) registered with a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(Arc<str>);

impl ResourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceName {
    fn from(s: String) -> Self {
        ResourceName(Arc::from(s.as_str()))
    }
}

impl From<&str> for ResourceName {
    fn from(s: &str) -> Self {
        ResourceName(Arc::from(s))
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Texture dimensionality. Only `Tex2D` has a dedicated texel access path in
/// generated programs; the rest are accepted and treated as 2-D.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureKind {
    #[default]
    Tex2D,
    Tex2DArray,
    Tex3D,
    Cube,
}

/// Texel storage format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::R32Float => 4,
        }
    }

    /// WGSL storage texel format name.
    pub fn wgsl_storage_format(self) -> &'static str {
        match self {
            TextureFormat::Rgba8Unorm => "rgba8unorm",
            TextureFormat::Rgba16Float => "rgba16float",
            TextureFormat::Rgba32Float => "rgba32float",
            TextureFormat::R32Float => "r32float",
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }

    pub fn from_naga_storage(format: naga::StorageFormat) -> Option<Self> {
        match format {
            naga::StorageFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
            naga::StorageFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
            naga::StorageFormat::Rgba32Float => Some(TextureFormat::Rgba32Float),
            naga::StorageFormat::R32Float => Some(TextureFormat::R32Float),
            _ => None,
        }
    }
}

/// Linear RGBA color with components in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearRgba(pub [f32; 4]);

impl LinearRgba {
    pub const BLACK: LinearRgba = LinearRgba([0.0, 0.0, 0.0, 1.0]);
    pub const WHITE: LinearRgba = LinearRgba([1.0, 1.0, 1.0, 1.0]);
    pub const TRANSPARENT: LinearRgba = LinearRgba([0.0, 0.0, 0.0, 0.0]);

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        LinearRgba([r, g, b, a])
    }

    /// Opaque color from 8-bit RGB components.
    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        LinearRgba([
            rgb[0] as f32 / 255.0,
            rgb[1] as f32 / 255.0,
            rgb[2] as f32 / 255.0,
            1.0,
        ])
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        self.0.map(unorm_to_u8)
    }

    pub fn lerp(self, other: LinearRgba, t: f32) -> LinearRgba {
        let t = t.clamp(0.0, 1.0);
        LinearRgba(std::array::from_fn(|i| self.0[i] + (other.0[i] - self.0[i]) * t))
    }

    pub fn modulate(self, other: LinearRgba) -> LinearRgba {
        LinearRgba(std::array::from_fn(|i| self.0[i] * other.0[i]))
    }
}

pub(crate) fn unorm_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Check a `[width, height]` pair describes a drawable surface.
pub fn is_valid_resolution(resolution: [u32; 2]) -> bool {
    resolution[0] > 0 && resolution[1] > 0
}
