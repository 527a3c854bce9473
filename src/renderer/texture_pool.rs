//! CPU-resident textures addressed by `ResourceName`.
//!
//! Texels are kept tightly packed in their declared format so that copies
//! between textures behave like GPU copies: a texel written to an `Rgba8Unorm`
//! texture is quantized, a texel written to `Rgba16Float` goes through `f16`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use half::f16;

use super::types::{
    LinearRgba, ResourceName, TextureFormat, TextureKind, is_valid_resolution, unorm_to_u8,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: ResourceName,
    pub kind: TextureKind,
    pub format: TextureFormat,
    /// `[width, height]`
    pub size: [u32; 2],
}

impl TextureDesc {
    pub fn new(name: impl Into<ResourceName>, format: TextureFormat, size: [u32; 2]) -> Self {
        Self {
            name: name.into(),
            kind: TextureKind::Tex2D,
            format,
            size,
        }
    }

    pub fn with_kind(mut self, kind: TextureKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Texture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl Texture {
    pub fn new(desc: TextureDesc) -> Self {
        let len = byte_len(desc.format, desc.size);
        Self {
            desc,
            data: vec![0; len],
        }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn size(&self) -> [u32; 2] {
        self.desc.size
    }

    pub fn width(&self) -> u32 {
        self.desc.size[0]
    }

    pub fn height(&self) -> u32 {
        self.desc.size[1]
    }

    pub fn is_empty(&self) -> bool {
        !is_valid_resolution(self.desc.size)
    }

    /// Raw texel bytes, row-major, no row padding.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row without padding.
    pub fn row_bytes(&self) -> u32 {
        self.desc.size[0] * self.desc.format.bytes_per_texel() as u32
    }

    /// Replace every texel with `bytes`, laid out as [`Texture::bytes`].
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.data.len() {
            bail!(
                "texture '{}' holds {} bytes, got {}",
                self.desc.name,
                self.data.len(),
                bytes.len()
            );
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Reallocate storage for a new size. Contents are cleared.
    pub fn resize(&mut self, size: [u32; 2]) {
        if self.desc.size == size {
            return;
        }
        self.desc.size = size;
        self.data = vec![0; byte_len(self.desc.format, size)];
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.desc.size[0] && y < self.desc.size[1]
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.desc.size[0] as usize + x as usize) * self.desc.format.bytes_per_texel()
    }

    /// Read one texel as RGBA floats. Single-channel formats read as `(r, 0, 0, 1)`.
    pub fn read_texel(&self, x: u32, y: u32) -> [f32; 4] {
        let o = self.offset(x, y);
        let bytes = &self.data[o..o + self.desc.format.bytes_per_texel()];
        match self.desc.format {
            TextureFormat::Rgba8Unorm => std::array::from_fn(|i| bytes[i] as f32 / 255.0),
            TextureFormat::Rgba16Float => std::array::from_fn(|i| {
                f16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]).to_f32()
            }),
            TextureFormat::Rgba32Float => bytemuck::pod_read_unaligned::<[f32; 4]>(bytes),
            TextureFormat::R32Float => [bytemuck::pod_read_unaligned::<f32>(bytes), 0.0, 0.0, 1.0],
        }
    }

    /// Write one texel, converting to the storage format.
    pub fn write_texel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        let o = self.offset(x, y);
        let format = self.desc.format;
        let dst = &mut self.data[o..o + format.bytes_per_texel()];
        match format {
            TextureFormat::Rgba8Unorm => {
                for (d, v) in dst.iter_mut().zip(value) {
                    *d = unorm_to_u8(v);
                }
            }
            TextureFormat::Rgba16Float => {
                for (chunk, v) in dst.chunks_exact_mut(2).zip(value) {
                    chunk.copy_from_slice(&f16::from_f32(v).to_le_bytes());
                }
            }
            TextureFormat::Rgba32Float => dst.copy_from_slice(bytemuck::bytes_of(&value)),
            TextureFormat::R32Float => dst.copy_from_slice(bytemuck::bytes_of(&value[0])),
        }
    }

    pub fn fill(&mut self, color: LinearRgba) {
        let [w, h] = self.desc.size;
        for y in 0..h {
            for x in 0..w {
                self.write_texel(x, y, color.0);
            }
        }
    }

    /// Convert to an 8-bit RGBA image.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let [w, h] = self.desc.size;
        image::RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba(LinearRgba(self.read_texel(x, y)).to_rgba8())
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to save texture '{}' to {}", self.desc.name, path.display()))
    }
}

fn byte_len(format: TextureFormat, size: [u32; 2]) -> usize {
    size[0] as usize * size[1] as usize * format.bytes_per_texel()
}

/// Owner of every named texture a stage graph or camera renders into.
#[derive(Default, Debug)]
pub struct TexturePool {
    textures: HashMap<ResourceName, Texture>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture. Re-declaring an existing name with an identical
    /// description keeps the existing contents.
    pub fn create(&mut self, desc: TextureDesc) -> Result<&mut Texture> {
        if let Some(existing) = self.textures.get(&desc.name) {
            if existing.desc != desc {
                bail!(
                    "texture '{}' has conflicting declarations: first {:?}, later {:?}",
                    desc.name,
                    existing.desc,
                    desc
                );
            }
        } else {
            self.textures.insert(desc.name.clone(), Texture::new(desc.clone()));
        }
        self.textures
            .get_mut(&desc.name)
            .ok_or_else(|| anyhow!("texture '{}' vanished after insert", desc.name))
    }

    pub fn remove(&mut self, name: &ResourceName) -> Option<Texture> {
        self.textures.remove(name)
    }

    pub fn contains(&self, name: &ResourceName) -> bool {
        self.textures.contains_key(name)
    }

    pub fn get(&self, name: &ResourceName) -> Option<&Texture> {
        self.textures.get(name)
    }

    pub fn get_mut(&mut self, name: &ResourceName) -> Option<&mut Texture> {
        self.textures.get_mut(name)
    }

    pub fn texture(&self, name: &ResourceName) -> Result<&Texture> {
        self.get(name)
            .ok_or_else(|| anyhow!("texture '{name}' is not registered"))
    }

    pub fn texture_mut(&mut self, name: &ResourceName) -> Result<&mut Texture> {
        self.get_mut(name)
            .ok_or_else(|| anyhow!("texture '{name}' is not registered"))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_float_texels_keep_f16_precision() {
        let mut tex = Texture::new(TextureDesc::new("hdr", TextureFormat::Rgba16Float, [2, 2]));
        tex.write_texel(1, 1, [0.5, 2.0, -1.25, 1.0]);
        assert_eq!(tex.read_texel(1, 1), [0.5, 2.0, -1.25, 1.0]);
        assert_eq!(tex.read_texel(0, 0), [0.0; 4]);
    }

    #[test]
    fn unorm_texels_are_quantized_and_clamped() {
        let mut tex = Texture::new(TextureDesc::new("ldr", TextureFormat::Rgba8Unorm, [1, 1]));
        tex.write_texel(0, 0, [1.5, 0.5, -0.2, 1.0]);
        assert_eq!(tex.bytes(), &[255, 128, 0, 255]);
    }

    #[test]
    fn r32_float_reads_back_single_channel() {
        let mut tex = Texture::new(TextureDesc::new("depth", TextureFormat::R32Float, [3, 1]));
        tex.write_texel(2, 0, [0.75, 9.0, 9.0, 9.0]);
        assert_eq!(tex.read_texel(2, 0), [0.75, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn resize_reallocates_storage() {
        let mut tex = Texture::new(TextureDesc::new("t", TextureFormat::Rgba32Float, [2, 2]));
        tex.resize([4, 3]);
        assert_eq!(tex.size(), [4, 3]);
        assert_eq!(tex.bytes().len(), 4 * 3 * 16);
    }

    #[test]
    fn write_bytes_requires_exact_length() {
        let mut tex = Texture::new(TextureDesc::new("t", TextureFormat::Rgba8Unorm, [2, 1]));
        assert_eq!(tex.row_bytes(), 8);
        assert!(tex.write_bytes(&[1; 7]).is_err());
        tex.write_bytes(&[0, 0, 0, 0, 10, 20, 30, 255]).unwrap();
        assert_eq!(tex.read_texel(1, 0)[3], 1.0);
        assert_eq!(LinearRgba(tex.read_texel(1, 0)).to_rgba8(), [10, 20, 30, 255]);
    }

    #[test]
    fn conflicting_declaration_is_rejected() {
        let mut pool = TexturePool::new();
        pool.create(TextureDesc::new("a", TextureFormat::Rgba8Unorm, [4, 4]))
            .unwrap();
        assert!(
            pool.create(TextureDesc::new("a", TextureFormat::Rgba8Unorm, [4, 4]))
                .is_ok()
        );
        let err = pool
            .create(TextureDesc::new("a", TextureFormat::Rgba16Float, [4, 4]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("conflicting declarations"));
    }

    #[test]
    fn save_png_writes_quantized_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let mut tex = Texture::new(TextureDesc::new("pipe", TextureFormat::Rgba16Float, [2, 1]));
        tex.write_texel(1, 0, [1.0, 0.5, 0.0, 1.0]);
        let path = dir.path().join("pipe.png");
        tex.save_png(&path).unwrap();
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(1, 0).0, [255, 128, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
