//! Generic camera sensor: renders the world from a tracked pose into an
//! owned buffer and returns the image as a [`SensorFrame`].

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use glam::{Mat4, Vec3};
use log::trace;

use super::camera::{Lens, RenderCamera};
use crate::renderer::device::RenderDevice;
use crate::renderer::texture_pool::{Texture, TextureDesc};
use crate::renderer::types::{TextureFormat, is_valid_resolution};
use crate::scene::graph::NodeId;
use crate::scene::world::World;

/// Captured image, row-major `(height, width, channels)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorFrame {
    height: usize,
    width: usize,
    /// Values in `[0, 1]` when true, raw `0..=255` otherwise.
    normalized: bool,
    data: Vec<f32>,
}

impl SensorFrame {
    pub const CHANNELS: usize = 3;

    fn from_rgba8(texture: &Texture, normalized: bool) -> Self {
        let scale = if normalized { 1.0 / 255.0 } else { 1.0 };
        let data = texture
            .bytes()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .map(|v| v as f32 * scale)
            .collect();
        Self {
            height: texture.height() as usize,
            width: texture.width() as usize,
            normalized,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, Self::CHANNELS)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let o = (y * self.width + x) * Self::CHANNELS;
        [self.data[o], self.data[o + 1], self.data[o + 2]]
    }

    /// Pixel as 8-bit RGB regardless of normalization.
    pub fn pixel_rgb8(&self, x: usize, y: usize) -> [u8; 3] {
        let scale = if self.normalized { 255.0 } else { 1.0 };
        self.pixel(x, y).map(|v| (v * scale).round().clamp(0.0, 255.0) as u8)
    }

    pub fn to_rgb8(&self) -> image::RgbImage {
        image::RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Rgb(self.pixel_rgb8(x as usize, y as usize))
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_rgb8()
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to save sensor frame to {}", path.display()))
    }
}

/// A camera-type sensor driven by the simulation loop.
pub trait Sensor {
    /// Attach the sensor to `parent` at a local pose.
    fn track(
        &mut self,
        world: Option<&mut World>,
        parent: Option<NodeId>,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<()>;

    /// Render one frame of the current world.
    fn capture(&mut self, world: Option<&mut World>, to_float: bool) -> Result<SensorFrame>;
}

pub struct BaseCamera {
    camera: RenderCamera,
    buffer: Texture,
    device: RenderDevice,
}

impl BaseCamera {
    pub fn new(name: &str, width: u32, height: u32, lens: Lens) -> Result<Self> {
        if !is_valid_resolution([width, height]) {
            bail!("camera '{name}' needs a non-zero buffer, got {width}x{height}");
        }
        Ok(Self {
            camera: RenderCamera::new(lens),
            buffer: Texture::new(TextureDesc::new(
                format!("{name}.buffer"),
                TextureFormat::Rgba8Unorm,
                [width, height],
            )),
            device: RenderDevice::new(),
        })
    }

    pub fn camera(&self) -> &RenderCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut RenderCamera {
        &mut self.camera
    }

    pub fn buffer(&self) -> &Texture {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn track(
        &mut self,
        world: Option<&World>,
        parent: Option<NodeId>,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<()> {
        if let (Some(world), Some(parent)) = (world, parent) {
            if !world.graph().contains(parent) {
                return Err(anyhow!("cannot track node {parent:?}: it is not in the scene"));
            }
        }
        self.camera.reparent(parent, position, hpr);
        Ok(())
    }

    /// Render the world (or only the clear color without one) and read back
    /// the buffer.
    pub fn capture(&mut self, world: Option<&World>, to_float: bool) -> Result<SensorFrame> {
        let clear = self.camera.clear_color();
        match world {
            Some(world) => {
                let graph = world.graph();
                let view = self.camera.view_matrix(graph)?;
                let aspect = self.width() as f32 / self.height() as f32;
                let projection = self.camera.lens.projection(aspect);
                let draws = self.camera.collect_draws(graph);
                self.device
                    .draw(&mut self.buffer, clear, view, projection, &draws);
            }
            None => self
                .device
                .draw(&mut self.buffer, clear, Mat4::IDENTITY, Mat4::IDENTITY, &[]),
        }
        trace!("captured {}x{} frame", self.width(), self.height());
        Ok(SensorFrame::from_rgba8(&self.buffer, to_float))
    }
}

impl Sensor for BaseCamera {
    fn track(
        &mut self,
        world: Option<&mut World>,
        parent: Option<NodeId>,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<()> {
        BaseCamera::track(self, world.as_deref(), parent, position, hpr)
    }

    fn capture(&mut self, world: Option<&mut World>, to_float: bool) -> Result<SensorFrame> {
        BaseCamera::capture(self, world.as_deref(), to_float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::types::LinearRgba;
    use crate::scene::mesh::Mesh;

    #[test]
    fn frame_shape_and_normalization() {
        let mut cam = BaseCamera::new("cam", 8, 4, Lens::default()).unwrap();
        cam.camera_mut().set_clear_color(LinearRgba::from_rgb8([255, 51, 0]));
        let raw = cam.capture(None, false).unwrap();
        assert_eq!(raw.shape(), (4, 8, 3));
        assert_eq!(raw.pixel(7, 3), [255.0, 51.0, 0.0]);

        let norm = cam.capture(None, true).unwrap();
        assert!(norm.is_normalized());
        assert!((norm.pixel(0, 0)[1] - 0.2).abs() < 1e-6);
        assert_eq!(norm.pixel_rgb8(0, 0), [255, 51, 0]);
    }

    #[test]
    fn frame_png_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cam = BaseCamera::new("cam", 3, 2, Lens::default()).unwrap();
        cam.camera_mut().set_clear_color(LinearRgba::from_rgb8([0, 10, 0]));
        let frame = cam.capture(None, true).unwrap();
        let path = dir.path().join("frame.png");
        frame.save_png(&path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [0, 10, 0]);
    }

    #[test]
    fn shaded_object_is_visible_in_front_of_camera() {
        let mut world = World::new();
        world
            .spawn(
                "box",
                Mesh::cuboid(Vec3::splat(2.0), LinearRgba::WHITE),
                Vec3::new(0.0, 10.0, 0.0),
                Vec3::ZERO,
            )
            .unwrap();
        let mut cam = BaseCamera::new("cam", 16, 16, Lens::default()).unwrap();
        let frame = cam.capture(Some(&world), false).unwrap();
        assert_ne!(frame.pixel_rgb8(8, 8), [0, 0, 0]);
        assert_eq!(frame.pixel_rgb8(0, 0), [0, 0, 0]);
    }

    #[test]
    fn tracking_a_missing_node_fails() {
        let mut world = World::new();
        let root = world.graph().root();
        let node = world.graph_mut().attach_new_node(root, "n").unwrap();
        world.graph_mut().remove_node(node).unwrap();
        let mut cam = BaseCamera::new("cam", 2, 2, Lens::default()).unwrap();
        assert!(cam.track(Some(&world), Some(node), Vec3::ZERO, Vec3::ZERO).is_err());
    }
}
