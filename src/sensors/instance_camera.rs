use anyhow::Result;
use glam::Vec3;

use super::base_camera::{BaseCamera, Sensor, SensorFrame};
use super::camera::{Lens, RenderCamera};
use super::tag_state::TagStateRenderer;
use crate::config::{InstanceCameraConfig, PipelineConfig};
use crate::renderer::types::LinearRgba;
use crate::scene::graph::NodeId;
use crate::scene::world::World;

/// Camera producing instance-segmentation images: every live object is
/// painted with its identification color over a black background.
///
/// The tag states are rebuilt from the world before every `track` and
/// `capture`, so spawns and despawns between frames are always reflected.
pub struct InstanceCamera {
    base: BaseCamera,
    tag_states: TagStateRenderer,
}

impl InstanceCamera {
    pub fn new(config: &InstanceCameraConfig) -> Result<Self> {
        let lens = Lens {
            fov_deg: config.fov_deg,
            near: config.near,
            far: config.far,
        };
        let mut base = BaseCamera::new("instance_camera", config.width, config.height, lens)?;
        base.camera_mut().set_clear_color(LinearRgba::BLACK);
        Ok(Self {
            base,
            tag_states: TagStateRenderer::new(config.unmapped_objects),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(&config.instance_camera)
    }

    pub fn camera(&self) -> &RenderCamera {
        self.base.camera()
    }

    pub fn base(&self) -> &BaseCamera {
        &self.base
    }

    pub fn track(
        &mut self,
        mut world: Option<&mut World>,
        parent: Option<NodeId>,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<()> {
        self.tag_states
            .configure(self.base.camera_mut(), world.as_deref_mut())?;
        self.base.track(world.as_deref(), parent, position, hpr)
    }

    /// Configure from the current world, then render. A consistency failure
    /// produces no frame.
    pub fn capture(&mut self, mut world: Option<&mut World>, to_float: bool) -> Result<SensorFrame> {
        self.tag_states
            .configure(self.base.camera_mut(), world.as_deref_mut())?;
        self.base.capture(world.as_deref(), to_float)
    }
}

impl Sensor for InstanceCamera {
    fn track(
        &mut self,
        world: Option<&mut World>,
        parent: Option<NodeId>,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<()> {
        InstanceCamera::track(self, world, parent, position, hpr)
    }

    fn capture(&mut self, world: Option<&mut World>, to_float: bool) -> Result<SensorFrame> {
        InstanceCamera::capture(self, world, to_float)
    }
}
