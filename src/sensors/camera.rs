//! Render camera: lens, placement in the scene, and the state overrides it
//! applies to everything it draws.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use glam::{Mat4, Vec3};

use crate::renderer::raster::DrawItem;
use crate::renderer::render_state::RenderState;
use crate::renderer::types::LinearRgba;
use crate::scene::graph::{NodeId, SceneGraph, Transform};

/// Perspective lens. `fov_deg` is the vertical field of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lens {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            fov_deg: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Lens {
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), aspect, self.near, self.far)
    }
}

#[derive(Clone, Debug)]
pub struct RenderCamera {
    pub lens: Lens,
    parent: Option<NodeId>,
    transform: Transform,
    clear_color: LinearRgba,
    initial_state: RenderState,
    tag_state_key: Option<String>,
    tag_states: BTreeMap<String, RenderState>,
}

impl RenderCamera {
    pub fn new(lens: Lens) -> Self {
        Self {
            lens,
            parent: None,
            transform: Transform::default(),
            clear_color: LinearRgba::BLACK,
            initial_state: RenderState::empty(),
            tag_state_key: None,
            tag_states: BTreeMap::new(),
        }
    }

    /// Attach under `parent` at a local offset. `None` places the camera in
    /// world space.
    pub fn reparent(&mut self, parent: Option<NodeId>, position: Vec3, hpr: Vec3) {
        self.parent = parent;
        self.transform = Transform::from_position_hpr(position, hpr);
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn world_matrix(&self, graph: &SceneGraph) -> Result<Mat4> {
        let parent = match self.parent {
            Some(parent) => graph
                .world_matrix(parent)
                .ok_or_else(|| anyhow!("camera parent {parent:?} is no longer in the scene"))?,
            None => Mat4::IDENTITY,
        };
        Ok(parent * self.transform.matrix())
    }

    /// View matrix looking down the camera's local +Y with +Z up.
    pub fn view_matrix(&self, graph: &SceneGraph) -> Result<Mat4> {
        let world = self.world_matrix(graph)?;
        let eye = world.transform_point3(Vec3::ZERO);
        let forward = world.transform_vector3(Vec3::Y).normalize_or_zero();
        let up = world.transform_vector3(Vec3::Z).normalize_or_zero();
        Ok(Mat4::look_to_rh(eye, forward, up))
    }

    pub fn clear_color(&self) -> LinearRgba {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: LinearRgba) {
        self.clear_color = color;
    }

    pub fn tag_state_key(&self) -> Option<&str> {
        self.tag_state_key.as_deref()
    }

    pub fn set_tag_state_key(&mut self, key: impl Into<String>) {
        self.tag_state_key = Some(key.into());
    }

    pub fn initial_state(&self) -> &RenderState {
        &self.initial_state
    }

    /// State composed over every node this camera draws.
    pub fn set_initial_state(&mut self, state: RenderState) {
        self.initial_state = state;
    }

    /// State for nodes whose tag under the tag-state key equals `value`.
    pub fn set_tag_state(&mut self, value: impl Into<String>, state: RenderState) {
        self.tag_states.insert(value.into(), state);
    }

    pub fn tag_state(&self, value: &str) -> Option<&RenderState> {
        self.tag_states.get(value)
    }

    pub fn tag_states(&self) -> &BTreeMap<String, RenderState> {
        &self.tag_states
    }

    pub fn clear_tag_states(&mut self) {
        self.tag_states.clear();
    }

    /// Drop every override: no tag key, no tag states, empty initial state.
    pub fn reset_effect(&mut self) {
        self.tag_state_key = None;
        self.tag_states.clear();
        self.initial_state = RenderState::empty();
    }

    /// Override applied to `node`: the tag state selected by the nearest
    /// tagged ancestor, else the initial state.
    pub fn override_for(&self, graph: &SceneGraph, node: NodeId) -> RenderState {
        self.tag_state_key
            .as_deref()
            .and_then(|key| graph.net_tag(node, key))
            .and_then(|value| self.tag_states.get(value))
            .copied()
            .unwrap_or(self.initial_state)
    }

    /// Resolved draws for every visible geometry node.
    pub fn collect_draws<'g>(&self, graph: &'g SceneGraph) -> Vec<DrawItem<'g>> {
        graph
            .geometry_nodes()
            .into_iter()
            .filter_map(|id| {
                let node = graph.node(id)?;
                let mesh = node.mesh.as_ref()?;
                let world = graph.world_matrix(id)?;
                let state = self.override_for(graph, id).compose(&graph.net_state(id));
                Some(DrawItem {
                    world,
                    mesh,
                    state: state.resolve(),
                })
            })
            .collect()
    }
}
