//! Per-object flat-color overrides for instance segmentation.
//!
//! [`TagStateRenderer::configure`] tags every live object's origin node with
//! its id and installs, on the camera, one override per id that paints the
//! object with its identification color. Everything else is painted with the
//! baseline: flat opaque black with lighting, texturing and shading disabled.
//!
//! The color table must never describe objects that are gone. A stale entry
//! is refused before anything on the camera or in the scene is touched.

use std::collections::BTreeSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::camera::RenderCamera;
use crate::renderer::render_state::{LightAttrib, RenderState, ShaderAttrib, TextureAttrib};
use crate::renderer::types::LinearRgba;
use crate::scene::world::{ObjectId, World};

/// Tag key the instance camera selects its overrides by.
pub const CAMERA_TAG_STATE_KEY: &str = "id";

/// Priority of every override, above the scene's own node states.
pub const OVERRIDE_PRIORITY: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagStateError {
    #[error("id color map has entries for objects that are not live: {ids:?}")]
    StaleColorMapping { ids: Vec<ObjectId> },

    #[error("live objects have no id color: {ids:?}")]
    UnmappedObjects { ids: Vec<ObjectId> },

    #[error("object '{id}' has no transform node in the scene")]
    MissingOrigin { id: ObjectId },
}

/// What to do with live objects that have no entry in the color table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedObjectPolicy {
    /// Render them with the baseline black, logging a warning.
    #[default]
    RenderBaseline,
    /// Fail the configuration.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TagStateRenderer {
    policy: UnmappedObjectPolicy,
}

impl TagStateRenderer {
    pub fn new(policy: UnmappedObjectPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnmappedObjectPolicy {
        self.policy
    }

    /// Override for untagged geometry.
    pub fn baseline() -> RenderState {
        RenderState::empty()
            .with_shader(ShaderAttrib::Off)
            .with_light(LightAttrib::AllOff)
            .with_texture(TextureAttrib::Off)
            .with_flat_color(LinearRgba::BLACK)
            .with_priority(OVERRIDE_PRIORITY)
    }

    /// Override for an object identified by `color`.
    pub fn tag_state_for(color: [u8; 3]) -> RenderState {
        Self::baseline().with_flat_color(LinearRgba::from_rgb8(color))
    }

    /// Point `camera` at the current object population. Without a world the
    /// camera goes back to its plain effect.
    pub fn configure(
        &self,
        camera: &mut RenderCamera,
        world: Option<&mut World>,
    ) -> Result<(), TagStateError> {
        let Some(world) = world else {
            camera.reset_effect();
            return Ok(());
        };

        let origins = {
            let live: BTreeSet<&ObjectId> = world.get_objects().keys().collect();
            let mapped: BTreeSet<&ObjectId> = world.id_colors().keys().collect();

            let stale: Vec<ObjectId> = mapped.difference(&live).map(|id| (*id).clone()).collect();
            if !stale.is_empty() {
                return Err(TagStateError::StaleColorMapping { ids: stale });
            }
            let unmapped: Vec<ObjectId> =
                live.difference(&mapped).map(|id| (*id).clone()).collect();
            if !unmapped.is_empty() {
                match self.policy {
                    UnmappedObjectPolicy::Reject => {
                        return Err(TagStateError::UnmappedObjects { ids: unmapped });
                    }
                    UnmappedObjectPolicy::RenderBaseline => {
                        warn!("objects without an id color render as background: {unmapped:?}");
                    }
                }
            }

            let origins: Vec<_> = world
                .get_objects()
                .values()
                .map(|o| (o.id.clone(), o.origin))
                .collect();
            if let Some((id, _)) = origins.iter().find(|(_, n)| !world.graph().contains(*n)) {
                return Err(TagStateError::MissingOrigin { id: id.clone() });
            }
            origins
        };

        let graph = world.graph_mut();
        for (id, origin) in &origins {
            graph
                .set_tag(*origin, CAMERA_TAG_STATE_KEY, id.as_str())
                .map_err(|_| TagStateError::MissingOrigin { id: id.clone() })?;
        }

        camera.set_tag_state_key(CAMERA_TAG_STATE_KEY);
        camera.set_initial_state(Self::baseline());
        camera.clear_tag_states();
        for (id, color) in world.id_colors().iter() {
            camera.set_tag_state(id.as_str(), Self::tag_state_for(color));
        }
        debug!("configured {} instance tag states", camera.tag_states().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::render_state::ColorAttrib;
    use crate::scene::mesh::Mesh;
    use crate::sensors::camera::Lens;
    use glam::Vec3;

    fn world_with(ids: &[&str]) -> World {
        let mut world = World::new();
        for id in ids {
            world
                .spawn_with_id(
                    (*id).into(),
                    id,
                    Mesh::quad(1.0, 1.0, LinearRgba::WHITE),
                    Vec3::ZERO,
                    Vec3::ZERO,
                )
                .unwrap();
        }
        world
    }

    #[test]
    fn stale_entry_fails_and_touches_nothing() {
        let mut world = world_with(&["a"]);
        world.id_colors_mut().insert("ghost".into(), [1, 2, 3]);
        let mut camera = RenderCamera::new(Lens::default());

        let err = TagStateRenderer::default()
            .configure(&mut camera, Some(&mut world))
            .unwrap_err();
        assert_eq!(
            err,
            TagStateError::StaleColorMapping {
                ids: vec!["ghost".into()]
            }
        );
        assert_eq!(camera.tag_state_key(), None);
        let origin = world.get_object(&"a".into()).unwrap().origin;
        assert_eq!(world.graph().tag(origin, CAMERA_TAG_STATE_KEY), None);
    }

    #[test]
    fn unmapped_objects_follow_policy() {
        let mut world = world_with(&["a", "b"]);
        world.id_colors_mut().remove(&"b".into());
        let mut camera = RenderCamera::new(Lens::default());

        let err = TagStateRenderer::new(UnmappedObjectPolicy::Reject)
            .configure(&mut camera, Some(&mut world))
            .unwrap_err();
        assert!(matches!(err, TagStateError::UnmappedObjects { ids } if ids == vec![ObjectId::from("b")]));

        TagStateRenderer::new(UnmappedObjectPolicy::RenderBaseline)
            .configure(&mut camera, Some(&mut world))
            .unwrap();
        assert!(camera.tag_state("b").is_none());
        assert!(camera.tag_state("a").is_some());
    }

    #[test]
    fn baseline_is_unlit_opaque_black() {
        let resolved = TagStateRenderer::baseline().resolve();
        assert_eq!(resolved.unlit_flat_color(), Some(LinearRgba::BLACK));
        assert_eq!(TagStateRenderer::baseline().priority, OVERRIDE_PRIORITY);
        assert_eq!(
            TagStateRenderer::tag_state_for([10, 0, 0]).color,
            Some(ColorAttrib::Flat(LinearRgba::from_rgb8([10, 0, 0])))
        );
    }

    #[test]
    fn reconfigure_drops_states_of_despawned_objects() {
        let mut world = world_with(&["a", "b"]);
        let mut camera = RenderCamera::new(Lens::default());
        let renderer = TagStateRenderer::default();
        renderer.configure(&mut camera, Some(&mut world)).unwrap();
        assert_eq!(camera.tag_states().len(), 2);

        world.despawn(&"b".into()).unwrap();
        renderer.configure(&mut camera, Some(&mut world)).unwrap();
        assert_eq!(camera.tag_states().keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn no_world_resets_to_plain_effect() {
        let mut world = world_with(&["a"]);
        let mut camera = RenderCamera::new(Lens::default());
        let renderer = TagStateRenderer::default();
        renderer.configure(&mut camera, Some(&mut world)).unwrap();
        renderer.configure(&mut camera, None).unwrap();
        assert_eq!(camera.tag_state_key(), None);
        assert!(camera.tag_states().is_empty());
        assert_eq!(*camera.initial_state(), RenderState::empty());
    }
}
