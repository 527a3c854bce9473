//! Live object population and per-object identification colors for one episode.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use anyhow::{Result, anyhow, bail};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use super::graph::{NodeId, SceneGraph, Transform};
use super::mesh::Mesh;

/// Stable, opaque object identifier assigned at spawn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn random() -> Self {
        ObjectId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        ObjectId::new(s)
    }
}

#[derive(Clone, Debug)]
pub struct SceneObject {
    pub id: ObjectId,
    /// Transform node every piece of the object's geometry hangs under.
    pub origin: NodeId,
}

/// `ObjectId -> RGB8` mapping used to paint objects in instance images.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdColorMap {
    colors: BTreeMap<ObjectId, [u8; 3]>,
    /// Reverse index. A color normally has one holder; the smallest id owns it
    /// when several do.
    holders: HashMap<[u8; 3], BTreeSet<ObjectId>>,
}

impl IdColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObjectId, color: [u8; 3]) -> Option<[u8; 3]> {
        let previous = self.colors.insert(id.clone(), color);
        if let Some(old) = previous {
            self.release(&id, old);
        }
        self.holders.entry(color).or_default().insert(id);
        previous
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<[u8; 3]> {
        let color = self.colors.remove(id)?;
        self.release(id, color);
        Some(color)
    }

    fn release(&mut self, id: &ObjectId, color: [u8; 3]) {
        if let Some(holders) = self.holders.get_mut(&color) {
            holders.remove(id);
            if holders.is_empty() {
                self.holders.remove(&color);
            }
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<[u8; 3]> {
        self.colors.get(id).copied()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.colors.contains_key(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObjectId> {
        self.colors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, [u8; 3])> {
        self.colors.iter().map(|(id, c)| (id, *c))
    }

    /// Reverse lookup used when decoding rendered frames.
    pub fn id_for_color(&self, color: [u8; 3]) -> Option<&ObjectId> {
        self.holders.get(&color)?.first()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Hands out distinct, non-black colors in a deterministic order.
#[derive(Debug, Default)]
struct ColorAllocator {
    cursor: u32,
    used: HashSet<[u8; 3]>,
}

impl ColorAllocator {
    /// Odd multiplier: stepping by it visits every 24-bit value once.
    const STEP: u32 = 0x9E_3779;

    fn allocate(&mut self) -> Result<[u8; 3]> {
        for _ in 0..(1u32 << 24) {
            self.cursor = self.cursor.wrapping_add(Self::STEP) & 0xFF_FFFF;
            let c = self.cursor;
            let color = [(c >> 16) as u8, (c >> 8) as u8, c as u8];
            if color != [0, 0, 0] && self.used.insert(color) {
                return Ok(color);
            }
        }
        bail!("instance color space exhausted")
    }

    fn reserve(&mut self, color: [u8; 3]) {
        self.used.insert(color);
    }

    fn release(&mut self, color: [u8; 3]) {
        self.used.remove(&color);
    }
}

/// Engine-side world state for one episode: the scene graph, the live objects
/// and their identification colors.
#[derive(Debug, Default)]
pub struct World {
    graph: SceneGraph,
    objects: BTreeMap<ObjectId, SceneObject>,
    id_colors: IdColorMap,
    allocator: ColorAllocator,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Live objects keyed by id.
    pub fn get_objects(&self) -> &BTreeMap<ObjectId, SceneObject> {
        &self.objects
    }

    pub fn get_object(&self, id: &ObjectId) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    pub fn id_colors(&self) -> &IdColorMap {
        &self.id_colors
    }

    /// Direct access to the color table, for engines that manage colors
    /// themselves.
    pub fn id_colors_mut(&mut self) -> &mut IdColorMap {
        &mut self.id_colors
    }

    /// Spawn an object under the scene root with a random id and an
    /// allocated color.
    pub fn spawn(&mut self, name: &str, mesh: Mesh, position: Vec3, hpr: Vec3) -> Result<ObjectId> {
        let id = ObjectId::random();
        self.spawn_with_id(id.clone(), name, mesh, position, hpr)?;
        Ok(id)
    }

    pub fn spawn_with_id(
        &mut self,
        id: ObjectId,
        name: &str,
        mesh: Mesh,
        position: Vec3,
        hpr: Vec3,
    ) -> Result<&SceneObject> {
        if self.objects.contains_key(&id) {
            bail!("object '{id}' is already spawned");
        }
        let color = self.allocator.allocate()?;
        self.spawn_with_color(id, name, mesh, position, hpr, color)
    }

    /// Spawn with a caller-chosen identification color.
    pub fn spawn_with_color(
        &mut self,
        id: ObjectId,
        name: &str,
        mesh: Mesh,
        position: Vec3,
        hpr: Vec3,
        color: [u8; 3],
    ) -> Result<&SceneObject> {
        if self.objects.contains_key(&id) {
            bail!("object '{id}' is already spawned");
        }
        if let Some(owner) = self.id_colors.id_for_color(color) {
            bail!("color {color:?} requested for '{id}' already identifies '{owner}'");
        }
        let root = self.graph.root();
        let origin = self.graph.attach_new_node(root, name)?;
        self.graph
            .set_transform(origin, Transform::from_position_hpr(position, hpr))?;
        let geom = self.graph.attach_new_node(origin, &format!("{name}-geom"))?;
        self.graph.set_mesh(geom, mesh)?;

        self.allocator.reserve(color);
        self.id_colors.insert(id.clone(), color);
        debug!("spawned '{id}' with color {color:?}");
        let object = self
            .objects
            .entry(id.clone())
            .or_insert(SceneObject { id, origin });
        Ok(&*object)
    }

    /// Remove the object, its subtree and its color entry.
    pub fn despawn(&mut self, id: &ObjectId) -> Result<()> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| anyhow!("object '{id}' is not spawned"))?;
        self.graph.remove_node(object.origin)?;
        if let Some(color) = self.id_colors.remove(id) {
            self.allocator.release(color);
        }
        debug!("despawned '{id}'");
        Ok(())
    }

    /// Despawn every object, ending the episode.
    pub fn clear(&mut self) -> Result<()> {
        let ids: Vec<ObjectId> = self.objects.keys().cloned().collect();
        for id in &ids {
            self.despawn(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::types::LinearRgba;

    fn quad() -> Mesh {
        Mesh::quad(1.0, 1.0, LinearRgba::WHITE)
    }

    #[test]
    fn allocated_colors_are_distinct_and_never_black() {
        let mut allocator = ColorAllocator::default();
        let mut seen = HashSet::new();
        for _ in 0..5000 {
            let c = allocator.allocate().unwrap();
            assert_ne!(c, [0, 0, 0]);
            assert!(seen.insert(c), "duplicate color {c:?}");
        }
    }

    #[test]
    fn spawn_and_despawn_keep_color_map_in_sync() {
        let mut world = World::new();
        let a = world.spawn("a", quad(), Vec3::ZERO, Vec3::ZERO).unwrap();
        let b = world.spawn("b", quad(), Vec3::X, Vec3::ZERO).unwrap();
        assert_eq!(world.id_colors().len(), 2);
        assert_ne!(world.id_colors().get(&a), world.id_colors().get(&b));

        let origin = world.get_object(&a).unwrap().origin;
        world.despawn(&a).unwrap();
        assert!(!world.id_colors().contains(&a));
        assert!(!world.graph().contains(origin));
        assert_eq!(
            world.get_objects().keys().collect::<Vec<_>>(),
            world.id_colors().keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_spawn_is_rejected() {
        let mut world = World::new();
        world
            .spawn_with_id("1".into(), "a", quad(), Vec3::ZERO, Vec3::ZERO)
            .unwrap();
        assert!(
            world
                .spawn_with_id("1".into(), "b", quad(), Vec3::ZERO, Vec3::ZERO)
                .is_err()
        );
    }

    #[test]
    fn reverse_lookup_finds_owner() {
        let mut map = IdColorMap::new();
        map.insert("x".into(), [1, 2, 3]);
        assert_eq!(map.id_for_color([1, 2, 3]), Some(&ObjectId::from("x")));
        assert_eq!(map.id_for_color([3, 2, 1]), None);
    }

    #[test]
    fn reverse_lookup_follows_recolor_and_removal() {
        let mut map = IdColorMap::new();
        map.insert("b".into(), [9, 9, 9]);
        map.insert("a".into(), [9, 9, 9]);
        assert_eq!(map.id_for_color([9, 9, 9]), Some(&ObjectId::from("a")));

        assert_eq!(map.insert("a".into(), [4, 4, 4]), Some([9, 9, 9]));
        assert_eq!(map.id_for_color([9, 9, 9]), Some(&ObjectId::from("b")));
        assert_eq!(map.id_for_color([4, 4, 4]), Some(&ObjectId::from("a")));

        map.remove(&"b".into());
        assert_eq!(map.id_for_color([9, 9, 9]), None);
        map.remove(&"a".into());
        assert_eq!(map, IdColorMap::new());
    }
}
