//! Transform-node hierarchy with per-node tags and render states.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use glam::{EulerRot, Mat4, Quat, Vec3};

use super::mesh::Mesh;
use crate::renderer::render_state::RenderState;

/// Handle to a node in a [`SceneGraph`]. Handles of removed nodes never
/// resolve again, even after their slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Local transform. `hpr` is heading/pitch/roll in degrees, Z-up with +Y
/// forward: heading turns about Z, pitch about X, roll about Y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub hpr: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            hpr: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position_hpr(position: Vec3, hpr: Vec3) -> Self {
        Self {
            position,
            hpr,
            ..Self::default()
        }
    }

    pub fn rotation(&self) -> Quat {
        hpr_to_quat(self.hpr)
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.position)
    }
}

pub fn hpr_to_quat(hpr: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZXY,
        hpr.x.to_radians(),
        hpr.y.to_radians(),
        hpr.z.to_radians(),
    )
}

#[derive(Clone, Debug, Default)]
pub struct TransformNode {
    pub name: String,
    pub transform: Transform,
    pub state: RenderState,
    pub mesh: Option<Mesh>,
    pub hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    tags: BTreeMap<String, String>,
}

impl TransformNode {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<TransformNode>,
}

#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        graph.root = graph.alloc(TransformNode::named("render"));
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, node: TransformNode) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&TransformNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TransformNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn expect_node_mut(&mut self, id: NodeId) -> Result<&mut TransformNode> {
        self.node_mut(id)
            .ok_or_else(|| anyhow!("scene node {id:?} does not exist"))
    }

    pub fn attach_new_node(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        if !self.contains(parent) {
            bail!("cannot attach '{name}': parent node {parent:?} does not exist");
        }
        let mut node = TransformNode::named(name);
        node.parent = Some(parent);
        let id = self.alloc(node);
        self.expect_node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Remove `id` and its whole subtree. The root cannot be removed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            bail!("the scene root cannot be removed");
        }
        let parent = self
            .node(id)
            .ok_or_else(|| anyhow!("scene node {id:?} does not exist"))?
            .parent;
        if let Some(parent) = parent.and_then(|p| self.node_mut(p)) {
            parent.children.retain(|c| *c != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                self.free.push(current.index);
            }
        }
        Ok(())
    }

    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        if id == self.root {
            bail!("the scene root cannot be reparented");
        }
        if self.ancestors(new_parent).any(|a| a == id) {
            bail!("reparenting {id:?} under {new_parent:?} would create a cycle");
        }
        if !self.contains(new_parent) {
            bail!("new parent {new_parent:?} does not exist");
        }
        let old_parent = self.expect_node_mut(id)?.parent.replace(new_parent);
        if let Some(old) = old_parent.and_then(|p| self.node_mut(p)) {
            old.children.retain(|c| *c != id);
        }
        self.expect_node_mut(new_parent)?.children.push(id);
        Ok(())
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.node(id).map(|_| id);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.node(current).and_then(|n| n.parent);
            Some(current)
        })
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<()> {
        self.expect_node_mut(id)?.transform = transform;
        Ok(())
    }

    pub fn set_mesh(&mut self, id: NodeId, mesh: Mesh) -> Result<()> {
        self.expect_node_mut(id)?.mesh = Some(mesh);
        Ok(())
    }

    pub fn set_state(&mut self, id: NodeId, state: RenderState) -> Result<()> {
        self.expect_node_mut(id)?.state = state;
        Ok(())
    }

    pub fn set_tag(&mut self, id: NodeId, key: &str, value: &str) -> Result<()> {
        self.expect_node_mut(id)?
            .tags
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn clear_tag(&mut self, id: NodeId, key: &str) -> Result<()> {
        self.expect_node_mut(id)?.tags.remove(key);
        Ok(())
    }

    /// Tag value on `id` itself, if any.
    pub fn tag(&self, id: NodeId, key: &str) -> Option<&str> {
        self.node(id)?.tag(key)
    }

    /// Tag value on `id` or its nearest ancestor carrying `key`.
    pub fn net_tag(&self, id: NodeId, key: &str) -> Option<&str> {
        self.ancestors(id)
            .find_map(|a| self.node(a).and_then(|n| n.tag(key)))
    }

    /// Composed render state from the root down to `id`.
    pub fn net_state(&self, id: NodeId) -> RenderState {
        let chain: Vec<NodeId> = self.ancestors(id).collect();
        chain
            .iter()
            .rev()
            .filter_map(|a| self.node(*a))
            .fold(RenderState::empty(), |acc, n| acc.compose(&n.state))
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        if !self.contains(id) {
            return None;
        }
        let chain: Vec<NodeId> = self.ancestors(id).collect();
        Some(
            chain
                .iter()
                .rev()
                .filter_map(|a| self.node(*a))
                .fold(Mat4::IDENTITY, |acc, n| acc * n.transform.matrix()),
        )
    }

    /// Visible nodes carrying geometry, depth-first from the root.
    pub fn geometry_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if node.hidden {
                continue;
            }
            if node.mesh.is_some() {
                out.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_inherited_by_descendants() {
        let mut graph = SceneGraph::new();
        let origin = graph.attach_new_node(graph.root(), "origin").unwrap();
        let geom = graph.attach_new_node(origin, "geom").unwrap();
        graph.set_tag(origin, "id", "car-1").unwrap();
        assert_eq!(graph.net_tag(geom, "id"), Some("car-1"));
        assert_eq!(graph.tag(geom, "id"), None);
        assert_eq!(graph.net_tag(graph.root(), "id"), None);
    }

    #[test]
    fn removed_handles_never_resolve() {
        let mut graph = SceneGraph::new();
        let a = graph.attach_new_node(graph.root(), "a").unwrap();
        let child = graph.attach_new_node(a, "child").unwrap();
        graph.remove_node(a).unwrap();
        assert!(!graph.contains(a));
        assert!(!graph.contains(child));

        let b = graph.attach_new_node(graph.root(), "b").unwrap();
        assert!(graph.contains(b));
        assert!(!graph.contains(a));
        assert!(graph.set_tag(a, "id", "x").is_err());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn world_matrix_chains_parent_transforms() {
        let mut graph = SceneGraph::new();
        let parent = graph.attach_new_node(graph.root(), "parent").unwrap();
        let child = graph.attach_new_node(parent, "child").unwrap();
        graph
            .set_transform(
                parent,
                Transform::from_position_hpr(Vec3::new(10.0, 0.0, 0.0), Vec3::new(90.0, 0.0, 0.0)),
            )
            .unwrap();
        graph
            .set_transform(child, Transform::from_position_hpr(Vec3::Y, Vec3::ZERO))
            .unwrap();
        let p = graph.world_matrix(child).unwrap().transform_point3(Vec3::ZERO);
        // Heading 90 turns +Y into -X.
        assert!((p - Vec3::new(9.0, 0.0, 0.0)).length() < 1e-5, "{p:?}");
    }

    #[test]
    fn reparent_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let a = graph.attach_new_node(graph.root(), "a").unwrap();
        let b = graph.attach_new_node(a, "b").unwrap();
        assert!(graph.reparent(a, b).is_err());
        graph.reparent(b, graph.root()).unwrap();
        assert_eq!(graph.node(b).unwrap().parent(), Some(graph.root()));
        assert!(graph.node(a).unwrap().children().is_empty());
    }
}
