//! Scene collaborators: transform hierarchy, geometry and the live world.

pub mod graph;
pub mod mesh;
pub mod world;

pub use graph::{NodeId, SceneGraph, Transform, TransformNode};
pub use mesh::{Mesh, Triangle};
pub use world::{IdColorMap, ObjectId, SceneObject, World};
