use glam::{Vec2, Vec3};

use crate::renderer::types::LinearRgba;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub uvs: [Vec2; 3],
    pub color: LinearRgba,
}

impl Triangle {
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).normalize_or_zero()
    }
}

/// Triangle soup in node-local coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Upright rectangle in the XZ plane centered on the origin, facing -Y.
    pub fn quad(width: f32, height: f32, color: LinearRgba) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let p = [
            Vec3::new(-hw, 0.0, -hh),
            Vec3::new(hw, 0.0, -hh),
            Vec3::new(hw, 0.0, hh),
            Vec3::new(-hw, 0.0, hh),
        ];
        let uv = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        Self {
            triangles: vec![
                Triangle {
                    positions: [p[0], p[1], p[2]],
                    uvs: [uv[0], uv[1], uv[2]],
                    color,
                },
                Triangle {
                    positions: [p[0], p[2], p[3]],
                    uvs: [uv[0], uv[2], uv[3]],
                    color,
                },
            ],
        }
    }

    /// Axis-aligned box centered on the origin.
    pub fn cuboid(size: Vec3, color: LinearRgba) -> Self {
        let h = size * 0.5;
        let corner = |x: f32, y: f32, z: f32| Vec3::new(x * h.x, y * h.y, z * h.z);
        // Each face as four corners, counter-clockwise seen from outside.
        let faces = [
            [corner(-1., -1., -1.), corner(1., -1., -1.), corner(1., -1., 1.), corner(-1., -1., 1.)],
            [corner(1., 1., -1.), corner(-1., 1., -1.), corner(-1., 1., 1.), corner(1., 1., 1.)],
            [corner(1., -1., -1.), corner(1., 1., -1.), corner(1., 1., 1.), corner(1., -1., 1.)],
            [corner(-1., 1., -1.), corner(-1., -1., -1.), corner(-1., -1., 1.), corner(-1., 1., 1.)],
            [corner(-1., -1., 1.), corner(1., -1., 1.), corner(1., 1., 1.), corner(-1., 1., 1.)],
            [corner(-1., 1., -1.), corner(1., 1., -1.), corner(1., -1., -1.), corner(-1., -1., -1.)],
        ];
        let uv = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        let triangles = faces
            .iter()
            .flat_map(|f| {
                [
                    Triangle {
                        positions: [f[0], f[1], f[2]],
                        uvs: [uv[0], uv[1], uv[2]],
                        color,
                    },
                    Triangle {
                        positions: [f[0], f[2], f[3]],
                        uvs: [uv[0], uv[2], uv[3]],
                        color,
                    },
                ]
            })
            .collect();
        Self { triangles }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}
