//! Edge-function triangle rasterizer behind scene draws.
//!
//! One sample per pixel at the pixel center, no anti-aliasing, depth tested.
//! Pixels on an edge shared by two triangles are owned by exactly one of them.
//! Triangles are clipped against the near plane before projection.

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::render_state::{ColorAttrib, LightAttrib, ResolvedState, ShaderAttrib, TextureAttrib};
use super::texture_pool::Texture;
use super::types::LinearRgba;
use crate::scene::mesh::{Mesh, Triangle};

/// One mesh instance to draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawItem<'a> {
    pub world: Mat4,
    pub mesh: &'a Mesh,
    pub state: ResolvedState,
}

/// Fixed lighting and fog environment for the shaded path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    /// Direction the light travels, world space.
    pub direction: Vec3,
    pub ambient: f32,
    pub diffuse: f32,
    pub fog_color: LinearRgba,
    pub fog_density: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, 0.6, -1.0).normalize(),
            ambient: 0.35,
            diffuse: 0.65,
            fog_color: LinearRgba::new(0.7, 0.75, 0.8, 1.0),
            fog_density: 0.02,
        }
    }
}

/// A vertex after the world-to-clip transform.
#[derive(Clone, Copy, Debug)]
struct ClipVertex {
    clip: Vec4,
    view_pos: Vec3,
    uv: Vec2,
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        ClipVertex {
            clip: self.clip.lerp(other.clip, t),
            view_pos: self.view_pos.lerp(other.view_pos, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }
}

/// Sutherland-Hodgman against the near plane (`z >= 0` in clip space).
/// Returns 0, 3 or 4 vertices keeping the input winding.
fn clip_near(tri: [ClipVertex; 3]) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(4);
    for i in 0..3 {
        let a = &tri[i];
        let b = &tri[(i + 1) % 3];
        let (da, db) = (a.clip.z, b.clip.z);
        if da >= 0.0 {
            out.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            out.push(a.lerp(b, da / (da - db)));
        }
    }
    out
}

struct ScreenVertex {
    pos: Vec2,
    depth: f32,
    inv_w: f32,
    view_distance: f32,
    uv: Vec2,
}

impl ScreenVertex {
    fn project(v: &ClipVertex, size: Vec2) -> Option<ScreenVertex> {
        if v.clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = v.clip.xyz() / v.clip.w;
        Some(ScreenVertex {
            pos: Vec2::new((ndc.x * 0.5 + 0.5) * size.x, (0.5 - ndc.y * 0.5) * size.y),
            depth: ndc.z,
            inv_w: 1.0 / v.clip.w,
            view_distance: v.view_pos.length(),
            uv: v.uv,
        })
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Ownership rule for pixels exactly on an edge. Reversing the edge flips the
/// answer, so a shared edge is drawn once.
fn owns_boundary(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    d.y > 0.0 || (d.y == 0.0 && d.x < 0.0)
}

fn checker(uv: Vec2) -> f32 {
    let cell = (uv * 8.0).floor();
    if (cell.x + cell.y).rem_euclid(2.0) < 1.0 { 1.0 } else { 0.6 }
}

fn shade(
    state: &ResolvedState,
    tri: &Triangle,
    world_normal: Vec3,
    uv: Vec2,
    view_distance: f32,
    lighting: &Lighting,
) -> LinearRgba {
    if let Some(flat) = state.unlit_flat_color() {
        return flat;
    }
    let mut color = match state.color {
        ColorAttrib::Flat(c) => c,
        ColorAttrib::Vertex => tri.color,
    };
    if state.texture == TextureAttrib::On {
        let t = checker(uv);
        color = color.modulate(LinearRgba::new(t, t, t, 1.0));
    }
    if state.light == LightAttrib::Default {
        let n_dot_l = world_normal.dot(-lighting.direction).abs();
        let k = lighting.ambient + lighting.diffuse * n_dot_l;
        color = color.modulate(LinearRgba::new(k, k, k, 1.0));
    }
    if state.shader == ShaderAttrib::Auto {
        let fog = 1.0 - (-view_distance * lighting.fog_density).exp();
        let alpha = color.0[3];
        color = color.lerp(lighting.fog_color, fog);
        color.0[3] = alpha;
    }
    color
}

/// Clear `target` and draw every item into it.
pub fn rasterize(
    target: &mut Texture,
    clear: LinearRgba,
    view: Mat4,
    projection: Mat4,
    items: &[DrawItem<'_>],
    lighting: &Lighting,
) {
    target.fill(clear);
    let [width, height] = target.size();
    if width == 0 || height == 0 {
        return;
    }
    let mut depth_buffer = vec![f32::INFINITY; width as usize * height as usize];
    let view_proj = projection * view;
    let size = Vec2::new(width as f32, height as f32);

    for item in items {
        let to_clip = view_proj * item.world;
        let to_view = view * item.world;
        for tri in &item.mesh.triangles {
            let corners: [ClipVertex; 3] = std::array::from_fn(|i| {
                let p = tri.positions[i].extend(1.0);
                ClipVertex {
                    clip: to_clip * p,
                    view_pos: (to_view * p).xyz(),
                    uv: tri.uvs[i],
                }
            });
            let polygon = clip_near(corners);
            let Some(screen) = polygon
                .iter()
                .map(|v| ScreenVertex::project(v, size))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            let fragment = Fragment {
                state: &item.state,
                tri,
                world_normal: item.world.transform_vector3(tri.normal()).normalize_or_zero(),
                lighting,
            };
            // Fan over the clipped polygon.
            for i in 1..screen.len().saturating_sub(1) {
                fill_triangle(
                    target,
                    &mut depth_buffer,
                    [&screen[0], &screen[i], &screen[i + 1]],
                    &fragment,
                );
            }
        }
    }
}

/// Per-triangle shading inputs shared by every clipped piece.
struct Fragment<'a> {
    state: &'a ResolvedState,
    tri: &'a Triangle,
    world_normal: Vec3,
    lighting: &'a Lighting,
}

fn fill_triangle(
    target: &mut Texture,
    depth_buffer: &mut [f32],
    verts: [&ScreenVertex; 3],
    fragment: &Fragment<'_>,
) {
    let [width, height] = target.size();
    let size = Vec2::new(width as f32, height as f32);
    let (mut i1, mut i2) = (1, 2);
    let mut area = edge(verts[0].pos, verts[1].pos, verts[2].pos);
    if area == 0.0 {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut i1, &mut i2);
        area = -area;
    }
    let (v0, v1, v2) = (verts[0], verts[i1], verts[i2]);

    let min = v0.pos.min(v1.pos).min(v2.pos).floor().max(Vec2::ZERO);
    let max = v0.pos.max(v1.pos).max(v2.pos).ceil().min(size);
    let owns = [
        owns_boundary(v1.pos, v2.pos),
        owns_boundary(v2.pos, v0.pos),
        owns_boundary(v0.pos, v1.pos),
    ];

    for y in min.y as u32..max.y as u32 {
        for x in min.x as u32..max.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = [
                edge(v1.pos, v2.pos, p),
                edge(v2.pos, v0.pos, p),
                edge(v0.pos, v1.pos, p),
            ];
            let inside = w
                .iter()
                .zip(owns)
                .all(|(w, owns)| *w > 0.0 || (*w == 0.0 && owns));
            if !inside {
                continue;
            }
            let b = [w[0] / area, w[1] / area, w[2] / area];
            let depth = b[0] * v0.depth + b[1] * v1.depth + b[2] * v2.depth;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let idx = y as usize * width as usize + x as usize;
            if depth >= depth_buffer[idx] {
                continue;
            }
            depth_buffer[idx] = depth;

            let pw = [b[0] * v0.inv_w, b[1] * v1.inv_w, b[2] * v2.inv_w];
            let norm = pw[0] + pw[1] + pw[2];
            let uv = (v0.uv * pw[0] + v1.uv * pw[1] + v2.uv * pw[2]) / norm;
            let distance =
                (v0.view_distance * pw[0] + v1.view_distance * pw[1] + v2.view_distance * pw[2])
                    / norm;
            let color = shade(
                fragment.state,
                fragment.tri,
                fragment.world_normal,
                uv,
                distance,
                fragment.lighting,
            );
            target.write_texel(x, y, color.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::render_state::RenderState;
    use crate::renderer::texture_pool::TextureDesc;
    use crate::renderer::types::TextureFormat;

    fn ndc_quad(color: LinearRgba) -> Mesh {
        // Covers the whole viewport when drawn with identity matrices.
        let z = 0.5;
        let p = [
            Vec3::new(-1.0, -1.0, z),
            Vec3::new(1.0, -1.0, z),
            Vec3::new(1.0, 1.0, z),
            Vec3::new(-1.0, 1.0, z),
        ];
        let tri = |a: usize, b: usize, c: usize| Triangle {
            positions: [p[a], p[b], p[c]],
            uvs: [Vec2::ZERO; 3],
            color,
        };
        Mesh {
            triangles: vec![tri(0, 1, 2), tri(0, 2, 3)],
        }
    }

    fn flat(color: LinearRgba) -> ResolvedState {
        RenderState::empty()
            .with_shader(ShaderAttrib::Off)
            .with_light(LightAttrib::AllOff)
            .with_texture(TextureAttrib::Off)
            .with_flat_color(color)
            .resolve()
    }

    #[test]
    fn full_screen_quad_covers_every_pixel_once() {
        let mut target = Texture::new(TextureDesc::new("t", TextureFormat::Rgba8Unorm, [16, 9]));
        let mesh = ndc_quad(LinearRgba::WHITE);
        let red = LinearRgba::new(1.0, 0.0, 0.0, 1.0);
        rasterize(
            &mut target,
            LinearRgba::BLACK,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            &[DrawItem {
                world: Mat4::IDENTITY,
                mesh: &mesh,
                state: flat(red),
            }],
            &Lighting::default(),
        );
        for y in 0..9 {
            for x in 0..16 {
                assert_eq!(LinearRgba(target.read_texel(x, y)).to_rgba8(), [255, 0, 0, 255]);
            }
        }
    }

    #[test]
    fn nearer_geometry_wins_depth_test() {
        let mut target = Texture::new(TextureDesc::new("t", TextureFormat::Rgba8Unorm, [4, 4]));
        let far = ndc_quad(LinearRgba::WHITE);
        let near = Mesh {
            triangles: ndc_quad(LinearRgba::WHITE)
                .triangles
                .into_iter()
                .map(|mut t| {
                    for p in &mut t.positions {
                        p.z = 0.25;
                    }
                    t
                })
                .collect(),
        };
        let green = LinearRgba::new(0.0, 1.0, 0.0, 1.0);
        let blue = LinearRgba::new(0.0, 0.0, 1.0, 1.0);
        rasterize(
            &mut target,
            LinearRgba::BLACK,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            &[
                DrawItem {
                    world: Mat4::IDENTITY,
                    mesh: &near,
                    state: flat(green),
                },
                DrawItem {
                    world: Mat4::IDENTITY,
                    mesh: &far,
                    state: flat(blue),
                },
            ],
            &Lighting::default(),
        );
        assert_eq!(LinearRgba(target.read_texel(2, 2)).to_rgba8(), [0, 255, 0, 255]);
    }

    #[test]
    fn lit_path_modulates_vertex_color() {
        let tri = Mesh::quad(1.0, 1.0, LinearRgba::WHITE).triangles[0];
        let lit = RenderState::empty()
            .with_shader(ShaderAttrib::Off)
            .with_texture(TextureAttrib::Off)
            .resolve();
        let c = shade(&lit, &tri, Vec3::NEG_Y, Vec2::ZERO, 1.0, &Lighting::default());
        assert!(c.0[0] < 1.0 && c.0[0] > 0.0);
        assert_eq!(c.0[3], 1.0);
    }

    #[test]
    fn geometry_behind_the_camera_is_clipped_not_dropped() {
        // A wall at x = 1.5 running from behind the camera to far in front.
        let (x, r) = (1.5, 20.0);
        let p = [
            Vec3::new(x, -r, r),
            Vec3::new(x, -r, -r),
            Vec3::new(x, r, -r),
            Vec3::new(x, r, r),
        ];
        let tri = |a: usize, b: usize, c: usize| Triangle {
            positions: [p[a], p[b], p[c]],
            uvs: [Vec2::ZERO; 3],
            color: LinearRgba::WHITE,
        };
        let wall = Mesh {
            triangles: vec![tri(0, 1, 2), tri(0, 2, 3)],
        };
        let red = LinearRgba::from_rgb8([10, 0, 0]);
        let mut target = Texture::new(TextureDesc::new("t", TextureFormat::Rgba8Unorm, [64, 32]));
        rasterize(
            &mut target,
            LinearRgba::BLACK,
            Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y),
            Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.1, 100.0),
            &[DrawItem {
                world: Mat4::IDENTITY,
                mesh: &wall,
                state: flat(red),
            }],
            &Lighting::default(),
        );
        for y in 0..32 {
            assert_eq!(LinearRgba(target.read_texel(63, y)).to_rgba8(), [10, 0, 0, 255], "row {y}");
        }
        assert_eq!(LinearRgba(target.read_texel(32, 16)).to_rgba8(), [0, 0, 0, 255]);
    }

    #[test]
    fn near_clip_keeps_the_visible_part() {
        let v = |z: f32| ClipVertex {
            clip: Vec4::new(0.0, 0.0, z, 1.0),
            view_pos: Vec3::ZERO,
            uv: Vec2::ZERO,
        };
        assert_eq!(clip_near([v(0.5), v(0.5), v(0.5)]).len(), 3);
        assert!(clip_near([v(-1.0), v(-1.0), v(-1.0)]).is_empty());
        let one_behind = clip_near([v(-1.0), v(1.0), v(1.0)]);
        assert_eq!(one_behind.len(), 4);
        assert!(one_behind.iter().all(|c| c.clip.z >= 0.0));
        let two_behind = clip_near([v(-1.0), v(-1.0), v(1.0)]);
        assert_eq!(two_behind.len(), 3);
        assert!(two_behind.iter().all(|c| c.clip.z >= 0.0));
    }
}
