//! Render-state overrides applied per camera or per tagged subtree.
//!
//! A [`RenderState`] is a set of optional attributes. Composing a higher
//! priority state over a lower priority one replaces every attribute the
//! higher one sets; attributes it leaves unset fall through.

use super::types::LinearRgba;

/// Whether the per-fragment shading program runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderAttrib {
    Auto,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightAttrib {
    Default,
    AllOff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureAttrib {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorAttrib {
    /// Use the geometry's own vertex colors.
    Vertex,
    /// Paint every fragment with one color.
    Flat(LinearRgba),
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RenderState {
    pub shader: Option<ShaderAttrib>,
    pub light: Option<LightAttrib>,
    pub texture: Option<TextureAttrib>,
    pub color: Option<ColorAttrib>,
    /// States with a higher priority win attribute conflicts on composition.
    pub priority: i32,
}

impl RenderState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_shader(mut self, shader: ShaderAttrib) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_light(mut self, light: LightAttrib) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_texture(mut self, texture: TextureAttrib) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_color(mut self, color: ColorAttrib) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_flat_color(self, color: LinearRgba) -> Self {
        self.with_color(ColorAttrib::Flat(color))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.shader.is_none() && self.light.is_none() && self.texture.is_none() && self.color.is_none()
    }

    /// Compose `other` with `self`: attributes from the higher priority state
    /// win, ties go to `other`.
    pub fn compose(&self, other: &RenderState) -> RenderState {
        let (low, high) = if self.priority > other.priority {
            (other, self)
        } else {
            (self, other)
        };
        RenderState {
            shader: high.shader.or(low.shader),
            light: high.light.or(low.light),
            texture: high.texture.or(low.texture),
            color: high.color.or(low.color),
            priority: high.priority,
        }
    }

    /// Fully resolved attributes, unset ones taking their defaults.
    pub fn resolve(&self) -> ResolvedState {
        ResolvedState {
            shader: self.shader.unwrap_or(ShaderAttrib::Auto),
            light: self.light.unwrap_or(LightAttrib::Default),
            texture: self.texture.unwrap_or(TextureAttrib::On),
            color: self.color.unwrap_or(ColorAttrib::Vertex),
        }
    }
}

/// Attribute values used by the rasterizer for one draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedState {
    pub shader: ShaderAttrib,
    pub light: LightAttrib,
    pub texture: TextureAttrib,
    pub color: ColorAttrib,
}

impl ResolvedState {
    /// Flat color with no lighting, texturing or shading program: every
    /// fragment of the draw gets exactly this color.
    pub fn unlit_flat_color(&self) -> Option<LinearRgba> {
        match (self.shader, self.light, self.texture, self.color) {
            (ShaderAttrib::Off, LightAttrib::AllOff, TextureAttrib::Off, ColorAttrib::Flat(c)) => {
                Some(c)
            }
            _ => None,
        }
    }
}
