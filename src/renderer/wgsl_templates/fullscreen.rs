//! Full-screen pass scaffolding shared by generated programs.

/// Vertex stage drawing one oversized triangle that covers the viewport.
/// Issue `draw(0..3)` with no vertex buffers.
pub const FULLSCREEN_VERTEX_WGSL: &str = r#"
struct VSOut {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VSOut {
    var out: VSOut;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    out.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    return out;
}
"#;

pub const FULLSCREEN_VERTEX_ENTRY: &str = "vs_main";
pub const FULLSCREEN_FRAGMENT_ENTRY: &str = "fs_main";

/// Assemble a complete module: header, resource declarations, the shared
/// vertex stage and a single `fs_main` wrapping `fragment_body`.
pub fn build_fullscreen_module(header: &str, declarations: &str, fragment_body: &str) -> String {
    let mut module = String::new();
    module.push_str(header);
    module.push_str(FULLSCREEN_VERTEX_WGSL);
    if !declarations.is_empty() {
        module.push('\n');
        module.push_str(declarations);
    }
    module.push_str(&format!(
        r#"
@fragment
fn {FULLSCREEN_FRAGMENT_ENTRY}(in: VSOut) -> @location(0) vec4<f32> {{
{fragment_body}    return vec4<f32>(0.0, 0.0, 0.0, 0.0);
}}
"#
    ));
    module
}
