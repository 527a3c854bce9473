//! Synthesis of the program that copies every registered source texture into
//! its paired destination storage texture.
//!
//! The output only depends on the ordered list of [`TransferSignature`]s:
//! texture names never appear in the source, so equal signature lists always
//! produce byte-identical modules and source equality doubles as the cache key.

use std::fmt::Write;

use anyhow::{Result, anyhow, bail};
use log::warn;

use super::fullscreen::build_fullscreen_module;
use crate::renderer::types::{TextureFormat, TextureKind};

pub const COPY_PROGRAM_NAME: &str = "update_previous_pipes";
pub const COPY_PROGRAM_VERSION: u32 = 1;

/// Each transfer takes two bindings in group 0. wgpu caps a group at 1000.
pub const MAX_TRANSFERS: usize = 256;

/// Integer pixel coordinate variable shared by every copy.
const COORD_VAR: &str = "coord_2d_int";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSignature {
    pub kind: TextureKind,
    pub format: TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransferSignature {
    pub source: TextureSignature,
    pub destination: TextureSignature,
}

pub fn source_binding_name(index: usize) -> String {
    format!("SrcTex{index}")
}

pub fn destination_binding_name(index: usize) -> String {
    format!("DestTex{index}")
}

/// Binding slot of `SrcTex<index>`. `None` when the slot does not fit a `u32`.
pub fn source_binding_slot(index: usize) -> Option<u32> {
    index.checked_mul(2).and_then(|slot| u32::try_from(slot).ok())
}

pub fn destination_binding_slot(index: usize) -> Option<u32> {
    source_binding_slot(index)?.checked_add(1)
}

/// How a texture kind is declared and accessed in WGSL.
#[derive(Clone, Copy, Debug)]
struct TexelAccess {
    sampled_type: &'static str,
    storage_type: &'static str,
}

const TEX2D_ACCESS: TexelAccess = TexelAccess {
    sampled_type: "texture_2d<f32>",
    storage_type: "texture_storage_2d",
};

/// Texel access lookup. Kinds without a dedicated row are copied as 2-D
/// textures; add a row here (and matching lookup/store code) to support them.
fn texel_access_for(kind: TextureKind) -> TexelAccess {
    match kind {
        TextureKind::Tex2D => TEX2D_ACCESS,
        other => {
            warn!("no texel access path for {other:?}, falling back to 2-D copy");
            TEX2D_ACCESS
        }
    }
}

fn sampler_type(texture: TextureSignature) -> String {
    texel_access_for(texture.kind).sampled_type.to_string()
}

fn image_type(texture: TextureSignature) -> String {
    format!(
        "{}<{}, write>",
        texel_access_for(texture.kind).storage_type,
        texture.format.wgsl_storage_format()
    )
}

fn sampler_lookup(dest_var: &str, sampler_name: &str) -> String {
    format!("let {dest_var} = textureLoad({sampler_name}, {COORD_VAR}, 0);")
}

fn store_code(image_name: &str, data_var: &str) -> String {
    format!("textureStore({image_name}, {COORD_VAR}, {data_var});")
}

/// Build the WGSL module for `transfers`, in order.
pub fn build_copy_program_source(transfers: &[TransferSignature]) -> Result<String> {
    if transfers.len() > MAX_TRANSFERS {
        bail!(
            "{COPY_PROGRAM_NAME} supports at most {MAX_TRANSFERS} transfers, got {}",
            transfers.len()
        );
    }
    let header = format!(
        "// {COPY_PROGRAM_NAME} v{COPY_PROGRAM_VERSION}\n\
         // Autogenerated, do not edit! Your changes will be lost.\n"
    );

    let mut declarations = String::new();
    let mut body = String::new();
    let _ = writeln!(body, "    let {COORD_VAR} = vec2<i32>(in.position.xy);");

    for (i, transfer) in transfers.iter().enumerate() {
        let src = source_binding_name(i);
        let dest = destination_binding_name(i);
        let data = format!("data{i}");
        let (Some(src_slot), Some(dest_slot)) =
            (source_binding_slot(i), destination_binding_slot(i))
        else {
            return Err(anyhow!("transfer {i} has no binding slot"));
        };

        let _ = writeln!(
            declarations,
            "@group(0) @binding({src_slot}) var {src}: {};",
            sampler_type(transfer.source)
        );
        let _ = writeln!(
            declarations,
            "@group(0) @binding({dest_slot}) var {dest}: {};",
            image_type(transfer.destination)
        );

        let _ = writeln!(body, "\n    // Transfer {i}");
        let _ = writeln!(body, "    {}", sampler_lookup(&data, &src));
        let _ = writeln!(body, "    {}", store_code(&dest, &data));
    }

    Ok(build_fullscreen_module(&header, &declarations, &body))
}
