pub mod copy_pipes;
pub mod fullscreen;

pub use copy_pipes::{
    TextureSignature, TransferSignature, build_copy_program_source, destination_binding_name,
    source_binding_name,
};
pub use fullscreen::build_fullscreen_module;
