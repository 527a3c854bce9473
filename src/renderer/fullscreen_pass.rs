//! Runs a compiled full-screen program on the GPU over pool textures.

use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};

use super::gpu::GpuContext;
use super::program::{CompiledProgram, TextureAccess, TextureBinding};
use super::texture_pool::Texture;
use super::types::{ResourceName, TextureFormat, TextureKind};
use super::wgsl_templates::fullscreen::{FULLSCREEN_FRAGMENT_ENTRY, FULLSCREEN_VERTEX_ENTRY};

/// Render pipeline and per-group layouts built from a program's reflected
/// texture interface.
pub struct FullscreenPipeline {
    pipeline: wgpu::RenderPipeline,
    layouts: Vec<wgpu::BindGroupLayout>,
}

impl FullscreenPipeline {
    pub fn new(
        device: &wgpu::Device,
        program: &CompiledProgram,
        color_format: TextureFormat,
    ) -> Result<Self> {
        for (entry, stage) in [
            (FULLSCREEN_VERTEX_ENTRY, naga::ShaderStage::Vertex),
            (FULLSCREEN_FRAGMENT_ENTRY, naga::ShaderStage::Fragment),
        ] {
            if !program.has_entry_point(entry, stage) {
                bail!("program '{}' has no {stage:?} entry point '{entry}'", program.label());
            }
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(program.source())),
        });

        let group_count = program
            .textures()
            .iter()
            .map(|t| t.group + 1)
            .max()
            .unwrap_or(0);
        let mut layouts = Vec::with_capacity(group_count as usize);
        for group in 0..group_count {
            let entries = program
                .textures()
                .iter()
                .filter(|t| t.group == group)
                .map(layout_entry)
                .collect::<Result<Vec<_>>>()?;
            layouts.push(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{}.group{group}", program.label())),
                entries: &entries,
            }));
        }
        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(program.label()),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.label()),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(FULLSCREEN_VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(FULLSCREEN_FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format.to_wgpu(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self { pipeline, layouts })
    }
}

fn layout_entry(binding: &TextureBinding) -> Result<wgpu::BindGroupLayoutEntry> {
    if binding.kind != TextureKind::Tex2D {
        bail!("{} is a {:?} texture, only 2-D textures can be bound", binding.name, binding.kind);
    }
    let ty = match binding.access {
        TextureAccess::Sampled => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        TextureAccess::StorageWrite { format } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: format.to_wgpu(),
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    };
    Ok(wgpu::BindGroupLayoutEntry {
        binding: binding.binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty,
        count: None,
    })
}

/// A pool texture bound to one of the program's texture variables.
#[derive(Clone, Copy, Debug)]
pub struct BoundTexture<'a> {
    pub binding: &'a TextureBinding,
    pub texture: &'a Texture,
}

fn is_storage(binding: &TextureBinding) -> bool {
    matches!(binding.access, TextureAccess::StorageWrite { .. })
}

/// Draw `program` once over `color` with `bound` textures attached and return
/// the new contents of every storage-bound texture followed by `color`.
///
/// Each texture gets one GPU copy per role. A texture that is both sampled
/// and written in the same pass is sampled with its pre-pass contents, and
/// written textures start from their pool contents so texels the program
/// does not store keep their values.
pub fn run(
    gpu: &GpuContext,
    program: &CompiledProgram,
    bound: &[BoundTexture<'_>],
    color: &Texture,
) -> Result<Vec<(ResourceName, Vec<u8>)>> {
    let pipeline = gpu.fullscreen_pipeline(program, color.desc().format)?;

    gpu.validated(program.label(), |device, queue| {
        let mut uploads: BTreeMap<(bool, &ResourceName), (wgpu::Texture, &Texture)> =
            BTreeMap::new();
        for b in bound {
            let storage = is_storage(b.binding);
            uploads
                .entry((storage, &b.texture.desc().name))
                .or_insert_with(|| {
                    let usage = if storage {
                        wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC
                    } else {
                        wgpu::TextureUsages::TEXTURE_BINDING
                    };
                    (gpu.upload(b.texture, usage), b.texture)
                });
        }
        let color_texture = gpu.create_texture(
            color.desc(),
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let views = bound
            .iter()
            .map(|b| {
                uploads
                    .get(&(is_storage(b.binding), &b.texture.desc().name))
                    .map(|(texture, _)| texture.create_view(&wgpu::TextureViewDescriptor::default()))
                    .ok_or_else(|| anyhow!("{} was not uploaded", b.binding.name))
            })
            .collect::<Result<Vec<_>>>()?;
        let bind_groups: Vec<wgpu::BindGroup> = pipeline
            .layouts
            .iter()
            .enumerate()
            .map(|(group, layout)| {
                let entries: Vec<wgpu::BindGroupEntry> = bound
                    .iter()
                    .zip(&views)
                    .filter(|(b, _)| b.binding.group as usize == group)
                    .map(|(b, view)| wgpu::BindGroupEntry {
                        binding: b.binding.binding,
                        resource: wgpu::BindingResource::TextureView(view),
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{}.group{group}", program.label())),
                    layout,
                    entries: &entries,
                })
            })
            .collect();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(program.label()),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.label()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_pipeline(&pipeline.pipeline);
            for (group, bind_group) in bind_groups.iter().enumerate() {
                rpass.set_bind_group(group as u32, bind_group, &[]);
            }
            rpass.draw(0..3, 0..1);
        }

        let mut names = Vec::new();
        let mut readbacks = Vec::new();
        for ((storage, name), (texture, source)) in &uploads {
            if *storage {
                names.push((*name).clone());
                readbacks.push(gpu.encode_readback(&mut encoder, texture, source.desc()));
            }
        }
        names.push(color.desc().name.clone());
        readbacks.push(gpu.encode_readback(&mut encoder, &color_texture, color.desc()));
        queue.submit(Some(encoder.finish()));

        let contents = gpu.finish_readbacks(readbacks)?;
        Ok(names.into_iter().zip(contents).collect())
    })
}
