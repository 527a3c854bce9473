//! Headless wgpu device shared by every renderer in the process.
//!
//! Pool textures stay CPU-resident between passes. A pass uploads what it
//! binds, runs, and reads back what it wrote; nothing reaches the pool until
//! every readback has completed.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock, mpsc};

use anyhow::{Result, anyhow, bail};
use log::{error, info, warn};

use super::fullscreen_pass::FullscreenPipeline;
use super::program::CompiledProgram;
use super::texture_pool::{Texture, TextureDesc};
use super::types::TextureFormat;

static SHARED: OnceLock<Option<Arc<GpuContext>>> = OnceLock::new();

pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    fullscreen_pipelines: Mutex<HashMap<(String, TextureFormat), Arc<FullscreenPipeline>>>,
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.info.name)
            .field("backend", &self.info.backend)
            .finish_non_exhaustive()
    }
}

/// True when a headless device can be created on this machine.
pub fn can_run_headless() -> bool {
    GpuContext::shared().is_some()
}

impl GpuContext {
    /// Request a new adapter and device without a surface.
    pub fn headless() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    /// The process-wide device, requested on first use. `None` when no
    /// adapter can run our passes.
    pub fn shared() -> Option<Arc<GpuContext>> {
        SHARED
            .get_or_init(|| match GpuContext::headless() {
                Ok(gpu) => Some(Arc::new(gpu)),
                Err(err) => {
                    warn!("no headless GPU: {err:#}");
                    None
                }
            })
            .clone()
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| anyhow!("no suitable adapter: {e}"))?;
        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::FRAGMENT_WRITABLE_STORAGE)
        {
            bail!(
                "adapter '{}' cannot write storage textures from fragment shaders",
                info.name
            );
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sensor-forge.device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| anyhow!("failed to create logical device: {e}"))?;
        device.on_uncaptured_error(Box::new(|e| {
            error!("uncaptured wgpu error: {e}");
        }));
        info!("headless device on '{}' ({:?})", info.name, info.backend);

        Ok(Self {
            device,
            queue,
            info,
            fullscreen_pipelines: Mutex::new(HashMap::new()),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Run `f` inside a validation error scope and turn a captured error into
    /// an `Err`.
    pub fn validated<T>(
        &self,
        what: &str,
        f: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> Result<T>,
    ) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f(&self.device, &self.queue);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            bail!("{what}: {err}");
        }
        result
    }

    /// Pipeline running `program` into a color target of `color_format`.
    pub fn fullscreen_pipeline(
        &self,
        program: &CompiledProgram,
        color_format: TextureFormat,
    ) -> Result<Arc<FullscreenPipeline>> {
        cached(
            &self.fullscreen_pipelines,
            (program.source().to_string(), color_format),
            || {
                self.validated(program.label(), |device, _| {
                    FullscreenPipeline::new(device, program, color_format)
                })
            },
        )
    }

    pub fn create_texture(&self, desc: &TextureDesc, usage: wgpu::TextureUsages) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.name.as_str()),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage,
            view_formats: &[],
        })
    }

    /// Create a GPU copy of `texture` with its current contents.
    pub fn upload(&self, texture: &Texture, usage: wgpu::TextureUsages) -> wgpu::Texture {
        let gpu_texture = self.create_texture(texture.desc(), usage | wgpu::TextureUsages::COPY_DST);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texture.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(texture.row_bytes()),
                rows_per_image: Some(texture.height()),
            },
            extent(texture.size()),
        );
        gpu_texture
    }

    /// Record a copy of `texture` into a mappable buffer.
    pub fn encode_readback(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        desc: &TextureDesc,
    ) -> Readback {
        let row_bytes = desc.size[0] * desc.format.bytes_per_texel() as u32;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let height = desc.size[1];
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}.readback", desc.name)),
            size: u64::from(padded_row_bytes) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            extent(desc.size),
        );
        Readback {
            buffer,
            row_bytes,
            padded_row_bytes,
            height,
        }
    }

    /// Wait for submitted work and return each readback's tightly packed
    /// texels, in order.
    pub fn finish_readbacks(&self, readbacks: Vec<Readback>) -> Result<Vec<Vec<u8>>> {
        let (tx, rx) = mpsc::channel();
        for (index, readback) in readbacks.iter().enumerate() {
            let tx = tx.clone();
            readback
                .buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = tx.send((index, result));
                });
        }
        drop(tx);
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| anyhow!("waiting for the GPU failed: {e}"))?;
        for _ in 0..readbacks.len() {
            let (index, result) = rx
                .recv()
                .map_err(|_| anyhow!("readback callback was dropped"))?;
            result.map_err(|e| anyhow!("failed to map readback {index}: {e}"))?;
        }

        Ok(readbacks
            .into_iter()
            .map(|readback| {
                let mapped = readback.buffer.slice(..).get_mapped_range();
                let mut bytes =
                    Vec::with_capacity(readback.row_bytes as usize * readback.height as usize);
                for row in mapped
                    .chunks(readback.padded_row_bytes as usize)
                    .take(readback.height as usize)
                {
                    bytes.extend_from_slice(&row[..readback.row_bytes as usize]);
                }
                drop(mapped);
                readback.buffer.unmap();
                bytes
            })
            .collect())
    }
}

/// A pending texture-to-buffer copy.
pub struct Readback {
    buffer: wgpu::Buffer,
    row_bytes: u32,
    padded_row_bytes: u32,
    height: u32,
}

pub fn extent(size: [u32; 2]) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size[0],
        height: size[1],
        depth_or_array_layers: 1,
    }
}

fn cached<K: Eq + Hash, V>(
    cache: &Mutex<HashMap<K, Arc<V>>>,
    key: K,
    build: impl FnOnce() -> Result<V>,
) -> Result<Arc<V>> {
    let mut cache = cache
        .lock()
        .map_err(|_| anyhow!("GPU pipeline cache is poisoned"))?;
    if let Some(value) = cache.get(&key) {
        return Ok(value.clone());
    }
    let value = Arc::new(build()?);
    cache.insert(key, value.clone());
    Ok(value)
}
