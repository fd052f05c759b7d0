//! Float textures and the providers that hand them to the histogram.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow, bail};

use super::bridge::GraphicsTexture;
use super::context::GpuContext;

static NEXT_TEXTURE_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Source of the texture a histogram is computed over.
///
/// `texture()` returns `None` until the provider has allocated something;
/// the painter treats that as "not ready yet" rather than an error.
pub trait TextureProvider: Send + Sync {
    fn gpu(&self) -> GpuContext;
    fn texture(&self) -> Option<GraphicsTexture>;
}

/// Provider whose texture is swapped from outside, e.g. by a render loop.
#[derive(Debug)]
pub struct SharedTextureProvider {
    gpu: GpuContext,
    slot: Mutex<Option<GraphicsTexture>>,
}

impl SharedTextureProvider {
    pub fn new(gpu: GpuContext) -> Self {
        SharedTextureProvider {
            gpu,
            slot: Mutex::new(None),
        }
    }

    pub fn publish(&self, texture: GraphicsTexture) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(texture);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl TextureProvider for SharedTextureProvider {
    fn gpu(&self) -> GpuContext {
        self.gpu.clone()
    }

    fn texture(&self) -> Option<GraphicsTexture> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Upload helpers for single-channel float textures.
pub struct FloatTexture;

impl FloatTexture {
    /// Upload `values` (row-major, `width * height`) as a sampled texture.
    /// `format` must be `R32Float` or `R16Float`.
    pub fn upload(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        values: &[f32],
        format: wgpu::TextureFormat,
    ) -> Result<GraphicsTexture> {
        if width == 0 || height == 0 {
            bail!("texture must not be empty, got {width}x{height}");
        }
        let expected = width as usize * height as usize;
        if values.len() != expected {
            bail!(
                "expected {expected} values for a {width}x{height} texture, got {}",
                values.len()
            );
        }

        let (bytes, bytes_per_texel): (Vec<u8>, u32) = match format {
            wgpu::TextureFormat::R32Float => (bytemuck::cast_slice(values).to_vec(), 4),
            wgpu::TextureFormat::R16Float => {
                let halves: Vec<u16> = values
                    .iter()
                    .map(|&v| half::f16::from_f32(v).to_bits())
                    .collect();
                (bytemuck::cast_slice(&halves).to_vec(), 2)
            }
            other => return Err(anyhow!("unsupported float texture format {other:?}")),
        };

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("histogram.float_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_texel),
                rows_per_image: Some(height),
            },
            size,
        );

        let handle = NEXT_TEXTURE_HANDLE.fetch_add(1, Ordering::Relaxed);
        Ok(GraphicsTexture::new(handle, width, height, gpu.id(), texture))
    }

    /// Decode an image file to luminance and upload it as `R32Float`.
    pub fn from_image_path(gpu: &GpuContext, path: impl AsRef<Path>) -> Result<GraphicsTexture> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_luma32f();
        let (width, height) = image.dimensions();
        Self::upload(gpu, width, height, image.as_raw(), wgpu::TextureFormat::R32Float)
            .with_context(|| format!("failed to upload image {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::initialize_device;

    #[test]
    fn upload_checks_value_count_and_format() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping float texture test.");
            return;
        };
        assert!(FloatTexture::upload(&gpu, 2, 2, &[0.0; 3], wgpu::TextureFormat::R32Float).is_err());
        assert!(FloatTexture::upload(&gpu, 0, 2, &[], wgpu::TextureFormat::R32Float).is_err());
        assert!(FloatTexture::upload(&gpu, 1, 1, &[0.0], wgpu::TextureFormat::Rgba8Unorm).is_err());

        let a = FloatTexture::upload(&gpu, 2, 2, &[0.0; 4], wgpu::TextureFormat::R32Float).unwrap();
        let b = FloatTexture::upload(&gpu, 2, 2, &[0.0; 4], wgpu::TextureFormat::R16Float).unwrap();
        assert_ne!(a.handle(), 0);
        assert_ne!(a.handle(), b.handle());
        assert_eq!(b.format(), wgpu::TextureFormat::R16Float);
    }

    #[test]
    fn shared_provider_publishes_and_clears() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping provider test.");
            return;
        };
        let provider = SharedTextureProvider::new(gpu.clone());
        assert!(provider.texture().is_none());
        let t = FloatTexture::upload(&gpu, 1, 1, &[1.0], wgpu::TextureFormat::R32Float).unwrap();
        provider.publish(t.clone());
        assert_eq!(provider.texture().map(|t| t.handle()), Some(t.handle()));
        provider.clear();
        assert!(provider.texture().is_none());
    }
}
