//! Hand-off of render-side textures to the compute side.
//!
//! A texture goes through `Unregistered → Registered → Mapped → Registered →
//! … → Disposed`. Registration validates the texture once; mapping produces
//! the [`MappedArray`] view that kernels read; unmapping consumes that view
//! so it cannot be used past its bracket.
//!
//! While a texture is mapped the render side must not draw into it. Nothing
//! here enforces that; it is the caller's side of the contract.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use super::context::{ComputeContext, ContextId};
use crate::error::{HistogramError, Result};

/// A single-channel float texture owned by a texture provider.
#[derive(Debug, Clone)]
pub struct GraphicsTexture {
    handle: u64,
    width: u32,
    height: u32,
    context: ContextId,
    texture: wgpu::Texture,
}

impl GraphicsTexture {
    /// Describe an existing texture. `width`/`height` are what the provider
    /// claims; registration checks them against the real allocation.
    pub fn new(
        handle: u64,
        width: u32,
        height: u32,
        context: ContextId,
        texture: wgpu::Texture,
    ) -> Self {
        GraphicsTexture {
            handle,
            width,
            height,
            context,
            texture,
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn wgpu_texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// True when both describe the same allocation at the same size.
    pub fn same_allocation(&self, other: &GraphicsTexture) -> bool {
        self.handle == other.handle && self.width == other.width && self.height == other.height
    }
}

pub fn is_supported_format(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::R32Float | wgpu::TextureFormat::R16Float
    )
}

/// How the kernel may touch a registered texture. The histogram kernel only
/// samples, so read-only is the single mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Registered,
    Mapped,
    Disposed,
}

/// A texture registered with one bridge.
#[derive(Debug)]
pub struct RegistrationToken {
    texture: Option<GraphicsTexture>,
    handle: u64,
    access: AccessMode,
    state: TokenState,
    generation: u64,
    live: Arc<AtomicBool>,
}

impl RegistrationToken {
    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn texture(&self) -> Option<&GraphicsTexture> {
        self.texture.as_ref()
    }
}

/// Compute-side view of a mapped texture.
#[derive(Debug)]
pub struct MappedArray {
    view: wgpu::TextureView,
    handle: u64,
    width: u32,
    height: u32,
    generation: u64,
    live: Arc<AtomicBool>,
}

impl MappedArray {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// False once the owning token has been disposed.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Registration bookkeeping for one calculator.
#[derive(Debug, Default)]
pub struct ResourceBridge {
    registered: HashSet<u64>,
}

impl ResourceBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, handle: u64) -> bool {
        self.registered.contains(&handle)
    }

    pub fn register_texture(
        &mut self,
        ctx: &ComputeContext,
        texture: &GraphicsTexture,
        access: AccessMode,
    ) -> Result<RegistrationToken> {
        validate_texture(ctx, texture, access)?;
        if !self.registered.insert(texture.handle) {
            return Err(HistogramError::registration(
                texture.handle,
                "texture is already registered with this calculator",
            ));
        }
        debug!(
            "registered texture {} ({}x{}, {:?})",
            texture.handle,
            texture.width,
            texture.height,
            texture.format()
        );
        Ok(RegistrationToken {
            handle: texture.handle,
            texture: Some(texture.clone()),
            access,
            state: TokenState::Registered,
            generation: 0,
            live: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn map_for_compute(&self, token: &mut RegistrationToken) -> Result<MappedArray> {
        match token.state {
            TokenState::Registered => {}
            TokenState::Mapped => {
                return Err(HistogramError::MappingError(format!(
                    "texture {} is already mapped",
                    token.handle
                )));
            }
            TokenState::Disposed => {
                return Err(HistogramError::MappingError(format!(
                    "texture {} was disposed",
                    token.handle
                )));
            }
        }
        let Some(texture) = token.texture.as_ref() else {
            return Err(HistogramError::MappingError(format!(
                "texture {} has no backing allocation",
                token.handle
            )));
        };

        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("histogram.mapped_array"),
            format: Some(texture.format()),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });

        token.generation += 1;
        token.state = TokenState::Mapped;
        Ok(MappedArray {
            view,
            handle: token.handle,
            width: texture.width,
            height: texture.height,
            generation: token.generation,
            live: token.live.clone(),
        })
    }

    pub fn unmap(&self, token: &mut RegistrationToken, array: MappedArray) -> Result<()> {
        if token.state != TokenState::Mapped {
            return Err(HistogramError::MappingError(format!(
                "texture {} is not mapped ({:?})",
                token.handle, token.state
            )));
        }
        if array.handle != token.handle || array.generation != token.generation {
            return Err(HistogramError::MappingError(format!(
                "mapped array for texture {} (map #{}) does not belong to this token (texture {}, map #{})",
                array.handle, array.generation, token.handle, token.generation
            )));
        }
        drop(array);
        token.state = TokenState::Registered;
        Ok(())
    }

    /// Deregister. Safe to call any number of times.
    pub fn dispose(&mut self, token: &mut RegistrationToken) {
        if token.state == TokenState::Disposed {
            return;
        }
        if token.state == TokenState::Mapped {
            debug!("disposing texture {} while mapped", token.handle);
        }
        token.live.store(false, Ordering::Release);
        token.texture = None;
        token.state = TokenState::Disposed;
        self.registered.remove(&token.handle);
        debug!("deregistered texture {}", token.handle);
    }
}

fn validate_texture(
    ctx: &ComputeContext,
    texture: &GraphicsTexture,
    access: AccessMode,
) -> Result<()> {
    let handle = texture.handle;
    if handle == 0 {
        return Err(HistogramError::registration(handle, "handle 0 is not a texture"));
    }
    if texture.width == 0 || texture.height == 0 {
        return Err(HistogramError::registration(
            handle,
            format!("empty texture {}x{}", texture.width, texture.height),
        ));
    }
    if texture.context != ctx.gpu().id() {
        return Err(HistogramError::registration(
            handle,
            "texture was created on a different device",
        ));
    }

    let raw = &texture.texture;
    if raw.width() != texture.width || raw.height() != texture.height {
        return Err(HistogramError::registration(
            handle,
            format!(
                "declared size {}x{} does not match allocation {}x{}",
                texture.width,
                texture.height,
                raw.width(),
                raw.height()
            ),
        ));
    }
    if raw.dimension() != wgpu::TextureDimension::D2 || raw.sample_count() != 1 {
        return Err(HistogramError::registration(
            handle,
            "only single-sampled 2D textures can be registered",
        ));
    }
    if !is_supported_format(raw.format()) {
        return Err(HistogramError::registration(
            handle,
            format!("unsupported format {:?}; expected R32Float or R16Float", raw.format()),
        ));
    }

    let required = match access {
        AccessMode::ReadOnly => wgpu::TextureUsages::TEXTURE_BINDING,
    };
    if !raw.usage().contains(required) {
        return Err(HistogramError::registration(
            handle,
            format!("texture usage {:?} lacks {:?}", raw.usage(), required),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::{GpuContext, initialize_device};

    fn make_texture(
        ctx: &ComputeContext,
        handle: u64,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> GraphicsTexture {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("bridge.test"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        GraphicsTexture::new(handle, size.0, size.1, ctx.gpu().id(), texture)
    }

    fn sampled() -> wgpu::TextureUsages {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
    }

    #[test]
    fn supported_formats_are_single_channel_float() {
        assert!(is_supported_format(wgpu::TextureFormat::R32Float));
        assert!(is_supported_format(wgpu::TextureFormat::R16Float));
        assert!(!is_supported_format(wgpu::TextureFormat::Rgba32Float));
        assert!(!is_supported_format(wgpu::TextureFormat::R32Uint));
    }

    #[test]
    fn state_machine_round_trip() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping bridge state test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let mut bridge = ResourceBridge::new();
        let texture = make_texture(&ctx, 7, (4, 4), wgpu::TextureFormat::R32Float, sampled());

        let mut token = bridge
            .register_texture(&ctx, &texture, AccessMode::ReadOnly)
            .expect("register");
        assert_eq!(token.state(), TokenState::Registered);

        let array = bridge.map_for_compute(&mut token).expect("map");
        assert_eq!(token.state(), TokenState::Mapped);
        assert!(matches!(
            bridge.map_for_compute(&mut token),
            Err(HistogramError::MappingError(_))
        ));

        bridge.unmap(&mut token, array).expect("unmap");
        assert_eq!(token.state(), TokenState::Registered);

        let array = bridge.map_for_compute(&mut token).expect("remap");
        assert!(array.is_live());
        bridge.dispose(&mut token);
        assert!(!array.is_live());
        assert_eq!(token.state(), TokenState::Disposed);
        assert!(!bridge.is_registered(7));

        bridge.dispose(&mut token);
        assert_eq!(token.state(), TokenState::Disposed);
        assert!(bridge.map_for_compute(&mut token).is_err());
    }

    #[test]
    fn unmap_rejects_arrays_from_an_older_map() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping stale array test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let mut bridge = ResourceBridge::new();
        let a = make_texture(&ctx, 1, (2, 2), wgpu::TextureFormat::R32Float, sampled());
        let b = make_texture(&ctx, 2, (2, 2), wgpu::TextureFormat::R32Float, sampled());
        let mut token_a = bridge.register_texture(&ctx, &a, AccessMode::ReadOnly).unwrap();
        let mut token_b = bridge.register_texture(&ctx, &b, AccessMode::ReadOnly).unwrap();

        let array_a = bridge.map_for_compute(&mut token_a).unwrap();
        let array_b = bridge.map_for_compute(&mut token_b).unwrap();
        assert!(matches!(
            bridge.unmap(&mut token_a, array_b),
            Err(HistogramError::MappingError(_))
        ));
        bridge.unmap(&mut token_a, array_a).unwrap();
    }

    #[test]
    fn registration_rejects_bad_textures() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping registration validation test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let mut bridge = ResourceBridge::new();

        let zero = make_texture(&ctx, 0, (4, 4), wgpu::TextureFormat::R32Float, sampled());
        let rgba = make_texture(&ctx, 10, (4, 4), wgpu::TextureFormat::Rgba8Unorm, sampled());
        let no_binding = make_texture(
            &ctx,
            11,
            (4, 4),
            wgpu::TextureFormat::R32Float,
            wgpu::TextureUsages::COPY_DST,
        );
        let ok = make_texture(&ctx, 12, (4, 4), wgpu::TextureFormat::R32Float, sampled());
        let lying = GraphicsTexture::new(13, 8, 8, ctx.gpu().id(), ok.wgpu_texture().clone());

        for bad in [&zero, &rgba, &no_binding, &lying] {
            let err = bridge
                .register_texture(&ctx, bad, AccessMode::ReadOnly)
                .expect_err("texture should be rejected");
            assert!(
                matches!(err, HistogramError::RegistrationError { .. }),
                "unexpected error: {err}"
            );
        }

        let token = bridge.register_texture(&ctx, &ok, AccessMode::default()).unwrap();
        assert_eq!(token.access(), AccessMode::ReadOnly);
        assert!(matches!(
            bridge.register_texture(&ctx, &ok, AccessMode::ReadOnly),
            Err(HistogramError::RegistrationError { .. })
        ));
    }

    #[test]
    fn registration_rejects_foreign_device_textures() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping foreign device test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let other = ComputeContext::attach(&GpuContext::from_shared(
            gpu.device.clone(),
            gpu.queue.clone(),
        ));
        let texture = make_texture(&other, 5, (2, 2), wgpu::TextureFormat::R32Float, sampled());
        let mut bridge = ResourceBridge::new();
        assert!(matches!(
            bridge.register_texture(&ctx, &texture, AccessMode::ReadOnly),
            Err(HistogramError::RegistrationError { .. })
        ));
    }
}
