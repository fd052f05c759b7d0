//! The per-frame histogram orchestrator.
//!
//! A calculator owns one compute session: the context, the loaded kernel,
//! the counter buffer and the registration of the provider's texture. The
//! texture stays mapped between calls. Before every calculation the
//! provider is asked for its current texture; if it was reallocated the
//! session drops the old registration and maps the new allocation.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{CalculatorConfig, HistogramSpec};
use crate::error::{HistogramError, Result};
use crate::gpu::bridge::{
    AccessMode, GraphicsTexture, MappedArray, RegistrationToken, ResourceBridge,
};
use crate::gpu::buffer::DeviceHistogramBuffer;
use crate::gpu::context::{ComputeContext, GpuContext};
use crate::gpu::kernel::{
    ENTRY_FUNCTION, KernelFunction, KernelModule, KernelParams, SAMPLER_SYMBOL, TextureBinding,
    TextureBindingSlot,
};
use crate::gpu::texture::TextureProvider;
use crate::histogram::region::RegionOfInterest;
use crate::histogram::result::HistogramResult;

#[derive(Debug, Clone, PartialEq)]
pub enum CalculatorStatus {
    Uninitialized,
    Ready,
    Failed { error: HistogramError, attempts: u32 },
    Disposed,
}

struct Session {
    ctx: ComputeContext,
    kernel: KernelModule,
    function: KernelFunction,
    slot: TextureBindingSlot,
    buffer: DeviceHistogramBuffer,
    bridge: ResourceBridge,
    token: RegistrationToken,
    mapped: Option<(MappedArray, TextureBinding)>,
    texture: GraphicsTexture,
}

impl Session {
    fn open(config: &CalculatorConfig, gpu: &GpuContext, texture: &GraphicsTexture) -> Result<Self> {
        let ctx = ComputeContext::attach(gpu);
        let kernel = KernelModule::load(&ctx, &config.kernel_path)?;
        let function = kernel.resolve_function(ENTRY_FUNCTION)?.clone();
        let slot = kernel.resolve_texture_binding(SAMPLER_SYMBOL)?.clone();

        let mut buffer = DeviceHistogramBuffer::new(&ctx, &config.histogram)?;
        let mut bridge = ResourceBridge::new();
        let token = match bridge.register_texture(&ctx, texture, AccessMode::ReadOnly) {
            Ok(token) => token,
            Err(err) => {
                buffer.release();
                return Err(err);
            }
        };

        // From here on Drop releases whatever was acquired.
        let mut session = Session {
            ctx,
            kernel,
            function,
            slot,
            buffer,
            bridge,
            token,
            mapped: None,
            texture: texture.clone(),
        };
        session.map()?;
        Ok(session)
    }

    fn map(&mut self) -> Result<()> {
        let array = self.bridge.map_for_compute(&mut self.token)?;
        let binding = match self.kernel.bind_array_to_sampler(
            &self.ctx,
            &self.slot,
            &array,
            &self.buffer,
        ) {
            Ok(binding) => binding,
            Err(err) => {
                if let Err(unmap_err) = self.bridge.unmap(&mut self.token, array) {
                    debug!("unmap after failed bind: {unmap_err}");
                }
                return Err(err);
            }
        };
        self.mapped = Some((array, binding));
        Ok(())
    }

    fn unmap(&mut self) {
        if let Some((array, binding)) = self.mapped.take() {
            drop(binding);
            if let Err(err) = self.bridge.unmap(&mut self.token, array) {
                debug!("unmap texture {}: {err}", self.token.handle());
            }
        }
    }

    /// Swap the registration over to a reallocated texture.
    fn remap(&mut self, texture: &GraphicsTexture) -> Result<()> {
        info!(
            "texture reallocated: {} ({}x{}) -> {} ({}x{}), remapping",
            self.texture.handle(),
            self.texture.width(),
            self.texture.height(),
            texture.handle(),
            texture.width(),
            texture.height()
        );
        self.unmap();
        self.bridge.dispose(&mut self.token);
        self.token = self
            .bridge
            .register_texture(&self.ctx, texture, AccessMode::ReadOnly)?;
        self.texture = texture.clone();
        self.map()
    }

    fn run(&mut self, region: &RegionOfInterest, spec: &HistogramSpec) -> Result<HistogramResult> {
        if self.mapped.is_none() {
            self.map()?;
        }
        let Some((array, binding)) = self.mapped.as_ref() else {
            return Err(HistogramError::MappingError(
                "texture is not mapped for compute".into(),
            ));
        };
        let (width, height) = array.size();
        let window = region.texel_window(width, height);

        let ctx = &self.ctx;
        let kernel = &self.kernel;
        let function = &self.function;
        let buffer = &self.buffer;
        ctx.scoped(
            HistogramError::LaunchError,
            |device| -> Result<()> {
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("histogram.calculate"),
                });
                buffer.encode_zero(&mut encoder)?;
                if let Some(window) = window {
                    let params = KernelParams::new(region, spec, (width, height), window);
                    kernel.encode_launch(ctx, &mut encoder, function, binding, &params);
                }
                ctx.queue().submit(Some(encoder.finish()));
                Ok(())
            },
        )??;
        ctx.wait_idle()?;

        let counts = self.buffer.read_back(&self.ctx)?;
        Ok(HistogramResult::from(counts))
    }

    fn release(&mut self) {
        self.unmap();
        self.bridge.dispose(&mut self.token);
        self.buffer.release();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

/// Computes region histograms of a provider's texture on the GPU.
pub struct HistogramCalculator {
    config: CalculatorConfig,
    provider: Arc<dyn TextureProvider>,
    status: CalculatorStatus,
    session: Option<Session>,
    last: HistogramResult,
}

impl HistogramCalculator {
    /// No GPU work happens until [`initialize`](Self::initialize).
    pub fn new(config: CalculatorConfig, provider: Arc<dyn TextureProvider>) -> Self {
        HistogramCalculator {
            config,
            provider,
            status: CalculatorStatus::Uninitialized,
            session: None,
            last: HistogramResult::default(),
        }
    }

    /// Validate a raw bin layout and build a calculator with default
    /// settings around it.
    pub fn with_spec(
        num_bins: i64,
        min_value: f64,
        max_value: f64,
        provider: Arc<dyn TextureProvider>,
    ) -> Result<Self> {
        let spec = HistogramSpec::new(num_bins, min_value, max_value)?;
        Ok(Self::new(CalculatorConfig::new(spec), provider))
    }

    pub fn spec(&self) -> &HistogramSpec {
        &self.config.histogram
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn status(&self) -> &CalculatorStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == CalculatorStatus::Ready
    }

    /// Most recent successful result; empty before the first one.
    pub fn last_result(&self) -> &HistogramResult {
        &self.last
    }

    /// Open the compute session and map `texture`. The calling thread
    /// becomes the owner of the compute context.
    pub fn initialize(&mut self, texture: &GraphicsTexture) -> Result<()> {
        let attempts = match &self.status {
            CalculatorStatus::Ready => return Ok(()),
            CalculatorStatus::Disposed => {
                return Err(HistogramError::ContextError(
                    "calculator was disposed".into(),
                ));
            }
            CalculatorStatus::Failed { attempts, .. } => *attempts,
            CalculatorStatus::Uninitialized => 0,
        };

        let gpu = self.provider.gpu();
        match Session::open(&self.config, &gpu, texture) {
            Ok(session) => {
                info!(
                    "histogram calculator ready: {} bins over [{}, {}), texture {} ({}x{})",
                    self.config.histogram.num_bins(),
                    self.config.histogram.min_value(),
                    self.config.histogram.max_value(),
                    texture.handle(),
                    texture.width(),
                    texture.height()
                );
                self.session = Some(session);
                self.status = CalculatorStatus::Ready;
                Ok(())
            }
            Err(error) => {
                self.status = CalculatorStatus::Failed {
                    error: error.clone(),
                    attempts: attempts + 1,
                };
                Err(error)
            }
        }
    }

    /// Whether another [`initialize`](Self::initialize) is worth trying.
    pub fn should_retry(&self) -> bool {
        match &self.status {
            CalculatorStatus::Uninitialized => true,
            CalculatorStatus::Failed { error, .. } => self.config.retry_policy.allows_retry(error),
            CalculatorStatus::Ready | CalculatorStatus::Disposed => false,
        }
    }

    /// Histogram of `region`. On any failure the previous result is
    /// returned unchanged.
    pub fn calculate(&mut self, region: &RegionOfInterest) -> HistogramResult {
        match self.try_calculate(region) {
            Ok(result) => result,
            Err(err) => {
                if self.is_ready() {
                    warn!("histogram calculation failed: {err}");
                } else {
                    debug!("histogram calculation skipped: {err}");
                }
                self.last.clone()
            }
        }
    }

    pub fn try_calculate(&mut self, region: &RegionOfInterest) -> Result<HistogramResult> {
        let session = match (&self.status, self.session.as_mut()) {
            (CalculatorStatus::Ready, Some(session)) => session,
            (CalculatorStatus::Disposed, _) => {
                return Err(HistogramError::ContextError(
                    "calculator was disposed".into(),
                ));
            }
            _ => {
                return Err(HistogramError::ContextError(
                    "calculator is not initialized".into(),
                ));
            }
        };

        session.ctx.ensure_current()?;
        if let Some(current) = self.provider.texture() {
            if !current.same_allocation(&session.texture) {
                session.remap(&current)?;
            }
        }

        let result = session.run(region, &self.config.histogram)?;
        self.last = result.clone();
        Ok(result)
    }

    /// Rebind the compute context to the calling thread.
    pub fn make_current(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.ctx.make_current();
        }
    }

    /// Release every GPU resource. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.status == CalculatorStatus::Disposed {
            return;
        }
        if let Some(mut session) = self.session.take() {
            session.release();
        }
        self.status = CalculatorStatus::Disposed;
        debug!("histogram calculator disposed");
    }
}
