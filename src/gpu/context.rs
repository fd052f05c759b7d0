//! Device and compute-context ownership.
//!
//! `GpuContext` is the device/queue pair shared with the render side; the
//! textures the histogram reads are created on it. `ComputeContext` is the
//! calculator's own session on that device. It remembers the thread that
//! created it and refuses work from any other thread until that thread calls
//! [`ComputeContext::make_current`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use log::{debug, info};

use crate::error::{HistogramError, Result};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a device, used to reject textures created elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

impl From<wgpu::AdapterInfo> for AdapterSummary {
    fn from(info: wgpu::AdapterInfo) -> Self {
        AdapterSummary {
            name: info.name,
            backend: info.backend,
            device_type: info.device_type,
        }
    }
}

/// Device + queue, cheap to clone.
#[derive(Clone)]
pub struct GpuContext {
    id: ContextId,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter: Option<AdapterSummary>,
}

impl GpuContext {
    /// Wrap a device that the render side already owns.
    pub fn from_shared(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        GpuContext {
            id: ContextId::next(),
            device,
            queue,
            adapter: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("id", &self.id)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

/// Open a headless device on the `index`-th adapter of any backend.
pub fn initialize_device(index: usize) -> Result<GpuContext> {
    pollster::block_on(initialize_device_async(index))
}

async fn initialize_device_async(index: usize) -> Result<GpuContext> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    let available = adapters.len();
    for adapter in &adapters {
        debug!("adapter: {}", AdapterSummary::from(adapter.get_info()));
    }

    let adapter = adapters
        .into_iter()
        .nth(index)
        .ok_or(HistogramError::DeviceUnavailable { index, available })?;
    let summary = AdapterSummary::from(adapter.get_info());

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("texture-histogram"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            ..Default::default()
        })
        .await
        .map_err(|e| HistogramError::ContextError(format!("device request failed: {e}")))?;

    info!("opened device on {summary}");

    Ok(GpuContext {
        id: ContextId::next(),
        device: Arc::new(device),
        queue: Arc::new(queue),
        adapter: Some(summary),
    })
}

/// The calculator's session on a device.
pub struct ComputeContext {
    gpu: GpuContext,
    owner: ThreadId,
}

impl ComputeContext {
    pub fn attach(gpu: &GpuContext) -> Self {
        ComputeContext {
            gpu: gpu.clone(),
            owner: thread::current().id(),
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    /// Rebind the context to the calling thread.
    pub fn make_current(&mut self) {
        let current = thread::current().id();
        if current != self.owner {
            debug!("compute context moved from {:?} to {:?}", self.owner, current);
            self.owner = current;
        }
    }

    pub fn is_current(&self) -> bool {
        self.owner == thread::current().id()
    }

    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(HistogramError::ContextError(format!(
                "context is current on {:?}, called from {:?}; call make_current() first",
                self.owner,
                thread::current().id()
            )))
        }
    }

    /// Run `f` inside a validation error scope and surface anything wgpu
    /// reported as `map_err(message)`.
    pub(crate) fn scoped<T>(
        &self,
        map_err: impl FnOnce(String) -> HistogramError,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T> {
        let device = self.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(device);
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(map_err(err.to_string())),
            None => Ok(value),
        }
    }

    /// Block until every submitted command has finished.
    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| HistogramError::LaunchError(format!("device synchronization failed: {e}")))
    }
}
