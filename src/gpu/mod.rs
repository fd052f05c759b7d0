//! Compute-side plumbing: device context, texture hand-off, kernel and
//! counter buffer.

pub mod bridge;
pub mod buffer;
pub mod context;
pub mod kernel;
pub mod texture;

pub use bridge::{AccessMode, GraphicsTexture, MappedArray, RegistrationToken, ResourceBridge, TokenState};
pub use buffer::DeviceHistogramBuffer;
pub use context::{ComputeContext, ContextId, GpuContext, initialize_device};
pub use kernel::{KernelModule, KernelSource, TextureBindingSlot};
pub use texture::{FloatTexture, SharedTextureProvider, TextureProvider};
