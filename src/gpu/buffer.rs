//! Device-resident bin counters, the bin edges they are filled against,
//! and the host mirror of the counters.

use std::sync::mpsc::{self, Receiver};

use log::debug;
use wgpu::util::DeviceExt;

use super::context::ComputeContext;
use crate::config::HistogramSpec;
use crate::error::{HistogramError, Result};

const COUNTER_SIZE: u64 = std::mem::size_of::<u32>() as u64;

pub struct DeviceHistogramBuffer {
    num_bins: u32,
    counters: wgpu::Buffer,
    edges: wgpu::Buffer,
    staging: wgpu::Buffer,
    host: Vec<u32>,
    released: bool,
}

impl DeviceHistogramBuffer {
    pub fn new(ctx: &ComputeContext, spec: &HistogramSpec) -> Result<Self> {
        let num_bins = spec.num_bins();
        let size = num_bins as u64 * COUNTER_SIZE;
        let max = ctx.device().limits().max_storage_buffer_binding_size as u64;
        if size > max {
            return Err(HistogramError::InvalidSpec(format!(
                "{num_bins} bins need {size} bytes, device allows {max}"
            )));
        }

        let edges = spec.bin_edges_f32();

        let (counters, edges, staging) = ctx.scoped(
            |reason| HistogramError::ContextError(format!("cannot allocate histogram buffer: {reason}")),
            |device| {
                let counters = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("histogram.counters"),
                    size,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let edges = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("histogram.bin_edges"),
                    contents: bytemuck::cast_slice(&edges),
                    usage: wgpu::BufferUsages::STORAGE,
                });
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("histogram.readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (counters, edges, staging)
            },
        )?;

        Ok(DeviceHistogramBuffer {
            num_bins,
            counters,
            edges,
            staging,
            host: vec![0; num_bins as usize],
            released: false,
        })
    }

    pub fn num_bins(&self) -> u32 {
        self.num_bins
    }

    pub fn counters(&self) -> &wgpu::Buffer {
        &self.counters
    }

    /// Lower edge of every bin, see [`HistogramSpec::bin_edges_f32`].
    pub fn edges(&self) -> &wgpu::Buffer {
        &self.edges
    }

    /// Host mirror as of the last [`read_back`](Self::read_back).
    pub fn host(&self) -> &[u32] {
        &self.host
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Record a zero fill of every counter.
    pub fn encode_zero(&self, encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        self.ensure_alive()?;
        encoder.clear_buffer(&self.counters, 0, None);
        Ok(())
    }

    /// Copy the counters into the host mirror. Waits for all work queued
    /// before it.
    pub fn read_back(&mut self, ctx: &ComputeContext) -> Result<&[u32]> {
        self.ensure_alive()?;
        let size = self.num_bins as u64 * COUNTER_SIZE;

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("histogram.readback.encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.counters, 0, &self.staging, 0, size);
        ctx.queue().submit(Some(encoder.finish()));

        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.finish_map(ctx, rx)?;

        {
            let data = slice.get_mapped_range();
            self.host
                .copy_from_slice(bytemuck::cast_slice::<u8, u32>(&data));
        }
        self.staging.unmap();
        Ok(&self.host)
    }

    /// Wait for a pending staging map. On failure the map is cancelled so
    /// the next readback can map again.
    fn finish_map(
        &self,
        ctx: &ComputeContext,
        rx: Receiver<std::result::Result<(), wgpu::BufferAsyncError>>,
    ) -> Result<()> {
        let outcome = ctx.wait_idle().and_then(|()| match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HistogramError::LaunchError(format!(
                "histogram readback map failed: {e}"
            ))),
            Err(_) => Err(HistogramError::LaunchError(
                "histogram readback callback was dropped".into(),
            )),
        });
        if outcome.is_err() {
            self.staging.unmap();
        }
        outcome
    }

    /// Free the device allocations. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.counters.destroy();
        self.edges.destroy();
        self.staging.destroy();
        self.released = true;
        debug!("released histogram buffer ({} bins)", self.num_bins);
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.released {
            Err(HistogramError::LaunchError(
                "histogram buffer was released".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::initialize_device;

    #[test]
    fn zeroed_buffer_reads_back_zeros() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping histogram buffer test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let spec = HistogramSpec::new(5, 0.0, 1.0).unwrap();
        let mut buffer = DeviceHistogramBuffer::new(&ctx, &spec).expect("buffer");

        ctx.queue()
            .write_buffer(buffer.counters(), 0, bytemuck::cast_slice(&[3u32, 1, 4, 1, 5]));
        assert_eq!(buffer.read_back(&ctx).unwrap(), &[3, 1, 4, 1, 5]);

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        buffer.encode_zero(&mut encoder).unwrap();
        ctx.queue().submit(Some(encoder.finish()));
        assert_eq!(buffer.read_back(&ctx).unwrap(), &[0; 5]);

        buffer.release();
        buffer.release();
        assert!(buffer.is_released());
        assert!(matches!(
            buffer.read_back(&ctx),
            Err(HistogramError::LaunchError(_))
        ));
    }

    #[test]
    fn failed_readback_leaves_staging_mappable() {
        let Ok(gpu) = initialize_device(0) else {
            eprintln!("No adapter available; skipping readback recovery test.");
            return;
        };
        let ctx = ComputeContext::attach(&gpu);
        let spec = HistogramSpec::new(3, 0.0, 1.0).unwrap();
        let mut buffer = DeviceHistogramBuffer::new(&ctx, &spec).expect("buffer");

        // A map whose completion is never delivered, as when the wait fails.
        let (tx, rx) = mpsc::channel();
        buffer
            .staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, |_| {});
        drop(tx);
        assert!(matches!(
            buffer.finish_map(&ctx, rx),
            Err(HistogramError::LaunchError(_))
        ));

        ctx.queue()
            .write_buffer(buffer.counters(), 0, bytemuck::cast_slice(&[2u32, 7, 1]));
        assert_eq!(buffer.read_back(&ctx).unwrap(), &[2, 7, 1]);
    }
}
