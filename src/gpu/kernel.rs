//! Kernel loading and the binding table.
//!
//! Kernel sources are parsed and validated with naga before anything
//! touches the device. Every symbol the calculator relies on is resolved
//! and type-checked once here, so a renamed global or a drifted uniform
//! layout fails at load time with `SymbolNotFound` instead of producing a
//! silently wrong histogram.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use log::debug;

use super::bridge::MappedArray;
use super::buffer::DeviceHistogramBuffer;
use super::context::ComputeContext;
use crate::config::HistogramSpec;
use crate::error::{HistogramError, Result};
use crate::histogram::region::{RegionOfInterest, TexelWindow, texel_step};

pub const ENTRY_FUNCTION: &str = "accumulate_histogram";
pub const SAMPLER_SYMBOL: &str = "source_texture";
pub const COUNTERS_SYMBOL: &str = "histogram_bins";
pub const PARAMS_SYMBOL: &str = "params";
pub const EDGES_SYMBOL: &str = "bin_edges";

/// Uniform block consumed by the accumulation kernel. Must match
/// `HistogramParams` in the WGSL source byte for byte.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub region: [f32; 4],
    pub step: [f32; 2],
    pub value_range: [f32; 2],
    pub origin: [u32; 2],
    pub extent: [u32; 2],
    pub num_bins: u32,
    pub _pad: [u32; 3],
}

impl KernelParams {
    pub fn new(
        region: &RegionOfInterest,
        spec: &HistogramSpec,
        texture_size: (u32, u32),
        window: TexelWindow,
    ) -> Self {
        let (step_x, step_y) = texel_step(texture_size.0, texture_size.1);
        KernelParams {
            region: region.as_f32(),
            step: [step_x, step_y],
            value_range: [spec.min_value() as f32, spec.bin_width() as f32],
            origin: window.origin,
            extent: window.extent,
            num_bins: spec.num_bins(),
            _pad: [0; 3],
        }
    }
}

const PARAMS_SIZE: u64 = std::mem::size_of::<KernelParams>() as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelFunction {
    pub name: String,
    pub workgroup_size: [u32; 3],
}

impl KernelFunction {
    /// Workgroups needed to cover `extent` texels.
    pub fn dispatch_size(&self, extent: [u32; 2]) -> (u32, u32) {
        (
            extent[0].div_ceil(self.workgroup_size[0].max(1)),
            extent[1].div_ceil(self.workgroup_size[1].max(1)),
        )
    }
}

/// Named texture global inside a kernel module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBindingSlot {
    pub name: String,
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    pub name: String,
    pub group: u32,
    pub binding: u32,
}

/// Every symbol the calculator binds, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTable {
    pub function: KernelFunction,
    pub sampler: TextureBindingSlot,
    pub counters: BufferSlot,
    pub params: BufferSlot,
    pub edges: BufferSlot,
}

/// Parsed and validated kernel source, not yet on a device.
#[derive(Debug)]
pub struct KernelSource {
    label: String,
    wgsl: String,
    module: naga::Module,
}

impl KernelSource {
    /// Read a kernel file. `.comp` and `.glsl` files are GLSL compute
    /// shaders and are translated to WGSL; anything else is WGSL.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HistogramError::module_load(&label, format!("cannot read file: {e}")))?;

        let is_glsl = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("comp") | Some("glsl")
        );
        let wgsl = if is_glsl {
            glsl_compute_to_wgsl(&text).map_err(|reason| HistogramError::module_load(&label, reason))?
        } else {
            text
        };
        Self::from_wgsl(label, wgsl)
    }

    pub fn from_wgsl(label: impl Into<String>, wgsl: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let wgsl = wgsl.into();
        let module = naga::front::wgsl::parse_str(&wgsl)
            .map_err(|e| HistogramError::module_load(&label, format_naga_error(&wgsl, &e)))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .map_err(|e| HistogramError::module_load(&label, format!("validation failed: {e:?}")))?;
        Ok(KernelSource { label, wgsl, module })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn wgsl(&self) -> &str {
        &self.wgsl
    }

    pub fn resolve_function(&self, name: &str) -> Result<KernelFunction> {
        let entry = self
            .module
            .entry_points
            .iter()
            .find(|ep| ep.name == name)
            .ok_or_else(|| HistogramError::symbol(name, "no entry point with this name"))?;
        if entry.stage != naga::ShaderStage::Compute {
            return Err(HistogramError::symbol(
                name,
                format!("entry point is a {:?} shader, not compute", entry.stage),
            ));
        }
        Ok(KernelFunction {
            name: entry.name.clone(),
            workgroup_size: entry.workgroup_size,
        })
    }

    pub fn resolve_texture_binding(&self, name: &str) -> Result<TextureBindingSlot> {
        let (var, ty) = self.global(name)?;
        match ty {
            naga::TypeInner::Image {
                dim: naga::ImageDimension::D2,
                arrayed: false,
                class:
                    naga::ImageClass::Sampled {
                        kind: naga::ScalarKind::Float,
                        multi: false,
                    },
            } => {}
            other => {
                return Err(HistogramError::symbol(
                    name,
                    format!("expected texture_2d<f32>, found {other:?}"),
                ));
            }
        }
        let (group, binding) = resource_binding(name, var)?;
        Ok(TextureBindingSlot {
            name: name.to_string(),
            group,
            binding,
        })
    }

    fn resolve_counters(&self, name: &str) -> Result<BufferSlot> {
        let (var, ty) = self.global(name)?;
        let writable = matches!(
            var.space,
            naga::AddressSpace::Storage { access } if access.contains(naga::StorageAccess::STORE)
        );
        if !writable {
            return Err(HistogramError::symbol(
                name,
                format!("expected var<storage, read_write>, found {:?}", var.space),
            ));
        }
        let element_ok = match ty {
            naga::TypeInner::Array { base, .. } => matches!(
                self.module.types[*base].inner,
                naga::TypeInner::Atomic(naga::Scalar {
                    kind: naga::ScalarKind::Uint,
                    width: 4,
                })
            ),
            _ => false,
        };
        if !element_ok {
            return Err(HistogramError::symbol(
                name,
                "expected array<atomic<u32>>",
            ));
        }
        let (group, binding) = resource_binding(name, var)?;
        Ok(BufferSlot {
            name: name.to_string(),
            group,
            binding,
        })
    }

    fn resolve_edges(&self, name: &str) -> Result<BufferSlot> {
        let (var, ty) = self.global(name)?;
        let read_only = matches!(
            var.space,
            naga::AddressSpace::Storage { access } if !access.contains(naga::StorageAccess::STORE)
        );
        if !read_only {
            return Err(HistogramError::symbol(
                name,
                format!("expected var<storage, read>, found {:?}", var.space),
            ));
        }
        let element_ok = match ty {
            naga::TypeInner::Array { base, .. } => matches!(
                self.module.types[*base].inner,
                naga::TypeInner::Scalar(naga::Scalar {
                    kind: naga::ScalarKind::Float,
                    width: 4,
                })
            ),
            _ => false,
        };
        if !element_ok {
            return Err(HistogramError::symbol(name, "expected array<f32>"));
        }
        let (group, binding) = resource_binding(name, var)?;
        Ok(BufferSlot {
            name: name.to_string(),
            group,
            binding,
        })
    }

    fn resolve_params(&self, name: &str) -> Result<BufferSlot> {
        let (var, ty) = self.global(name)?;
        if var.space != naga::AddressSpace::Uniform {
            return Err(HistogramError::symbol(
                name,
                format!("expected var<uniform>, found {:?}", var.space),
            ));
        }
        let size = ty.size(self.module.to_ctx()) as u64;
        if size != PARAMS_SIZE {
            return Err(HistogramError::symbol(
                name,
                format!("uniform is {size} bytes, host layout is {PARAMS_SIZE} bytes"),
            ));
        }
        let (group, binding) = resource_binding(name, var)?;
        Ok(BufferSlot {
            name: name.to_string(),
            group,
            binding,
        })
    }

    /// Resolve and check every symbol the calculator binds.
    pub fn binding_table(&self) -> Result<BindingTable> {
        let table = BindingTable {
            function: self.resolve_function(ENTRY_FUNCTION)?,
            sampler: self.resolve_texture_binding(SAMPLER_SYMBOL)?,
            counters: self.resolve_counters(COUNTERS_SYMBOL)?,
            params: self.resolve_params(PARAMS_SYMBOL)?,
            edges: self.resolve_edges(EDGES_SYMBOL)?,
        };
        let groups = [
            table.sampler.group,
            table.counters.group,
            table.params.group,
            table.edges.group,
        ];
        if groups.iter().any(|&g| g != 0) {
            return Err(HistogramError::module_load(
                &self.label,
                format!("all histogram bindings must live in group 0, found groups {groups:?}"),
            ));
        }
        let mut bindings = [
            table.sampler.binding,
            table.counters.binding,
            table.params.binding,
            table.edges.binding,
        ];
        bindings.sort_unstable();
        if bindings.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(HistogramError::module_load(
                &self.label,
                format!("histogram bindings overlap: {bindings:?}"),
            ));
        }
        Ok(table)
    }

    fn global(&self, name: &str) -> Result<(&naga::GlobalVariable, &naga::TypeInner)> {
        self.module
            .global_variables
            .iter()
            .map(|(_, var)| var)
            .find(|var| var.name.as_deref() == Some(name))
            .map(|var| (var, &self.module.types[var.ty].inner))
            .ok_or_else(|| HistogramError::symbol(name, "no global with this name"))
    }
}

fn resource_binding(name: &str, var: &naga::GlobalVariable) -> Result<(u32, u32)> {
    var.binding
        .as_ref()
        .map(|rb| (rb.group, rb.binding))
        .ok_or_else(|| HistogramError::symbol(name, "global has no @group/@binding"))
}

/// Bind group tying a mapped texture and the counters to one module.
#[derive(Debug)]
pub struct TextureBinding {
    bind_group: wgpu::BindGroup,
    handle: u64,
}

impl TextureBinding {
    pub fn handle(&self) -> u64 {
        self.handle
    }
}

/// A kernel built on a device: pipeline, layout and params block.
pub struct KernelModule {
    label: String,
    table: BindingTable,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
}

impl KernelModule {
    pub fn load(ctx: &ComputeContext, path: impl AsRef<Path>) -> Result<Self> {
        let source = KernelSource::read(path)?;
        Self::build(ctx, &source)
    }

    pub fn build(ctx: &ComputeContext, source: &KernelSource) -> Result<Self> {
        let table = source.binding_table()?;
        let label = source.label().to_string();

        let (layout, pipeline, params_buffer) = ctx.scoped(
            |reason| HistogramError::module_load(&label, reason),
            |device| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("histogram.kernel"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.wgsl().to_string())),
                });

                let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("histogram.kernel.bgl"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: table.sampler.binding,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: table.counters.binding,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: table.params.binding,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: table.edges.binding,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: true },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("histogram.kernel.layout"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    });

                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("histogram.kernel.pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(table.function.name.as_str()),
                    compilation_options: Default::default(),
                    cache: None,
                });

                let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("histogram.kernel.params"),
                    size: PARAMS_SIZE,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                (layout, pipeline, params_buffer)
            },
        )?;

        debug!(
            "loaded kernel {label}: {} workgroup {:?}",
            table.function.name, table.function.workgroup_size
        );

        Ok(KernelModule {
            label,
            table,
            layout,
            pipeline,
            params_buffer,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn binding_table(&self) -> &BindingTable {
        &self.table
    }

    pub fn resolve_function(&self, name: &str) -> Result<&KernelFunction> {
        if self.table.function.name == name {
            Ok(&self.table.function)
        } else {
            Err(HistogramError::symbol(
                name,
                format!("module '{}' was built for '{}'", self.label, self.table.function.name),
            ))
        }
    }

    pub fn resolve_texture_binding(&self, sampler_name: &str) -> Result<&TextureBindingSlot> {
        if self.table.sampler.name == sampler_name {
            Ok(&self.table.sampler)
        } else {
            Err(HistogramError::symbol(
                sampler_name,
                format!("module '{}' samples '{}'", self.label, self.table.sampler.name),
            ))
        }
    }

    /// Associate `slot` with the currently mapped array and `buffer` with
    /// the counter and edge bindings. Must be called again after every remap.
    pub fn bind_array_to_sampler(
        &self,
        ctx: &ComputeContext,
        slot: &TextureBindingSlot,
        array: &MappedArray,
        buffer: &DeviceHistogramBuffer,
    ) -> Result<TextureBinding> {
        if *slot != self.table.sampler {
            return Err(HistogramError::symbol(
                slot.name.as_str(),
                "slot does not belong to this module",
            ));
        }
        if !array.is_live() {
            return Err(HistogramError::MappingError(format!(
                "mapped array for texture {} outlived its registration",
                array.handle()
            )));
        }

        let bind_group = ctx.scoped(
            |reason| HistogramError::MappingError(format!("cannot bind mapped array: {reason}")),
            |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("histogram.kernel.bg"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource: wgpu::BindingResource::TextureView(array.view()),
                        },
                        wgpu::BindGroupEntry {
                            binding: self.table.counters.binding,
                            resource: buffer.counters().as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: self.table.params.binding,
                            resource: self.params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: self.table.edges.binding,
                            resource: buffer.edges().as_entire_binding(),
                        },
                    ],
                })
            },
        )?;

        Ok(TextureBinding {
            bind_group,
            handle: array.handle(),
        })
    }

    /// Record one dispatch of `function` over `params.extent` texels.
    pub fn encode_launch(
        &self,
        ctx: &ComputeContext,
        encoder: &mut wgpu::CommandEncoder,
        function: &KernelFunction,
        binding: &TextureBinding,
        params: &KernelParams,
    ) {
        ctx.queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));

        let (groups_x, groups_y) = function.dispatch_size(params.extent);
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("histogram.kernel.pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, &binding.bind_group, &[]);
        cpass.dispatch_workgroups(groups_x, groups_y, 1);
    }
}

/// Translate a GLSL compute shader to WGSL.
pub fn glsl_compute_to_wgsl(source: &str) -> std::result::Result<String, String> {
    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: naga::ShaderStage::Compute,
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, source)
        .map_err(|e| format!("GLSL parse failed: {e:?}"))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| format!("GLSL validation failed: {e:?}"))?;

    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::EXPLICIT_TYPES)
        .map_err(|e| format!("WGSL writer failed: {e:?}"))
}

/// Parse error with a numbered listing of the offending source.
fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = format!("WGSL parse failed:\n  {error}\n\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL: &str = include_str!("../../kernels/histogram_texture.wgsl");

    #[test]
    fn params_layout_is_64_bytes() {
        assert_eq!(PARAMS_SIZE, 64);
    }

    #[test]
    fn shipped_kernel_has_a_complete_binding_table() {
        let source = KernelSource::from_wgsl("histogram_texture.wgsl", KERNEL).unwrap();
        let table = source.binding_table().unwrap();
        assert_eq!(table.function.name, ENTRY_FUNCTION);
        assert_eq!(table.function.workgroup_size, [8, 8, 1]);
        assert_eq!(table.sampler.name, SAMPLER_SYMBOL);
        assert_eq!((table.sampler.group, table.sampler.binding), (0, 0));
        assert_eq!(table.counters.binding, 1);
        assert_eq!(table.params.binding, 2);
        assert_eq!(table.edges.binding, 3);
    }

    #[test]
    fn unknown_function_is_symbol_not_found() {
        let source = KernelSource::from_wgsl("k", KERNEL).unwrap();
        assert!(matches!(
            source.resolve_function("test_float_2D"),
            Err(HistogramError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn unknown_sampler_is_symbol_not_found() {
        let source = KernelSource::from_wgsl("k", KERNEL).unwrap();
        let err = source.resolve_texture_binding("texture_float_2D").unwrap_err();
        assert!(matches!(err, HistogramError::SymbolNotFound { .. }), "{err}");
    }

    #[test]
    fn non_texture_global_is_rejected_as_sampler() {
        let source = KernelSource::from_wgsl("k", KERNEL).unwrap();
        assert!(matches!(
            source.resolve_texture_binding(PARAMS_SYMBOL),
            Err(HistogramError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn renamed_sampler_fails_the_table() {
        let drifted = KERNEL.replace("source_texture", "heat_map");
        let source = KernelSource::from_wgsl("drifted", drifted).unwrap();
        let err = source.binding_table().unwrap_err();
        match err {
            HistogramError::SymbolNotFound { symbol, .. } => assert_eq!(symbol, SAMPLER_SYMBOL),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn uniform_layout_drift_is_detected() {
        let drifted = KERNEL.replace("    _pad2: u32,\n", "    _pad2: u32,\n    extra: vec4<f32>,\n");
        let source = KernelSource::from_wgsl("drifted", drifted).unwrap();
        let err = source.binding_table().unwrap_err();
        assert!(
            matches!(err, HistogramError::SymbolNotFound { ref symbol, .. } if symbol == PARAMS_SYMBOL),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn read_only_counters_are_rejected() {
        let drifted = KERNEL
            .replace("var<storage, read_write> histogram_bins: array<atomic<u32>>;",
                     "var<storage, read> histogram_bins: array<u32>;")
            .replace("atomicAdd(&histogram_bins[bin], 1u);", "let _unused = histogram_bins[bin];");
        let source = KernelSource::from_wgsl("drifted", drifted).unwrap();
        assert!(matches!(
            source.binding_table(),
            Err(HistogramError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn writable_bin_edges_are_rejected() {
        let drifted = KERNEL.replace(
            "var<storage, read> bin_edges: array<f32>;",
            "var<storage, read_write> bin_edges: array<f32>;",
        );
        let source = KernelSource::from_wgsl("drifted", drifted).unwrap();
        assert!(matches!(
            source.binding_table(),
            Err(HistogramError::SymbolNotFound { ref symbol, .. }) if symbol == EDGES_SYMBOL
        ));
    }

    #[test]
    fn broken_source_is_module_load_error() {
        let err = KernelSource::from_wgsl("broken", "fn invalid() -> { }").unwrap_err();
        match err {
            HistogramError::ModuleLoadError { path, reason } => {
                assert_eq!(path, "broken");
                assert!(reason.contains("WGSL parse failed"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_module_load_error() {
        let err = KernelSource::read("does/not/exist.wgsl").unwrap_err();
        assert!(matches!(err, HistogramError::ModuleLoadError { .. }), "{err}");
    }

    #[test]
    fn broken_glsl_is_module_load_error() {
        let dir = std::env::temp_dir().join(format!("texture-histogram-glsl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.comp");
        std::fs::write(&path, "#version 450\nvoid main( {").unwrap();
        let err = KernelSource::read(&path).unwrap_err();
        assert!(matches!(err, HistogramError::ModuleLoadError { .. }), "{err}");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn dispatch_covers_partial_workgroups() {
        let f = KernelFunction {
            name: ENTRY_FUNCTION.into(),
            workgroup_size: [8, 8, 1],
        };
        assert_eq!(f.dispatch_size([4, 4]), (1, 1));
        assert_eq!(f.dispatch_size([16, 9]), (2, 2));
        assert_eq!(f.dispatch_size([100, 100]), (13, 13));
    }

    #[test]
    fn params_follow_region_and_spec() {
        let spec = HistogramSpec::new(10, 0.0, 1.0).unwrap();
        let region = RegionOfInterest::full();
        let window = region.texel_window(4, 4).unwrap();
        let p = KernelParams::new(&region, &spec, (4, 4), window);
        assert_eq!(p.region, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(p.step, [0.25, 0.25]);
        assert_eq!(p.value_range, [0.0, 0.1]);
        assert_eq!(p.extent, [4, 4]);
        assert_eq!(p.num_bins, 10);
    }
}
