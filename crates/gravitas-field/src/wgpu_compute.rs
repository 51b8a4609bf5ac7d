//! WebGPU backend for the vector field.
//!
//! Kernels live in `shaders/vector_field.wgsl` and are compiled once per
//! device. Grid buffers are cached per field shape and reused across calls;
//! every call uploads the host field, runs its kernels in a single
//! submission and reads the result back before touching the host field.
//!
//! ## Failure handling
//!
//! Device work runs inside an out-of-memory and a validation error scope.
//! Either scope firing turns the whole call into an error and the host field
//! is left as it was. Acquisition failures surface as `DeviceUnavailable`.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::backend::{self, Device, FieldBackend};
use crate::diffusion::DiffusionWeights;
use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};
use crate::sampling::{Impulse, Injection, TINY_NEIGHBOR_FRACTION};

const SHADER_SOURCE: &str = include_str!("shaders/vector_field.wgsl");

/// Threads per group in every kernel; all dispatches are linear.
const LINEAR_WORKGROUP: u32 = 256;

const CELL_BYTES: u64 = std::mem::size_of::<Vec2>() as u64;

/// Stride of one scatter request: a WGSL `vec4<f32>`.
const REQUEST_BYTES: u64 = 16;

/// Uniform block shared by every entry point (must match WGSL `Params`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParams {
    width: u32,
    height: u32,
    count: u32,
    _pad0: u32,
    self_weight: f32,
    neighbor_weight: f32,
    tiny_fraction: f32,
    _pad1: f32,
}

impl GpuParams {
    fn for_field(field: &VectorField) -> Self {
        Self {
            width: field.width(),
            height: field.height(),
            tiny_fraction: TINY_NEIGHBOR_FRACTION,
            ..Default::default()
        }
    }
}

/// Scatter kernels selectable for a request batch.
#[derive(Debug, Clone, Copy)]
enum Scatter {
    Add,
    Tiny,
    Burst,
}

impl Scatter {
    fn label(self) -> &'static str {
        match self {
            Scatter::Add => "add_batch",
            Scatter::Tiny => "tiny_batch",
            Scatter::Burst => "burst_batch",
        }
    }
}

/// Double-buffered device copy of one field shape plus its readback buffer.
struct GridBuffers {
    shape: (u32, u32),
    bytes: u64,
    front: wgpu::Buffer,
    back: wgpu::Buffer,
    staging: wgpu::Buffer,
}

impl GridBuffers {
    fn new(device: &wgpu::Device, shape: (u32, u32), bytes: u64) -> Self {
        let grid = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let front = grid("Field Grid A");
        let back = grid("Field Grid B");
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Field Staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            shape,
            bytes,
            front,
            back,
            staging,
        }
    }
}

impl Drop for GridBuffers {
    fn drop(&mut self) {
        self.front.destroy();
        self.back.destroy();
        self.staging.destroy();
    }
}

/// Compiled kernels and their layouts.
struct Pipelines {
    diffuse_layout: wgpu::BindGroupLayout,
    sample_layout: wgpu::BindGroupLayout,
    scatter_layout: wgpu::BindGroupLayout,
    diffuse: wgpu::ComputePipeline,
    fit: wgpu::ComputePipeline,
    add: wgpu::ComputePipeline,
    tiny: wgpu::ComputePipeline,
    burst: wgpu::ComputePipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vector Field Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        // (binding, read_only) for each storage buffer; binding 0 is the
        // uniform block.
        let layout = |label, storage: &[(u32, bool)]| {
            let mut entries = vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }];
            entries.extend(storage.iter().map(|&(binding, read_only)| {
                wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }
            }));
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
        };

        let diffuse_layout = layout("Diffuse Bind Group Layout", &[(1, true), (2, false)]);
        let sample_layout = layout(
            "Sample Bind Group Layout",
            &[(3, true), (4, true), (5, false)],
        );
        let scatter_layout = layout("Scatter Bind Group Layout", &[(6, false), (7, true)]);

        let pipeline = |label, bind_layout: &wgpu::BindGroupLayout, entry_point| {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[bind_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point,
            })
        };

        let diffuse = pipeline("Diffuse Pipeline", &diffuse_layout, "diffuse");
        let fit = pipeline("Fit Pipeline", &sample_layout, "fit_batch");
        let add = pipeline("Add Pipeline", &scatter_layout, "add_batch");
        let tiny = pipeline("Tiny Pipeline", &scatter_layout, "tiny_batch");
        let burst = pipeline("Burst Pipeline", &scatter_layout, "burst_batch");

        Self {
            diffuse_layout,
            sample_layout,
            scatter_layout,
            diffuse,
            fit,
            add,
            tiny,
            burst,
        }
    }

    fn scatter(&self, kind: Scatter) -> &wgpu::ComputePipeline {
        match kind {
            Scatter::Add => &self.add,
            Scatter::Tiny => &self.tiny,
            Scatter::Burst => &self.burst,
        }
    }
}

/// An acquired device with compiled kernels.
struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    limits: wgpu::Limits,
    pipelines: Pipelines,
    grid: Option<GridBuffers>,
}

impl GpuContext {
    async fn acquire() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| FieldError::device("No WebGPU adapter found"))?;

        let info = adapter.get_info();
        tracing::info!("Vector field GPU compute: {} ({:?})", info.name, info.backend);

        // Large grids need the adapter's full storage limits.
        let supported = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            max_compute_workgroups_per_dimension: supported.max_compute_workgroups_per_dimension,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Gravitas Field Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                },
                None,
            )
            .await
            .map_err(|e| FieldError::device(format!("Failed to create device: {}", e)))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            tracing::error!("Uncaptured WebGPU error: {}", e);
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = Pipelines::new(&device);
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(FieldError::device(format!(
                "Failed to build compute pipelines: {}",
                e
            )));
        }

        Ok(Self {
            limits: device.limits(),
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: info.name,
            pipelines,
            grid: None,
        })
    }

    /// Bytes a buffer of `count` elements of `elem` bytes needs, if the
    /// device can bind it.
    fn storage_bytes(&self, count: usize, elem: u64, what: &str) -> Result<u64> {
        let bytes = (count as u64)
            .checked_mul(elem)
            .ok_or_else(|| FieldError::exhausted(format!("{} size overflows", what)))?;
        let binding_limit = u64::from(self.limits.max_storage_buffer_binding_size);
        if bytes > binding_limit || bytes > self.limits.max_buffer_size {
            return Err(FieldError::exhausted(format!(
                "{} needs {} bytes, device binds at most {}",
                what,
                bytes,
                binding_limit.min(self.limits.max_buffer_size)
            )));
        }
        Ok(bytes)
    }

    /// Cached grid buffers for this field's shape, reallocating on change.
    fn grid_for(&mut self, field: &VectorField) -> Result<&GridBuffers> {
        let shape = field.shape();
        let stale = self.grid.as_ref().map_or(true, |g| g.shape != shape);
        if stale {
            let bytes = self.storage_bytes(field.len(), CELL_BYTES, "field")?;
            // Release the old pair before allocating the new one.
            self.grid = None;
            tracing::debug!(
                "Allocating GPU grid {}x{} ({} bytes per buffer)",
                shape.0,
                shape.1,
                bytes
            );
            self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
            let grid = GridBuffers::new(&self.device, shape, bytes);
            if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
                return Err(FieldError::exhausted(format!(
                    "GPU out of memory allocating {}x{} grid: {}",
                    shape.0, shape.1, e
                )));
            }
            self.grid = Some(grid);
        }
        self.grid
            .as_ref()
            .ok_or_else(|| FieldError::backend("grid buffers missing after allocation"))
    }

    fn params_buffer(&self, params: &GpuParams) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Field Params"),
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Workgroup grid for a 1D batch, folded into y past the per-dimension
    /// limit.
    fn linear_groups(&self, count: u32) -> Result<(u32, u32)> {
        let max = self.limits.max_compute_workgroups_per_dimension;
        let groups = count.div_ceil(LINEAR_WORKGROUP);
        if groups <= max {
            return Ok((groups, 1));
        }
        let rows = groups.div_ceil(max);
        if rows > max {
            return Err(FieldError::exhausted(format!(
                "batch of {} exceeds dispatch limits",
                count
            )));
        }
        Ok((max, rows))
    }

    /// Run `op` inside OOM and validation scopes.
    ///
    /// A scope error drops the cached grid; the next call reallocates it.
    fn scoped<T>(&mut self, op: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = op(&*self);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());

        if oom.is_some() || validation.is_some() {
            self.grid = None;
        }
        if let Some(e) = oom {
            return Err(FieldError::exhausted(format!("GPU out of memory: {}", e)));
        }
        if let Some(e) = validation {
            return Err(FieldError::backend(format!("GPU validation failed: {}", e)));
        }
        result
    }

    /// Submit `encoder` and read `bytes` from `staging` back to the host.
    fn submit_and_read<T: bytemuck::Pod>(
        &self,
        encoder: wgpu::CommandEncoder,
        staging: &wgpu::Buffer,
        bytes: u64,
    ) -> Result<Vec<T>> {
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only goes away if this call already returned.
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| FieldError::transfer(format!("Map callback dropped: {}", e)))?
            .map_err(|e| FieldError::transfer(format!("Map failed: {:?}", e)))?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(result)
    }

    fn diffuse(
        &mut self,
        field: &VectorField,
        weights: DiffusionWeights,
        iterations: u32,
    ) -> Result<Vec<Vec2>> {
        self.grid_for(field)?;
        self.scoped(|ctx| {
            let grid = ctx
                .grid
                .as_ref()
                .ok_or_else(|| FieldError::backend("grid buffers missing"))?;

            let cells = u32::try_from(field.len())
                .map_err(|_| FieldError::exhausted("field has too many cells to dispatch"))?;
            let groups = ctx.linear_groups(cells)?;
            let params = GpuParams {
                count: cells,
                self_weight: weights.self_weight,
                neighbor_weight: weights.neighbor_weight,
                ..GpuParams::for_field(field)
            };
            let params_buffer = ctx.params_buffer(&params);
            ctx.queue
                .write_buffer(&grid.front, 0, bytemuck::cast_slice(field.cells()));

            let bind = |src: &wgpu::Buffer, dst: &wgpu::Buffer| {
                ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Diffuse Bind Group"),
                    layout: &ctx.pipelines.diffuse_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: src.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: dst.as_entire_binding(),
                        },
                    ],
                })
            };
            let forward = bind(&grid.front, &grid.back);
            let backward = bind(&grid.back, &grid.front);

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Diffuse Encoder"),
                });
            for i in 0..iterations {
                let bind_group = if i % 2 == 0 { &forward } else { &backward };
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Diffuse Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&ctx.pipelines.diffuse);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(groups.0, groups.1, 1);
            }

            // Odd iteration counts finish in the back buffer.
            let result = if iterations % 2 == 1 {
                &grid.back
            } else {
                &grid.front
            };
            encoder.copy_buffer_to_buffer(result, 0, &grid.staging, 0, grid.bytes);
            ctx.submit_and_read(encoder, &grid.staging, grid.bytes)
        })
    }

    fn fit_batch(&mut self, field: &VectorField, positions: &[Vec2]) -> Result<Vec<Vec2>> {
        let count = u32::try_from(positions.len())
            .map_err(|_| FieldError::exhausted("sample batch exceeds u32 range"))?;
        let out_bytes = self.storage_bytes(positions.len(), CELL_BYTES, "sample batch")?;
        let groups = self.linear_groups(count)?;
        self.grid_for(field)?;

        self.scoped(|ctx| {
            let grid = ctx
                .grid
                .as_ref()
                .ok_or_else(|| FieldError::backend("grid buffers missing"))?;

            let params = GpuParams {
                count,
                ..GpuParams::for_field(field)
            };
            let params_buffer = ctx.params_buffer(&params);
            ctx.queue
                .write_buffer(&grid.front, 0, bytemuck::cast_slice(field.cells()));

            let points = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sample Points"),
                    contents: bytemuck::cast_slice(positions),
                    usage: wgpu::BufferUsages::STORAGE,
                });
            let out = ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Sample Results"),
                size: out_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Sample Staging"),
                size: out_bytes,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sample Bind Group"),
                layout: &ctx.pipelines.sample_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: grid.front.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: points.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: out.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Sample Encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Sample Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&ctx.pipelines.fit);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups.0, groups.1, 1);
            }
            encoder.copy_buffer_to_buffer(&out, 0, &staging, 0, out_bytes);
            ctx.submit_and_read(encoder, &staging, out_bytes)
        })
    }

    /// Run one scatter kernel over `requests` (one vec4 per request) and
    /// return the updated grid.
    fn scatter<R: bytemuck::Pod>(
        &mut self,
        kind: Scatter,
        field: &VectorField,
        requests: &[R],
    ) -> Result<Vec<Vec2>> {
        if std::mem::size_of::<R>() as u64 != REQUEST_BYTES {
            return Err(FieldError::backend("scatter request is not a vec4"));
        }
        let count = u32::try_from(requests.len())
            .map_err(|_| FieldError::exhausted("injection batch exceeds u32 range"))?;
        self.storage_bytes(requests.len(), REQUEST_BYTES, "injection batch")?;
        let groups = self.linear_groups(count)?;
        self.grid_for(field)?;

        self.scoped(|ctx| {
            let grid = ctx
                .grid
                .as_ref()
                .ok_or_else(|| FieldError::backend("grid buffers missing"))?;

            let params = GpuParams {
                count,
                ..GpuParams::for_field(field)
            };
            let params_buffer = ctx.params_buffer(&params);
            ctx.queue
                .write_buffer(&grid.front, 0, bytemuck::cast_slice(field.cells()));

            let request_buffer = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Injection Requests"),
                    contents: bytemuck::cast_slice(requests),
                    usage: wgpu::BufferUsages::STORAGE,
                });

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Scatter Bind Group"),
                layout: &ctx.pipelines.scatter_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: grid.front.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 7,
                        resource: request_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Scatter Encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(kind.label()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(ctx.pipelines.scatter(kind));
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups.0, groups.1, 1);
            }
            encoder.copy_buffer_to_buffer(&grid.front, 0, &grid.staging, 0, grid.bytes);
            ctx.submit_and_read(encoder, &grid.staging, grid.bytes)
        })
    }
}

/// Vector field backend running on a WebGPU device.
///
/// The device is acquired on construction (or lazily after [`release`]).
///
/// [`release`]: FieldBackend::release
pub struct WgpuBackend {
    context: Option<GpuContext>,
}

impl WgpuBackend {
    /// Acquire a device, blocking the calling thread.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Acquire a device.
    pub async fn new_async() -> Result<Self> {
        let context = GpuContext::acquire().await?;
        Ok(Self {
            context: Some(context),
        })
    }

    /// Name of the adapter in use, if a device is currently held.
    pub fn adapter_name(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.adapter_name.as_str())
    }

    /// Whether a device is currently held.
    pub fn is_acquired(&self) -> bool {
        self.context.is_some()
    }

    fn context(&mut self) -> Result<&mut GpuContext> {
        if self.context.is_none() {
            tracing::debug!("Re-acquiring GPU device after release");
            self.context = Some(pollster::block_on(GpuContext::acquire())?);
        }
        self.context
            .as_mut()
            .ok_or_else(|| FieldError::device("GPU context unavailable"))
    }

    fn scatter<R: bytemuck::Pod>(
        &mut self,
        kind: Scatter,
        field: &mut VectorField,
        requests: &[R],
    ) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let cells = self.context()?.scatter(kind, field, requests)?;
        field.overwrite_cells(&cells)
    }
}

impl FieldBackend for WgpuBackend {
    fn device(&self) -> Device {
        Device::Parallel
    }

    fn diffuse(
        &mut self,
        field: &mut VectorField,
        weights: DiffusionWeights,
        iterations: u32,
    ) -> Result<()> {
        weights.validate()?;
        if iterations == 0 {
            return Ok(());
        }
        let cells = self.context()?.diffuse(field, weights, iterations)?;
        field.overwrite_cells(&cells)?;
        tracing::debug!(
            "GPU diffusion: {} iteration(s) on {}x{}",
            iterations,
            field.width(),
            field.height()
        );
        Ok(())
    }

    fn fit_batch(&mut self, field: &VectorField, positions: &[Vec2]) -> Result<Vec<Vec2>> {
        backend::validate_points(positions)?;
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.context()?.fit_batch(field, positions)?;
        if out.len() != positions.len() {
            return Err(FieldError::transfer(format!(
                "readback returned {} samples for {} positions",
                out.len(),
                positions.len()
            )));
        }
        Ok(out)
    }

    fn add_batch(&mut self, field: &mut VectorField, injections: &[Injection]) -> Result<()> {
        backend::validate_injections(injections)?;
        self.scatter(Scatter::Add, field, injections)
    }

    fn tiny_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        backend::validate_impulses(impulses)?;
        self.scatter(Scatter::Tiny, field, &pack_impulses(impulses))
    }

    fn burst_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        backend::validate_impulses(impulses)?;
        self.scatter(Scatter::Burst, field, &pack_impulses(impulses))
    }

    fn release(&mut self) {
        if let Some(context) = self.context.take() {
            tracing::info!("Releasing GPU device {}", context.adapter_name);
            drop(context);
        }
    }
}

fn pack_impulses(impulses: &[Impulse]) -> Vec<[f32; 4]> {
    impulses
        .iter()
        .map(|i| [i.x, i.y, i.magnitude, 0.0])
        .collect()
}

/// Whether a WebGPU adapter can be found on this machine.
pub fn is_gpu_available() -> bool {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).is_some()
}
