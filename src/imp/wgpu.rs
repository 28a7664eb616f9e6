// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A [`Device`] backed by wgpu.

This crate does not ship FFT kernels.  Programs are compiled from WGSL supplied by a
[`KernelSource`], which must declare

* `@group(0) @binding(0)`: the input, a storage buffer or a texture read with `textureLoad`,
* `@group(0) @binding(1)`: the output, a storage buffer or a write-only storage texture,
* `@group(0) @binding(2)`: a uniform block `{ p: u32, offset: vec2<f32>, scale: vec2<f32> }`,

and an entry point named `main`.  Pipelines use an automatic layout, so every binding has to be
referenced by the kernel.
*/

use crate::device::{
    Binding, BufferUsage, Device, DeviceError, DeviceInfo, Dispatch, RawHandle, TextureDescriptor,
    TextureFormat, TextureRegion,
};
use crate::parameters::Parameters;
use crate::sys::time::Instant;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;
use wgpu::{PollType, Trace};

/// Provides WGSL for a kernel variant.
pub trait KernelSource: Send + Sync {
    fn wgsl(&self, parameters: &Parameters) -> String;
}

impl<F: Fn(&Parameters) -> String + Send + Sync> KernelSource for F {
    fn wgsl(&self, parameters: &Parameters) -> String {
        self(parameters)
    }
}

const UNIFORM_SIZE: u64 = 24;

#[derive(Default)]
struct State {
    next_handle: u32,
    buffers: HashMap<RawHandle, wgpu::Buffer>,
    textures: HashMap<RawHandle, (wgpu::Texture, TextureDescriptor)>,
    programs: HashMap<RawHandle, wgpu::ComputePipeline>,
}

impl State {
    fn allocate_handle(&mut self) -> RawHandle {
        self.next_handle += 1;
        RawHandle::new(self.next_handle).expect("handle counter wrapped")
    }
}

pub struct WgpuDevice {
    renderer: String,
    max_compute_invocations: u32,
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: Box<dyn KernelSource>,
    epoch: Instant,
    state: Mutex<State>,
}

fn binding_kind(binding: Binding) -> &'static str {
    match binding {
        Binding::Buffer(_) => "buffer",
        Binding::Texture(_) => "texture",
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

impl WgpuDevice {
    /// Picks the default adapter from the environment and opens a device on it.
    pub async fn request(kernels: impl KernelSource + 'static) -> Result<Self, DeviceError> {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&descriptor);
        let options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = instance
            .request_adapter(&options)
            .await
            .map_err(|_| DeviceError::NoSuchAdapter)?;
        let info = adapter.get_info();
        let limits = adapter.limits();
        logwise::info_sync!(
            "WgpuDevice: using adapter {name} ({backend})",
            name = info.name.clone(),
            backend = logwise::privacy::LogIt(&info.backend)
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: wgpu::Label::from("fft_wisdom"),
                required_features: Default::default(),
                required_limits: limits.clone(),
                memory_hints: Default::default(),
                trace: Trace::Off,
            })
            .await?;

        Ok(WgpuDevice {
            renderer: info.name,
            max_compute_invocations: limits.max_compute_invocations_per_workgroup,
            device,
            queue,
            kernels: Box::new(kernels),
            epoch: Instant::now(),
            state: Mutex::new(State::default()),
        })
    }

    /// Blocking form of [`WgpuDevice::request`].
    pub fn new(kernels: impl KernelSource + 'static) -> Result<Self, DeviceError> {
        test_executors::spin_on(Self::request(kernels))
    }

    fn view(state: &State, binding: Binding) -> Result<Option<wgpu::TextureView>, DeviceError> {
        match binding {
            Binding::Buffer(_) => Ok(None),
            Binding::Texture(h) => state
                .textures
                .get(&h)
                .map(|(t, _)| Some(t.create_view(&wgpu::TextureViewDescriptor::default())))
                .ok_or(DeviceError::UnknownHandle {
                    kind: "texture",
                    handle: h.get(),
                }),
        }
    }

    fn bind<'a>(
        state: &'a State,
        binding: Binding,
        view: Option<&'a wgpu::TextureView>,
    ) -> Result<wgpu::BindingResource<'a>, DeviceError> {
        match (binding, view) {
            (Binding::Texture(_), Some(view)) => Ok(wgpu::BindingResource::TextureView(view)),
            (Binding::Texture(h), None) | (Binding::Buffer(h), _) => state
                .buffers
                .get(&h)
                .map(|b| b.as_entire_binding())
                .ok_or(DeviceError::UnknownHandle {
                    kind: binding_kind(binding),
                    handle: h.get(),
                }),
        }
    }
}

impl Debug for WgpuDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("renderer", &self.renderer)
            .field("max_compute_invocations", &self.max_compute_invocations)
            .finish_non_exhaustive()
    }
}

impl Device for WgpuDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            renderer: self.renderer.clone(),
            max_compute_invocations: self.max_compute_invocations,
        }
    }

    fn create_buffer(
        &self,
        data: Option<&[u8]>,
        size: usize,
        usage: BufferUsage,
    ) -> Result<RawHandle, DeviceError> {
        let label = match usage {
            BufferUsage::StaticCopy => "fft_wisdom static buffer",
            BufferUsage::StreamCopy => "fft_wisdom stream buffer",
        };
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if test_executors::spin_on(self.device.pop_error_scope()).is_some() {
            return Err(DeviceError::OutOfMemory { bytes: size });
        }
        if let Some(data) = data {
            if data.len() < size {
                buffer.destroy();
                return Err(DeviceError::ShortUpload {
                    len: data.len(),
                    width: size as u32,
                    height: 1,
                });
            }
            self.queue.write_buffer(&buffer, 0, &data[..size]);
        }
        let mut state = self.state.lock().unwrap();
        let handle = state.allocate_handle();
        state.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn delete_buffer(&self, buffer: RawHandle) {
        if let Some(b) = self.state.lock().unwrap().buffers.remove(&buffer) {
            b.destroy();
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<RawHandle, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fft_wisdom texture"),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: descriptor.levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(descriptor.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if test_executors::spin_on(self.device.pop_error_scope()).is_some() {
            return Err(DeviceError::OutOfMemory {
                bytes: descriptor.width as usize
                    * descriptor.height as usize
                    * descriptor.format.bytes_per_texel(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let handle = state.allocate_handle();
        state.textures.insert(handle, (texture, *descriptor));
        Ok(handle)
    }

    fn upload_texture(
        &self,
        texture: RawHandle,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let state = self.state.lock().unwrap();
        let (texture, descriptor) = state.textures.get(&texture).ok_or(DeviceError::UnknownHandle {
            kind: "texture",
            handle: texture.get(),
        })?;
        let bytes_per_row = region.width * descriptor.format.bytes_per_texel() as u32;
        if data.len() < bytes_per_row as usize * region.height as usize {
            return Err(DeviceError::ShortUpload {
                len: data.len(),
                width: region.width,
                height: region.height,
            });
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn delete_texture(&self, texture: RawHandle) {
        if let Some((t, _)) = self.state.lock().unwrap().textures.remove(&texture) {
            t.destroy();
        }
    }

    fn build_program(&self, parameters: &Parameters) -> Result<RawHandle, DeviceError> {
        let source = self.kernels.wgsl(parameters);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fft_wisdom kernel"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("fft_wisdom pipeline"),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(error) = test_executors::spin_on(self.device.pop_error_scope()) {
            logwise::warn_sync!(
                "WgpuDevice: kernel for radix {radix} failed to build",
                radix = parameters.radix
            );
            return Err(DeviceError::Compile(error.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let handle = state.allocate_handle();
        state.programs.insert(handle, pipeline);
        Ok(handle)
    }

    fn delete_program(&self, program: RawHandle) {
        self.state.lock().unwrap().programs.remove(&program);
    }

    fn dispatch(&self, dispatch: &Dispatch) -> Result<(), DeviceError> {
        let state = self.state.lock().unwrap();
        let pipeline = state
            .programs
            .get(&dispatch.program)
            .ok_or(DeviceError::UnknownHandle {
                kind: "program",
                handle: dispatch.program.get(),
            })?;

        let mut uniform = [0u8; UNIFORM_SIZE as usize];
        uniform[0..4].copy_from_slice(&dispatch.p.to_le_bytes());
        for (i, v) in dispatch
            .texture_offset
            .iter()
            .chain(dispatch.texture_scale.iter())
            .enumerate()
        {
            let at = 8 + i * 4;
            uniform[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fft_wisdom uniforms"),
            size: UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&uniform_buffer, 0, &uniform);

        let input_view = Self::view(&state, dispatch.input)?;
        let output_view = Self::view(&state, dispatch.output)?;

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fft_wisdom bind group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: Self::bind(&state, dispatch.input, input_view.as_ref())?,
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: Self::bind(&state, dispatch.output, output_view.as_ref())?,
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fft_wisdom dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fft_wisdom pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dispatch.workgroups_x, dispatch.workgroups_y, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn finish(&self) {
        let (s, r) = r#continue::continuation();
        self.queue.on_submitted_work_done(move || {
            s.send(());
        });
        if let Err(error) = self.device.poll(PollType::Wait) {
            logwise::warn_sync!(
                "WgpuDevice: poll failed while draining the queue: {error}",
                error = logwise::privacy::LogIt(&error)
            );
        }
        test_executors::spin_on(r);
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
