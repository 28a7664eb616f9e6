// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A software device with a virtual clock.

Nothing is computed.  Every dispatch advances the clock by whatever the cost model says the
dispatch costs, so benchmarks are exact and repeatable.  The device keeps track of every handle it
hands out, which makes it useful for checking that resources are released exactly once.
*/

use crate::device::{
    Binding, BufferUsage, Device, DeviceError, DeviceInfo, Dispatch, RawHandle, TextureDescriptor,
    TextureRegion,
};
use crate::parameters::Parameters;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

/// Seconds one dispatch of a program takes.
pub type CostModel = Box<dyn Fn(&Parameters, &Dispatch) -> f64 + Send + Sync>;
/// Returns `false` for programs that should fail to compile.
pub type CompileFilter = Box<dyn Fn(&Parameters) -> bool + Send + Sync>;

/// Counters describing what the device has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub live_buffers: usize,
    pub live_textures: usize,
    pub live_programs: usize,
    pub buffers_released: usize,
    pub textures_released: usize,
    pub programs_released: usize,
    pub programs_built: usize,
    pub compile_failures: usize,
    pub dispatches: u64,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    buffers: HashMap<RawHandle, usize>,
    textures: HashMap<RawHandle, TextureDescriptor>,
    programs: HashMap<RawHandle, Parameters>,
    allocated_bytes: usize,
    clock: f64,
    stats: SimulatedStats,
}

impl State {
    fn allocate_handle(&mut self) -> RawHandle {
        self.next_handle += 1;
        RawHandle::new(self.next_handle).expect("handle counter wrapped")
    }

    fn reserve(&mut self, bytes: usize, limit: Option<usize>) -> Result<(), DeviceError> {
        if let Some(limit) = limit {
            if self.allocated_bytes + bytes > limit {
                return Err(DeviceError::OutOfMemory { bytes });
            }
        }
        self.allocated_bytes += bytes;
        Ok(())
    }

    fn check_binding(&self, binding: Binding) -> Result<(), DeviceError> {
        let known = match binding {
            Binding::Buffer(h) => self.buffers.contains_key(&h),
            Binding::Texture(h) => self.textures.contains_key(&h),
        };
        if known {
            Ok(())
        } else {
            Err(DeviceError::UnknownHandle {
                kind: match binding {
                    Binding::Buffer(_) => "buffer",
                    Binding::Texture(_) => "texture",
                },
                handle: binding.handle().get(),
            })
        }
    }
}

pub struct SimulatedDevice {
    renderer: String,
    max_compute_invocations: u32,
    memory_limit: Option<usize>,
    cost_model: CostModel,
    compile_filter: Option<CompileFilter>,
    state: Mutex<State>,
}

/// A rough model of a GPU that likes 64 wide workgroups and 4 wide vectors.
pub fn default_cost_model(parameters: &Parameters, dispatch: &Dispatch) -> f64 {
    const LAUNCH_OVERHEAD: f64 = 5e-6;
    const SECONDS_PER_ELEMENT: f64 = 1e-10;

    let groups = f64::from(dispatch.workgroups_x) * f64::from(dispatch.workgroups_y);
    let invocations = groups * f64::from(parameters.invocations());
    let work = invocations * f64::from(parameters.vector_size) * f64::from(parameters.radix);

    let occupancy = 1.0 + (f64::from(parameters.invocations()) / 64.0).log2().abs() * 0.15;
    let vector = match parameters.vector_size {
        2 => 1.2,
        4 => 1.0,
        _ => 0.95,
    };
    let banking = if parameters.shared_banked { 0.97 } else { 1.0 };
    LAUNCH_OVERHEAD + work * SECONDS_PER_ELEMENT * occupancy * vector * banking
}

impl SimulatedDevice {
    pub fn new(renderer: impl Into<String>, max_compute_invocations: u32) -> Self {
        SimulatedDevice {
            renderer: renderer.into(),
            max_compute_invocations,
            memory_limit: None,
            cost_model: Box::new(default_cost_model),
            compile_filter: None,
            state: Mutex::new(State::default()),
        }
    }

    /// A device that identifies as a Mali GPU.
    pub fn mali() -> Self {
        Self::new("Mali-T880 (simulated)", 256)
    }

    pub fn with_cost_model(
        mut self,
        cost_model: impl Fn(&Parameters, &Dispatch) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.cost_model = Box::new(cost_model);
        self
    }

    pub fn with_compile_filter(
        mut self,
        filter: impl Fn(&Parameters) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.compile_filter = Some(Box::new(filter));
        self
    }

    /// Fails allocations once `bytes` are live.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn stats(&self) -> SimulatedStats {
        self.state.lock().unwrap().stats
    }

    /// Parameters of every live program.
    pub fn live_programs(&self) -> Vec<Parameters> {
        self.state.lock().unwrap().programs.values().copied().collect()
    }
}

impl Debug for SimulatedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("renderer", &self.renderer)
            .field("max_compute_invocations", &self.max_compute_invocations)
            .field("memory_limit", &self.memory_limit)
            .finish_non_exhaustive()
    }
}

impl Device for SimulatedDevice {
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
        _usage: BufferUsage,
    ) -> Result<RawHandle, DeviceError> {
        if let Some(data) = data {
            if data.len() < size {
                return Err(DeviceError::ShortUpload {
                    len: data.len(),
                    width: size as u32,
                    height: 1,
                });
            }
        }
        let mut state = self.state.lock().unwrap();
        state.reserve(size, self.memory_limit)?;
        let handle = state.allocate_handle();
        state.buffers.insert(handle, size);
        state.stats.live_buffers += 1;
        Ok(handle)
    }

    fn delete_buffer(&self, buffer: RawHandle) {
        let mut state = self.state.lock().unwrap();
        match state.buffers.remove(&buffer) {
            Some(size) => {
                state.allocated_bytes -= size;
                state.stats.live_buffers -= 1;
                state.stats.buffers_released += 1;
            }
            None => logwise::warn_sync!(
                "SimulatedDevice: double release of buffer {handle}",
                handle = buffer.get()
            ),
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<RawHandle, DeviceError> {
        let bytes = descriptor.width as usize
            * descriptor.height as usize
            * descriptor.format.bytes_per_texel();
        let mut state = self.state.lock().unwrap();
        state.reserve(bytes, self.memory_limit)?;
        let handle = state.allocate_handle();
        state.textures.insert(handle, *descriptor);
        state.stats.live_textures += 1;
        Ok(handle)
    }

    fn upload_texture(
        &self,
        texture: RawHandle,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let state = self.state.lock().unwrap();
        let descriptor = state
            .textures
            .get(&texture)
            .ok_or(DeviceError::UnknownHandle {
                kind: "texture",
                handle: texture.get(),
            })?;
        let needed =
            region.width as usize * region.height as usize * descriptor.format.bytes_per_texel();
        if data.len() < needed
            || region.x + region.width > descriptor.width
            || region.y + region.height > descriptor.height
        {
            return Err(DeviceError::ShortUpload {
                len: data.len(),
                width: region.width,
                height: region.height,
            });
        }
        Ok(())
    }

    fn delete_texture(&self, texture: RawHandle) {
        let mut state = self.state.lock().unwrap();
        match state.textures.remove(&texture) {
            Some(descriptor) => {
                state.allocated_bytes -= descriptor.width as usize
                    * descriptor.height as usize
                    * descriptor.format.bytes_per_texel();
                state.stats.live_textures -= 1;
                state.stats.textures_released += 1;
            }
            None => logwise::warn_sync!(
                "SimulatedDevice: double release of texture {handle}",
                handle = texture.get()
            ),
        }
    }

    fn build_program(&self, parameters: &Parameters) -> Result<RawHandle, DeviceError> {
        let accepted = self
            .compile_filter
            .as_ref()
            .is_none_or(|filter| filter(parameters));
        let mut state = self.state.lock().unwrap();
        if !accepted {
            state.stats.compile_failures += 1;
            return Err(DeviceError::Compile(format!(
                "simulated compile failure for radix {} mode {:?}",
                parameters.radix, parameters.mode
            )));
        }
        let handle = state.allocate_handle();
        state.programs.insert(handle, *parameters);
        state.stats.live_programs += 1;
        state.stats.programs_built += 1;
        Ok(handle)
    }

    fn delete_program(&self, program: RawHandle) {
        let mut state = self.state.lock().unwrap();
        match state.programs.remove(&program) {
            Some(_) => {
                state.stats.live_programs -= 1;
                state.stats.programs_released += 1;
            }
            None => logwise::warn_sync!(
                "SimulatedDevice: double release of program {handle}",
                handle = program.get()
            ),
        }
    }

    fn dispatch(&self, dispatch: &Dispatch) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        let parameters = *state
            .programs
            .get(&dispatch.program)
            .ok_or(DeviceError::UnknownHandle {
                kind: "program",
                handle: dispatch.program.get(),
            })?;
        state.check_binding(dispatch.input)?;
        state.check_binding(dispatch.output)?;
        let cost = (self.cost_model)(&parameters, dispatch);
        state.clock += cost;
        state.stats.dispatches += 1;
        Ok(())
    }

    fn finish(&self) {}

    fn now(&self) -> f64 {
        self.state.lock().unwrap().clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureFormat;
    use crate::parameters::{Direction, Mode, Target};

    fn parameters() -> Parameters {
        Parameters {
            workgroup_size_x: 64,
            workgroup_size_y: 1,
            workgroup_size_z: 1,
            radix: 4,
            vector_size: 4,
            direction: Direction::Forward,
            mode: Mode::Horizontal,
            input_target: Target::Ssbo,
            output_target: Target::Ssbo,
            p1: true,
            pow2_stride: false,
            shared_banked: false,
            fft_fp16: false,
            input_fp16: false,
            output_fp16: false,
            fft_normalize: false,
        }
    }

    #[test]
    fn dispatch_advances_clock_by_cost() {
        let device = SimulatedDevice::mali().with_cost_model(|_, _| 0.5);
        let program = device.build_program(&parameters()).unwrap();
        let buffer = device.create_buffer(None, 16, BufferUsage::StreamCopy).unwrap();
        let dispatch = Dispatch {
            program,
            input: Binding::Buffer(buffer),
            output: Binding::Buffer(buffer),
            p: 1,
            texture_offset: [0.0; 2],
            texture_scale: [1.0; 2],
            workgroups_x: 1,
            workgroups_y: 1,
        };
        assert_eq!(device.now(), 0.0);
        device.dispatch(&dispatch).unwrap();
        device.dispatch(&dispatch).unwrap();
        assert_eq!(device.now(), 1.0);
        assert_eq!(device.stats().dispatches, 2);
    }

    #[test]
    fn binding_kind_is_checked() {
        let device = SimulatedDevice::mali();
        let program = device.build_program(&parameters()).unwrap();
        let buffer = device.create_buffer(None, 16, BufferUsage::StreamCopy).unwrap();
        let dispatch = Dispatch {
            program,
            input: Binding::Texture(buffer),
            output: Binding::Buffer(buffer),
            p: 1,
            texture_offset: [0.0; 2],
            texture_scale: [1.0; 2],
            workgroups_x: 1,
            workgroups_y: 1,
        };
        let err = device.dispatch(&dispatch).unwrap_err();
        assert!(matches!(err, DeviceError::UnknownHandle { kind: "texture", .. }));
    }

    #[test]
    fn compile_filter_rejects() {
        let device = SimulatedDevice::mali().with_compile_filter(|p| p.radix != 4);
        assert!(matches!(
            device.build_program(&parameters()),
            Err(DeviceError::Compile(_))
        ));
        assert_eq!(device.stats().compile_failures, 1);
        assert_eq!(device.stats().live_programs, 0);
        assert!(device.live_programs().is_empty());

        let accepted = Parameters {
            radix: 8,
            ..parameters()
        };
        let program = device.build_program(&accepted).unwrap();
        assert_eq!(device.live_programs(), vec![accepted]);
        device.delete_program(program);
        assert!(device.live_programs().is_empty());
    }

    #[test]
    fn memory_limit_is_enforced() {
        let device = SimulatedDevice::mali().with_memory_limit(100);
        let a = device.create_buffer(None, 64, BufferUsage::StaticCopy).unwrap();
        assert!(matches!(
            device.create_texture(&TextureDescriptor {
                width: 4,
                height: 4,
                levels: 1,
                format: TextureFormat::Rg32Float,
            }),
            Err(DeviceError::OutOfMemory { .. })
        ));
        device.delete_buffer(a);
        device.create_buffer(None, 100, BufferUsage::StaticCopy).unwrap();
    }

    #[test]
    fn default_model_prefers_wide_vectors() {
        let p2 = Parameters {
            vector_size: 2,
            ..parameters()
        };
        let p4 = parameters();
        let device = SimulatedDevice::mali();
        let program = device.build_program(&p4).unwrap();
        let buffer = device.create_buffer(None, 16, BufferUsage::StreamCopy).unwrap();
        let dispatch = Dispatch {
            program,
            input: Binding::Buffer(buffer),
            output: Binding::Buffer(buffer),
            p: 1,
            texture_offset: [0.0; 2],
            texture_scale: [1.0; 2],
            workgroups_x: 16,
            workgroups_y: 1,
        };
        // vec4 covers the same elements with half the groups
        let wide = Dispatch {
            workgroups_x: 8,
            ..dispatch
        };
        assert!(default_cost_model(&p4, &wide) < default_cost_model(&p2, &dispatch));
    }
}
