// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Executable FFT pass sequences.

An [`Fft`] is a list of compiled passes plus the scratch buffers they ping-pong through.  It is
built either as a single pass, which is what the learner measures, or as a complete transform
planned from [`Wisdom`].
*/

mod plan;
mod radix;

use crate::device::{Binding, Buffer, BufferUsage, Device, DeviceError, Dispatch, Program, RawHandle};
use crate::error::{ConfigError, Error};
use crate::parameters::{Direction, Mode, Options, Parameters, Precision, Target, TransformType};
use crate::program_cache::ProgramCache;
use crate::wisdom::{PassDescriptor, Wisdom};
use radix::{Radix, WorkGroupSize, build_radix, build_resolve_radix, radix_to_wg_z};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

struct Pass {
    parameters: Parameters,
    workgroups_x: u32,
    workgroups_y: u32,
    /// Texels one invocation reads in x, relative to one element.
    uv_scale_x: u32,
    program: Arc<Program>,
    barrier: bool,
}

impl Debug for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("radix", &self.parameters.radix)
            .field("mode", &self.parameters.mode)
            .field("workgroups", &(self.workgroups_x, self.workgroups_y))
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Fft {
    device: Arc<dyn Device>,
    passes: Vec<Pass>,
    temp_buffer: Buffer,
    temp_buffer_image: Buffer,
    texture_offset: [f32; 2],
    texture_scale: [f32; 2],
    cost: f64,
}

const fn is_pot(n: u32) -> bool {
    n != 0 && n & (n - 1) == 0
}

/// Looks `parameters` up in `cache`, building and inserting on a miss.
fn get_program(
    device: &Arc<dyn Device>,
    cache: &mut ProgramCache,
    parameters: &Parameters,
) -> Result<Arc<Program>, Error> {
    if let Some(program) = cache.program(parameters) {
        return Ok(program);
    }
    let name = device.build_program(parameters).map_err(|e| match e {
        DeviceError::Compile(log) => Error::Config(ConfigError::Compile(log)),
        other => Error::Device(other),
    })?;
    Ok(cache.insert_program(*parameters, Program::from_raw(device, name)))
}

impl Fft {
    fn empty(device: &Arc<dyn Device>, nx: u32, ny: u32) -> Self {
        let mut fft = Fft {
            device: device.clone(),
            passes: Vec::new(),
            temp_buffer: Buffer::new(device),
            temp_buffer_image: Buffer::new(device),
            texture_offset: [0.0; 2],
            texture_scale: [1.0; 2],
            cost: 0.0,
        };
        fft.set_texture_offset_scale(
            0.5 / nx as f32,
            0.5 / ny as f32,
            1.0 / nx as f32,
            1.0 / ny as f32,
        );
        fft
    }

    /**
    Builds one pass.

    `p` is the stride of the butterflies; 1 for the first pass of a dimension.  Passes with
    `p != 1` must read a buffer, and passes with `p < radix` must write one.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn single_pass(
        device: &Arc<dyn Device>,
        nx: u32,
        ny: u32,
        radix: u32,
        p: u32,
        mode: Mode,
        input_target: Target,
        output_target: Target,
        cache: &mut ProgramCache,
        options: &Options,
    ) -> Result<Self, Error> {
        if !is_pot(nx) || !is_pot(ny) {
            return Err(ConfigError::NotPowerOfTwo { nx, ny }.into());
        }
        if p != 1 && input_target != Target::Ssbo {
            return Err(ConfigError::P1RequiresSsboInput.into());
        }
        if p < radix && output_target != Target::Ssbo {
            return Err(ConfigError::PartialRequiresSsboOutput.into());
        }

        // only the resolve passes care about direction
        let direction = if mode == Mode::ResolveComplexToReal {
            Direction::Inverse
        } else {
            Direction::Forward
        };

        let performance = options.performance;
        let res = if mode.is_resolve() {
            build_resolve_radix(
                nx,
                ny,
                WorkGroupSize {
                    x: performance.workgroup_size_x,
                    y: performance.workgroup_size_y,
                    z: 1,
                },
            )
        } else {
            build_radix(
                nx,
                ny,
                mode,
                performance.vector_size,
                performance.shared_banked,
                radix,
                WorkGroupSize {
                    x: performance.workgroup_size_x,
                    y: performance.workgroup_size_y,
                    z: radix_to_wg_z(radix),
                },
                false,
            )?
        };
        if !res.is_dispatchable() {
            return Err(ConfigError::InvalidWorkgroupSizes.into());
        }

        let parameters = pass_parameters(
            &res,
            direction,
            mode,
            input_target,
            output_target,
            p == 1,
            false,
            &options.precision,
            options.precision.input_fp16,
        );
        let program = get_program(device, cache, &parameters)?;

        let mut fft = Fft::empty(device, nx, ny);
        fft.passes.push(Pass {
            parameters,
            workgroups_x: res.workgroups_x,
            workgroups_y: res.workgroups_y,
            uv_scale_x: res.vector_size / mode.input_components(),
            program,
            barrier: false,
        });
        Ok(fft)
    }

    /**
    Plans and builds a complete transform.

    For real transforms `nx` is the number of real samples; the complex passes run on `nx / 2`
    elements and a resolve pass converts between the two after the first dimension.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &Arc<dyn Device>,
        nx: u32,
        ny: u32,
        transform_type: TransformType,
        direction: Direction,
        input_target: Target,
        output_target: Target,
        cache: &mut ProgramCache,
        options: &Options,
        wisdom: &Wisdom,
    ) -> Result<Self, Error> {
        let expand = transform_type.needs_resolve();
        let complex_nx = if expand { nx / 2 } else { nx };

        if !is_pot(complex_nx) || !is_pot(ny) {
            return Err(ConfigError::NotPowerOfTwo { nx, ny }.into());
        }
        if transform_type == TransformType::ComplexToReal && direction == Direction::Forward {
            return Err(ConfigError::ComplexToRealRequiresInverse.into());
        }
        if transform_type == TransformType::RealToComplex && direction != Direction::Forward {
            return Err(ConfigError::RealToComplexRequiresForward.into());
        }
        if transform_type == TransformType::RealToComplex && input_target == Target::Image {
            return Err(ConfigError::RealInputRequiresImageReal.into());
        }
        if transform_type == TransformType::ComplexToReal && output_target == Target::Image {
            return Err(ConfigError::RealOutputRequiresImageReal.into());
        }

        let mut fft = Fft::empty(device, nx, ny);

        // real transforms need double the scratch, so size with the full nx
        let components = if transform_type == TransformType::ComplexToComplexDual {
            4
        } else {
            2
        };
        let temp_buffer_size = (nx as usize * ny as usize * size_of::<f32>() * components)
            >> u32::from(options.precision.output_fp16);
        fft.temp_buffer
            .init(None, temp_buffer_size, BufferUsage::StreamCopy)?;
        if output_target != Target::Ssbo {
            fft.temp_buffer_image
                .init(None, temp_buffer_size, BufferUsage::StreamCopy)?;
        }

        let nx = complex_nx;
        let dual = transform_type == TransformType::ComplexToComplexDual;
        let (horizontal, vertical) = if dual {
            (Mode::HorizontalDual, Mode::VerticalDual)
        } else {
            (Mode::Horizontal, Mode::Vertical)
        };

        let mut cost = 0.0;
        let (modes, radices) = match direction {
            Direction::Forward => {
                let middle = if ny > 1 { Target::Ssbo } else { output_target };
                let first = plan::split_radices(
                    nx, ny, horizontal, input_target, middle, options, false, wisdom, &mut cost,
                )?;
                let second = plan::split_radices(
                    nx, ny, vertical, middle, output_target, options, expand, wisdom, &mut cost,
                )?;
                ([horizontal, vertical], [first, second])
            }
            Direction::Inverse | Direction::InverseConvolve => {
                let middle = if ny > 1 { Target::Ssbo } else { input_target };
                let first = plan::split_radices(
                    nx, ny, vertical, input_target, middle, options, expand, wisdom, &mut cost,
                )?;
                let second = plan::split_radices(
                    nx, ny, horizontal, middle, output_target, options, false, wisdom, &mut cost,
                )?;
                ([vertical, horizontal], [first, second])
            }
        };
        fft.cost = cost;
        log_radix_splits(&radices);

        let precision = options.precision;
        let last_index = if radices[1].is_empty() && !expand { 0 } else { 1 };
        for (index, radix_direction) in radices.iter().enumerate() {
            let mode = modes[index];
            let pow2_stride = expand && mode == Mode::Vertical;
            let mut p = 1;
            for (i, radix) in radix_direction.iter().enumerate() {
                let last_pass = index == last_index && i + 1 == radix_direction.len();
                let first_pass = fft.passes.is_empty();
                let parameters = pass_parameters(
                    radix,
                    pass_direction(direction, first_pass),
                    mode,
                    if first_pass { input_target } else { Target::Ssbo },
                    if last_pass { output_target } else { Target::Ssbo },
                    p == 1,
                    pow2_stride,
                    &precision,
                    if first_pass {
                        precision.input_fp16
                    } else {
                        precision.output_fp16
                    },
                );
                let program = get_program(device, cache, &parameters)?;
                fft.passes.push(Pass {
                    parameters,
                    workgroups_x: radix.workgroups_x,
                    workgroups_y: radix.workgroups_y,
                    uv_scale_x: radix.vector_size / transform_type.input_components(),
                    program,
                    // the caller decides how the final output is synchronized
                    barrier: !last_pass,
                });
                p *= radix.radix;
            }

            if index == 0 && expand {
                fft.push_resolve_pass(
                    device,
                    nx,
                    ny,
                    transform_type,
                    direction,
                    input_target,
                    if radices[1].is_empty() {
                        output_target
                    } else {
                        Target::Ssbo
                    },
                    cache,
                    options,
                    wisdom,
                )?;
            }
        }

        Ok(fft)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_resolve_pass(
        &mut self,
        device: &Arc<dyn Device>,
        nx: u32,
        ny: u32,
        transform_type: TransformType,
        direction: Direction,
        input_target: Target,
        output_target: Target,
        cache: &mut ProgramCache,
        options: &Options,
        wisdom: &Wisdom,
    ) -> Result<(), Error> {
        let first_pass = self.passes.is_empty();
        let input_target = if first_pass { input_target } else { Target::Ssbo };
        let mode = if transform_type == TransformType::ComplexToReal {
            Mode::ResolveComplexToReal
        } else {
            Mode::ResolveRealToComplex
        };
        let precision = Precision {
            input_fp16: if first_pass {
                options.precision.input_fp16
            } else {
                options.precision.output_fp16
            },
            ..options.precision
        };
        let base = Options::new(options.performance, precision);
        let opts = wisdom.find_optimal_options_or_default(
            &PassDescriptor::new(nx, ny, 2, mode, input_target, output_target, precision),
            &base,
        );
        let res = build_resolve_radix(
            nx,
            ny,
            WorkGroupSize {
                x: opts.workgroup_size_x,
                y: opts.workgroup_size_y,
                z: 1,
            },
        );
        if !res.is_dispatchable() {
            return Err(ConfigError::InvalidWorkgroupSizes.into());
        }
        let parameters = pass_parameters(
            &res,
            pass_direction(direction, first_pass),
            mode,
            input_target,
            output_target,
            true,
            false,
            &precision,
            precision.input_fp16,
        );
        let program = get_program(device, cache, &parameters)?;
        self.passes.push(Pass {
            parameters,
            workgroups_x: res.workgroups_x,
            workgroups_y: res.workgroups_y,
            uv_scale_x: 1,
            program,
            barrier: true,
        });
        Ok(())
    }

    /// Texture coordinate mapping used when the first pass samples an image.
    pub fn set_texture_offset_scale(
        &mut self,
        offset_x: f32,
        offset_y: f32,
        scale_x: f32,
        scale_y: f32,
    ) {
        self.texture_offset = [offset_x, offset_y];
        self.texture_scale = [scale_x, scale_y];
    }

    /**
    Runs every pass once.

    `input` and `output` are buffers or textures according to the first pass's input target and the
    last pass's output target.  A barrier follows every pass but the last.
    */
    pub fn process(&self, output: RawHandle, input: RawHandle) -> Result<(), DeviceError> {
        let Some(last) = self.passes.last() else {
            return Ok(());
        };
        let odd = self.passes.len() % 2 == 1;
        let final_buffer = if last.parameters.output_target != Target::Ssbo {
            self.temp_buffer_image.get()
        } else {
            Some(output)
        };
        let mut buffers = [
            Some(input),
            if odd {
                final_buffer
            } else {
                self.temp_buffer.get()
            },
        ];

        let mut p = 1;
        for (index, pass) in self.passes.iter().enumerate() {
            let parameters = &pass.parameters;
            if parameters.p1 {
                p = 1;
            }
            let stride = p;
            p *= parameters.radix;

            let source = buffers[0].ok_or(DeviceError::NullBuffer)?;
            let input_binding = Binding::for_target(parameters.input_target, source);
            let output_binding = if parameters.output_target != Target::Ssbo {
                Binding::Texture(output)
            } else {
                Binding::Buffer(buffers[1].ok_or(DeviceError::NullBuffer)?)
            };
            let program = pass.program.get().ok_or(DeviceError::UnknownHandle {
                kind: "program",
                handle: 0,
            })?;

            self.device.dispatch(&Dispatch {
                program,
                input: input_binding,
                output: output_binding,
                p: stride,
                texture_offset: self.texture_offset,
                texture_scale: [
                    self.texture_scale[0] * pass.uv_scale_x as f32,
                    self.texture_scale[1],
                ],
                workgroups_x: pass.workgroups_x,
                workgroups_y: pass.workgroups_y,
            })?;
            if pass.barrier {
                self.device.memory_barrier();
            }

            if index == 0 {
                buffers[0] = if odd {
                    self.temp_buffer.get()
                } else {
                    final_buffer
                };
            }
            buffers.swap(0, 1);
        }
        Ok(())
    }

    /**
    Average seconds per [`Fft::process`].

    Runs `warmup` unmeasured processes, then up to `iterations` measured iterations of
    `dispatches` processes each.  Iterations stop once `max_time` seconds have elapsed; the first
    always runs.
    */
    pub fn bench(
        &self,
        output: RawHandle,
        input: RawHandle,
        warmup: u32,
        iterations: u32,
        dispatches: u32,
        max_time: f64,
    ) -> Result<f64, DeviceError> {
        let iterations = iterations.max(1);
        let dispatches = dispatches.max(1);
        let device = &self.device;

        device.finish();
        for _ in 0..warmup {
            self.process(output, input)?;
        }
        device.finish();

        let mut runs = 0u32;
        let start = device.now();
        let mut total = 0.0;
        let mut i = 0;
        while i < iterations && (device.now() - start < max_time || i == 0) {
            let iteration_start = device.now();
            for _ in 0..dispatches {
                self.process(output, input)?;
                device.memory_barrier();
                runs += 1;
            }
            device.finish();
            total += device.now() - iteration_start;
            i += 1;
        }
        Ok(total / f64::from(runs))
    }

    /// Planning cost of a transform built by [`Fft::new`]; zero for single passes.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Kernel parameters of every pass, in execution order.
    pub fn pass_parameters(&self) -> impl Iterator<Item = &Parameters> {
        self.passes.iter().map(|p| &p.parameters)
    }
}

/// Inverse-convolve only applies to the first pass; the rest are plain inverse passes.
fn pass_direction(direction: Direction, first_pass: bool) -> Direction {
    if direction == Direction::InverseConvolve && !first_pass {
        Direction::Inverse
    } else {
        direction
    }
}

#[allow(clippy::too_many_arguments)]
fn pass_parameters(
    radix: &Radix,
    direction: Direction,
    mode: Mode,
    input_target: Target,
    output_target: Target,
    p1: bool,
    pow2_stride: bool,
    precision: &Precision,
    input_fp16: bool,
) -> Parameters {
    Parameters {
        workgroup_size_x: radix.size.x,
        workgroup_size_y: radix.size.y,
        workgroup_size_z: radix.size.z,
        radix: radix.radix,
        vector_size: radix.vector_size,
        direction,
        mode,
        input_target,
        output_target,
        p1,
        pow2_stride,
        shared_banked: radix.shared_banked,
        fft_fp16: precision.fp16,
        input_fp16,
        output_fp16: precision.output_fp16,
        fft_normalize: precision.normalize,
    }
}

fn log_radix_splits(radices: &[Vec<Radix>; 2]) {
    for (index, direction) in radices.iter().enumerate() {
        let index = index as u64 + 1;
        for radix in direction {
            logwise::trace_sync!(
                "Transform #{index}: radix {radix} size {size} dispatch {dispatch} vector {vector}",
                index = index,
                radix = radix.radix,
                size = logwise::privacy::LogIt(&radix.size),
                dispatch = logwise::privacy::LogIt(&(radix.workgroups_x, radix.workgroups_y)),
                vector = radix.vector_size
            );
        }
    }
}
