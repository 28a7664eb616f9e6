// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Empirical tuning of FFT pass launch parameters.

[`Wisdom`] answers "which workgroup shape, vector size and banking mode is fastest for this pass on
this GPU?".  The first time a pass is asked about, every plausible configuration is built and
timed; the winner is remembered in a [`WisdomStore`] and returned on later calls.

The search is bounded by a [`StaticWisdom`] profile for the hardware family, and the candidates
come from a [`SearchSpace`].  Both are plain data and can be replaced.

```
use std::sync::Arc;
use fft_wisdom::device::Device;
use fft_wisdom::imp::SimulatedDevice;
use fft_wisdom::parameters::{Mode, Precision, Target};
use fft_wisdom::wisdom::{BenchParams, PassDescriptor, Wisdom};

let device: Arc<dyn Device> = Arc::new(SimulatedDevice::mali());
let mut wisdom = Wisdom::for_device(device.as_ref())
    .with_bench_params(BenchParams::new(0, 1, 1, 1.0));
let pass = PassDescriptor::new(256, 1, 4, Mode::Horizontal, Target::Ssbo, Target::Ssbo, Precision::default());
let (cost, performance) = wisdom.learn_optimal_options(&device, pass).unwrap();
assert!(cost >= 0.0);
assert!(performance.workgroup_size() <= 64);
```
*/

pub mod search;
pub mod static_wisdom;
pub mod store;

pub use search::{BenchParams, SearchSpace};
pub use static_wisdom::{HardwareFamily, HardwareTable, StaticWisdom, Tristate, WorkgroupCeiling};
pub use store::{PassDescriptor, WisdomPass, WisdomStore};

use crate::device::{Buffer, BufferUsage, Device, RawHandle, Texture, TextureFormat};
use crate::error::{ConfigError, Error};
use crate::fft::Fft;
use crate::parameters::{Mode, Options, Performance, Precision, Target, TransformType};
use crate::program_cache::ProgramCache;
use std::sync::Arc;

/// Result of measuring one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchOutcome {
    /// Seconds per dispatch.
    Feasible(f64),
    /// The candidate cannot be built for this pass.
    Infeasible(ConfigError),
}

#[derive(Debug, Clone, Default)]
pub struct Wisdom {
    library: WisdomStore,
    static_wisdom: StaticWisdom,
    search_space: SearchSpace,
    params: BenchParams,
}

/// Components per element of the synthetic data for a pass.
const fn mode_to_size(mode: Mode) -> usize {
    match mode {
        Mode::VerticalDual
        | Mode::HorizontalDual
        | Mode::ResolveRealToComplex
        | Mode::ResolveComplexToReal => 4,
        Mode::Vertical | Mode::Horizontal => 2,
    }
}

impl Wisdom {
    /// Empty wisdom with all-zero static bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives static wisdom for `device` from the built-in hardware table.
    pub fn for_device(device: &dyn Device) -> Self {
        Self::for_device_with_table(device, &HardwareTable::default())
    }

    pub fn for_device_with_table(device: &dyn Device, table: &HardwareTable) -> Self {
        let info = device.info();
        let mut wisdom = Self::new();
        wisdom.set_static_wisdom(table.static_wisdom(&info.renderer, info.max_compute_invocations));
        wisdom
    }

    pub fn with_static_wisdom(mut self, static_wisdom: StaticWisdom) -> Self {
        self.static_wisdom = static_wisdom;
        self
    }

    pub fn with_search_space(mut self, search_space: SearchSpace) -> Self {
        self.search_space = search_space;
        self
    }

    pub fn with_bench_params(mut self, params: BenchParams) -> Self {
        self.params = params;
        self
    }

    pub fn set_static_wisdom(&mut self, static_wisdom: StaticWisdom) {
        self.static_wisdom = static_wisdom;
    }

    pub fn static_wisdom(&self) -> StaticWisdom {
        self.static_wisdom
    }

    pub fn set_bench_params(&mut self, params: BenchParams) {
        self.params = params;
    }

    pub fn bench_params(&self) -> BenchParams {
        self.params
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.search_space
    }

    pub fn store(&self) -> &WisdomStore {
        &self.library
    }

    /// For seeding wisdom measured elsewhere.
    pub fn store_mut(&mut self) -> &mut WisdomStore {
        &mut self.library
    }

    /**
    Returns the best known configuration for `pass`, learning it first if necessary.

    An error means not even the default configuration could be built; nothing is stored in that
    case.
    */
    pub fn learn_optimal_options(
        &mut self,
        device: &Arc<dyn Device>,
        pass: PassDescriptor,
    ) -> Result<(f64, Performance), Error> {
        if let Some((key, performance)) = self.library.get(&pass) {
            return Ok((key.cost, *performance));
        }
        let mut key = WisdomPass::new(pass);
        let result = self.study(device, &key)?;
        key.cost = result.0;
        self.library.insert(key, result.1);
        Ok(result)
    }

    /**
    Learns every pass a full transform of this shape may use.

    Best effort: passes that cannot be built are left out.  Within one radix, the first pass that
    fails skips the remaining passes of that radix.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn learn_optimal_options_exhaustive(
        &mut self,
        device: &Arc<dyn Device>,
        nx: u32,
        ny: u32,
        transform_type: TransformType,
        input_target: Target,
        output_target: Target,
        precision: Precision,
    ) -> Result<(), Error> {
        let learn_resolve = transform_type.needs_resolve();
        let nx = nx >> u32::from(learn_resolve);
        let (vertical_mode, horizontal_mode) = match transform_type {
            TransformType::ComplexToComplexDual => (Mode::VerticalDual, Mode::HorizontalDual),
            _ => (Mode::Vertical, Mode::Horizontal),
        };

        let radices = self.search_space.radices.clone();
        for radix in radices {
            let mut passes = Vec::with_capacity(6);
            let mut targets = vec![(Target::Ssbo, Target::Ssbo)];
            // first and last passes read or write the caller's resources directly
            if input_target != Target::Ssbo {
                targets.push((input_target, Target::Ssbo));
            }
            if output_target != Target::Ssbo {
                targets.push((Target::Ssbo, output_target));
            }
            for (input, output) in targets {
                if ny > 1 {
                    passes.push(PassDescriptor::new(
                        nx,
                        ny,
                        radix,
                        vertical_mode,
                        input,
                        output,
                        precision,
                    ));
                }
                passes.push(PassDescriptor::new(
                    nx,
                    ny,
                    radix,
                    horizontal_mode,
                    input,
                    output,
                    precision,
                ));
            }
            for pass in passes {
                if let Err(e) = self.learn_optimal_options(device, pass) {
                    match e {
                        Error::Config(reason) => {
                            logwise::info_sync!(
                                "Skipping radix {radix}: {reason}",
                                radix = radix,
                                reason = logwise::privacy::LogIt(&reason)
                            );
                            break;
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        if learn_resolve {
            let mut resolve_precision = Precision {
                input_fp16: precision.output_fp16,
                ..precision
            };
            let mut resolve_input_target = Target::Ssbo;
            // a complex-to-real Nx1 transform starts with the resolve pass
            if transform_type == TransformType::ComplexToReal && ny == 1 {
                resolve_precision = precision;
                resolve_input_target = input_target;
            }
            let resolve_mode = if transform_type == TransformType::ComplexToReal {
                Mode::ResolveComplexToReal
            } else {
                Mode::ResolveRealToComplex
            };
            // a real-to-complex Nx1 transform ends with the resolve pass
            let resolve_output_target = if ny == 1 && resolve_mode == Mode::ResolveRealToComplex {
                output_target
            } else {
                Target::Ssbo
            };
            let pass = PassDescriptor::new(
                nx,
                ny,
                2,
                resolve_mode,
                resolve_input_target,
                resolve_output_target,
                resolve_precision,
            );
            match self.learn_optimal_options(device, pass) {
                Ok(_) | Err(Error::Config(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /**
    Measures `pass` with one configuration.

    The input read is `p = 1` when it is an image, since images can only feed the first pass.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn bench(
        &self,
        device: &Arc<dyn Device>,
        output: RawHandle,
        input: RawHandle,
        pass: &WisdomPass,
        options: &Options,
        cache: &mut ProgramCache,
    ) -> Result<BenchOutcome, Error> {
        let p = if pass.pass.input_target != Target::Ssbo {
            1
        } else {
            pass.pass.radix
        };
        let fft = match Fft::single_pass(
            device,
            pass.pass.nx,
            pass.pass.ny,
            pass.pass.radix,
            p,
            pass.pass.mode,
            pass.pass.input_target,
            pass.pass.output_target,
            cache,
            options,
        ) {
            Ok(fft) => fft,
            Err(Error::Config(reason)) => return Ok(BenchOutcome::Infeasible(reason)),
            Err(other) => return Err(other),
        };
        let cost = fft.bench(
            output,
            input,
            self.params.warmup,
            self.params.iterations,
            self.params.dispatches,
            self.params.timeout,
        )?;
        Ok(BenchOutcome::Feasible(cost))
    }

    /**
    Searches every candidate for `pass` and returns the fastest.

    The default configuration is measured first and is only replaced by a strictly faster one.
    */
    pub fn study(
        &self,
        device: &Arc<dyn Device>,
        pass: &WisdomPass,
    ) -> Result<(f64, Performance), Error> {
        let descriptor = &pass.pass;
        let precision = descriptor.precision;
        let mut cache = ProgramCache::new();

        let mut input = Buffer::new(device);
        let mut output = Buffer::new(device);
        let mut input_tex = Texture::new(device);
        let mut output_tex = Texture::new(device);

        // resolve passes see the real signal as 2 * nx texels
        let real_width = || {
            descriptor
                .nx
                .checked_mul(2)
                .ok_or(ConfigError::SizeOverflow {
                    nx: descriptor.nx,
                    ny: descriptor.ny,
                })
        };
        let elements = mode_to_size(descriptor.mode) * descriptor.nx as usize * descriptor.ny as usize;
        let bytes = elements * size_of::<f32>();

        let input_name = if descriptor.input_target == Target::Ssbo {
            let zeros = vec![0u8; bytes >> u32::from(precision.input_fp16)];
            input.init(Some(&zeros), zeros.len(), BufferUsage::StaticCopy)?
        } else {
            let (format, width) = match descriptor.mode {
                Mode::VerticalDual | Mode::HorizontalDual => {
                    (TextureFormat::Rgba32Float, descriptor.nx)
                }
                Mode::Vertical | Mode::Horizontal => (TextureFormat::Rg32Float, descriptor.nx),
                Mode::ResolveComplexToReal => (TextureFormat::Rg32Float, real_width()?),
                Mode::ResolveRealToComplex => return Err(Error::InvalidMode(descriptor.mode)),
            };
            let name = input_tex.init(width, descriptor.ny, 1, format)?;
            let texels = vec![0u8; width as usize * descriptor.ny as usize * format.bytes_per_texel()];
            input_tex.upload(&texels, 0, 0, width, descriptor.ny)?;
            name
        };

        let output_name = if descriptor.output_target == Target::Ssbo {
            output.init(
                None,
                bytes >> u32::from(precision.output_fp16),
                BufferUsage::StreamCopy,
            )?
        } else {
            let (format, width) = match descriptor.mode {
                Mode::VerticalDual | Mode::HorizontalDual => {
                    (TextureFormat::Rgba32Float, descriptor.nx)
                }
                Mode::Vertical | Mode::Horizontal => (TextureFormat::Rg32Float, descriptor.nx),
                Mode::ResolveRealToComplex => (TextureFormat::Rg32Float, real_width()?),
                Mode::ResolveComplexToReal => return Err(Error::InvalidMode(descriptor.mode)),
            };
            output_tex.init(width, descriptor.ny, 1, format)?
        };

        let mut best = Performance::default();
        let mut minimum_cost = match self.bench(
            device,
            output_name,
            input_name,
            pass,
            &Options::new(best, precision),
            &mut cache,
        )? {
            BenchOutcome::Feasible(cost) => cost,
            BenchOutcome::Infeasible(reason) => return Err(reason.into()),
        };

        let mut bench_count = 0u32;
        for candidate in self.search_space.candidates(descriptor, &self.static_wisdom) {
            let outcome = self.bench(
                device,
                output_name,
                input_name,
                pass,
                &Options::new(candidate, precision),
                &mut cache,
            )?;
            let BenchOutcome::Feasible(cost) = outcome else {
                continue;
            };
            bench_count += 1;
            logwise::trace_sync!(
                "Wisdom run {descriptor}: {candidate} cost {cost}",
                descriptor = logwise::privacy::LogIt(descriptor),
                candidate = logwise::privacy::LogIt(&candidate),
                cost = logwise::privacy::LogIt(&cost)
            );
            if cost < minimum_cost {
                logwise::trace_sync!(
                    "New optimal solution ({old} -> {new})",
                    old = logwise::privacy::LogIt(&minimum_cost),
                    new = logwise::privacy::LogIt(&cost)
                );
                best = candidate;
                minimum_cost = cost;
            }
        }

        let programs = cache.cache_size() as u64;
        logwise::info_sync!(
            "Tested {count} variants for radix {radix} ({programs} programs)",
            count = bench_count,
            radix = descriptor.radix,
            programs = programs
        );
        Ok((minimum_cost, best))
    }

    pub fn find_optimal_options(
        &self,
        pass: &PassDescriptor,
    ) -> Option<(&WisdomPass, &Performance)> {
        self.library.get(pass)
    }

    /// Learned configuration for `pass`, or `base.performance` when nothing has been learned.
    pub fn find_optimal_options_or_default(
        &self,
        pass: &PassDescriptor,
        base: &Options,
    ) -> Performance {
        match self.library.get(pass) {
            Some((_, performance)) => *performance,
            None => {
                logwise::info_sync!(
                    "Didn't find options for {pass}",
                    pass = logwise::privacy::LogIt(pass)
                );
                base.performance
            }
        }
    }

    pub fn archive(&self) -> Result<String, Error> {
        self.library.archive()
    }

    pub fn extract(&mut self, json: &str) -> Result<(), Error> {
        self.library.extract(json)
    }
}
