// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! fft_wisdom finds the fastest launch parameters for GPU FFT kernels and remembers them.

A GPU FFT is a sequence of radix passes.  Each pass can be launched with many workgroup shapes,
vector widths and shared-memory layouts, and which of those is fastest depends heavily on the GPU.
Rather than guessing, this crate measures: it builds every plausible variant, times it, and keeps
the winner as *wisdom*.  Wisdom then drives how a transform is split into passes.

| Piece                         | Role                                                              |
|-------------------------------|-------------------------------------------------------------------|
| [`wisdom::Wisdom`]            | Learns, stores and looks up the best [`parameters::Performance`]  |
| [`wisdom::StaticWisdom`]      | Per-hardware bounds that prune the search                         |
| [`fft::Fft`]                  | A planned transform: one or more passes, with scratch buffers     |
| [`program_cache::ProgramCache`] | Compiled kernel variants shared between transforms              |
| [`device::Device`]            | The GPU seam; see [`imp`] for backends                            |

Learned wisdom serializes to JSON with [`wisdom::Wisdom::archive`] and loads back with
[`wisdom::Wisdom::extract`], so the search only has to run once per device.

# Backends

The wgpu backend ([`imp::WgpuDevice`]) is enabled by the default `backend_wgpu` feature.  It does
not ship kernels; supply WGSL through [`imp::KernelSource`].

[`imp::SimulatedDevice`] runs everything against a virtual clock and a cost model you provide.
It is useful for tests and for exploring the planner without a GPU.

```
use std::sync::Arc;
use fft_wisdom::device::Device;
use fft_wisdom::imp::SimulatedDevice;
use fft_wisdom::parameters::{Direction, Options, Target, TransformType};
use fft_wisdom::{Fft, ProgramCache, Wisdom};

let device: Arc<dyn Device> = Arc::new(SimulatedDevice::mali());
let wisdom = Wisdom::for_device(device.as_ref());
let mut cache = ProgramCache::new();
let fft = Fft::new(
    &device,
    256,
    256,
    TransformType::ComplexToComplex,
    Direction::Forward,
    Target::Ssbo,
    Target::Ssbo,
    &mut cache,
    &Options::default(),
    &wisdom,
)
.unwrap();
assert_eq!(fft.pass_count(), 4);
```
*/

pub mod device;
pub mod error;
pub mod fft;
pub mod imp;
pub mod parameters;
pub mod program_cache;
#[cfg(feature = "backend_wgpu")]
mod sys;
pub mod wisdom;

pub use error::{ConfigError, Error};
pub use fft::Fft;
pub use program_cache::ProgramCache;
pub use wisdom::Wisdom;
