// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The configuration model for FFT passes.

[`Parameters`] is the complete description of one compiled kernel variant and is the key of the
[`crate::program_cache::ProgramCache`]. It is deliberately built only from fixed-width integers,
enums and bools, so the derived `Eq` and `Hash` are exact: two values compare equal iff every field
matches, and equal values always hash identically.

[`Performance`] is the tunable subset that the wisdom search optimizes, and [`Precision`] is the
fixed part the caller picks.
*/

use serde::{Deserialize, Serialize};

/// Transform direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Forward FFT transform.
    Forward,
    /// Inverse FFT transform with two frequency domain inputs which are multiplied together
    /// for convolution.
    InverseConvolve,
    /// Inverse FFT transform.
    Inverse,
}

/// The shape of a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    Horizontal,
    HorizontalDual,
    Vertical,
    VerticalDual,
    ResolveRealToComplex,
    ResolveComplexToReal,
}

impl Mode {
    /// Dual modes transform two complex values (four components) per element.
    pub const fn is_dual(self) -> bool {
        matches!(self, Mode::HorizontalDual | Mode::VerticalDual)
    }

    /// Resolve modes convert between real and complex representations.
    pub const fn is_resolve(self) -> bool {
        matches!(self, Mode::ResolveRealToComplex | Mode::ResolveComplexToReal)
    }

    /// Number of components a kernel reads per element for this mode.
    pub(crate) const fn input_components(self) -> u32 {
        match self {
            Mode::HorizontalDual | Mode::VerticalDual => 4,
            Mode::Horizontal | Mode::Vertical | Mode::ResolveComplexToReal => 2,
            Mode::ResolveRealToComplex => 1,
        }
    }
}

/// The kind of transform a full [`crate::fft::Fft`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformType {
    /// Regular complex-to-complex transform.
    ComplexToComplex,
    /// Complex-to-complex transform where each value is a vector of two complex values.
    /// Typically used to transform RGBA data.
    ComplexToComplexDual,
    /// Complex-to-real transform. N / 2 + 1 complex values are used per row with a stride of
    /// N complex samples.
    ComplexToReal,
    /// Real-to-complex transform. N / 2 + 1 complex output samples are created per row with a
    /// stride of N complex samples.
    RealToComplex,
}

impl TransformType {
    pub(crate) const fn input_components(self) -> u32 {
        match self {
            TransformType::ComplexToComplex | TransformType::ComplexToReal => 2,
            TransformType::RealToComplex => 1,
            TransformType::ComplexToComplexDual => 4,
        }
    }

    /// Whether the transform needs a real/complex resolve pass.
    pub const fn needs_resolve(self) -> bool {
        matches!(self, TransformType::ComplexToReal | TransformType::RealToComplex)
    }
}

/// Where a pass reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    /// Shader storage buffer.
    Ssbo,
    /// Two or four component floating point image, depending on the transform.
    Image,
    /// Single component real-valued image.
    ImageReal,
}

/**
Everything that distinguishes one compiled kernel from another.

Constructed fresh for each pass or candidate and never mutated afterwards.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameters {
    pub workgroup_size_x: u32,
    pub workgroup_size_y: u32,
    pub workgroup_size_z: u32,
    pub radix: u32,
    pub vector_size: u32,
    pub direction: Direction,
    pub mode: Mode,
    pub input_target: Target,
    pub output_target: Target,
    /// First pass of a transform direction, where the stride `p` is 1.
    pub p1: bool,
    pub pow2_stride: bool,
    pub shared_banked: bool,
    pub fft_fp16: bool,
    pub input_fp16: bool,
    pub output_fp16: bool,
    pub fft_normalize: bool,
}

impl Parameters {
    /// Total invocations in one workgroup.
    pub const fn invocations(&self) -> u32 {
        self.workgroup_size_x * self.workgroup_size_y * self.workgroup_size_z
    }
}

/// Launch parameters the wisdom search tunes.
///
/// The defaults are conservative and work for every transform size the library supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Performance {
    /// Workgroup size in X. Large values may make smaller transforms impossible to build.
    pub workgroup_size_x: u32,
    /// Workgroup size in Y. Large values may make smaller transforms impossible to build.
    pub workgroup_size_y: u32,
    /// Vector size. "Scalar" GPUs prefer 2, vector GPUs prefer 4 (and maybe 8).
    pub vector_size: u32,
    /// Whether to use banked shared memory. Desktop GPUs usually prefer this, mobile GPUs don't.
    pub shared_banked: bool,
}

impl Default for Performance {
    fn default() -> Self {
        Performance {
            workgroup_size_x: 4,
            workgroup_size_y: 1,
            vector_size: 2,
            shared_banked: false,
        }
    }
}

impl Performance {
    pub const fn workgroup_size(&self) -> u32 {
        self.workgroup_size_x * self.workgroup_size_y
    }
}

/// Precision and normalization choices. Part of every wisdom key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Precision {
    /// Whether the kernel computes in half precision.
    pub fp16: bool,
    /// Whether the input buffer is packed 2xfp16 instead of fp32.
    pub input_fp16: bool,
    /// Whether the output buffer is packed 2xfp16 instead of fp32.
    pub output_fp16: bool,
    /// Whether to apply the 1 / N normalization factor.
    pub normalize: bool,
}

impl Precision {
    /// All of kernel, input and output in half precision.
    pub const fn is_full_fp16(&self) -> bool {
        self.fp16 && self.input_fp16 && self.output_fp16
    }
}

/// Options for building an FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Options {
    pub performance: Performance,
    pub precision: Precision,
}

impl Options {
    pub const fn new(performance: Performance, precision: Precision) -> Self {
        Options {
            performance,
            precision,
        }
    }
}
