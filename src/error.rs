// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error types.
//!
//! [`ConfigError`] means "this configuration cannot be built here".  The learner treats it as an
//! infeasible candidate and moves on.  Everything else in [`Error`] is a real failure.

use crate::device::DeviceError;
use crate::parameters::Mode;

/// A pass or transform configuration that cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Transform sizes {nx}x{ny} must be non-zero powers of two")]
    NotPowerOfTwo { nx: u32, ny: u32 },
    #[error("P != 1 only supported with SSBO as input")]
    P1RequiresSsboInput,
    #[error("P < radix only supported with SSBO as output")]
    PartialRequiresSsboOutput,
    #[error("Workgroup size in y must be 1 when Ny is 1")]
    WorkgroupYMustBeOne,
    #[error("Invalid workgroup sizes for this transform")]
    InvalidWorkgroupSizes,
    #[error("Failed to subdivide {size} into supported radices")]
    NoSubdivision { size: u32 },
    #[error("Radix split does not multiply out to {size}")]
    InvalidRadixSplit { size: u32 },
    #[error("Complex-to-real transforms require the inverse direction")]
    ComplexToRealRequiresInverse,
    #[error("Real-to-complex transforms require the forward direction")]
    RealToComplexRequiresForward,
    #[error("Real-to-complex transforms cannot read from a complex image")]
    RealInputRequiresImageReal,
    #[error("Complex-to-real transforms cannot write to a complex image")]
    RealOutputRequiresImageReal,
    #[error("Transform sizes {nx}x{ny} overflow the addressable range")]
    SizeOverflow { nx: u32, ny: u32 },
    #[error("Program failed to build: {0}")]
    Compile(String),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Infeasible configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Mode {0:?} cannot be used with this target")]
    InvalidMode(Mode),
    #[error("Malformed wisdom archive: {0}")]
    Archive(#[from] serde_json::Error),
    #[error("Unsupported wisdom archive version {0}")]
    UnsupportedArchiveVersion(u32),
}

impl Error {
    /// The configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config(e) => Some(e),
            _ => None,
        }
    }
}
