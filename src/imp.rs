// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backends implementing [`crate::device::Device`].
//!
//! The simulated backend is always available.  The wgpu backend is compiled with the
//! `backend_wgpu` feature.

mod simulated;

pub use simulated::{
    CompileFilter, CostModel, SimulatedDevice, SimulatedStats, default_cost_model,
};

#[cfg(feature = "backend_wgpu")]
mod wgpu;

#[cfg(feature = "backend_wgpu")]
pub use self::wgpu::{KernelSource, WgpuDevice};
