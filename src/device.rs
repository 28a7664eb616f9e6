// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The GPU seam.
//!
//! Everything the planner needs from a GPU API goes through [`Device`]: allocating scratch
//! resources, building a program for a [`Parameters`] value, dispatching it, waiting for the
//! queue to drain and reading a clock.  Backends live in [`crate::imp`].
//!
//! Handles are opaque.  Ownership of the underlying resource is expressed by the wrappers in
//! [`resources`], which release their handle exactly once.

use crate::parameters::{Parameters, Target};
use std::fmt::Debug;
use std::num::NonZeroU32;

pub mod resources;

pub use resources::{Buffer, Program, Texture};

/// An opaque, non-null device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroU32);

impl RawHandle {
    /// Returns `None` for the null handle.
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(n) => Some(RawHandle(n)),
            None => None,
        }
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Usage hint for buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once, read by the GPU many times.
    StaticCopy,
    /// Written and read by the GPU every frame.
    StreamCopy,
}

/// Texel formats the planner allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// One complex value per texel.
    Rg32Float,
    /// Two complex values per texel, for dual transforms.
    Rgba32Float,
}

impl TextureFormat {
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: TextureFormat,
}

/// A rectangular sub-region of mip level 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How a resource is bound to a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Buffer(RawHandle),
    Texture(RawHandle),
}

impl Binding {
    /// Buffers for [`Target::Ssbo`], textures for everything else.
    pub const fn for_target(target: Target, handle: RawHandle) -> Self {
        match target {
            Target::Ssbo => Binding::Buffer(handle),
            Target::Image | Target::ImageReal => Binding::Texture(handle),
        }
    }

    pub const fn handle(self) -> RawHandle {
        match self {
            Binding::Buffer(h) | Binding::Texture(h) => h,
        }
    }
}

/// One compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch {
    pub program: RawHandle,
    pub input: Binding,
    pub output: Binding,
    /// Stride uniform for passes that are not the first of their direction.
    pub p: u32,
    /// Texture coordinate offset, used when sampling an image input.
    pub texture_offset: [f32; 2],
    /// Texture coordinate scale, used when sampling an image input.
    pub texture_scale: [f32; 2],
    pub workgroups_x: u32,
    pub workgroups_y: u32,
}

/// What a device reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Free-form renderer / adapter name, used to pick static wisdom.
    pub renderer: String,
    /// Maximum number of invocations in one compute workgroup.
    pub max_compute_invocations: u32,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DeviceError {
    #[error("No such adapter")]
    NoSuchAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error("Can't request device {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Unknown {kind} handle {handle}")]
    UnknownHandle { kind: &'static str, handle: u32 },
    #[error("Cannot upload to null texture")]
    NullTexture,
    #[error("Cannot bind a null buffer")]
    NullBuffer,
    #[error("Upload of {len} bytes does not cover {width}x{height} texels")]
    ShortUpload { len: usize, width: u32, height: u32 },
    #[error("Out of device memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },
    #[error("Failed to compile program: {0}")]
    Compile(String),
}

/**
A GPU that can build and time FFT passes.

Implementations use interior mutability; the planner only ever holds shared references.
*/
pub trait Device: Debug {
    fn info(&self) -> DeviceInfo;

    /// Allocates a buffer of `size` bytes, optionally initialized from `data`.
    fn create_buffer(
        &self,
        data: Option<&[u8]>,
        size: usize,
        usage: BufferUsage,
    ) -> Result<RawHandle, DeviceError>;
    fn delete_buffer(&self, buffer: RawHandle);

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<RawHandle, DeviceError>;
    /// Uploads tightly packed texels into `region` of mip level 0.
    fn upload_texture(
        &self,
        texture: RawHandle,
        region: &TextureRegion,
        data: &[u8],
    ) -> Result<(), DeviceError>;
    fn delete_texture(&self, texture: RawHandle);

    /// Builds the kernel variant described by `parameters`.
    fn build_program(&self, parameters: &Parameters) -> Result<RawHandle, DeviceError>;
    fn delete_program(&self, program: RawHandle);

    fn dispatch(&self, dispatch: &Dispatch) -> Result<(), DeviceError>;

    /// Orders writes of previous dispatches before reads of later ones.
    fn memory_barrier(&self) {}

    /// Blocks until all submitted work has completed.
    fn finish(&self);

    /// Monotonic time in seconds.
    fn now(&self) -> f64;
}
