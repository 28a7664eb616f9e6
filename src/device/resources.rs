// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Owning wrappers for device handles.

Each wrapper owns at most one handle.  They are move-only; re-initializing releases the previous
resource first, and dropping releases a non-null handle.
*/

use super::{
    BufferUsage, Device, DeviceError, RawHandle, TextureDescriptor, TextureFormat, TextureRegion,
};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub struct Buffer {
    device: Arc<dyn Device>,
    name: Option<RawHandle>,
}

impl Buffer {
    /// A null buffer. Call [`Buffer::init`] to allocate.
    pub fn new(device: &Arc<dyn Device>) -> Self {
        Buffer {
            device: device.clone(),
            name: None,
        }
    }

    /// Takes ownership of an existing handle.
    pub fn from_raw(device: &Arc<dyn Device>, name: RawHandle) -> Self {
        Buffer {
            device: device.clone(),
            name: Some(name),
        }
    }

    pub fn init(
        &mut self,
        data: Option<&[u8]>,
        size: usize,
        usage: BufferUsage,
    ) -> Result<RawHandle, DeviceError> {
        self.release();
        let name = self.device.create_buffer(data, size, usage)?;
        self.name = Some(name);
        Ok(name)
    }

    #[inline]
    pub fn get(&self) -> Option<RawHandle> {
        self.name
    }

    /// Gives up ownership without releasing.
    pub fn into_raw(mut self) -> Option<RawHandle> {
        self.name.take()
    }

    fn release(&mut self) {
        if let Some(name) = self.name.take() {
            self.device.delete_buffer(name);
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("name", &self.name).finish()
    }
}

pub struct Texture {
    device: Arc<dyn Device>,
    name: Option<RawHandle>,
    format: Option<TextureFormat>,
}

impl Texture {
    pub fn new(device: &Arc<dyn Device>) -> Self {
        Texture {
            device: device.clone(),
            name: None,
            format: None,
        }
    }

    pub fn from_raw(device: &Arc<dyn Device>, name: RawHandle, format: TextureFormat) -> Self {
        Texture {
            device: device.clone(),
            name: Some(name),
            format: Some(format),
        }
    }

    pub fn init(
        &mut self,
        width: u32,
        height: u32,
        levels: u32,
        format: TextureFormat,
    ) -> Result<RawHandle, DeviceError> {
        self.release();
        let name = self.device.create_texture(&TextureDescriptor {
            width,
            height,
            levels,
            format,
        })?;
        self.name = Some(name);
        self.format = Some(format);
        Ok(name)
    }

    /// Uploads tightly packed texels in the texture's format.
    pub fn upload(
        &self,
        data: &[u8],
        x_off: u32,
        y_off: u32,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        let name = self.name.ok_or(DeviceError::NullTexture)?;
        let region = TextureRegion {
            x: x_off,
            y: y_off,
            width,
            height,
        };
        self.device.upload_texture(name, &region, data)
    }

    #[inline]
    pub fn get(&self) -> Option<RawHandle> {
        self.name
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.format
    }

    pub fn into_raw(mut self) -> Option<RawHandle> {
        self.format = None;
        self.name.take()
    }

    fn release(&mut self) {
        if let Some(name) = self.name.take() {
            self.device.delete_texture(name);
        }
        self.format = None;
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for Texture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("format", &self.format)
            .finish()
    }
}

/// A compiled kernel.
pub struct Program {
    device: Arc<dyn Device>,
    name: Option<RawHandle>,
}

impl Program {
    pub fn from_raw(device: &Arc<dyn Device>, name: RawHandle) -> Self {
        Program {
            device: device.clone(),
            name: Some(name),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<RawHandle> {
        self.name
    }

    pub fn into_raw(mut self) -> Option<RawHandle> {
        self.name.take()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.device.delete_program(name);
        }
    }
}

impl Debug for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::SimulatedDevice;

    fn device() -> (Arc<SimulatedDevice>, Arc<dyn Device>) {
        let sim = Arc::new(SimulatedDevice::mali());
        let dyn_device: Arc<dyn Device> = sim.clone();
        (sim, dyn_device)
    }

    #[test]
    fn buffer_drop_releases_once() {
        let (sim, device) = device();
        {
            let mut buffer = Buffer::new(&device);
            assert!(buffer.get().is_none());
            buffer.init(None, 64, BufferUsage::StreamCopy).unwrap();
            assert_eq!(sim.stats().live_buffers, 1);
        }
        let stats = sim.stats();
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.buffers_released, 1);
    }

    #[test]
    fn reinit_releases_previous_buffer() {
        let (sim, device) = device();
        let mut buffer = Buffer::new(&device);
        let first = buffer.init(None, 16, BufferUsage::StaticCopy).unwrap();
        let second = buffer.init(None, 32, BufferUsage::StaticCopy).unwrap();
        assert_ne!(first, second);
        assert_eq!(buffer.get(), Some(second));
        let stats = sim.stats();
        assert_eq!(stats.live_buffers, 1);
        assert_eq!(stats.buffers_released, 1);
    }

    #[test]
    fn moving_transfers_ownership() {
        let (sim, device) = device();
        let mut buffer = Buffer::new(&device);
        buffer.init(None, 16, BufferUsage::StaticCopy).unwrap();
        let moved = buffer;
        assert_eq!(sim.stats().live_buffers, 1);
        drop(moved);
        assert_eq!(sim.stats().live_buffers, 0);
        assert_eq!(sim.stats().buffers_released, 1);
    }

    #[test]
    fn into_raw_does_not_release() {
        let (sim, device) = device();
        let mut buffer = Buffer::new(&device);
        let name = buffer.init(None, 16, BufferUsage::StaticCopy).unwrap();
        assert_eq!(buffer.into_raw(), Some(name));
        assert_eq!(sim.stats().live_buffers, 1);
        // hand it back so the device is left clean
        drop(Buffer::from_raw(&device, name));
        assert_eq!(sim.stats().live_buffers, 0);
    }

    #[test]
    fn upload_to_null_texture_fails() {
        let (_sim, device) = device();
        let texture = Texture::new(&device);
        let err = texture.upload(&[0; 8], 0, 0, 1, 1).unwrap_err();
        assert!(matches!(err, DeviceError::NullTexture));
    }

    #[test]
    fn texture_upload_and_release() {
        let (sim, device) = device();
        let mut texture = Texture::new(&device);
        texture.init(4, 2, 1, TextureFormat::Rg32Float).unwrap();
        texture.upload(&[0; 4 * 2 * 8], 0, 0, 4, 2).unwrap();
        assert_eq!(texture.format(), Some(TextureFormat::Rg32Float));
        let short = texture.upload(&[0; 8], 0, 0, 4, 2).unwrap_err();
        assert!(matches!(short, DeviceError::ShortUpload { .. }));
        drop(texture);
        assert_eq!(sim.stats().live_textures, 0);
        assert_eq!(sim.stats().textures_released, 1);
    }

    #[test]
    fn dual_textures_hold_two_complex_values_per_texel() {
        let (_sim, device) = device();
        let mut texture = Texture::new(&device);
        texture.init(4, 2, 1, TextureFormat::Rgba32Float).unwrap();
        assert_eq!(TextureFormat::Rgba32Float.bytes_per_texel(), 16);
        // sized for a single complex value per texel
        let short = texture.upload(&[0; 4 * 2 * 8], 0, 0, 4, 2).unwrap_err();
        assert!(matches!(short, DeviceError::ShortUpload { .. }));
        texture.upload(&[0; 4 * 2 * 16], 0, 0, 4, 2).unwrap();
    }
}
