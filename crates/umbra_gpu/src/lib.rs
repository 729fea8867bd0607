//! Abstractions for allocating GPU resources backing shadow maps.

pub mod device;
pub mod resource;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wgpu_device;

pub use device::GraphicsDevice;
pub use wgpu;
pub use wgpu_device::WgpuGraphicsDevice;
