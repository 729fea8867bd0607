//! Allocation and reuse of the GPU resources backing shadow maps.

pub mod allocation;
pub mod config;
pub mod entry;
pub mod layout;
pub mod light;
#[cfg(test)]
mod log_capture;
pub mod manager;
pub mod resolution;

pub use config::ShadowMappingConfig;
pub use entry::{CubemapFace, ShadowMapEntry, TextureArrayRef};
pub use light::{LightIdx, LightKind, ShaderLight, ShadowMapMode};
pub use manager::ShadowMapManager;
pub use resolution::{ShadowMapQuality, ShadowMapResolution};
