//! Shadow map resource management for a 3D scene runtime.

pub use umbra_gpu;
pub use umbra_log;
pub use umbra_shadow;

pub use umbra_gpu::GraphicsDevice;
pub use umbra_shadow::{
    CubemapFace, LightIdx, LightKind, ShaderLight, ShadowMapEntry, ShadowMapManager,
    ShadowMapMode, ShadowMapQuality, ShadowMapResolution, ShadowMappingConfig, TextureArrayRef,
};
