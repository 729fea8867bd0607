//! Configuration of shadow mapping.

/// Configuration options for shadow mapping.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowMappingConfig {
    /// Whether shadow maps should be allocated at all. When disabled, every
    /// cached shadow map resource is released.
    pub enabled: bool,
    /// Whether cube map shadow maps should get render targets for blurring.
    /// Blurring a cube map requires six color attachments, so it is skipped
    /// on devices supporting fewer regardless of this option.
    pub blur_cube_maps: bool,
}

impl Default for ShadowMappingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blur_cube_maps: true,
        }
    }
}
