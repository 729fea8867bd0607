//! Lights as seen by the shadow map manager.

use crate::resolution::ShadowMapResolution;

/// Index of a light in the light list passed to
/// [`ShadowMapManager::add_shadow_maps`](crate::ShadowMapManager::add_shadow_maps).
pub type LightIdx = usize;

/// The kind of light source.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
    Other,
}

/// How the shadow map of a light is stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShadowMapMode {
    /// Variance shadow map in a layer of a texture array shared with other
    /// directional lights of the same resolution.
    Vsm,
    /// Cube map with one face per axis direction.
    Cube,
}

/// A light that may cast shadows in the current frame.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderLight {
    pub kind: LightKind,
    /// Whether the light casts shadows.
    pub shadows: bool,
    pub shadow_map_resolution: ShadowMapResolution,
    /// Name used to label the GPU resources of the light.
    pub debug_name: String,
}

impl ShadowMapMode {
    /// Returns the shadow map mode used for lights of the given kind.
    pub const fn for_light_kind(kind: LightKind) -> Self {
        match kind {
            LightKind::Directional => Self::Vsm,
            LightKind::Point | LightKind::Spot | LightKind::Other => Self::Cube,
        }
    }
}

impl ShaderLight {
    /// Creates a shadow casting light of the given kind.
    pub fn new(
        kind: LightKind,
        shadow_map_resolution: impl Into<ShadowMapResolution>,
        debug_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            shadows: true,
            shadow_map_resolution: shadow_map_resolution.into(),
            debug_name: debug_name.into(),
        }
    }

    /// Creates a shadow casting directional light.
    pub fn directional(
        shadow_map_resolution: impl Into<ShadowMapResolution>,
        debug_name: impl Into<String>,
    ) -> Self {
        Self::new(LightKind::Directional, shadow_map_resolution, debug_name)
    }

    /// Creates a shadow casting point light.
    pub fn point(
        shadow_map_resolution: impl Into<ShadowMapResolution>,
        debug_name: impl Into<String>,
    ) -> Self {
        Self::new(LightKind::Point, shadow_map_resolution, debug_name)
    }

    /// Creates a shadow casting spot light.
    pub fn spot(
        shadow_map_resolution: impl Into<ShadowMapResolution>,
        debug_name: impl Into<String>,
    ) -> Self {
        Self::new(LightKind::Spot, shadow_map_resolution, debug_name)
    }

    /// Returns the light with shadow casting disabled.
    pub fn without_shadows(mut self) -> Self {
        self.shadows = false;
        self
    }

    /// Returns the light with the given shadow map resolution.
    pub fn with_resolution(
        mut self,
        shadow_map_resolution: impl Into<ShadowMapResolution>,
    ) -> Self {
        self.shadow_map_resolution = shadow_map_resolution.into();
        self
    }

    pub fn shadow_map_mode(&self) -> ShadowMapMode {
        ShadowMapMode::for_light_kind(self.kind)
    }
}
