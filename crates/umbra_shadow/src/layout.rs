//! Assignment of texture array layers to directional lights.

use crate::{
    light::{LightIdx, ShaderLight, ShadowMapMode},
    resolution::{N_RESOLUTION_BUCKETS, ResolutionBucket, ShadowMapResolution},
};

/// How the shadow maps of a light list are laid out.
///
/// Shadow casting directional lights share one texture array per resolution.
/// Within an array, lights get consecutive layers in light list order, so the
/// layout only depends on the kinds, shadow flags and resolutions of the
/// lights and on their order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowMapLayout {
    n_shadows: usize,
    bucket_layer_counts: [u32; N_RESOLUTION_BUCKETS],
    layer_indices: Vec<Option<u32>>,
}

impl ShadowMapLayout {
    /// Computes the layout for the given lights.
    pub fn for_lights(lights: &[ShaderLight]) -> Self {
        let mut n_shadows = 0;
        let mut bucket_layer_counts = [0; N_RESOLUTION_BUCKETS];

        let layer_indices = lights
            .iter()
            .map(|light| {
                if !light.shadows {
                    return None;
                }
                n_shadows += 1;

                if light.shadow_map_mode() != ShadowMapMode::Vsm {
                    return None;
                }
                let count =
                    &mut bucket_layer_counts[usize::from(light.shadow_map_resolution.bucket())];
                let layer_index = *count;
                *count += 1;
                Some(layer_index)
            })
            .collect();

        Self {
            n_shadows,
            bucket_layer_counts,
            layer_indices,
        }
    }

    /// Returns the number of shadow casting lights.
    pub fn n_shadows(&self) -> usize {
        self.n_shadows
    }

    /// Returns the number of directional lights sharing the texture array of
    /// the given bucket.
    pub fn layer_count(&self, bucket: ResolutionBucket) -> u32 {
        self.bucket_layer_counts[usize::from(bucket)]
    }

    /// Returns the resolution and layer count of each texture array needed,
    /// from lowest to highest resolution.
    pub fn texture_arrays(&self) -> impl Iterator<Item = (ShadowMapResolution, u32)> + '_ {
        self.bucket_layer_counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(bucket, &count)| (ShadowMapResolution::from_bucket(bucket as u8), count))
    }

    /// Returns the texture array layer assigned to the light with the given
    /// index, or [`None`] if the light is not a shadow casting directional
    /// light.
    pub fn layer_index(&self, light_index: LightIdx) -> Option<u32> {
        self.layer_indices.get(light_index).copied().flatten()
    }
}
