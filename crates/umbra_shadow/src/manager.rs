//! Management of the shadow maps of all lights in a scene.

use crate::{
    allocation::{self, AllocatedTexture},
    config::ShadowMappingConfig,
    entry::{
        CubeShadowMapResources, DirectionalShadowMapResources, ShadowMapEntry, TextureArrayRef,
    },
    layout::ShadowMapLayout,
    light::{LightIdx, ShaderLight, ShadowMapMode},
    resolution::ShadowMapResolution,
};
use std::collections::BTreeMap;
use umbra_gpu::{
    GraphicsDevice,
    resource::{RenderBufferKind, TextureFlags, TextureFormat, TextureSize},
};

/// Number of color attachments needed to blur all faces of a cube map in a
/// single pass.
const CUBE_BLUR_COLOR_ATTACHMENTS: u32 = 6;

/// Owner of the GPU resources backing the shadow maps of the lights in a
/// scene.
///
/// Directional lights render into layers of texture arrays shared between all
/// directional lights with the same shadow map resolution. All other lights
/// get their own cube map.
///
/// Resources are only reallocated when the set of shadow casting lights
/// changes in a way that invalidates the current allocation, in which case
/// everything is released and allocated anew.
#[derive(Debug)]
pub struct ShadowMapManager<D: GraphicsDevice> {
    device: D,
    config: ShadowMappingConfig,
    entries: Vec<ShadowMapEntry>,
    texture_arrays: BTreeMap<ShadowMapResolution, AllocatedTexture>,
    warned_about_unblurred_cube_maps: bool,
}

impl<D: GraphicsDevice> ShadowMapManager<D> {
    /// Creates a manager allocating shadow maps on the given device with the
    /// default configuration.
    pub fn new(device: D) -> Self {
        Self::with_config(device, ShadowMappingConfig::default())
    }

    /// Creates a manager allocating shadow maps on the given device with the
    /// given configuration.
    pub fn with_config(device: D, config: ShadowMappingConfig) -> Self {
        Self {
            device,
            config,
            entries: Vec::new(),
            texture_arrays: BTreeMap::new(),
            warned_about_unblurred_cube_maps: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &ShadowMappingConfig {
        &self.config
    }

    /// Replaces the configuration. If it differs from the current one, all
    /// cached resources are released so that the next call to
    /// [`Self::add_shadow_maps`] allocates them anew.
    pub fn set_config(&mut self, config: ShadowMappingConfig) {
        if config != self.config {
            self.release_cached_resources();
            self.config = config;
        }
    }

    /// Returns the shadow map entry of the light with the given index in the
    /// light list most recently passed to [`Self::add_shadow_maps`], or
    /// [`None`] if the light does not cast shadows.
    pub fn shadow_map_entry(&self, light_index: LightIdx) -> Option<&ShadowMapEntry> {
        self.entries
            .iter()
            .find(|entry| entry.light_index() == light_index)
    }

    /// Returns the number of shadow map entries, which equals the number of
    /// shadow casting lights.
    pub fn shadow_map_entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the shadow map entries in light list order.
    pub fn entries(&self) -> &[ShadowMapEntry] {
        &self.entries
    }

    /// Returns the texture array shared by directional lights with the given
    /// shadow map resolution, if any.
    pub fn texture_array(&self, resolution: ShadowMapResolution) -> Option<&AllocatedTexture> {
        self.texture_arrays.get(&resolution)
    }

    /// Returns the number of shared texture arrays.
    pub fn n_texture_arrays(&self) -> usize {
        self.texture_arrays.len()
    }

    /// Makes sure every shadow casting light in the given list has a shadow
    /// map.
    ///
    /// If the current shadow maps fit the lights, nothing happens. Otherwise
    /// all shadow map resources are released and allocated anew. Failing to
    /// allocate a resource is logged and leaves the affected light without a
    /// usable shadow map. Nothing is done if the device has no backend.
    pub fn add_shadow_maps(&mut self, lights: &[ShaderLight]) {
        if !self.device.has_backend() {
            return;
        }
        if !self.config.enabled {
            self.release_cached_resources();
            return;
        }

        let layout = ShadowMapLayout::for_lights(lights);

        if !self.needs_rebuild(lights, &layout) {
            umbra_log::trace!("Reusing shadow maps for {} lights", layout.n_shadows());
            return;
        }

        umbra_log::with_trace_logging!("Rebuilding shadow maps for {} lights", layout.n_shadows(); {
            self.rebuild(lights, &layout);
        });
    }

    /// Destroys every shadow map resource. Entries are removed, so the next
    /// call to [`Self::add_shadow_maps`] allocates everything anew.
    pub fn release_cached_resources(&mut self) {
        for mut entry in self.entries.drain(..) {
            entry.destroy_gpu_resources(&self.device);
        }
        for texture_array in std::mem::take(&mut self.texture_arrays).into_values() {
            texture_array.destroy(&self.device);
        }
    }

    fn needs_rebuild(&self, lights: &[ShaderLight], layout: &ShadowMapLayout) -> bool {
        if layout.n_shadows() != self.entries.len() {
            return true;
        }

        lights
            .iter()
            .enumerate()
            .filter(|(_, light)| light.shadows)
            .any(|(light_index, light)| {
                let size = TextureSize::square(light.shadow_map_resolution.size());
                let layer_index = layout.layer_index(light_index).unwrap_or(0);
                self.shadow_map_entry(light_index).is_none_or(|entry| {
                    !entry.is_compatible(size, layer_index, light.shadow_map_mode())
                })
            })
    }

    fn rebuild(&mut self, lights: &[ShaderLight], layout: &ShadowMapLayout) {
        self.release_cached_resources();

        let format = allocation::select_shadow_format(&self.device);

        for (resolution, n_layers) in layout.texture_arrays() {
            let texture_array = allocation::allocate_texture(
                &self.device,
                format,
                TextureSize::square(resolution.size()),
                n_layers,
                TextureFlags::RENDER_TARGET | TextureFlags::TEXTURE_ARRAY,
            );
            self.texture_arrays.insert(resolution, texture_array);
        }

        let blur_cube_maps = self.config.blur_cube_maps
            && self.device.max_color_attachments() >= CUBE_BLUR_COLOR_ATTACHMENTS;

        let mut entries = Vec::with_capacity(layout.n_shadows());

        for (light_index, light) in lights.iter().enumerate() {
            if !light.shadows {
                continue;
            }
            let entry = match light.shadow_map_mode() {
                ShadowMapMode::Vsm => {
                    // Always assigned for shadow casting directional lights
                    let layer_index = layout.layer_index(light_index).unwrap_or_default();
                    self.create_directional_entry(light_index, light, format, layer_index)
                }
                ShadowMapMode::Cube => {
                    if !blur_cube_maps
                        && self.config.blur_cube_maps
                        && !self.warned_about_unblurred_cube_maps
                    {
                        umbra_log::warn!(
                            "Cube map shadow maps will not be blurred because the device supports \
                             {} color attachments, fewer than {CUBE_BLUR_COLOR_ATTACHMENTS}",
                            self.device.max_color_attachments()
                        );
                        self.warned_about_unblurred_cube_maps = true;
                    }
                    self.create_cube_entry(light_index, light, format, blur_cube_maps)
                }
            };
            entries.push(entry);
        }

        umbra_log::debug!(
            "Allocated {} shadow maps using {} shared texture arrays",
            entries.len(),
            self.texture_arrays.len()
        );

        self.entries = entries;
    }

    fn create_directional_entry(
        &self,
        light_index: LightIdx,
        light: &ShaderLight,
        format: TextureFormat,
        layer_index: u32,
    ) -> ShadowMapEntry {
        let size = TextureSize::square(light.shadow_map_resolution.size());

        let texture_array = &self.texture_arrays[&light.shadow_map_resolution];
        debug_assert!(layer_index < texture_array.layer_count());

        let resources = DirectionalShadowMapResources {
            texture_array: TextureArrayRef::new(texture_array),
            layer_index,
            depth_copy: allocation::allocate_texture(
                &self.device,
                format,
                size,
                0,
                TextureFlags::RENDER_TARGET,
            ),
            depth_stencil: allocation::allocate_render_buffer(
                &self.device,
                RenderBufferKind::DepthStencil,
                size,
            ),
        };

        ShadowMapEntry::for_directional(&self.device, light_index, resources, &light.debug_name)
    }

    fn create_cube_entry(
        &self,
        light_index: LightIdx,
        light: &ShaderLight,
        format: TextureFormat,
        blur: bool,
    ) -> ShadowMapEntry {
        let size = TextureSize::square(light.shadow_map_resolution.size());
        let flags = TextureFlags::RENDER_TARGET | TextureFlags::CUBE_MAP;

        let resources = CubeShadowMapResources {
            depth_cube: allocation::allocate_texture(&self.device, format, size, 0, flags),
            cube_copy: allocation::allocate_texture(&self.device, format, size, 0, flags),
            depth_stencil: allocation::allocate_render_buffer(
                &self.device,
                RenderBufferKind::DepthStencil,
                size,
            ),
        };

        ShadowMapEntry::for_cube(&self.device, light_index, resources, blur, &light.debug_name)
    }
}

impl<D: GraphicsDevice> Drop for ShadowMapManager<D> {
    fn drop(&mut self) {
        self.release_cached_resources();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry::CubemapFace, log_capture::capture_warnings, resolution::ShadowMapQuality};
    use std::sync::Arc;
    use umbra_gpu::{resource::RenderTargetID, testing::RecordingGraphicsDevice};

    type TestManager = ShadowMapManager<RecordingGraphicsDevice>;

    fn directional(size: u32, name: &str) -> ShaderLight {
        ShaderLight::directional(ShadowMapResolution::new(size).unwrap(), name)
    }

    fn point(size: u32, name: &str) -> ShaderLight {
        ShaderLight::point(ShadowMapResolution::new(size).unwrap(), name)
    }

    fn resolution(size: u32) -> ShadowMapResolution {
        ShadowMapResolution::new(size).unwrap()
    }

    fn all_render_targets(manager: &TestManager) -> Vec<RenderTargetID> {
        manager
            .entries()
            .iter()
            .flat_map(|entry| {
                let mut render_targets = vec![entry.render_target()];
                render_targets.extend(
                    CubemapFace::all()
                        .into_iter()
                        .map(|face| entry.face_render_target(face)),
                );
                render_targets.extend(entry.blur_render_targets());
                render_targets
            })
            .flatten()
            .collect()
    }

    #[test]
    fn adding_identical_lights_again_allocates_nothing() {
        let lights = [
            directional(1024, "sun"),
            point(512, "lamp"),
            ShaderLight::spot(ShadowMapQuality::Low, "torch"),
        ];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);
        let creations = manager.device().creation_count();
        let render_targets = all_render_targets(&manager);

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.device().creation_count(), creations);
        assert_eq!(manager.device().destruction_count(), 0);
        assert_eq!(all_render_targets(&manager), render_targets);
    }

    #[test]
    fn directional_lights_at_same_resolution_occupy_consecutive_layers_of_one_array() {
        let lights = [
            directional(1024, "L0"),
            directional(1024, "L1"),
            directional(1024, "L2"),
        ];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);

        let texture_array = manager.texture_array(resolution(1024)).unwrap();
        assert_eq!(texture_array.layer_count(), 3);
        assert_eq!(manager.n_texture_arrays(), 1);

        for light_index in 0..3 {
            let entry = manager.shadow_map_entry(light_index).unwrap();
            assert_eq!(entry.depth_array_layer(), Some(light_index as u32));
            assert_eq!(entry.texture_array().unwrap().id(), texture_array.id());
        }
    }

    #[test]
    fn directional_lights_at_different_resolutions_never_share_an_array() {
        let lights = [directional(512, "near"), directional(2048, "far")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.n_texture_arrays(), 2);

        let small = manager.texture_array(resolution(512)).unwrap();
        let large = manager.texture_array(resolution(2048)).unwrap();
        assert_ne!(small.id(), large.id());
        assert_eq!(small.size(), TextureSize::square(512));
        assert_eq!(large.size(), TextureSize::square(2048));
        assert_eq!(small.layer_count(), 1);
        assert_eq!(large.layer_count(), 1);

        let near = manager.shadow_map_entry(0).unwrap();
        let far = manager.shadow_map_entry(1).unwrap();
        assert_eq!(near.texture_array().unwrap().id(), small.id());
        assert_eq!(far.texture_array().unwrap().id(), large.id());
        assert_eq!(near.depth_array_layer(), Some(0));
        assert_eq!(far.depth_array_layer(), Some(0));
    }

    #[test]
    fn entries_report_the_mode_of_their_light() {
        let lights = [directional(1024, "sun"), point(1024, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);

        let size = TextureSize::square(1024);
        let sun = manager.shadow_map_entry(0).unwrap();
        let lamp = manager.shadow_map_entry(1).unwrap();
        assert!(sun.is_compatible(size, 0, ShadowMapMode::Vsm));
        assert!(!sun.is_compatible(size, 0, ShadowMapMode::Cube));
        assert!(lamp.is_compatible(size, 0, ShadowMapMode::Cube));
        assert!(!lamp.is_compatible(size, 0, ShadowMapMode::Vsm));
    }

    #[test]
    fn adding_a_shadowed_light_rebuilds_everything() {
        let mut lights = vec![directional(1024, "sun"), point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);
        let old_render_targets = all_render_targets(&manager);
        let old_array = manager.texture_array(resolution(1024)).unwrap().id().unwrap();
        assert_eq!(manager.shadow_map_entry_count(), 2);

        lights.push(directional(256, "moon"));
        manager.add_shadow_maps(&lights);

        assert_eq!(manager.shadow_map_entry_count(), 3);
        assert!(!old_render_targets.is_empty());
        for render_target in old_render_targets {
            assert!(!manager.device().is_render_target_alive(render_target));
        }
        assert!(!manager.device().is_texture_alive(old_array));
        assert!(manager.shadow_map_entry(2).is_some());
    }

    #[test]
    fn changing_a_resolution_rebuilds_the_texture_arrays() {
        let mut lights = vec![directional(1024, "sun")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);
        let old_array = manager.texture_array(resolution(1024)).unwrap().id().unwrap();

        lights[0] = lights[0].clone().with_resolution(resolution(2048));
        assert!(!manager.shadow_map_entry(0).unwrap().is_compatible(
            TextureSize::square(2048),
            0,
            ShadowMapMode::Vsm
        ));

        manager.add_shadow_maps(&lights);

        assert!(!manager.device().is_texture_alive(old_array));
        assert!(manager.texture_array(resolution(1024)).is_none());

        let new_array = manager.texture_array(resolution(2048)).unwrap();
        assert!(manager.device().is_texture_alive(new_array.id().unwrap()));
        assert_eq!(manager.n_texture_arrays(), 1);
        assert_eq!(
            manager.shadow_map_entry(0).unwrap().texture_array().unwrap().id(),
            new_array.id()
        );
    }

    #[test]
    fn cube_maps_are_not_blurred_with_too_few_color_attachments() {
        let lights = [point(512, "a"), point(512, "b"), point(1024, "c")];
        let mut manager =
            TestManager::new(RecordingGraphicsDevice::new().with_max_color_attachments(4));

        let ((), warnings) = capture_warnings(|| manager.add_shadow_maps(&lights));

        assert_eq!(warnings.len(), 1);
        assert_eq!(manager.shadow_map_entry_count(), 3);
        for entry in manager.entries() {
            for face in CubemapFace::all() {
                assert!(entry.face_render_target(face).is_some());
            }
            assert_eq!(entry.blur_render_targets(), [None, None]);
            assert!(!entry.is_blurred());
        }
    }

    #[test]
    fn missing_cube_map_blur_is_only_warned_about_once_per_manager() {
        let device = Arc::new(RecordingGraphicsDevice::new().with_max_color_attachments(4));
        let mut manager = ShadowMapManager::new(Arc::clone(&device));

        let ((), first) = capture_warnings(|| manager.add_shadow_maps(&[point(512, "a")]));
        let ((), second) = capture_warnings(|| {
            manager.add_shadow_maps(&[point(512, "a"), point(256, "b")]);
        });

        let mut other_manager = ShadowMapManager::new(device);
        let ((), other) = capture_warnings(|| other_manager.add_shadow_maps(&[point(512, "a")]));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn cube_maps_are_blurred_when_color_attachments_suffice() {
        let mut manager =
            TestManager::new(RecordingGraphicsDevice::new().with_max_color_attachments(6));

        let ((), warnings) = capture_warnings(|| manager.add_shadow_maps(&[point(512, "lamp")]));

        assert!(warnings.is_empty());
        assert!(manager.shadow_map_entry(0).unwrap().is_blurred());
    }

    #[test]
    fn disabling_cube_map_blur_skips_it_without_warning() {
        let config = ShadowMappingConfig {
            blur_cube_maps: false,
            ..Default::default()
        };
        let mut manager = TestManager::with_config(
            RecordingGraphicsDevice::new().with_max_color_attachments(4),
            config,
        );

        let ((), warnings) = capture_warnings(|| manager.add_shadow_maps(&[point(512, "lamp")]));

        assert!(warnings.is_empty());
        assert!(!manager.shadow_map_entry(0).unwrap().is_blurred());
    }

    #[test]
    fn nothing_is_allocated_without_backend() {
        let lights = [directional(1024, "sun"), point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::without_backend());

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.shadow_map_entry_count(), 0);
        assert_eq!(manager.n_texture_arrays(), 0);
        assert_eq!(manager.device().creation_count(), 0);
    }

    #[test]
    fn lights_without_shadows_get_no_entry() {
        let lights = [
            directional(1024, "sun").without_shadows(),
            point(512, "lamp"),
        ];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.shadow_map_entry_count(), 1);
        assert!(manager.shadow_map_entry(0).is_none());
        assert_eq!(manager.shadow_map_entry(1).unwrap().light_index(), 1);
        assert_eq!(manager.n_texture_arrays(), 0);
    }

    #[test]
    fn failed_allocations_do_not_abort_the_rebuild() {
        let lights = [directional(1024, "sun"), point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.device().set_texture_creation_fails(true);

        let ((), warnings) = capture_warnings(|| manager.add_shadow_maps(&lights));

        assert!(!warnings.is_empty());
        assert_eq!(manager.shadow_map_entry_count(), 2);
        assert!(!manager.texture_array(resolution(1024)).unwrap().is_valid());

        let sun = manager.shadow_map_entry(0).unwrap();
        assert!(sun.render_target().is_none());
        assert!(sun.depth_stencil().unwrap().is_valid());

        let lamp = manager.shadow_map_entry(1).unwrap();
        assert!(!lamp.depth_cube().unwrap().is_valid());
        assert!(lamp.face_render_target(CubemapFace::PositiveX).is_none());
    }

    #[test]
    fn failed_depth_stencil_buffers_leave_only_depth_render_targets_missing() {
        let lights = [directional(1024, "sun"), point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.device().set_render_buffer_creation_fails(true);

        let ((), warnings) = capture_warnings(|| manager.add_shadow_maps(&lights));

        assert!(!warnings.is_empty());
        assert_eq!(manager.shadow_map_entry_count(), 2);

        let sun = manager.shadow_map_entry(0).unwrap();
        assert!(!sun.depth_stencil().unwrap().is_valid());
        assert!(sun.render_target().is_none());
        assert!(sun.is_blurred());

        let lamp = manager.shadow_map_entry(1).unwrap();
        assert!(!lamp.depth_stencil().unwrap().is_valid());
        assert!(lamp.depth_cube().unwrap().is_valid());
        for face in CubemapFace::all() {
            assert!(lamp.face_render_target(face).is_none());
        }
        assert!(lamp.is_blurred());

        let creations = manager.device().creation_count();
        manager.add_shadow_maps(&lights);
        assert_eq!(manager.device().creation_count(), creations);
    }

    #[test]
    fn failed_allocations_are_not_retried_until_lights_change() {
        let lights = [point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.device().set_texture_creation_fails(true);

        capture_warnings(|| manager.add_shadow_maps(&lights));
        manager.device().set_texture_creation_fails(false);
        let creations = manager.device().creation_count();

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.device().creation_count(), creations);
        assert!(!manager.shadow_map_entry(0).unwrap().depth_cube().unwrap().is_valid());

        manager.add_shadow_maps(&[point(1024, "lamp")]);

        assert!(manager.shadow_map_entry(0).unwrap().depth_cube().unwrap().is_valid());
    }

    #[test]
    fn disabling_shadow_mapping_releases_all_resources() {
        let lights = [directional(1024, "sun"), point(512, "lamp")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.add_shadow_maps(&lights);
        assert!(manager.device().live_resource_count() > 0);

        manager.set_config(ShadowMappingConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(manager.device().live_resource_count(), 0);

        manager.add_shadow_maps(&lights);

        assert_eq!(manager.shadow_map_entry_count(), 0);
        assert_eq!(manager.device().live_resource_count(), 0);
        assert!(!manager.config().enabled);
    }

    #[test]
    fn setting_unchanged_config_keeps_resources() {
        let lights = [directional(1024, "sun")];
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.add_shadow_maps(&lights);
        let live_resources = manager.device().live_resource_count();

        manager.set_config(ShadowMappingConfig::default());

        assert_eq!(manager.device().live_resource_count(), live_resources);
        assert_eq!(manager.shadow_map_entry_count(), 1);
    }

    #[test]
    fn reordering_lights_of_different_kinds_forces_a_rebuild() {
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.add_shadow_maps(&[directional(512, "sun"), point(512, "lamp")]);
        let creations = manager.device().creation_count();

        manager.add_shadow_maps(&[point(512, "lamp"), directional(512, "sun")]);

        assert!(manager.device().creation_count() > creations);
        assert_eq!(
            manager.shadow_map_entry(0).unwrap().mode(),
            ShadowMapMode::Cube
        );
        assert_eq!(
            manager.shadow_map_entry(1).unwrap().mode(),
            ShadowMapMode::Vsm
        );
    }

    #[test]
    fn releasing_cached_resources_destroys_everything() {
        let mut manager = TestManager::new(RecordingGraphicsDevice::new());
        manager.add_shadow_maps(&[directional(1024, "sun"), point(512, "lamp")]);

        manager.release_cached_resources();

        assert_eq!(manager.shadow_map_entry_count(), 0);
        assert_eq!(manager.n_texture_arrays(), 0);
        assert_eq!(manager.device().live_resource_count(), 0);
    }

    #[test]
    fn dropping_manager_releases_all_resources() {
        let device = Arc::new(RecordingGraphicsDevice::new());
        let mut manager = ShadowMapManager::new(Arc::clone(&device));
        manager.add_shadow_maps(&[
            directional(1024, "sun"),
            directional(1024, "moon"),
            point(512, "lamp"),
        ]);
        assert!(device.live_resource_count() > 0);

        drop(manager);

        assert_eq!(device.live_resource_count(), 0);
    }
}
