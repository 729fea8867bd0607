//! A [`GraphicsDevice`] that records resource operations without touching a
//! GPU.

use crate::{
    device::GraphicsDevice,
    resource::{
        RenderBufferDescriptor, RenderBufferID, RenderPassDescriptorID, RenderTargetDescriptor,
        RenderTargetID, TextureDescriptor, TextureFormat, TextureID,
    },
};
use anyhow::{Result, anyhow, bail};
use nohash_hasher::IntMap;
use parking_lot::Mutex;

/// Graphics device keeping track of every created and destroyed resource.
/// Capabilities and failures can be configured to exercise degraded paths.
#[derive(Debug)]
pub struct RecordingGraphicsDevice {
    has_backend: bool,
    supported_formats: Vec<TextureFormat>,
    max_color_attachments: u32,
    state: Mutex<RecordingState>,
}

/// A render target as recorded by a [`RecordingGraphicsDevice`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRenderTarget {
    pub descriptor: RenderTargetDescriptor,
    pub render_pass: RenderPassDescriptorID,
}

#[derive(Debug, Default)]
struct RecordingState {
    next_id: u64,
    textures: IntMap<TextureID, TextureDescriptor>,
    render_buffers: IntMap<RenderBufferID, RenderBufferDescriptor>,
    render_passes: IntMap<RenderPassDescriptorID, RenderTargetDescriptor>,
    render_targets: IntMap<RenderTargetID, RecordedRenderTarget>,
    creation_count: usize,
    destruction_count: usize,
    fail_texture_creation: bool,
    fail_render_buffer_creation: bool,
}

impl RecordingGraphicsDevice {
    /// Creates a device with an active backend, support for every texture
    /// format and eight color attachments.
    pub fn new() -> Self {
        Self {
            has_backend: true,
            supported_formats: vec![TextureFormat::R16Float, TextureFormat::R16Unorm],
            max_color_attachments: 8,
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Creates a device reporting that no graphics backend is active.
    pub fn without_backend() -> Self {
        Self {
            has_backend: false,
            ..Self::new()
        }
    }

    /// Sets the maximum number of color attachments per render target.
    pub fn with_max_color_attachments(mut self, max_color_attachments: u32) -> Self {
        self.max_color_attachments = max_color_attachments;
        self
    }

    /// Sets which texture formats the device supports.
    pub fn with_supported_formats(mut self, formats: &[TextureFormat]) -> Self {
        self.supported_formats = formats.to_vec();
        self
    }

    /// Makes subsequent texture creations fail (or succeed again).
    pub fn set_texture_creation_fails(&self, fails: bool) {
        self.state.lock().fail_texture_creation = fails;
    }

    /// Makes subsequent render buffer creations fail (or succeed again).
    pub fn set_render_buffer_creation_fails(&self, fails: bool) {
        self.state.lock().fail_render_buffer_creation = fails;
    }

    /// Number of resource creation calls made so far, including failed ones.
    pub fn creation_count(&self) -> usize {
        self.state.lock().creation_count
    }

    /// Number of destruction calls made so far for resources that existed.
    pub fn destruction_count(&self) -> usize {
        self.state.lock().destruction_count
    }

    /// Number of resources of any kind that currently exist.
    pub fn live_resource_count(&self) -> usize {
        let state = self.state.lock();
        state.textures.len()
            + state.render_buffers.len()
            + state.render_passes.len()
            + state.render_targets.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn is_texture_alive(&self, texture: TextureID) -> bool {
        self.state.lock().textures.contains_key(&texture)
    }

    pub fn is_render_buffer_alive(&self, render_buffer: RenderBufferID) -> bool {
        self.state.lock().render_buffers.contains_key(&render_buffer)
    }

    pub fn is_render_target_alive(&self, render_target: RenderTargetID) -> bool {
        self.state.lock().render_targets.contains_key(&render_target)
    }

    /// Returns the description of the given live texture.
    pub fn texture(&self, texture: TextureID) -> Option<TextureDescriptor> {
        self.state.lock().textures.get(&texture).cloned()
    }

    /// Returns the recorded state of the given live render target.
    pub fn render_target(&self, render_target: RenderTargetID) -> Option<RecordedRenderTarget> {
        self.state.lock().render_targets.get(&render_target).cloned()
    }

    fn check_attachments_exist(
        state: &RecordingState,
        target: &RenderTargetDescriptor,
    ) -> Result<()> {
        for attachment in &target.color_attachments {
            if !state.textures.contains_key(&attachment.texture) {
                bail!("Missing color attachment {}", attachment.texture);
            }
        }
        if let Some(depth_stencil) = target.depth_stencil
            && !state.render_buffers.contains_key(&depth_stencil)
        {
            bail!("Missing depth-stencil attachment {depth_stencil}");
        }
        Ok(())
    }
}

impl RecordingState {
    fn next_raw_id(&mut self) -> u64 {
        self.creation_count += 1;
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for RecordingGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for RecordingGraphicsDevice {
    fn has_backend(&self) -> bool {
        self.has_backend
    }

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.supported_formats.contains(&format)
    }

    fn max_color_attachments(&self) -> u32 {
        self.max_color_attachments
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureID> {
        let mut state = self.state.lock();
        let id = TextureID::from_raw(state.next_raw_id());
        if !self.has_backend || state.fail_texture_creation {
            bail!("Injected texture creation failure");
        }
        state.textures.insert(id, descriptor.clone());
        Ok(id)
    }

    fn create_render_buffer(&self, descriptor: &RenderBufferDescriptor) -> Result<RenderBufferID> {
        let mut state = self.state.lock();
        let id = RenderBufferID::from_raw(state.next_raw_id());
        if !self.has_backend || state.fail_render_buffer_creation {
            bail!("Injected render buffer creation failure");
        }
        state.render_buffers.insert(id, descriptor.clone());
        Ok(id)
    }

    fn create_render_pass_descriptor(
        &self,
        target: &RenderTargetDescriptor,
    ) -> Result<RenderPassDescriptorID> {
        let mut state = self.state.lock();
        let id = RenderPassDescriptorID::from_raw(state.next_raw_id());
        Self::check_attachments_exist(&state, target)?;
        state.render_passes.insert(id, target.clone());
        Ok(id)
    }

    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        render_pass: RenderPassDescriptorID,
    ) -> Result<RenderTargetID> {
        let mut state = self.state.lock();
        let id = RenderTargetID::from_raw(state.next_raw_id());
        Self::check_attachments_exist(&state, descriptor)?;
        if descriptor.color_attachments.len() > self.max_color_attachments as usize {
            bail!(
                "{} color attachments exceed the limit of {}",
                descriptor.color_attachments.len(),
                self.max_color_attachments
            );
        }
        if !state.render_passes.contains_key(&render_pass) {
            return Err(anyhow!("Missing render pass descriptor {render_pass}"));
        }
        state.render_targets.insert(
            id,
            RecordedRenderTarget {
                descriptor: descriptor.clone(),
                render_pass,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, texture: TextureID) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture).is_some() {
            state.destruction_count += 1;
        }
    }

    fn destroy_render_buffer(&self, render_buffer: RenderBufferID) {
        let mut state = self.state.lock();
        if state.render_buffers.remove(&render_buffer).is_some() {
            state.destruction_count += 1;
        }
    }

    fn destroy_render_pass_descriptor(&self, render_pass: RenderPassDescriptorID) {
        let mut state = self.state.lock();
        if state.render_passes.remove(&render_pass).is_some() {
            state.destruction_count += 1;
        }
    }

    fn destroy_render_target(&self, render_target: RenderTargetID) {
        let mut state = self.state.lock();
        if state.render_targets.remove(&render_target).is_some() {
            state.destruction_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ColorAttachment, RenderBufferKind, TextureFlags, TextureSize};

    fn plain_texture() -> TextureDescriptor {
        TextureDescriptor {
            format: TextureFormat::R16Float,
            size: TextureSize::square(256),
            array_size: 0,
            flags: TextureFlags::RENDER_TARGET,
        }
    }

    #[test]
    fn created_resources_are_alive_until_destroyed() {
        let device = RecordingGraphicsDevice::new();
        let texture = device.create_texture(&plain_texture()).unwrap();

        assert!(device.is_texture_alive(texture));
        assert_eq!(device.creation_count(), 1);

        device.destroy_texture(texture);

        assert!(!device.is_texture_alive(texture));
        assert_eq!(device.destruction_count(), 1);
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn destroying_unknown_resource_is_not_counted() {
        let device = RecordingGraphicsDevice::new();
        device.destroy_texture(TextureID::from_raw(42));
        assert_eq!(device.destruction_count(), 0);
    }

    #[test]
    fn failing_texture_creation_counts_the_attempt() {
        let device = RecordingGraphicsDevice::new();
        device.set_texture_creation_fails(true);

        assert!(device.create_texture(&plain_texture()).is_err());
        assert_eq!(device.creation_count(), 1);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn render_target_with_too_many_attachments_is_rejected() {
        let device = RecordingGraphicsDevice::new().with_max_color_attachments(1);
        let texture = device.create_texture(&plain_texture()).unwrap();
        let descriptor = RenderTargetDescriptor::with_color_attachments(
            "two",
            [
                ColorAttachment { texture, layer: 0 },
                ColorAttachment { texture, layer: 0 },
            ],
        );
        let single = RenderTargetDescriptor::with_color_attachments(
            "one",
            [ColorAttachment { texture, layer: 0 }],
        );
        let render_pass = device.create_render_pass_descriptor(&single).unwrap();

        assert!(device.create_render_target(&descriptor, render_pass).is_err());
        assert!(device.create_render_target(&single, render_pass).is_ok());
    }

    #[test]
    fn render_target_referencing_destroyed_buffer_is_rejected() {
        let device = RecordingGraphicsDevice::new();
        let texture = device.create_texture(&plain_texture()).unwrap();
        let depth_stencil = device
            .create_render_buffer(&RenderBufferDescriptor {
                kind: RenderBufferKind::DepthStencil,
                size: TextureSize::square(256),
            })
            .unwrap();
        let descriptor = RenderTargetDescriptor::with_color_attachments(
            "rt",
            [ColorAttachment { texture, layer: 0 }],
        )
        .with_depth_stencil(depth_stencil);
        let render_pass = device.create_render_pass_descriptor(&descriptor).unwrap();

        device.destroy_render_buffer(depth_stencil);

        assert!(device.create_render_target(&descriptor, render_pass).is_err());
    }
}
