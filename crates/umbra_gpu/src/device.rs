//! Graphics device interface.

use crate::resource::{
    RenderBufferDescriptor, RenderBufferID, RenderPassDescriptorID, RenderTargetDescriptor,
    RenderTargetID, TextureDescriptor, TextureFormat, TextureID,
};
use anyhow::Result;
use std::sync::Arc;

/// Interface to a graphics device that can create and destroy the resources
/// backing shadow maps.
///
/// All methods take `&self` so that a device can be shared between the
/// renderer and the resource managers. Implementations are responsible for any
/// interior synchronization.
pub trait GraphicsDevice {
    /// Whether a graphics backend is currently active. When this returns
    /// `false`, no resources can be created.
    fn has_backend(&self) -> bool;

    /// Whether textures of the given format can be created and rendered to.
    fn is_texture_format_supported(&self, format: TextureFormat) -> bool;

    /// The maximum number of color attachments a single render target can
    /// have.
    fn max_color_attachments(&self) -> u32;

    /// Creates a texture with a single mip level.
    ///
    /// # Errors
    /// Returns an error if the device fails to create the texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureID>;

    /// Creates a render buffer.
    ///
    /// # Errors
    /// Returns an error if the device fails to create the render buffer.
    fn create_render_buffer(&self, descriptor: &RenderBufferDescriptor) -> Result<RenderBufferID>;

    /// Creates a render pass descriptor compatible with render targets matching
    /// the given description.
    ///
    /// # Errors
    /// Returns an error if any referenced resource does not exist.
    fn create_render_pass_descriptor(
        &self,
        target: &RenderTargetDescriptor,
    ) -> Result<RenderPassDescriptorID>;

    /// Creates a render target using the given render pass descriptor.
    ///
    /// # Errors
    /// Returns an error if any referenced resource does not exist, if the
    /// render target has more color attachments than supported or if it is
    /// incompatible with the render pass descriptor.
    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        render_pass: RenderPassDescriptorID,
    ) -> Result<RenderTargetID>;

    /// Destroys the given texture. Unknown IDs are ignored.
    fn destroy_texture(&self, texture: TextureID);

    /// Destroys the given render buffer. Unknown IDs are ignored.
    fn destroy_render_buffer(&self, render_buffer: RenderBufferID);

    /// Destroys the given render pass descriptor. Unknown IDs are ignored.
    fn destroy_render_pass_descriptor(&self, render_pass: RenderPassDescriptorID);

    /// Destroys the given render target. Unknown IDs are ignored.
    fn destroy_render_target(&self, render_target: RenderTargetID);
}

impl<D: GraphicsDevice + ?Sized> GraphicsDevice for Arc<D> {
    fn has_backend(&self) -> bool {
        (**self).has_backend()
    }

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        (**self).is_texture_format_supported(format)
    }

    fn max_color_attachments(&self) -> u32 {
        (**self).max_color_attachments()
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureID> {
        (**self).create_texture(descriptor)
    }

    fn create_render_buffer(&self, descriptor: &RenderBufferDescriptor) -> Result<RenderBufferID> {
        (**self).create_render_buffer(descriptor)
    }

    fn create_render_pass_descriptor(
        &self,
        target: &RenderTargetDescriptor,
    ) -> Result<RenderPassDescriptorID> {
        (**self).create_render_pass_descriptor(target)
    }

    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        render_pass: RenderPassDescriptorID,
    ) -> Result<RenderTargetID> {
        (**self).create_render_target(descriptor, render_pass)
    }

    fn destroy_texture(&self, texture: TextureID) {
        (**self).destroy_texture(texture);
    }

    fn destroy_render_buffer(&self, render_buffer: RenderBufferID) {
        (**self).destroy_render_buffer(render_buffer);
    }

    fn destroy_render_pass_descriptor(&self, render_pass: RenderPassDescriptorID) {
        (**self).destroy_render_pass_descriptor(render_pass);
    }

    fn destroy_render_target(&self, render_target: RenderTargetID) {
        (**self).destroy_render_target(render_target);
    }
}
