//! Allocation of shadow map textures, buffers and render targets.
//!
//! Failing to create a resource never aborts shadow map setup. The failure is
//! logged and the returned resource has no handle, which leaves the affected
//! light unshadowed.

use umbra_gpu::{
    GraphicsDevice,
    resource::{
        ColorAttachment, RenderBufferDescriptor, RenderBufferID, RenderBufferKind,
        RenderPassDescriptorID, RenderTargetDescriptor, RenderTargetID, TextureDescriptor,
        TextureFlags, TextureFormat, TextureID, TextureSize,
    },
};

/// A texture requested from a [`GraphicsDevice`]. The description is kept even
/// if creation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatedTexture {
    id: Option<TextureID>,
    descriptor: TextureDescriptor,
}

/// A render buffer requested from a [`GraphicsDevice`]. The description is
/// kept even if creation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatedRenderBuffer {
    id: Option<RenderBufferID>,
    descriptor: RenderBufferDescriptor,
}

/// Selects the texture format for shadow maps, preferring 16-bit floats and
/// falling back to 16-bit unsigned normalized values.
pub fn select_shadow_format(device: &impl GraphicsDevice) -> TextureFormat {
    if device.is_texture_format_supported(TextureFormat::R16Float) {
        TextureFormat::R16Float
    } else {
        TextureFormat::R16Unorm
    }
}

/// Requests a texture with a single mip level. `n_layers` is only used when
/// `flags` contains [`TextureFlags::TEXTURE_ARRAY`].
pub fn allocate_texture(
    device: &impl GraphicsDevice,
    format: TextureFormat,
    size: TextureSize,
    n_layers: u32,
    flags: TextureFlags,
) -> AllocatedTexture {
    let descriptor = TextureDescriptor {
        format,
        size,
        array_size: if flags.contains(TextureFlags::TEXTURE_ARRAY) {
            n_layers
        } else {
            0
        },
        flags,
    };

    let id = match device.create_texture(&descriptor) {
        Ok(id) => Some(id),
        Err(error) => {
            umbra_log::warn!("Failed to create shadow map texture of size {size}: {error:#}");
            None
        }
    };

    AllocatedTexture { id, descriptor }
}

/// Requests a render buffer of the given kind.
pub fn allocate_render_buffer(
    device: &impl GraphicsDevice,
    kind: RenderBufferKind,
    size: TextureSize,
) -> AllocatedRenderBuffer {
    let descriptor = RenderBufferDescriptor { kind, size };

    let id = match device.create_render_buffer(&descriptor) {
        Ok(id) => Some(id),
        Err(error) => {
            umbra_log::warn!("Failed to build depth-stencil buffer of size {size}: {error:#}");
            None
        }
    };

    AllocatedRenderBuffer { id, descriptor }
}

/// Creates a render target writing into the given texture layers and
/// optional depth/stencil buffer.
///
/// If `render_pass` is [`None`], a render pass descriptor compatible with the
/// new target is created and stored there, so that further targets with the
/// same attachment formats can reuse it.
///
/// Returns [`None`] if any attachment failed to allocate or if the device
/// fails to create the render target.
pub(crate) fn create_render_target(
    device: &impl GraphicsDevice,
    label: String,
    color_attachments: impl IntoIterator<Item = (Option<TextureID>, u32)>,
    depth_stencil: Option<&AllocatedRenderBuffer>,
    render_pass: &mut Option<RenderPassDescriptorID>,
) -> Option<RenderTargetID> {
    let attachments: Option<Vec<_>> = color_attachments
        .into_iter()
        .map(|(texture, layer)| texture.map(|texture| ColorAttachment { texture, layer }))
        .collect();

    let depth_stencil = match depth_stencil {
        Some(buffer) => {
            let Some(id) = buffer.id() else {
                umbra_log::warn!(
                    "Failed to build shadow map render target {label}: missing depth-stencil buffer"
                );
                return None;
            };
            Some(id)
        }
        None => None,
    };

    let Some(attachments) = attachments else {
        umbra_log::warn!(
            "Failed to build shadow map render target {label}: missing color attachment"
        );
        return None;
    };

    let descriptor = RenderTargetDescriptor {
        label,
        color_attachments: attachments,
        depth_stencil,
    };

    let render_pass = match *render_pass {
        Some(id) => id,
        None => match device.create_render_pass_descriptor(&descriptor) {
            Ok(id) => *render_pass.insert(id),
            Err(error) => {
                umbra_log::warn!(
                    "Failed to build render pass descriptor for {}: {error:#}",
                    descriptor.label
                );
                return None;
            }
        },
    };

    match device.create_render_target(&descriptor, render_pass) {
        Ok(id) => Some(id),
        Err(error) => {
            umbra_log::warn!(
                "Failed to build shadow map render target {}: {error:#}",
                descriptor.label
            );
            None
        }
    }
}

/// Destroys the render target, if any.
pub(crate) fn destroy_render_target(
    device: &impl GraphicsDevice,
    render_target: Option<RenderTargetID>,
) {
    if let Some(render_target) = render_target {
        device.destroy_render_target(render_target);
    }
}

/// Destroys the render pass descriptor, if any.
pub(crate) fn destroy_render_pass_descriptor(
    device: &impl GraphicsDevice,
    render_pass: Option<RenderPassDescriptorID>,
) {
    if let Some(render_pass) = render_pass {
        device.destroy_render_pass_descriptor(render_pass);
    }
}

impl AllocatedTexture {
    /// Returns the ID of the texture, or [`None`] if creation failed.
    pub fn id(&self) -> Option<TextureID> {
        self.id
    }

    /// Whether the device successfully created the texture.
    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> TextureSize {
        self.descriptor.size
    }

    /// Returns the number of 2D layers of the texture.
    pub fn layer_count(&self) -> u32 {
        self.descriptor.layer_count()
    }

    /// Destroys the texture on the device.
    pub fn destroy(self, device: &impl GraphicsDevice) {
        if let Some(id) = self.id {
            device.destroy_texture(id);
        }
    }
}

impl AllocatedRenderBuffer {
    /// Returns the ID of the render buffer, or [`None`] if creation failed.
    pub fn id(&self) -> Option<RenderBufferID> {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }

    pub fn size(&self) -> TextureSize {
        self.descriptor.size
    }

    /// Destroys the render buffer on the device.
    pub fn destroy(self, device: &impl GraphicsDevice) {
        if let Some(id) = self.id {
            device.destroy_render_buffer(id);
        }
    }
}
