//! Identifiers and descriptors for GPU resources.

use bitflags::bitflags;
use std::fmt;

macro_rules! define_resource_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from the given raw value.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl nohash_hasher::IsEnabled for $name {}

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_resource_id!(
    /// Identifier for a texture created by a
    /// [`GraphicsDevice`](crate::GraphicsDevice).
    TextureID
);

define_resource_id!(
    /// Identifier for a render buffer created by a
    /// [`GraphicsDevice`](crate::GraphicsDevice).
    RenderBufferID
);

define_resource_id!(
    /// Identifier for a render pass descriptor created by a
    /// [`GraphicsDevice`](crate::GraphicsDevice).
    RenderPassDescriptorID
);

define_resource_id!(
    /// Identifier for a render target created by a
    /// [`GraphicsDevice`](crate::GraphicsDevice).
    RenderTargetID
);

/// Width and height of a texture or render buffer in texels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

/// Pixel formats that shadow map textures can be created with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single-channel 16-bit floating point.
    R16Float,
    /// Single-channel 16-bit unsigned normalized.
    R16Unorm,
}

bitflags! {
    /// Flags describing the shape and usage of a texture.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u8 {
        /// The texture can be rendered to.
        const RENDER_TARGET = 1 << 0;
        /// The texture is an array of 2D layers.
        const TEXTURE_ARRAY = 1 << 1;
        /// The texture is a cube map with six 2D faces.
        const CUBE_MAP = 1 << 2;
    }
}

/// Description of a texture to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub format: TextureFormat,
    pub size: TextureSize,
    /// Number of layers when [`TextureFlags::TEXTURE_ARRAY`] is set. Ignored
    /// otherwise.
    pub array_size: u32,
    pub flags: TextureFlags,
}

/// The kind of data stored in a render buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderBufferKind {
    DepthStencil,
}

/// Description of a render buffer to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderBufferDescriptor {
    pub kind: RenderBufferKind,
    pub size: TextureSize,
}

/// A single layer of a texture used as a color attachment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorAttachment {
    pub texture: TextureID,
    /// Array layer or cube face to render into.
    pub layer: u32,
}

/// Description of a render target to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetDescriptor {
    pub label: String,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<RenderBufferID>,
}

impl TextureSize {
    /// Creates a size with the given width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates a size with equal width and height.
    pub const fn square(extent: u32) -> Self {
        Self::new(extent, extent)
    }
}

impl fmt::Display for TextureSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl TextureFormat {
    /// Returns the corresponding [`wgpu::TextureFormat`].
    pub const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R16Float => wgpu::TextureFormat::R16Float,
            Self::R16Unorm => wgpu::TextureFormat::R16Unorm,
        }
    }
}

impl RenderBufferKind {
    /// Returns the corresponding [`wgpu::TextureFormat`].
    pub const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::DepthStencil => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

impl TextureDescriptor {
    /// Returns the number of 2D layers the texture will have.
    pub fn layer_count(&self) -> u32 {
        if self.flags.contains(TextureFlags::CUBE_MAP) {
            6
        } else if self.flags.contains(TextureFlags::TEXTURE_ARRAY) {
            self.array_size
        } else {
            1
        }
    }
}

impl RenderTargetDescriptor {
    /// Creates a render target description with the given color attachments and
    /// no depth/stencil buffer.
    pub fn with_color_attachments(
        label: impl Into<String>,
        color_attachments: impl IntoIterator<Item = ColorAttachment>,
    ) -> Self {
        Self {
            label: label.into(),
            color_attachments: color_attachments.into_iter().collect(),
            depth_stencil: None,
        }
    }

    /// Sets the depth/stencil buffer of the render target.
    pub fn with_depth_stencil(mut self, depth_stencil: RenderBufferID) -> Self {
        self.depth_stencil = Some(depth_stencil);
        self
    }
}
