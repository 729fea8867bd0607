//! GPU resources for the shadow map of a single light.

use crate::{
    allocation::{
        self, AllocatedRenderBuffer, AllocatedTexture, destroy_render_pass_descriptor,
        destroy_render_target,
    },
    light::{LightIdx, ShadowMapMode},
};
use std::fmt;
use umbra_gpu::{
    GraphicsDevice,
    resource::{RenderPassDescriptorID, RenderTargetID, TextureID, TextureSize},
};

/// One of the six faces of a cube map. The enum value corresponds to the
/// conventional index of the face, which is also its layer in the cube map
/// texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CubemapFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

/// Non-owning reference to a texture array shared by several directional
/// lights. Only the [`ShadowMapManager`](crate::ShadowMapManager) that
/// allocated the array destroys it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureArrayRef {
    id: Option<TextureID>,
    size: TextureSize,
    layer_count: u32,
}

/// Resources handed to [`ShadowMapEntry::for_directional`].
#[derive(Debug)]
pub struct DirectionalShadowMapResources {
    pub texture_array: TextureArrayRef,
    /// Layer of the shared texture array holding this light's shadow map.
    pub layer_index: u32,
    /// Private texture the horizontal blur pass writes into.
    pub depth_copy: AllocatedTexture,
    pub depth_stencil: AllocatedRenderBuffer,
}

/// Resources handed to [`ShadowMapEntry::for_cube`].
#[derive(Debug)]
pub struct CubeShadowMapResources {
    pub depth_cube: AllocatedTexture,
    /// Private cube map the horizontal blur pass writes into.
    pub cube_copy: AllocatedTexture,
    pub depth_stencil: AllocatedRenderBuffer,
}

/// The GPU resources backing the shadow map of one light.
///
/// An entry is fully set up on construction and stays unchanged until its
/// resources are destroyed. A light whose shadow map needs a different
/// resolution or mode gets a new entry.
#[derive(Debug)]
pub struct ShadowMapEntry {
    light_index: LightIdx,
    maps: ShadowMaps,
    depth_stencil: Option<AllocatedRenderBuffer>,
    render_pass: Option<RenderPassDescriptorID>,
    blur_render_targets: [Option<RenderTargetID>; 2],
    blur_render_pass: Option<RenderPassDescriptorID>,
}

#[derive(Debug)]
enum ShadowMaps {
    Vsm {
        texture_array: Option<TextureArrayRef>,
        layer_index: u32,
        depth_copy: Option<AllocatedTexture>,
        render_target: Option<RenderTargetID>,
    },
    Cube {
        depth_cube: Option<AllocatedTexture>,
        cube_copy: Option<AllocatedTexture>,
        face_render_targets: [Option<RenderTargetID>; 6],
    },
}

impl CubemapFace {
    /// Returns an array with each face in the conventional order.
    pub const fn all() -> [Self; 6] {
        [
            Self::PositiveX,
            Self::NegativeX,
            Self::PositiveY,
            Self::NegativeY,
            Self::PositiveZ,
            Self::NegativeZ,
        ]
    }

    pub const fn as_idx_u32(&self) -> u32 {
        *self as u32
    }

    pub const fn as_idx_usize(&self) -> usize {
        *self as usize
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::PositiveX => "+X",
            Self::NegativeX => "-X",
            Self::PositiveY => "+Y",
            Self::NegativeY => "-Y",
            Self::PositiveZ => "+Z",
            Self::NegativeZ => "-Z",
        }
    }
}

impl fmt::Display for CubemapFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl TextureArrayRef {
    /// Creates a reference to the given texture array.
    pub fn new(texture_array: &AllocatedTexture) -> Self {
        Self {
            id: texture_array.id(),
            size: texture_array.size(),
            layer_count: texture_array.layer_count(),
        }
    }

    /// Returns the ID of the texture array, or [`None`] if its creation failed.
    pub fn id(&self) -> Option<TextureID> {
        self.id
    }

    pub fn size(&self) -> TextureSize {
        self.size
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

impl ShadowMapEntry {
    /// Creates the entry for a directional light rendering into a layer of a
    /// shared texture array, along with its render targets:
    ///
    /// - A render target writing depths into the array layer.
    /// - A blur target writing from the array layer into the depth copy.
    /// - A blur target writing from the depth copy back into the array layer.
    pub fn for_directional(
        device: &impl GraphicsDevice,
        light_index: LightIdx,
        resources: DirectionalShadowMapResources,
        debug_name: &str,
    ) -> Self {
        let DirectionalShadowMapResources {
            texture_array,
            layer_index,
            depth_copy,
            depth_stencil,
        } = resources;

        let mut render_pass = None;
        let render_target = allocation::create_render_target(
            device,
            format!("{debug_name} shadow map"),
            [(texture_array.id(), layer_index)],
            Some(&depth_stencil),
            &mut render_pass,
        );

        let mut blur_render_pass = None;
        let blur_x = allocation::create_render_target(
            device,
            format!("{debug_name} shadow blur X"),
            [(depth_copy.id(), 0)],
            None,
            &mut blur_render_pass,
        );
        let blur_y = allocation::create_render_target(
            device,
            format!("{debug_name} shadow blur Y"),
            [(texture_array.id(), layer_index)],
            None,
            &mut blur_render_pass,
        );

        Self {
            light_index,
            maps: ShadowMaps::Vsm {
                texture_array: Some(texture_array),
                layer_index,
                depth_copy: Some(depth_copy),
                render_target,
            },
            depth_stencil: Some(depth_stencil),
            render_pass,
            blur_render_targets: [blur_x, blur_y],
            blur_render_pass,
        }
    }

    /// Creates the entry for a light rendering into its own cube map, with a
    /// render target for each face. If `blur` is `true`, two render targets
    /// attaching all six faces are added for blurring from the cube map into
    /// the copy and back, which requires the device to support six color
    /// attachments.
    pub fn for_cube(
        device: &impl GraphicsDevice,
        light_index: LightIdx,
        resources: CubeShadowMapResources,
        blur: bool,
        debug_name: &str,
    ) -> Self {
        let CubeShadowMapResources {
            depth_cube,
            cube_copy,
            depth_stencil,
        } = resources;

        let mut render_pass = None;
        let face_render_targets = CubemapFace::all().map(|face| {
            allocation::create_render_target(
                device,
                format!("{debug_name} shadow cube face: {face}"),
                [(depth_cube.id(), face.as_idx_u32())],
                Some(&depth_stencil),
                &mut render_pass,
            )
        });

        let mut blur_render_pass = None;
        let blur_render_targets = if blur {
            let all_faces = |texture: &AllocatedTexture| {
                CubemapFace::all().map(|face| (texture.id(), face.as_idx_u32()))
            };
            let blur_x = allocation::create_render_target(
                device,
                format!("{debug_name} shadow cube blur X"),
                all_faces(&cube_copy),
                None,
                &mut blur_render_pass,
            );
            let blur_y = allocation::create_render_target(
                device,
                format!("{debug_name} shadow cube blur Y"),
                all_faces(&depth_cube),
                None,
                &mut blur_render_pass,
            );
            [blur_x, blur_y]
        } else {
            [None, None]
        };

        Self {
            light_index,
            maps: ShadowMaps::Cube {
                depth_cube: Some(depth_cube),
                cube_copy: Some(cube_copy),
                face_render_targets,
            },
            depth_stencil: Some(depth_stencil),
            render_pass,
            blur_render_targets,
            blur_render_pass,
        }
    }

    /// Returns the index of the light this entry belongs to.
    pub fn light_index(&self) -> LightIdx {
        self.light_index
    }

    pub fn mode(&self) -> ShadowMapMode {
        match self.maps {
            ShadowMaps::Vsm { .. } => ShadowMapMode::Vsm,
            ShadowMaps::Cube { .. } => ShadowMapMode::Cube,
        }
    }

    /// Whether this entry can be reused for a shadow map with the given size,
    /// texture array layer and mode. The layer is ignored for cube maps.
    ///
    /// Entries whose resources have been destroyed are never compatible.
    pub fn is_compatible(
        &self,
        size: TextureSize,
        layer_index: u32,
        mode: ShadowMapMode,
    ) -> bool {
        if mode != self.mode() {
            return false;
        }
        match &self.maps {
            ShadowMaps::Cube { cube_copy, .. } => cube_copy
                .as_ref()
                .is_some_and(|cube_copy| cube_copy.size() == size),
            ShadowMaps::Vsm { texture_array, .. } => {
                texture_array.as_ref().is_some_and(|texture_array| {
                    texture_array.size() == size && layer_index < texture_array.layer_count()
                })
            }
        }
    }

    /// Returns the layer of the shared texture array this entry renders into,
    /// or [`None`] for cube map entries.
    pub fn depth_array_layer(&self) -> Option<u32> {
        match self.maps {
            ShadowMaps::Vsm { layer_index, .. } => Some(layer_index),
            ShadowMaps::Cube { .. } => None,
        }
    }

    /// Returns the shared texture array of a directional light entry.
    pub fn texture_array(&self) -> Option<&TextureArrayRef> {
        match &self.maps {
            ShadowMaps::Vsm { texture_array, .. } => texture_array.as_ref(),
            ShadowMaps::Cube { .. } => None,
        }
    }

    /// Returns the blur copy texture of a directional light entry.
    pub fn depth_copy(&self) -> Option<&AllocatedTexture> {
        match &self.maps {
            ShadowMaps::Vsm { depth_copy, .. } => depth_copy.as_ref(),
            ShadowMaps::Cube { .. } => None,
        }
    }

    /// Returns the depth cube map of a cube map entry.
    pub fn depth_cube(&self) -> Option<&AllocatedTexture> {
        match &self.maps {
            ShadowMaps::Cube { depth_cube, .. } => depth_cube.as_ref(),
            ShadowMaps::Vsm { .. } => None,
        }
    }

    /// Returns the blur copy cube map of a cube map entry.
    pub fn cube_copy(&self) -> Option<&AllocatedTexture> {
        match &self.maps {
            ShadowMaps::Cube { cube_copy, .. } => cube_copy.as_ref(),
            ShadowMaps::Vsm { .. } => None,
        }
    }

    pub fn depth_stencil(&self) -> Option<&AllocatedRenderBuffer> {
        self.depth_stencil.as_ref()
    }

    /// Returns the render target of a directional light entry.
    pub fn render_target(&self) -> Option<RenderTargetID> {
        match self.maps {
            ShadowMaps::Vsm { render_target, .. } => render_target,
            ShadowMaps::Cube { .. } => None,
        }
    }

    /// Returns the render target for the given face of a cube map entry.
    pub fn face_render_target(&self, face: CubemapFace) -> Option<RenderTargetID> {
        match &self.maps {
            ShadowMaps::Cube {
                face_render_targets,
                ..
            } => face_render_targets[face.as_idx_usize()],
            ShadowMaps::Vsm { .. } => None,
        }
    }

    /// Returns the render pass descriptor shared by the depth render targets.
    pub fn render_pass(&self) -> Option<RenderPassDescriptorID> {
        self.render_pass
    }

    /// Returns the horizontal and vertical blur render targets.
    pub fn blur_render_targets(&self) -> [Option<RenderTargetID>; 2] {
        self.blur_render_targets
    }

    /// Returns the render pass descriptor shared by the blur render targets.
    pub fn blur_render_pass(&self) -> Option<RenderPassDescriptorID> {
        self.blur_render_pass
    }

    /// Whether both blur render targets exist.
    pub fn is_blurred(&self) -> bool {
        self.blur_render_targets.iter().all(Option::is_some)
    }

    /// Destroys every resource owned by the entry. The shared texture array of
    /// a directional light entry is only forgotten, not destroyed. Calling this
    /// again has no effect.
    pub fn destroy_gpu_resources(&mut self, device: &impl GraphicsDevice) {
        match &mut self.maps {
            ShadowMaps::Vsm {
                texture_array,
                depth_copy,
                render_target,
                ..
            } => {
                texture_array.take();
                destroy_render_target(device, render_target.take());
                if let Some(depth_copy) = depth_copy.take() {
                    depth_copy.destroy(device);
                }
            }
            ShadowMaps::Cube {
                depth_cube,
                cube_copy,
                face_render_targets,
            } => {
                for render_target in face_render_targets {
                    destroy_render_target(device, render_target.take());
                }
                if let Some(depth_cube) = depth_cube.take() {
                    depth_cube.destroy(device);
                }
                if let Some(cube_copy) = cube_copy.take() {
                    cube_copy.destroy(device);
                }
            }
        }

        for render_target in &mut self.blur_render_targets {
            destroy_render_target(device, render_target.take());
        }
        destroy_render_pass_descriptor(device, self.render_pass.take());
        destroy_render_pass_descriptor(device, self.blur_render_pass.take());

        if let Some(depth_stencil) = self.depth_stencil.take() {
            depth_stencil.destroy(device);
        }
    }
}
