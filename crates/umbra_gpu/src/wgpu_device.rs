//! Graphics device backed by `wgpu`.

use crate::{
    device::GraphicsDevice,
    resource::{
        RenderBufferDescriptor, RenderBufferID, RenderPassDescriptorID, RenderTargetDescriptor,
        RenderTargetID, TextureDescriptor, TextureFlags, TextureFormat, TextureID, TextureSize,
    },
};
use anyhow::{Context, Result, anyhow, bail};
use nohash_hasher::IntMap;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

/// [`GraphicsDevice`] creating resources on a connected [`wgpu::Device`].
///
/// Resource creation failures are detected through `wgpu` error scopes, so
/// every creation call blocks until the device has validated it.
#[derive(Debug)]
pub struct WgpuGraphicsDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    supported_formats: Vec<TextureFormat>,
    lost: Arc<AtomicBool>,
    next_id: AtomicU64,
    textures: Mutex<IntMap<TextureID, GpuTexture>>,
    render_buffers: Mutex<IntMap<RenderBufferID, GpuRenderBuffer>>,
    render_passes: Mutex<IntMap<RenderPassDescriptorID, RenderPassLayout>>,
    render_targets: Mutex<IntMap<RenderTargetID, GpuRenderTarget>>,
}

/// A texture created by a [`WgpuGraphicsDevice`].
#[derive(Debug)]
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    descriptor: TextureDescriptor,
}

#[derive(Debug)]
struct GpuRenderBuffer {
    texture: wgpu::Texture,
    format: wgpu::TextureFormat,
}

/// The attachment formats a render pass writes to. Render targets created with
/// a render pass descriptor must match its layout, and pipelines drawing into
/// such targets are created from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPassLayout {
    color_formats: Vec<wgpu::TextureFormat>,
    depth_stencil_format: Option<wgpu::TextureFormat>,
}

/// A render target created by a [`WgpuGraphicsDevice`], holding a view for
/// each attached texture layer.
#[derive(Debug)]
pub struct GpuRenderTarget {
    label: String,
    size: TextureSize,
    color_views: Vec<wgpu::TextureView>,
    depth_stencil_view: Option<wgpu::TextureView>,
    render_pass: RenderPassDescriptorID,
}

const SHADOW_MAP_FORMATS: [TextureFormat; 2] = [TextureFormat::R16Float, TextureFormat::R16Unorm];

impl WgpuGraphicsDevice {
    /// Connects to a graphics device through the given adapter, enabling the
    /// optional features that widen the set of usable shadow map formats.
    ///
    /// # Errors
    /// Returns an error if the connection request fails.
    pub async fn connect(adapter: &wgpu::Adapter) -> Result<Self> {
        let required_features = adapter.features() & wgpu::Features::TEXTURE_FORMAT_16BIT_NORM;

        let (device, queue) = umbra_log::with_timing_info_logging!("Requesting graphics device"; {
            adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("Shadow map device"),
                        required_features,
                        required_limits: adapter.limits(),
                        memory_hints: wgpu::MemoryHints::Performance,
                    },
                    None,
                )
                .await
        })
        .context("Failed to connect to graphics device")?;

        Ok(Self::new(adapter, device, queue))
    }

    /// Wraps an already connected device. Format support is determined from
    /// the adapter the device was requested from.
    pub fn new(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let supported_formats = SHADOW_MAP_FORMATS
            .into_iter()
            .filter(|&format| Self::format_is_usable(adapter, &device, format))
            .collect();

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            umbra_log::warn!("Graphics device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Release);
        });

        Self {
            device,
            queue,
            supported_formats,
            lost,
            next_id: AtomicU64::new(0),
            textures: Mutex::new(IntMap::default()),
            render_buffers: Mutex::new(IntMap::default()),
            render_passes: Mutex::new(IntMap::default()),
            render_targets: Mutex::new(IntMap::default()),
        }
    }

    /// Returns a reference to the underlying [`wgpu::Device`].
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the underlying [`wgpu::Queue`].
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Calls the given closure with the texture with the given ID, if it
    /// exists.
    pub fn with_texture<R>(
        &self,
        texture: TextureID,
        f: impl FnOnce(&GpuTexture) -> R,
    ) -> Option<R> {
        self.textures.lock().get(&texture).map(f)
    }

    /// Calls the given closure with the render target with the given ID, if it
    /// exists.
    pub fn with_render_target<R>(
        &self,
        render_target: RenderTargetID,
        f: impl FnOnce(&GpuRenderTarget) -> R,
    ) -> Option<R> {
        self.render_targets.lock().get(&render_target).map(f)
    }

    /// Returns the attachment layout of the given render pass descriptor, if
    /// it exists.
    pub fn render_pass_layout(
        &self,
        render_pass: RenderPassDescriptorID,
    ) -> Option<RenderPassLayout> {
        self.render_passes.lock().get(&render_pass).cloned()
    }

    fn format_is_usable(
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        format: TextureFormat,
    ) -> bool {
        let wgpu_format = format.to_wgpu();
        if !device.features().contains(wgpu_format.required_features()) {
            return false;
        }
        adapter
            .get_texture_format_features(wgpu_format)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
    }

    fn next_raw_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs the given resource creation and reports any validation or
    /// out-of-memory error it caused.
    fn with_error_scope<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let resource = create(&self.device);

        let validation_error = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory_error = pollster::block_on(self.device.pop_error_scope());

        match validation_error.or(out_of_memory_error) {
            Some(error) => Err(anyhow!("{error}")),
            None => Ok(resource),
        }
    }

    fn ensure_backend(&self) -> Result<()> {
        if !self.has_backend() {
            bail!("Graphics device has been lost");
        }
        Ok(())
    }

    fn attachment_formats(&self, target: &RenderTargetDescriptor) -> Result<RenderPassLayout> {
        let textures = self.textures.lock();
        let color_formats = target
            .color_attachments
            .iter()
            .map(|attachment| {
                textures
                    .get(&attachment.texture)
                    .map(|texture| texture.texture.format())
                    .ok_or_else(|| anyhow!("Missing color attachment {}", attachment.texture))
            })
            .collect::<Result<Vec<_>>>()?;
        drop(textures);

        let depth_stencil_format = match target.depth_stencil {
            Some(id) => Some(
                self.render_buffers
                    .lock()
                    .get(&id)
                    .map(|buffer| buffer.format)
                    .ok_or_else(|| anyhow!("Missing depth-stencil attachment {id}"))?,
            ),
            None => None,
        };

        Ok(RenderPassLayout {
            color_formats,
            depth_stencil_format,
        })
    }
}

impl GraphicsDevice for WgpuGraphicsDevice {
    fn has_backend(&self) -> bool {
        !self.lost.load(Ordering::Acquire)
    }

    fn is_texture_format_supported(&self, format: TextureFormat) -> bool {
        self.supported_formats.contains(&format)
    }

    fn max_color_attachments(&self) -> u32 {
        self.device.limits().max_color_attachments
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureID> {
        self.ensure_backend()?;

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        if descriptor.flags.contains(TextureFlags::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let view_dimension = if descriptor.flags.contains(TextureFlags::CUBE_MAP) {
            wgpu::TextureViewDimension::Cube
        } else if descriptor.flags.contains(TextureFlags::TEXTURE_ARRAY) {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };

        let (texture, view) = self.with_error_scope(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Shadow map texture"),
                size: wgpu::Extent3d {
                    width: descriptor.size.width,
                    height: descriptor.size.height,
                    depth_or_array_layers: descriptor.layer_count(),
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format.to_wgpu(),
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(view_dimension),
                ..Default::default()
            });
            (texture, view)
        })?;

        let id = TextureID::from_raw(self.next_raw_id());
        self.textures.lock().insert(
            id,
            GpuTexture {
                texture,
                view,
                descriptor: descriptor.clone(),
            },
        );
        Ok(id)
    }

    fn create_render_buffer(&self, descriptor: &RenderBufferDescriptor) -> Result<RenderBufferID> {
        self.ensure_backend()?;

        let format = descriptor.kind.to_wgpu();
        let texture = self.with_error_scope(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Shadow map depth-stencil buffer"),
                size: wgpu::Extent3d {
                    width: descriptor.size.width,
                    height: descriptor.size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        })?;

        let id = RenderBufferID::from_raw(self.next_raw_id());
        self.render_buffers
            .lock()
            .insert(id, GpuRenderBuffer { texture, format });
        Ok(id)
    }

    fn create_render_pass_descriptor(
        &self,
        target: &RenderTargetDescriptor,
    ) -> Result<RenderPassDescriptorID> {
        self.ensure_backend()?;
        let layout = self.attachment_formats(target)?;
        let id = RenderPassDescriptorID::from_raw(self.next_raw_id());
        self.render_passes.lock().insert(id, layout);
        Ok(id)
    }

    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        render_pass: RenderPassDescriptorID,
    ) -> Result<RenderTargetID> {
        self.ensure_backend()?;

        let n_attachments = descriptor.color_attachments.len();
        if n_attachments == 0 {
            bail!("Render target {} has no color attachments", descriptor.label);
        }
        if n_attachments > self.max_color_attachments() as usize {
            bail!(
                "Render target {} has {} color attachments, but at most {} are supported",
                descriptor.label,
                n_attachments,
                self.max_color_attachments()
            );
        }

        let layout = self.attachment_formats(descriptor)?;
        let expected_layout = self
            .render_pass_layout(render_pass)
            .ok_or_else(|| anyhow!("Missing render pass descriptor {render_pass}"))?;
        if layout != expected_layout {
            bail!(
                "Render target {} is incompatible with render pass descriptor {render_pass}",
                descriptor.label
            );
        }

        let textures = self.textures.lock();
        let mut size = None;
        let mut color_views = Vec::with_capacity(n_attachments);
        for attachment in &descriptor.color_attachments {
            let texture = textures
                .get(&attachment.texture)
                .ok_or_else(|| anyhow!("Missing color attachment {}", attachment.texture))?;
            if attachment.layer >= texture.descriptor.layer_count() {
                bail!(
                    "Layer {} is out of range for {} with {} layers",
                    attachment.layer,
                    attachment.texture,
                    texture.descriptor.layer_count()
                );
            }
            size.get_or_insert(texture.descriptor.size);
            color_views.push(texture.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&descriptor.label),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: attachment.layer,
                array_layer_count: Some(1),
                ..Default::default()
            }));
        }
        drop(textures);

        let depth_stencil_view = descriptor.depth_stencil.and_then(|id| {
            self.render_buffers
                .lock()
                .get(&id)
                .map(|buffer| buffer.texture.create_view(&wgpu::TextureViewDescriptor::default()))
        });

        let id = RenderTargetID::from_raw(self.next_raw_id());
        self.render_targets.lock().insert(
            id,
            GpuRenderTarget {
                label: descriptor.label.clone(),
                size: size.unwrap_or(TextureSize::square(0)),
                color_views,
                depth_stencil_view,
                render_pass,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, texture: TextureID) {
        if let Some(texture) = self.textures.lock().remove(&texture) {
            texture.texture.destroy();
        }
    }

    fn destroy_render_buffer(&self, render_buffer: RenderBufferID) {
        if let Some(render_buffer) = self.render_buffers.lock().remove(&render_buffer) {
            render_buffer.texture.destroy();
        }
    }

    fn destroy_render_pass_descriptor(&self, render_pass: RenderPassDescriptorID) {
        self.render_passes.lock().remove(&render_pass);
    }

    fn destroy_render_target(&self, render_target: RenderTargetID) {
        self.render_targets.lock().remove(&render_target);
    }
}

impl GpuTexture {
    /// Returns the underlying [`wgpu::Texture`].
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Returns a view of all layers of the texture, with a cube dimension for
    /// cube maps and an array dimension for texture arrays.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Returns the description the texture was created from.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }
}

impl RenderPassLayout {
    /// Returns the formats of the color attachments, in attachment order.
    pub fn color_formats(&self) -> &[wgpu::TextureFormat] {
        &self.color_formats
    }

    /// Returns the format of the depth/stencil attachment, if any.
    pub fn depth_stencil_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_stencil_format
    }

    /// Returns color target states for a pipeline drawing into render targets
    /// with this layout.
    pub fn color_target_states(&self) -> Vec<Option<wgpu::ColorTargetState>> {
        self.color_formats
            .iter()
            .map(|&format| Some(format.into()))
            .collect()
    }
}

impl GpuRenderTarget {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> TextureSize {
        self.size
    }

    /// Returns a view of each attached texture layer, in attachment order.
    pub fn color_views(&self) -> &[wgpu::TextureView] {
        &self.color_views
    }

    pub fn depth_stencil_view(&self) -> Option<&wgpu::TextureView> {
        self.depth_stencil_view.as_ref()
    }

    /// Returns the render pass descriptor the target was created with.
    pub fn render_pass(&self) -> RenderPassDescriptorID {
        self.render_pass
    }
}
