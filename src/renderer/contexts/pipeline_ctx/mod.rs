pub mod pipeline_builder;
pub mod render_pass;
pub mod shader;

use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::swapchain::Swapchain;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedImage, MemoryAllocator};
use crate::renderer::resources::image::{create_image_view, depth_image_desc, DEPTH_FORMAT};

/// Responsibilities:
/// - Own the render pass
/// - Own everything sized after the swapchain: depth buffer and framebuffers
pub struct RenderPipelineContext {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    depth_image: Option<AllocatedImage>,
    depth_view: vk::ImageView,
}

impl RenderPipelineContext {
    /// The render pass outlives every swapchain and is released by the deletion queue
    pub fn new(
        dev: &RenderDevice,
        swapchain: &Swapchain,
        deletion_queue: &mut DeletionQueue,
    ) -> Result<Self> {
        let render_pass = render_pass::create_render_pass(&dev.logical, swapchain.format, DEPTH_FORMAT)?;
        deletion_queue.push(Deletion::RenderPass(render_pass));

        let mut ctx = Self {
            render_pass,
            framebuffers: Vec::new(),
            depth_image: None,
            depth_view: vk::ImageView::null(),
        };
        ctx.create_swapchain_resources(dev, swapchain)?;

        Ok(ctx)
    }

    /// On failure nothing sized after the swapchain is left alive
    pub fn create_swapchain_resources(&mut self, dev: &RenderDevice, swapchain: &Swapchain) -> Result<()> {
        let created = self.build_swapchain_resources(dev, swapchain);
        if created.is_err() {
            if let Err(e) = self.destroy_swapchain_resources(dev) {
                log::error!("Failed to destroy partial swapchain resources: {:?}", e);
            }
        }
        created
    }

    fn build_swapchain_resources(&mut self, dev: &RenderDevice, swapchain: &Swapchain) -> Result<()> {
        let depth_image = self.depth_image.insert(dev.allocator.create_image(
            &depth_image_desc(swapchain.extent),
            MemoryLocation::GpuOnly,
            "Depth Image",
        )?);
        self.depth_view = create_image_view(
            &dev.logical,
            depth_image.image,
            depth_image.format,
            depth_image.aspect,
            depth_image.mip_levels,
        )?;

        self.framebuffers = render_pass::create_framebuffers(
            &dev.logical,
            self.render_pass,
            &swapchain.image_views,
            self.depth_view,
            swapchain.extent,
        )?;

        Ok(())
    }

    /// The device must be idle
    pub fn destroy_swapchain_resources(&mut self, dev: &RenderDevice) -> Result<()> {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                dev.logical.destroy_framebuffer(framebuffer, None);
            }
            if self.depth_view != vk::ImageView::null() {
                dev.logical.destroy_image_view(self.depth_view, None);
                self.depth_view = vk::ImageView::null();
            }
        }
        if let Some(depth_image) = self.depth_image.take() {
            dev.allocator.destroy_image(depth_image)?;
        }
        Ok(())
    }
}
