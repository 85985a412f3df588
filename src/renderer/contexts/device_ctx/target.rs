use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::swapchain::Swapchain;

/// Presentation target of the renderer, encapsulating the window, surface, and swapchain
pub struct RenderTarget {
    pub window: Arc<Window>,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,

    pub swapchain: Swapchain,

    device: Arc<ash::Device>,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        surface: (vk::SurfaceKHR, ash::khr::surface::Instance),
        vsync: bool,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let (surface, surface_loader) = surface;

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(dev.physical, surface)?
        };

        let surface_present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(dev.physical, surface)?
        };

        let surface_format = surface_formats
            .iter()
            .find(|format| {
                format.format == vk::Format::B8G8R8A8_SRGB
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_eyre("No suitable surface format found")?;

        // FIFO is the only mode every driver has to support
        let present_mode = if vsync {
            vk::PresentModeKHR::FIFO
        } else {
            surface_present_modes
                .iter()
                .copied()
                .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        let swapchain = Swapchain::new(
            surface,
            &surface_loader,
            surface_format,
            present_mode,
            window_extent(&window),
            vk::SwapchainKHR::null(),
            ins,
            dev,
        )?;

        Ok(Self {
            window,
            surface,
            surface_loader,
            surface_format,
            present_mode,
            swapchain,
            device: dev.logical.clone(),
        })
    }

    /// Current size of the window's drawable area
    pub fn window_extent(&self) -> vk::Extent2D {
        window_extent(&self.window)
    }

    /// Recreate the swapchain, handing the old one to the driver for reuse.
    /// The device must be idle.
    pub fn recreate_swapchain(
        &mut self,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<()> {
        let swapchain = Swapchain::new(
            self.surface,
            &self.surface_loader,
            self.surface_format,
            self.present_mode,
            self.window_extent(),
            self.swapchain.swapchain,
            ins,
            dev,
        )?;

        let mut old = std::mem::replace(&mut self.swapchain, swapchain);
        old.destroy(&self.device);

        Ok(())
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.swapchain.destroy(&self.device);
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
