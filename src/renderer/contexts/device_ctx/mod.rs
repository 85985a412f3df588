pub mod command_encoder;
pub mod device;
pub mod instance;
pub mod queue;
pub mod swapchain;
pub mod target;
pub mod transfer_ctx;
pub mod transition;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderTarget;

/// Responsibilities:
/// - Manage the Vulkan instance, device, and queues
/// - Own the presentation target
/// - Run one-shot uploads
pub struct RenderDeviceContext {
    // Fields drop in declaration order: target, then device, then instance
    pub target: Option<RenderTarget>,
    pub device: RenderDevice,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(
        window: Option<Arc<Window>>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(window.as_deref())?;
        let surface = match window.as_ref() {
            Some(window) => Some(instance.create_surface(window)?),
            None => None,
        };
        let device = RenderDevice::new(
            &instance.instance,
            surface.as_ref(),
            config.upload_fence_timeout.as_nanos() as u64,
        )?;
        let target = match (window, surface) {
            (Some(window), Some(surface)) => Some(RenderTarget::new(
                window,
                surface,
                config.vsync,
                &instance,
                &device,
            )?),
            _ => None,
        };

        Ok(Self {
            target,
            device,
            instance,
        })
    }
}
