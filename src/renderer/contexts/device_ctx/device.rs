use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::str::Utf8Error;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::transfer_ctx::UploadContext;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, ResourceDestroyer};
use crate::renderer::contexts::resource_ctx::resource_allocator::{MemoryAllocator, ResourceAllocator};

/// Thin handle implementing the device-facing traits on top of `ash`
#[derive(Clone)]
pub struct AshDevice(pub Arc<ash::Device>);

impl From<Arc<ash::Device>> for AshDevice {
    fn from(device: Arc<ash::Device>) -> Self {
        Self(device)
    }
}

impl AshDevice {
    /// Wait for `fence`, turning a timeout into an error
    pub fn wait_for_fence_with_timeout(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        match unsafe { self.0.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(eyre!(
                "Timed out after {} ms waiting for fence {:?}",
                timeout_ns / 1_000_000,
                fence,
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Logical device, its queue, and the allocators bound to it
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    // The graphics queue also presents and runs uploads
    pub graphics_queue: Arc<Queue>,

    pub allocator: ManuallyDrop<ResourceAllocator>,
    pub upload: ManuallyDrop<UploadContext<AshDevice>>,
}

impl RenderDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: Option<&(vk::SurfaceKHR, ash::khr::surface::Instance)>,
        upload_timeout_ns: u64,
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) =
            Self::select_physical_device(instance, surface)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {:?}",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
        );

        let (logical_device, graphics_queue) = Self::create_logical_device(
            instance,
            &physical_device,
            graphics_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(graphics_queue);

        let allocator = ResourceAllocator::new(memory_allocator, logical_device.clone());
        let upload = UploadContext::new(
            graphics_queue.clone(),
            AshDevice(logical_device.clone()),
            upload_timeout_ns,
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,
            graphics_queue,
            allocator: ManuallyDrop::new(allocator),
            upload: ManuallyDrop::new(upload),
        })
    }

    pub fn ash(&self) -> AshDevice {
        AshDevice(self.logical.clone())
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: Option<&(vk::SurfaceKHR, ash::khr::surface::Instance)>,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions(surface.is_some());
        let req_device_exts = req_device_exts
            .iter()
            .map(|ext| ext.to_str())
            .collect::<std::result::Result<Vec<&str>, Utf8Error>>()?;

        let devices = unsafe { instance.enumerate_physical_devices()? };

        devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default()
                };

                req_device_exts.iter().all(|req_ext| {
                    let req_ext_supported = supported_extensions
                        .iter()
                        .filter_map(|sup_ext| sup_ext.extension_name_as_c_str().ok())
                        .any(|sup_ext| sup_ext.to_str() == Ok(*req_ext));
                    if !req_ext_supported {
                        log::warn!("Device extension not supported: {}", req_ext);
                    }
                    req_ext_supported
                })
            })
            // Filter out devices without a queue that can both draw and present
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };

                QueueFamily::select_graphics(&props, surface.is_some(), |index| match surface {
                    Some((surface, surface_loader)) => unsafe {
                        surface_loader
                            .get_physical_device_surface_support(device, index, *surface)
                            .unwrap_or(false)
                    },
                    None => true,
                })
                    .map(|family| (device, family))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions(
            graphics_queue_family.presents,
        )
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance.create_device(*physical_device, &device_create_info, None)?
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
        let mut exts = Vec::new();
        if presenting {
            exts.push(ash::khr::swapchain::NAME);
        }

        #[cfg(target_os = "macos")]
        exts.push(ash::khr::portability_subset::NAME);

        exts
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            // The allocator reports leaks when dropped, so it has to go before the device
            ManuallyDrop::drop(&mut self.upload);
            ManuallyDrop::drop(&mut self.allocator);
            self.logical.destroy_device(None);
        }
    }
}

impl ResourceDestroyer for RenderDevice {
    fn destroy(&mut self, deletion: Deletion) -> Result<()> {
        let device = &self.logical;
        unsafe {
            match deletion {
                Deletion::Buffer(buffer) => self.allocator.destroy_buffer(buffer)?,
                Deletion::Image(image) => self.allocator.destroy_image(image)?,
                Deletion::ImageView(view) => device.destroy_image_view(view, None),
                Deletion::Sampler(sampler) => device.destroy_sampler(sampler, None),
                Deletion::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer, None),
                Deletion::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                Deletion::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
                Deletion::RenderPass(render_pass) => device.destroy_render_pass(render_pass, None),
                Deletion::ShaderModule(module) => device.destroy_shader_module(module, None),
                Deletion::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
                Deletion::Fence(fence) => device.destroy_fence(fence, None),
                Deletion::CommandPool(pool) => device.destroy_command_pool(pool, None),
                Deletion::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
                Deletion::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout, None),
            }
        }
        Ok(())
    }
}
