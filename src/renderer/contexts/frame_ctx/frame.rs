use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::descriptor_builder::DescriptorBuilder;
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, MemoryAllocator};
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::shader_data::GpuObjectData;

/// Everything one frame in flight records into and synchronizes on
pub struct Frame {
    // Signals when the swapchain image is ready to be rendered to.
    pub present_semaphore: vk::Semaphore,

    // Signals when rendering commands have finished on the queue.
    pub render_semaphore: vk::Semaphore,

    // Signals the host when the frame's command buffer can be reused.
    pub render_fence: vk::Fence,

    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    pub object_buffer: AllocatedBuffer,
    pub object_set: vk::DescriptorSet,
}

impl Frame {
    /// Sync objects and the command pool are handed to the deletion queue right away.
    /// The object buffer is released with [`Frame::release`].
    pub fn new(
        index: usize,
        dev: &RenderDevice,
        res: &mut RenderResourceContext,
        max_objects: usize,
    ) -> Result<Self> {
        let device = &dev.logical;

        let present_semaphore = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        res.deletion_queue.push(Deletion::Semaphore(present_semaphore));

        let render_semaphore = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        res.deletion_queue.push(Deletion::Semaphore(render_semaphore));

        // Created signaled so the first wait on it returns immediately
        let render_fence = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };
        res.deletion_queue.push(Deletion::Fence(render_fence));

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(dev.graphics_queue.family.index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )?
        };
        res.deletion_queue.push(Deletion::CommandPool(command_pool));

        let command_buffer = unsafe {
            device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(command_pool)
                    .command_buffer_count(1)
                    .level(vk::CommandBufferLevel::PRIMARY),
            )?
        }
            .into_iter()
            .next()
            .ok_or_eyre("Driver returned no command buffer")?;

        let object_buffer_size = (max_objects * size_of::<GpuObjectData>()) as u64;
        let object_buffer = dev.allocator.create_buffer(
            object_buffer_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            &format!("Object Buffer {}", index),
        )?;

        let object_info = vk::DescriptorBufferInfo {
            buffer: object_buffer.buffer,
            offset: 0,
            range: object_buffer_size,
        };
        let object_set = DescriptorBuilder::begin(&mut res.layout_cache, &mut res.descriptor_allocator)
            .bind_buffer(
                0,
                object_info,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .build()
            .map(|(set, _)| set);
        let object_set = match object_set {
            Some(set) => set,
            None => {
                dev.allocator.destroy_buffer(object_buffer)?;
                return Err(eyre!("Failed to allocate object descriptor set {}", index));
            }
        };

        Ok(Self {
            present_semaphore,
            render_semaphore,
            render_fence,
            command_pool,
            command_buffer,
            object_buffer,
            object_set,
        })
    }

    pub fn release(self, deletion_queue: &mut DeletionQueue) {
        deletion_queue.push(Deletion::Buffer(self.object_buffer));
    }
}
