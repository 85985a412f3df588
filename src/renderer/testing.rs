//! Recording stand-ins for the device-facing traits, so the engine's
//! bookkeeping can be exercised without a GPU.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use ash::vk;
use ash::vk::Handle;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use gpu_descriptor::{CreatePoolError, DescriptorTotalCount, DeviceAllocationError};
use crate::renderer::contexts::device_ctx::command_encoder::CommandRecorder;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::transfer_ctx::UploadDevice;
use crate::renderer::contexts::resource_ctx::descriptor_allocator::DescriptorPoolDevice;
use crate::renderer::contexts::resource_ctx::descriptor_builder::{DescriptorWrite, DescriptorWriter};
use crate::renderer::contexts::resource_ctx::layout_cache::{LayoutBinding, LayoutDevice};
use crate::renderer::contexts::resource_ctx::resource_allocator::{
    AllocatedBuffer, AllocatedImage, ImageDesc, MemoryAllocator,
};

pub fn test_queue() -> Arc<Queue> {
    let properties = vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        queue_count: 1,
        ..Default::default()
    };
    Arc::new(Queue::new(
        QueueFamily::new(0, properties, false),
        vk::Queue::from_raw(1),
    ))
}

/// Descriptor pools that hold a fixed number of sets each
pub struct MockDescriptorDevice {
    capacity_per_pool: usize,
    next_handle: Cell<u64>,
    pools: RefCell<HashMap<vk::DescriptorPool, Vec<vk::DescriptorSet>>>,
    pools_created: Cell<usize>,
    pools_reset: Cell<usize>,
    pools_destroyed: Cell<usize>,
    allocation_attempts: Cell<usize>,
    fail_next: Cell<Option<DeviceAllocationError>>,
    fail_next_reset: Cell<bool>,
    writes: RefCell<Vec<DescriptorWrite>>,
}

impl MockDescriptorDevice {
    pub fn new(capacity_per_pool: usize) -> Self {
        Self {
            capacity_per_pool,
            next_handle: Cell::new(0),
            pools: RefCell::new(HashMap::new()),
            pools_created: Cell::new(0),
            pools_reset: Cell::new(0),
            pools_destroyed: Cell::new(0),
            allocation_attempts: Cell::new(0),
            fail_next: Cell::new(None),
            fail_next_reset: Cell::new(false),
            writes: RefCell::new(Vec::new()),
        }
    }

    pub fn fail_next_with(&self, error: DeviceAllocationError) {
        self.fail_next.set(Some(error));
    }

    /// Make the next pool reset fail without touching the pool
    pub fn fail_next_reset(&self) {
        self.fail_next_reset.set(true);
    }

    pub fn pools_created(&self) -> usize {
        self.pools_created.get()
    }

    pub fn pools_reset(&self) -> usize {
        self.pools_reset.get()
    }

    pub fn pools_destroyed(&self) -> usize {
        self.pools_destroyed.get()
    }

    pub fn live_pools(&self) -> usize {
        self.pools.borrow().len()
    }

    pub fn allocation_attempts(&self) -> usize {
        self.allocation_attempts.get()
    }

    /// Whether `set` still belongs to a pool that has not been reset since
    pub fn is_live(&self, set: vk::DescriptorSet) -> bool {
        self.pools.borrow().values().any(|sets| sets.contains(&set))
    }

    pub fn writes(&self) -> Vec<DescriptorWrite> {
        self.writes.borrow().clone()
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.set(self.next_handle.get() + 1);
        self.next_handle.get()
    }
}

impl DescriptorPoolDevice for MockDescriptorDevice {
    fn create_descriptor_pool(
        &self,
        _descriptor_count: &DescriptorTotalCount,
        _max_sets: u32,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let pool = vk::DescriptorPool::from_raw(self.next_raw());
        self.pools.borrow_mut().insert(pool, Vec::new());
        self.pools_created.set(self.pools_created.get() + 1);
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
        if self.fail_next_reset.replace(false) {
            return Err(eyre!("Device lost while resetting {:?}", pool));
        }
        let mut pools = self.pools.borrow_mut();
        let sets = pools
            .get_mut(&pool)
            .ok_or_else(|| eyre!("Unknown descriptor pool {:?}", pool))?;
        sets.clear();
        self.pools_reset.set(self.pools_reset.get() + 1);
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        if self.pools.borrow_mut().remove(&pool).is_some() {
            self.pools_destroyed.set(self.pools_destroyed.get() + 1);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceAllocationError> {
        self.allocation_attempts.set(self.allocation_attempts.get() + 1);
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }

        let set = vk::DescriptorSet::from_raw(self.next_raw());
        let mut pools = self.pools.borrow_mut();
        let sets = pools
            .get_mut(&pool)
            .ok_or(DeviceAllocationError::OutOfHostMemory)?;
        if sets.len() >= self.capacity_per_pool {
            return Err(DeviceAllocationError::OutOfPoolMemory);
        }
        sets.push(set);
        Ok(set)
    }
}

impl DescriptorWriter for MockDescriptorDevice {
    fn write_descriptors(&self, writes: &[DescriptorWrite]) {
        self.writes.borrow_mut().extend_from_slice(writes);
    }
}

#[derive(Default)]
pub struct MockLayoutDevice {
    next_handle: Cell<u64>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
    fail_on: Cell<Option<usize>>,
    last_bindings: RefCell<Vec<LayoutBinding>>,
}

impl MockLayoutDevice {
    /// Make the `n`th layout creation (counting from 1) fail
    pub fn fail_on_creation(&self, n: usize) {
        self.fail_on.set(Some(n));
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    pub fn last_bindings(&self) -> Vec<LayoutBinding> {
        self.last_bindings.borrow().clone()
    }
}

impl LayoutDevice for MockLayoutDevice {
    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        if self.fail_on.get() == Some(self.created.get() + 1) {
            return Err(eyre!("Out of host memory creating a set layout"));
        }
        self.next_handle.set(self.next_handle.get() + 1);
        self.created.set(self.created.get() + 1);
        *self.last_bindings.borrow_mut() = bindings.to_vec();
        Ok(vk::DescriptorSetLayout::from_raw(self.next_handle.get()))
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: u64,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        extent: vk::Extent3D,
    },
    CopyImageToBuffer {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        extent: vk::Extent3D,
    },
    Barrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        aspect: vk::ImageAspectFlags,
        level_count: u32,
    },
}

/// Command recorder that keeps every command instead of encoding it
#[derive(Default)]
pub struct RecordingEncoder {
    pub commands: Vec<RecordedCommand>,
}

impl CommandRecorder for RecordingEncoder {
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            size: regions.iter().map(|r| r.size).sum(),
        });
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        for region in regions {
            self.commands.push(RecordedCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                extent: region.image_extent,
            });
        }
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        for region in regions {
            self.commands.push(RecordedCommand::CopyImageToBuffer {
                src,
                src_layout,
                dst,
                extent: region.image_extent,
            });
        }
    }

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        for barrier in image_barriers {
            self.commands.push(RecordedCommand::Barrier {
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
                src_access: barrier.src_access_mask,
                dst_access: barrier.dst_access_mask,
                src_stage,
                dst_stage,
                aspect: barrier.subresource_range.aspect_mask,
                level_count: barrier.subresource_range.level_count,
            });
        }
    }
}

#[derive(Default)]
struct UploadState {
    next_handle: u64,
    live_fences: usize,
    live_pools: usize,
    live_command_buffers: usize,
    fence_signaled: bool,
    gpu_hung: bool,
    submissions: usize,
    pool_resets: usize,
    recorded: Vec<RecordedCommand>,
}

/// Upload device whose queue completes work the moment it is submitted.
/// Clones share state, so a clone can observe the context after it is dropped.
#[derive(Default, Clone)]
pub struct MockUploadDevice {
    state: Rc<RefCell<UploadState>>,
}

impl MockUploadDevice {
    /// Submitted work never finishes from now on
    pub fn hang_gpu(&self) {
        self.state.borrow_mut().gpu_hung = true;
    }

    pub fn fence_signaled(&self) -> bool {
        self.state.borrow().fence_signaled
    }

    pub fn submissions(&self) -> usize {
        self.state.borrow().submissions
    }

    pub fn pool_resets(&self) -> usize {
        self.state.borrow().pool_resets
    }

    pub fn live_command_buffers(&self) -> usize {
        self.state.borrow().live_command_buffers
    }

    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.state.borrow().recorded.clone()
    }

    /// Every fence and pool created has been destroyed again
    pub fn released(&self) -> bool {
        let state = self.state.borrow();
        state.live_fences == 0 && state.live_pools == 0
    }

    fn next_raw(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        state.next_handle
    }
}

impl UploadDevice for MockUploadDevice {
    fn create_fence(&self) -> Result<vk::Fence> {
        let fence = vk::Fence::from_raw(self.next_raw());
        self.state.borrow_mut().live_fences += 1;
        Ok(fence)
    }

    fn create_command_pool(&self, _queue_family_index: u32) -> Result<vk::CommandPool> {
        let pool = vk::CommandPool::from_raw(self.next_raw());
        self.state.borrow_mut().live_pools += 1;
        Ok(pool)
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
        let raw = self.next_raw();
        let mut state = self.state.borrow_mut();
        // A single buffer fits in the pool until it is reset
        if state.live_command_buffers > 0 {
            bail!("Command pool exhausted");
        }
        state.live_command_buffers += 1;
        Ok(vk::CommandBuffer::from_raw(raw))
    }

    fn record_one_time<F>(&self, _cmd: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandRecorder) -> Result<()>,
    {
        let mut encoder = RecordingEncoder::default();
        record(&mut encoder)?;
        self.state.borrow_mut().recorded.extend(encoder.commands);
        Ok(())
    }

    fn submit(&self, _queue: vk::Queue, _cmd: vk::CommandBuffer, _fence: vk::Fence) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.submissions += 1;
        state.fence_signaled = !state.gpu_hung;
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        if !self.state.borrow().fence_signaled {
            bail!("Timed out after {} ms waiting for fence {:?}", timeout_ns / 1_000_000, fence);
        }
        Ok(())
    }

    fn reset_fence(&self, _fence: vk::Fence) -> Result<()> {
        self.state.borrow_mut().fence_signaled = false;
        Ok(())
    }

    fn reset_command_pool(&self, _pool: vk::CommandPool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.live_command_buffers = 0;
        state.pool_resets += 1;
        Ok(())
    }

    fn destroy_fence(&self, _fence: vk::Fence) {
        self.state.borrow_mut().live_fences -= 1;
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {
        self.state.borrow_mut().live_pools -= 1;
    }
}

/// What the mock allocator remembers about one buffer
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub buffer: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub name: String,
    pub contents: Vec<u8>,
}

#[derive(Default)]
struct AllocatorState {
    next_handle: u64,
    buffers: Vec<BufferRecord>,
    live_buffers: HashMap<vk::Buffer, usize>,
    live_images: HashMap<vk::Image, ImageDesc>,
    images_created: usize,
}

/// Host memory pretending to be GPU memory. `GpuOnly` buffers refuse host access.
#[derive(Default)]
pub struct MockAllocator {
    state: RefCell<AllocatorState>,
}

impl MockAllocator {
    /// Every buffer ever created, in creation order
    pub fn buffers(&self) -> Vec<BufferRecord> {
        self.state.borrow().buffers.clone()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().live_buffers.len()
    }

    pub fn live_image_count(&self) -> usize {
        self.state.borrow().live_images.len()
    }

    pub fn images_created(&self) -> usize {
        self.state.borrow().images_created
    }

    pub fn is_live(&self, buffer: vk::Buffer) -> bool {
        self.state.borrow().live_buffers.contains_key(&buffer)
    }
}

impl MemoryAllocator for MockAllocator {
    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedBuffer> {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let buffer = vk::Buffer::from_raw(state.next_handle);

        let index = state.buffers.len();
        state.buffers.push(BufferRecord {
            buffer,
            usage,
            location,
            name: name.to_string(),
            contents: vec![0; size as usize],
        });
        state.live_buffers.insert(buffer, index);

        Ok(AllocatedBuffer::from_parts(buffer, size, None))
    }

    fn create_image(
        &self,
        desc: &ImageDesc,
        _location: MemoryLocation,
        _name: &str,
    ) -> Result<AllocatedImage> {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let image = vk::Image::from_raw(state.next_handle);
        state.live_images.insert(image, *desc);
        state.images_created += 1;
        Ok(AllocatedImage::from_parts(image, desc, None))
    }

    fn destroy_buffer(&self, buffer: AllocatedBuffer) -> Result<()> {
        if self.state.borrow_mut().live_buffers.remove(&buffer.buffer).is_none() {
            bail!("Buffer {:?} destroyed twice", buffer.buffer);
        }
        Ok(())
    }

    fn destroy_image(&self, image: AllocatedImage) -> Result<()> {
        if self.state.borrow_mut().live_images.remove(&image.image).is_none() {
            bail!("Image {:?} destroyed twice", image.image);
        }
        Ok(())
    }

    fn upload_to_buffer(
        &self,
        data: &[u8],
        buffer: &mut AllocatedBuffer,
        offset: u64,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = *state
            .live_buffers
            .get(&buffer.buffer)
            .ok_or_else(|| eyre!("Unknown buffer {:?}", buffer.buffer))?;
        let record = &mut state.buffers[index];

        if record.location == MemoryLocation::GpuOnly {
            bail!("Buffer {:?} is not host visible", buffer.buffer);
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > record.contents.len() {
            bail!("Upload overruns buffer {:?}", buffer.buffer);
        }
        record.contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_from_buffer(
        &self,
        buffer: &AllocatedBuffer,
        dst: &mut [u8],
    ) -> Result<usize> {
        let state = self.state.borrow();
        let index = *state
            .live_buffers
            .get(&buffer.buffer)
            .ok_or_else(|| eyre!("Unknown buffer {:?}", buffer.buffer))?;
        let contents = &state.buffers[index].contents;
        let len = dst.len().min(contents.len());
        dst[..len].copy_from_slice(&contents[..len]);
        Ok(len)
    }
}
