use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{bail, eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;

/// GPU buffer paired with the allocation backing it.
/// Move-only; release it through the allocator that created it.
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
}

impl AllocatedBuffer {
    pub(crate) fn from_parts(
        buffer: vk::Buffer,
        size: u64,
        allocation: Option<Allocation>,
    ) -> Self {
        Self {
            buffer,
            size,
            allocation,
        }
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        if self.allocation.is_some() {
            log::warn!("Buffer {:?} dropped without being destroyed, its memory leaks", self.buffer);
        }
    }
}

/// GPU image paired with the allocation backing it.
/// Move-only; release it through the allocator that created it.
pub struct AllocatedImage {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub aspect: vk::ImageAspectFlags,

    allocation: Option<Allocation>,
}

impl AllocatedImage {
    pub(crate) fn from_parts(
        image: vk::Image,
        desc: &ImageDesc,
        allocation: Option<Allocation>,
    ) -> Self {
        Self {
            image,
            format: desc.format,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            aspect: desc.aspect,
            allocation,
        }
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        if self.allocation.is_some() {
            log::warn!("Image {:?} dropped without being destroyed, its memory leaks", self.image);
        }
    }
}

/// Describes a 2D image to create
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    /// Aspect that views and copies of the image address
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    pub fn new_2d(
        format: vk::Format,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage,
            mip_levels: 1,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn with_aspect(self, aspect: vk::ImageAspectFlags) -> Self {
        Self { aspect, ..self }
    }
}

/// Creates and releases GPU memory for buffers and images.
/// Creation and destruction always pair the native handle with its allocation.
pub trait MemoryAllocator {
    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedBuffer>;

    fn create_image(
        &self,
        desc: &ImageDesc,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedImage>;

    fn destroy_buffer(&self, buffer: AllocatedBuffer) -> Result<()>;

    fn destroy_image(&self, image: AllocatedImage) -> Result<()>;

    /// Raw byte copy into a host-visible buffer at `offset`.
    /// No synchronization happens here: the GPU must not be using that range.
    fn upload_to_buffer(
        &self,
        data: &[u8],
        buffer: &mut AllocatedBuffer,
        offset: u64,
    ) -> Result<()>;

    /// Raw byte copy out of a host-visible buffer starting at offset 0
    fn read_from_buffer(
        &self,
        buffer: &AllocatedBuffer,
        dst: &mut [u8],
    ) -> Result<usize>;
}

/// [`MemoryAllocator`] backed by `gpu-allocator`
pub struct ResourceAllocator {
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl ResourceAllocator {
    pub fn new(
        memory_allocator: Allocator,
        device: Arc<ash::Device>,
    ) -> Self {
        Self {
            memory_allocator: Arc::new(Mutex::new(memory_allocator)),
            device,
        }
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        Ok(self.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
    }

    fn free(&self, allocation: Allocation) -> Result<()> {
        self.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .free(allocation)?;
        Ok(())
    }

    /// The creation error is what gets reported, so a failed free is only logged
    fn free_after_failure(&self, allocation: Allocation, name: &str) {
        if let Err(e) = self.free(allocation) {
            log::error!("Failed to free memory of {}: {:?}", name, e);
        }
    }
}

impl MemoryAllocator for ResourceAllocator {
    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedBuffer> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { self.device.create_buffer(&buffer_info, None)? }
        };

        let reqs = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation = match self.allocate(name, reqs, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_buffer(buffer, None) };
            self.free_after_failure(allocation, name);
            return Err(e.into());
        }

        Ok(AllocatedBuffer::from_parts(buffer, size, Some(allocation)))
    }

    fn create_image(
        &self,
        desc: &ImageDesc,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedImage> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device.create_image(&image_info, None)? };

        let reqs = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = match self.allocate(name, reqs, location, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device.bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            unsafe { self.device.destroy_image(image, None) };
            self.free_after_failure(allocation, name);
            return Err(e.into());
        }

        Ok(AllocatedImage::from_parts(image, desc, Some(allocation)))
    }

    fn destroy_buffer(&self, mut buffer: AllocatedBuffer) -> Result<()> {
        let allocation = buffer.allocation.take();
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        if let Some(allocation) = allocation {
            self.free(allocation)?;
        }
        Ok(())
    }

    fn destroy_image(&self, mut image: AllocatedImage) -> Result<()> {
        let allocation = image.allocation.take();
        unsafe {
            self.device.destroy_image(image.image, None);
        }
        if let Some(allocation) = allocation {
            self.free(allocation)?;
        }
        Ok(())
    }

    fn upload_to_buffer(
        &self,
        data: &[u8],
        buffer: &mut AllocatedBuffer,
        offset: u64,
    ) -> Result<()> {
        if offset + data.len() as u64 > buffer.size {
            bail!(
                "Upload of {} bytes at offset {} overruns buffer of {} bytes",
                data.len(),
                offset,
                buffer.size,
            );
        }

        let allocation = buffer
            .allocation
            .as_mut()
            .ok_or_eyre("Buffer has no allocation")?;
        if allocation.mapped_ptr().is_none() {
            bail!("Buffer {:?} is not host visible", buffer.buffer);
        }

        presser::copy_from_slice_to_offset(data, allocation, offset as usize)?;
        Ok(())
    }

    fn read_from_buffer(
        &self,
        buffer: &AllocatedBuffer,
        dst: &mut [u8],
    ) -> Result<usize> {
        let mapped = buffer
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_eyre("Buffer is not host visible")?;
        let len = dst.len().min(mapped.len()).min(buffer.size as usize);
        dst[..len].copy_from_slice(&mapped[..len]);
        Ok(len)
    }
}
