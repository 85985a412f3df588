use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::transfer_ctx::Uploader;
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, MemoryAllocator};

/// Copy `data` into a new device-local buffer through a host-visible staging buffer.
/// The staging buffer is gone by the time this returns, whether or not the copy worked.
pub fn upload_buffer<A, U>(
    allocator: &A,
    uploader: &U,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<AllocatedBuffer>
where
    A: MemoryAllocator + ?Sized,
    U: Uploader,
{
    let size = data.len() as u64;

    let mut staging = allocator.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        &format!("{} (staging)", name),
    )?;
    if let Err(e) = allocator.upload_to_buffer(data, &mut staging, 0) {
        allocator.destroy_buffer(staging)?;
        return Err(e);
    }

    let buffer = match allocator.create_buffer(
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            allocator.destroy_buffer(staging)?;
            return Err(e);
        }
    };

    let copied = uploader.submit_command(|cmd| {
        cmd.copy_buffer(
            staging.buffer,
            buffer.buffer,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            }],
        );
        Ok(())
    });
    allocator.destroy_buffer(staging)?;

    match copied {
        Ok(()) => Ok(buffer),
        Err(e) => {
            allocator.destroy_buffer(buffer)?;
            Err(e)
        }
    }
}
