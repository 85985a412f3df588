use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, Result};
use crate::renderer::contexts::device_ctx::command_encoder::{CommandEncoder, CommandRecorder};
use crate::renderer::contexts::device_ctx::device::AshDevice;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Runs recorded transfer commands to completion before returning
pub trait Uploader {
    fn submit_command<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandRecorder) -> Result<()>;
}

/// Device operations behind [`UploadContext`]
pub trait UploadDevice {
    fn create_fence(&self) -> Result<vk::Fence>;

    fn create_command_pool(&self, queue_family_index: u32) -> Result<vk::CommandPool>;

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> Result<vk::CommandBuffer>;

    /// Begin `cmd` as one-time-submit, run `record` against it and end it
    fn record_one_time<F>(&self, cmd: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandRecorder) -> Result<()>;

    fn submit(&self, queue: vk::Queue, cmd: vk::CommandBuffer, fence: vk::Fence) -> Result<()>;

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;

    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    fn reset_command_pool(&self, pool: vk::CommandPool) -> Result<()>;

    fn destroy_fence(&self, fence: vk::Fence);

    fn destroy_command_pool(&self, pool: vk::CommandPool);
}

/// Responsibilities:
/// - Own the upload fence and command pool
/// - Execute one-shot transfer work synchronously
pub struct UploadContext<D: UploadDevice> {
    upload_fence: vk::Fence,
    command_pool: vk::CommandPool,
    fence_timeout_ns: u64,

    queue: Arc<Queue>,
    device: D,
}

impl<D: UploadDevice> UploadContext<D> {
    pub fn new(
        queue: Arc<Queue>,
        device: D,
        fence_timeout_ns: u64,
    ) -> Result<Self> {
        let upload_fence = device.create_fence()?;
        let command_pool = device.create_command_pool(queue.family.index)?;

        Ok(Self {
            upload_fence,
            command_pool,
            fence_timeout_ns,
            queue,
            device,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: UploadDevice> Uploader for UploadContext<D> {
    // Blocks the calling thread until the GPU has executed the commands.
    // Uploads are serialized, nothing is pipelined.
    fn submit_command<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandRecorder) -> Result<()>,
    {
        let cmd = self.device.allocate_command_buffer(self.command_pool)?;

        if let Err(e) = self.device.record_one_time(cmd, record) {
            // Nothing reached the queue, the pool can be recycled right away
            self.device.reset_command_pool(self.command_pool)?;
            return Err(e);
        }

        self.device.submit(self.queue.handle, cmd, self.upload_fence)?;

        if let Err(e) = self.device.wait_for_fence(self.upload_fence, self.fence_timeout_ns) {
            let e = e.wrap_err("Upload did not complete");
            log::error!("{:?}", e);
            return Err(e);
        }

        self.device.reset_fence(self.upload_fence)?;
        // Frees the command buffer along with everything else allocated from the pool
        self.device.reset_command_pool(self.command_pool)?;

        Ok(())
    }
}

impl<D: UploadDevice> Drop for UploadContext<D> {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.command_pool);
        self.device.destroy_fence(self.upload_fence);
    }
}

impl UploadDevice for AshDevice {
    fn create_fence(&self) -> Result<vk::Fence> {
        let fence_info = vk::FenceCreateInfo::default();
        Ok(unsafe { self.0.create_fence(&fence_info, None)? })
    }

    fn create_command_pool(&self, queue_family_index: u32) -> Result<vk::CommandPool> {
        // No per-buffer reset: the whole pool is reset after every upload
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        Ok(unsafe { self.0.create_command_pool(&pool_info, None)? })
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let buffers = unsafe { self.0.allocate_command_buffers(&allocate_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Driver returned no command buffer"))
    }

    fn record_one_time<F>(&self, cmd: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandRecorder) -> Result<()>,
    {
        let mut encoder = CommandEncoder::begin_one_time(cmd, &self.0)?;
        record(&mut encoder)?;
        encoder.end()
    }

    fn submit(&self, queue: vk::Queue, cmd: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            self.0.queue_submit(queue, &[submit], fence)?;
        }
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        self.wait_for_fence_with_timeout(fence, timeout_ns)
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.0.reset_fences(&[fence])?;
        }
        Ok(())
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> Result<()> {
        unsafe {
            self.0.reset_command_pool(pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe {
            self.0.destroy_fence(fence, None);
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe {
            self.0.destroy_command_pool(pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::{test_queue, MockUploadDevice, RecordedCommand};
    use ash::vk::Handle;

    const TIMEOUT: u64 = 10_000_000_000;

    #[test]
    fn pool_is_reset_and_fence_unsignaled_after_submit() {
        let ctx = UploadContext::new(test_queue(), MockUploadDevice::default(), TIMEOUT).unwrap();

        ctx.submit_command(|cmd| {
            cmd.copy_buffer(
                vk::Buffer::from_raw(1),
                vk::Buffer::from_raw(2),
                &[vk::BufferCopy { src_offset: 0, dst_offset: 0, size: 16 }],
            );
            Ok(())
        }).unwrap();

        let device = ctx.device();
        assert!(!device.fence_signaled());
        assert_eq!(device.pool_resets(), 1);
        assert_eq!(device.live_command_buffers(), 0);
        assert_eq!(device.submissions(), 1);
        assert!(matches!(
            device.recorded().as_slice(),
            [RecordedCommand::CopyBuffer { size: 16, .. }],
        ));
    }

    #[test]
    fn context_can_be_reused_for_consecutive_uploads() {
        let ctx = UploadContext::new(test_queue(), MockUploadDevice::default(), TIMEOUT).unwrap();

        for _ in 0..3 {
            ctx.submit_command(|_| Ok(())).unwrap();
        }

        assert_eq!(ctx.device().submissions(), 3);
        assert_eq!(ctx.device().pool_resets(), 3);
        assert!(!ctx.device().fence_signaled());
    }

    #[test]
    fn fence_timeout_is_reported() {
        let device = MockUploadDevice::default();
        device.hang_gpu();
        let ctx = UploadContext::new(test_queue(), device, TIMEOUT).unwrap();

        let err = ctx.submit_command(|_| Ok(())).unwrap_err();
        assert!(format!("{:?}", err).contains("Upload did not complete"));
    }

    #[test]
    fn failed_recording_is_not_submitted() {
        let ctx = UploadContext::new(test_queue(), MockUploadDevice::default(), TIMEOUT).unwrap();

        let result = ctx.submit_command(|_| Err(eyre!("bad copy")));

        assert!(result.is_err());
        assert_eq!(ctx.device().submissions(), 0);
        assert_eq!(ctx.device().live_command_buffers(), 0);

        // The pool was recycled, so the next upload can still allocate
        ctx.submit_command(|_| Ok(())).unwrap();
        assert_eq!(ctx.device().submissions(), 1);
    }

    #[test]
    fn drop_releases_fence_and_pool() {
        let ctx = UploadContext::new(test_queue(), MockUploadDevice::default(), TIMEOUT).unwrap();
        let device = ctx.device().clone();
        drop(ctx);
        assert!(device.released());
    }
}
