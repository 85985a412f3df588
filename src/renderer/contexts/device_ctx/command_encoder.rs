use ash::vk;
use color_eyre::Result;

/// Transfer and synchronization commands recorded into a command buffer
pub trait CommandRecorder {
    fn copy_buffer(
        &mut self,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    );

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
}

/// Records into a Vulkan command buffer that is already in the recording state
pub struct CommandEncoder<'a> {
    pub command_buffer: vk::CommandBuffer,
    device: &'a ash::Device,
}

impl<'a> CommandEncoder<'a> {
    pub fn new(command_buffer: vk::CommandBuffer, device: &'a ash::Device) -> Self {
        Self {
            command_buffer,
            device,
        }
    }

    /// Begin a command buffer that will be submitted exactly once before resetting
    pub fn begin_one_time(
        command_buffer: vk::CommandBuffer,
        device: &'a ash::Device,
    ) -> Result<Self> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.begin_command_buffer(command_buffer, &begin_info)?;
        }
        Ok(Self::new(command_buffer, device))
    }

    pub fn end(self) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(self.command_buffer)?;
        }
        Ok(())
    }
}

impl CommandRecorder for CommandEncoder<'_> {
    fn copy_buffer(
        &mut self,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions);
        }
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(self.command_buffer, src, dst, dst_layout, regions);
        }
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.cmd_copy_image_to_buffer(self.command_buffer, src, src_layout, dst, regions);
        }
    }

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }
}
