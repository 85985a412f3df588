use ash::vk;

/// Pipeline plus the per-material descriptor set. Instances share the
/// pipeline and layout of the material they were created from.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub texture_set: Option<vk::DescriptorSet>,
}

impl Material {
    pub fn new(pipeline: vk::Pipeline, pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            pipeline,
            pipeline_layout,
            texture_set: None,
        }
    }

    pub fn instance(&self, texture_set: Option<vk::DescriptorSet>) -> Self {
        Self {
            texture_set,
            ..*self
        }
    }

    pub fn bind_pipeline(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            );
        }
    }

    pub fn update_push_constants(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        stage_flags: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                stage_flags,
                0,
                data,
            );
        }
    }
}
