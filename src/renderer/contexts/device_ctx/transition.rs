use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::command_encoder::CommandRecorder;

/// Access masks and stages guarding one kind of layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for each supported (old, new) layout pair.
/// Any other pair is an error.
pub fn layout_transition(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionBarrier> {
    use vk::ImageLayout as L;

    let barrier = match (old_layout, new_layout) {
        // Before a copy into the image
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionBarrier {
            src_access: vk::AccessFlags::NONE,
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        // Copy finished, fragment shaders may sample now
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionBarrier {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionBarrier {
            src_access: vk::AccessFlags::NONE,
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        // Read back of a swapchain image. It was last written as a colour attachment,
        // so those writes have to be made visible to the copy.
        (L::PRESENT_SRC_KHR, L::TRANSFER_SRC_OPTIMAL) => TransitionBarrier {
            src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::ALL_GRAPHICS,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_SRC_OPTIMAL, L::PRESENT_SRC_KHR) => TransitionBarrier {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::NONE,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::ALL_GRAPHICS,
        },
        (old, new) => {
            log::error!("Unsupported layout transition: {:?} -> {:?}", old, new);
            bail!("Unsupported layout transition: {:?} -> {:?}", old, new);
        }
    };

    Ok(barrier)
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Aspect a transition into `new_layout` has to cover
pub fn transition_aspect(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Record the barrier moving every mip level of `image` from `old_layout` to `new_layout`
pub fn transition_image_layout(
    recorder: &mut dyn CommandRecorder,
    image: vk::Image,
    format: vk::Format,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
) -> Result<()> {
    let transition = layout_transition(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: transition_aspect(format, new_layout),
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    recorder.pipeline_barrier(transition.src_stage, transition.dst_stage, &[barrier]);

    Ok(())
}
