use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::resource_ctx::resource_allocator::ImageDesc;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Depth buffer matching a swapchain of the given size
pub fn depth_image_desc(extent: vk::Extent2D) -> ImageDesc {
    ImageDesc::new_2d(
        DEPTH_FORMAT,
        extent.width,
        extent.height,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .with_aspect(vk::ImageAspectFlags::DEPTH)
}

/// Shader-readable RGBA texture that is filled by a transfer
pub fn texture_image_desc(width: u32, height: u32) -> ImageDesc {
    ImageDesc::new_2d(
        vk::Format::R8G8B8A8_SRGB,
        width,
        height,
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
    )
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });
    Ok(unsafe { device.create_image_view(&info, None)? })
}

/// Nearest-neighbour sampler that repeats in every direction
pub fn create_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT);
    Ok(unsafe { device.create_sampler(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_image_follows_window_size() {
        let desc = depth_image_desc(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(desc.format, vk::Format::D32_SFLOAT);
        assert_eq!(desc.extent, vk::Extent3D { width: 800, height: 600, depth: 1 });
        assert_eq!(desc.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn textures_address_the_colour_aspect() {
        let desc = texture_image_desc(4, 2);
        assert_eq!(desc.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
    }
}
