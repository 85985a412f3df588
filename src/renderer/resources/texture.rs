use std::path::Path;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::transfer_ctx::Uploader;
use crate::renderer::contexts::device_ctx::transition::transition_image_layout;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedImage, MemoryAllocator};
use crate::renderer::resources::image::texture_image_desc;

/// Sampled image together with the view shaders read it through
pub struct Texture {
    pub image: AllocatedImage,
    pub view: vk::ImageView,
}

impl Texture {
    /// Queued so that the view is destroyed before its image
    pub fn release(self, deletion_queue: &mut DeletionQueue) {
        deletion_queue.push(Deletion::Image(self.image));
        deletion_queue.push(Deletion::ImageView(self.view));
    }
}

/// Decoded RGBA8 pixels of an image file
pub struct ImagePixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// `None` when the file cannot be read or decoded
pub fn load_image_from_file(path: &Path) -> Option<ImagePixels> {
    let image = match image::open(path) {
        Ok(image) => image,
        Err(e) => {
            log::error!("Failed to load image {}: {}", path.display(), e);
            return None;
        }
    };

    let rgba = image.to_rgba8();
    Some(ImagePixels {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// Create a device-local SRGB texture and fill it with `rgba`.
/// The image ends up in SHADER_READ_ONLY_OPTIMAL.
pub fn upload_texture<A, U>(
    allocator: &A,
    uploader: &U,
    width: u32,
    height: u32,
    rgba: &[u8],
    name: &str,
) -> Result<AllocatedImage>
where
    A: MemoryAllocator + ?Sized,
    U: Uploader,
{
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || rgba.len() != expected {
        bail!(
            "Texture {} is {}x{} but has {} bytes of pixel data",
            name,
            width,
            height,
            rgba.len(),
        );
    }

    let mut staging = allocator.create_buffer(
        rgba.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        &format!("{} (staging)", name),
    )?;
    if let Err(e) = allocator.upload_to_buffer(rgba, &mut staging, 0) {
        allocator.destroy_buffer(staging)?;
        return Err(e);
    }

    let desc = texture_image_desc(width, height);
    let image = match allocator.create_image(&desc, MemoryLocation::GpuOnly, name) {
        Ok(image) => image,
        Err(e) => {
            allocator.destroy_buffer(staging)?;
            return Err(e);
        }
    };

    let copied = uploader.submit_command(|cmd| {
        transition_image_layout(
            cmd,
            image.image,
            image.format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            image.mip_levels,
        )?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: image.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(image.extent);
        cmd.copy_buffer_to_image(
            staging.buffer,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        transition_image_layout(
            cmd,
            image.image,
            image.format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            image.mip_levels,
        )
    });
    allocator.destroy_buffer(staging)?;

    match copied {
        Ok(()) => {
            log::debug!("Uploaded texture {} ({}x{})", name, width, height);
            Ok(image)
        }
        Err(e) => {
            allocator.destroy_image(image)?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::device_ctx::transfer_ctx::UploadContext;
    use crate::renderer::testing::{test_queue, MockAllocator, MockUploadDevice, RecordedCommand};

    #[test]
    fn white_pixel_takes_two_transitions_around_one_copy() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let uploader = UploadContext::new(test_queue(), device.clone(), 1_000_000_000).unwrap();

        let image = upload_texture(&allocator, &uploader, 1, 1, &[255; 4], "white").unwrap();

        let commands = device.recorded();
        assert_eq!(commands.len(), 3);
        match (&commands[0], &commands[1], &commands[2]) {
            (
                RecordedCommand::Barrier { old_layout: a0, new_layout: a1, image: first, .. },
                RecordedCommand::CopyBufferToImage { dst, dst_layout, extent, .. },
                RecordedCommand::Barrier { old_layout: b0, new_layout: b1, src_stage, dst_stage, .. },
            ) => {
                assert_eq!((*a0, *a1), (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL));
                assert_eq!(*first, image.image);
                assert_eq!(*dst, image.image);
                assert_eq!(*dst_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                assert_eq!(*extent, vk::Extent3D { width: 1, height: 1, depth: 1 });
                assert_eq!(
                    (*b0, *b1),
                    (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                );
                assert_eq!(*src_stage, vk::PipelineStageFlags::TRANSFER);
                assert_eq!(*dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
            }
            other => panic!("unexpected commands {:?}", other),
        }

        // Staging buffer is gone, the image stays
        assert_eq!(allocator.live_buffer_count(), 0);
        assert_eq!(allocator.live_image_count(), 1);
        assert_eq!(image.format, vk::Format::R8G8B8A8_SRGB);
        allocator.destroy_image(image).unwrap();
    }

    #[test]
    fn pixel_data_must_match_dimensions() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let uploader = UploadContext::new(test_queue(), device.clone(), 1_000_000_000).unwrap();

        assert!(upload_texture(&allocator, &uploader, 2, 2, &[255; 4], "short").is_err());
        assert!(upload_texture(&allocator, &uploader, 0, 1, &[], "empty").is_err());
        assert_eq!(allocator.images_created(), 0);
        assert_eq!(device.submissions(), 0);
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_image_from_file(Path::new("does/not/exist.png")).is_none());
    }
}
