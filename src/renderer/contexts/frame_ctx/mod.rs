pub mod frame;
pub mod uniform_layout;

use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use glam::Vec4;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::contexts::frame_ctx::uniform_layout::UniformLayout;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::descriptor_builder::DescriptorBuilder;
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, MemoryAllocator};
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::resources::render_object::RenderObject;
use crate::renderer::shader_data::{GpuCameraData, GpuObjectData, GpuSceneData};

/// Number of frames the CPU may record ahead of the GPU
pub const FRAME_OVERLAP: usize = 2;

pub fn frame_index(frame_count: u64) -> usize {
    (frame_count % FRAME_OVERLAP as u64) as usize
}

/// Lighting for the given frame. The ambient colour slowly cycles.
pub fn scene_data(frame_count: u64) -> GpuSceneData {
    let t = frame_count as f32 / 120.0;
    GpuSceneData {
        ambient_color: Vec4::new(t.sin(), 0.0, t.cos(), 1.0),
        sunlight_direction: Vec4::new(0.0, -1.0, 0.0, 1.0),
        sunlight_color: Vec4::ONE,
    }
}

/// Write the camera and scene blocks into their slice of the uniform ring
pub fn write_frame_uniforms<A: MemoryAllocator + ?Sized>(
    allocator: &A,
    buffer: &mut AllocatedBuffer,
    layout: &UniformLayout,
    frame_index: usize,
    camera: &GpuCameraData,
    scene: &GpuSceneData,
) -> Result<()> {
    allocator.upload_to_buffer(bytemuck::bytes_of(camera), buffer, layout.camera_offset(frame_index))?;
    allocator.upload_to_buffer(bytemuck::bytes_of(scene), buffer, layout.scene_offset(frame_index))?;
    Ok(())
}

/// Fill the object storage buffer, one element per render object in draw order.
/// Returns how many objects fit.
pub fn write_object_data<A: MemoryAllocator + ?Sized>(
    allocator: &A,
    buffer: &mut AllocatedBuffer,
    objects: &[RenderObject],
    max_objects: usize,
) -> Result<usize> {
    let count = objects.len().min(max_objects);
    if count < objects.len() {
        log::warn!("Drawing only {} of {} render objects", count, objects.len());
    }

    let data = objects[..count]
        .iter()
        .map(|object| GpuObjectData {
            model_matrix: object.transform,
            color: object.color,
        })
        .collect::<Vec<_>>();
    if !data.is_empty() {
        allocator.upload_to_buffer(bytemuck::cast_slice(&data), buffer, 0)?;
    }

    Ok(count)
}

/// Responsibilities:
/// - Manage per-frame command buffers
/// - Manage per-frame resources
/// - Manage synchronization between frames
pub struct RenderFrameContext {
    pub frames: Vec<Frame>,
    pub frame_count: u64,
    pub max_objects: usize,

    pub uniform_layout: UniformLayout,
    // Camera and scene data of every frame, addressed through dynamic offsets
    scene_buffer: Option<AllocatedBuffer>,
    pub global_set: vk::DescriptorSet,
}

impl RenderFrameContext {
    pub fn new(
        dev: &RenderDevice,
        res: &mut RenderResourceContext,
        max_objects: usize,
    ) -> Result<Self> {
        let uniform_layout = UniformLayout::new(
            dev.min_uniform_buffer_offset_alignment(),
            FRAME_OVERLAP,
        );

        let scene_buffer = dev.allocator.create_buffer(
            uniform_layout.buffer_size(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Scene Buffer",
        )?;

        let camera_info = vk::DescriptorBufferInfo {
            buffer: scene_buffer.buffer,
            offset: 0,
            range: size_of::<GpuCameraData>() as u64,
        };
        let scene_info = vk::DescriptorBufferInfo {
            buffer: scene_buffer.buffer,
            offset: 0,
            range: size_of::<GpuSceneData>() as u64,
        };
        let global_set = DescriptorBuilder::begin(&mut res.layout_cache, &mut res.descriptor_allocator)
            .bind_buffer(
                0,
                camera_info,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX,
            )
            .bind_buffer(
                1,
                scene_info,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )
            .build()
            .map(|(set, _)| set)
            .ok_or_eyre("Failed to allocate global descriptor set");
        let global_set = match global_set {
            Ok(set) => set,
            Err(e) => {
                dev.allocator.destroy_buffer(scene_buffer)?;
                return Err(e);
            }
        };

        let mut ctx = Self {
            frames: Vec::with_capacity(FRAME_OVERLAP),
            frame_count: 0,
            max_objects,
            uniform_layout,
            scene_buffer: Some(scene_buffer),
            global_set,
        };
        for i in 0..FRAME_OVERLAP {
            match Frame::new(i, dev, res, max_objects) {
                Ok(frame) => ctx.frames.push(frame),
                Err(e) => {
                    ctx.release(&mut res.deletion_queue);
                    return Err(e);
                }
            }
        }

        Ok(ctx)
    }

    pub fn current_index(&self) -> usize {
        frame_index(self.frame_count)
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.current_index()]
    }

    /// Update the uniform ring and the object buffer of the current frame.
    /// The frame's fence must have been waited on.
    pub fn write_frame_data(
        &mut self,
        allocator: &impl MemoryAllocator,
        camera: &GpuCameraData,
        objects: &[RenderObject],
    ) -> Result<usize> {
        let index = self.current_index();
        let scene = scene_data(self.frame_count);
        let scene_buffer = self
            .scene_buffer
            .as_mut()
            .ok_or_eyre("Frame context was already released")?;
        write_frame_uniforms(allocator, scene_buffer, &self.uniform_layout, index, camera, &scene)?;

        write_object_data(
            allocator,
            &mut self.frames[index].object_buffer,
            objects,
            self.max_objects,
        )
    }

    pub fn advance(&mut self) {
        self.frame_count += 1;
    }

    /// Hand all frame buffers to the deletion queue
    pub fn release(&mut self, deletion_queue: &mut DeletionQueue) {
        for frame in self.frames.drain(..) {
            frame.release(deletion_queue);
        }
        if let Some(scene_buffer) = self.scene_buffer.take() {
            deletion_queue.push(Deletion::Buffer(scene_buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use crate::renderer::resources::handle::Handle;
    use crate::renderer::testing::MockAllocator;

    #[test]
    fn frames_rotate_round_robin() {
        let indices = (0..6).map(frame_index).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn uniforms_land_in_the_frame_slice() {
        let allocator = MockAllocator::default();
        let layout = UniformLayout::new(256, FRAME_OVERLAP);
        let mut buffer = allocator
            .create_buffer(
                layout.buffer_size(),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "scene",
            )
            .unwrap();

        let camera = GpuCameraData {
            view: Mat4::from_scale(glam::Vec3::splat(2.0)),
            ..Default::default()
        };
        let scene = scene_data(0);
        write_frame_uniforms(&allocator, &mut buffer, &layout, 1, &camera, &scene).unwrap();

        let contents = allocator.buffers()[0].contents.clone();
        let camera_at = layout.camera_offset(1) as usize;
        let scene_at = layout.scene_offset(1) as usize;
        assert_eq!(
            &contents[camera_at..camera_at + size_of::<GpuCameraData>()],
            bytemuck::bytes_of(&camera),
        );
        assert_eq!(
            &contents[scene_at..scene_at + size_of::<GpuSceneData>()],
            bytemuck::bytes_of(&scene),
        );
        // Slice 0 was not touched
        assert!(contents[..layout.stride() as usize].iter().all(|b| *b == 0));

        allocator.destroy_buffer(buffer).unwrap();
    }

    #[test]
    fn object_data_is_clamped_to_capacity() {
        let allocator = MockAllocator::default();
        let max_objects = 2;
        let mut buffer = allocator
            .create_buffer(
                (max_objects * size_of::<GpuObjectData>()) as u64,
                vk::BufferUsageFlags::STORAGE_BUFFER,
                MemoryLocation::CpuToGpu,
                "objects",
            )
            .unwrap();

        let objects = (0..3)
            .map(|i| RenderObject {
                mesh: Handle::from_raw(1),
                material: Handle::from_raw(1),
                transform: Mat4::from_translation(glam::Vec3::X * i as f32),
                color: Vec4::ONE,
            })
            .collect::<Vec<_>>();

        let written = write_object_data(&allocator, &mut buffer, &objects, max_objects).unwrap();
        assert_eq!(written, 2);

        let contents = allocator.buffers()[0].contents.clone();
        let size = size_of::<GpuObjectData>();
        let second: GpuObjectData = bytemuck::pod_read_unaligned(&contents[size..2 * size]);
        assert_eq!(second.model_matrix, objects[1].transform);

        allocator.destroy_buffer(buffer).unwrap();
    }

    #[test]
    fn ambient_colour_starts_blue() {
        let scene = scene_data(0);
        assert_eq!(scene.ambient_color, Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(scene.sunlight_direction.w, 1.0);
    }
}
