use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::camera::Camera;
use crate::renderer::contexts::device_ctx::command_encoder::{CommandEncoder, CommandRecorder};
use crate::renderer::contexts::device_ctx::transition::transition_image_layout;
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, MemoryAllocator};
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::GpuMesh;
use crate::renderer::resources::render_object::DrawStep;
use crate::renderer::shader_data::MeshPushConstants;
use crate::renderer::Renderer;

/// What the frame copies out of the swapchain image after rendering
struct Readback<'a> {
    buffer: &'a AllocatedBuffer,
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Renderer {
    pub fn draw(&mut self, camera: &Camera) -> Result<()> {
        self.render_frame(camera, None).map(|_| ())
    }

    /// Render a frame and copy the presented image into `dst`.
    /// Returns how many bytes were written, zero if no frame was rendered.
    pub fn draw_to_buffer(&mut self, camera: &Camera, dst: &mut [u8]) -> Result<usize> {
        self.render_frame(camera, Some(dst))
    }

    fn render_frame(&mut self, camera: &Camera, dst: Option<&mut [u8]>) -> Result<usize> {
        if self.resize_requested {
            self.resize()?;
            if self.resize_requested {
                // Window is minimized
                return Ok(0);
            }
        }

        let Some(target) = self.dev.target.as_ref() else {
            return Ok(0);
        };
        let device = self.dev.device.logical.clone();
        let frame_timeout = self.config.frame_fence_timeout.as_nanos() as u64;

        let (render_fence, present_semaphore, render_semaphore, command_buffer) = {
            let frame = self.frm.current();
            (frame.render_fence, frame.present_semaphore, frame.render_semaphore, frame.command_buffer)
        };

        // At most FRAME_OVERLAP frames are in flight
        if let Err(e) = self.dev.device.ash().wait_for_fence_with_timeout(render_fence, frame_timeout) {
            let e = e.wrap_err(format!("Frame {} did not complete", self.frm.frame_count));
            log::error!("{:?}", e);
            return Err(e);
        }

        let acquired = unsafe {
            target.swapchain.swapchain_loader.acquire_next_image(
                target.swapchain.swapchain,
                frame_timeout,
                present_semaphore,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            // A suboptimal swapchain still presents, it is rebuilt after this frame
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.resize_requested = true;
                }
                image_index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resize_requested = true;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        // Only reset once work is certain to be submitted, or the next wait would hang
        unsafe {
            device.reset_fences(&[render_fence])?;
        }

        let aspect_ratio = target.swapchain.extent.width as f32 / target.swapchain.extent.height as f32;
        let object_count = self.frm.write_frame_data(
            &*self.dev.device.allocator,
            &camera.camera_data(aspect_ratio),
            self.render_objects.as_slice(),
        )?;

        let extent = target.swapchain.extent;
        let readback_buffer = match dst {
            Some(_) => Some(self.dev.device.allocator.create_buffer(
                extent.width as u64 * extent.height as u64 * 4,
                vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuToCpu,
                "Readback Buffer",
            )?),
            None => None,
        };
        let readback = readback_buffer.as_ref().map(|buffer| Readback {
            buffer,
            image: target.swapchain.images[image_index as usize],
            format: target.swapchain.format,
            extent,
        });

        let submitted = self
            .record_frame(command_buffer, image_index, object_count, readback)
            .and_then(|()| {
                let wait_semaphores = [present_semaphore];
                let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
                let command_buffers = [command_buffer];
                let signal_semaphores = [render_semaphore];
                let submit_info = vk::SubmitInfo::default()
                    .wait_semaphores(&wait_semaphores)
                    .wait_dst_stage_mask(&wait_stages)
                    .command_buffers(&command_buffers)
                    .signal_semaphores(&signal_semaphores);
                unsafe {
                    device.queue_submit(
                        self.dev.device.graphics_queue.handle,
                        &[submit_info],
                        render_fence,
                    )?;
                }
                Ok(())
            });
        if let Err(e) = submitted {
            if let Some(buffer) = readback_buffer {
                self.dev.device.allocator.destroy_buffer(buffer)?;
            }
            return Err(e);
        }

        let swapchains = [target.swapchain.swapchain];
        let wait_semaphores = [render_semaphore];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);
        let presented = unsafe {
            target.swapchain.swapchain_loader.queue_present(
                self.dev.device.graphics_queue.handle,
                &present_info,
            )
        };
        match presented {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.resize_requested = true,
            Err(e) => {
                if let Some(buffer) = readback_buffer {
                    self.dev.device.allocator.destroy_buffer(buffer)?;
                }
                return Err(e.into());
            }
        }
        if target.window_extent() != target.swapchain.extent {
            self.resize_requested = true;
        }

        self.frm.advance();

        let mut written = 0;
        if let (Some(buffer), Some(dst)) = (readback_buffer, dst) {
            let copied = self.dev.device
                .ash()
                .wait_for_fence_with_timeout(render_fence, frame_timeout)
                .and_then(|()| self.dev.device.allocator.read_from_buffer(&buffer, dst));
            self.dev.device.allocator.destroy_buffer(buffer)?;
            written = copied?;
        }

        Ok(written)
    }

    /// Record the render pass for every render object, plus the optional readback copy
    fn record_frame(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        object_count: usize,
        readback: Option<Readback<'_>>,
    ) -> Result<()> {
        let device = &self.dev.device.logical;
        let target = self.dev.target
            .as_ref()
            .ok_or_eyre("No presentation target to record for")?;
        let extent = target.swapchain.extent;
        let framebuffer = *self.pip.framebuffers
            .get(image_index as usize)
            .ok_or_eyre("Swapchain image has no framebuffer")?;

        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
        }
        let mut encoder = CommandEncoder::begin_one_time(command_buffer, device)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.pip.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(
                command_buffer,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        }

        self.draw_objects(command_buffer, object_count);

        unsafe {
            device.cmd_end_render_pass(command_buffer);
        }

        if let Some(readback) = readback {
            record_readback(&mut encoder, &readback)?;
        }

        encoder.end()
    }

    fn draw_objects(&self, command_buffer: vk::CommandBuffer, object_count: usize) {
        let device = &self.dev.device.logical;
        let frame = self.frm.current();
        let dynamic_offsets = self.frm.uniform_layout.dynamic_offsets(self.frm.current_index());
        let objects = self.render_objects.as_slice();

        let mut material: Option<&Material> = None;
        let mut mesh: Option<&GpuMesh> = None;

        for step in self.render_objects.draw_steps() {
            match step {
                DrawStep::BindMaterial(handle) => {
                    material = self.res.materials.get(handle);
                    if let Some(material) = material {
                        material.bind_pipeline(device, command_buffer);
                        material.bind_descriptor_sets(device, command_buffer, 0, &[self.frm.global_set], &dynamic_offsets);
                        material.bind_descriptor_sets(device, command_buffer, 1, &[frame.object_set], &[]);
                        if let Some(texture_set) = material.texture_set {
                            material.bind_descriptor_sets(device, command_buffer, 2, &[texture_set], &[]);
                        }
                    }
                }
                DrawStep::BindMesh(handle) => {
                    mesh = self.res.meshes.get(handle);
                    if let Some(mesh) = mesh {
                        unsafe {
                            device.cmd_bind_vertex_buffers(command_buffer, 0, &[mesh.vertex_buffer.buffer], &[0]);
                            if let Some(index_buffer) = &mesh.index_buffer {
                                device.cmd_bind_index_buffer(command_buffer, index_buffer.buffer, 0, vk::IndexType::UINT32);
                            }
                        }
                    }
                }
                DrawStep::Draw(i) => {
                    if i >= object_count {
                        continue;
                    }
                    let (Some(material), Some(mesh)) = (material, mesh) else {
                        continue;
                    };

                    let push_constants = MeshPushConstants {
                        render_matrix: objects[i].transform,
                    };
                    material.update_push_constants(
                        device,
                        command_buffer,
                        vk::ShaderStageFlags::VERTEX,
                        bytemuck::bytes_of(&push_constants),
                    );

                    // First instance indexes the object storage buffer
                    unsafe {
                        if mesh.index_buffer.is_some() {
                            device.cmd_draw_indexed(command_buffer, mesh.index_count, 1, 0, 0, i as u32);
                        } else {
                            device.cmd_draw(command_buffer, mesh.vertex_count, 1, 0, i as u32);
                        }
                    }
                }
            }
        }
    }
}

/// Copy a presentable image into a host-readable buffer and hand it back to presentation
fn record_readback(recorder: &mut dyn CommandRecorder, readback: &Readback<'_>) -> Result<()> {
    transition_image_layout(
        recorder,
        readback.image,
        readback.format,
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        1,
    )?;

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D {
            width: readback.extent.width,
            height: readback.extent.height,
            depth: 1,
        });
    recorder.copy_image_to_buffer(
        readback.image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        readback.buffer.buffer,
        &[region],
    );

    transition_image_layout(
        recorder,
        readback.image,
        readback.format,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        1,
    )
}
