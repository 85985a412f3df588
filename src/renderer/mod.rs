pub mod camera;
pub mod config;
pub mod contexts;
pub mod resources;
pub mod shader_data;
pub mod util;

mod draw;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use winit::window::Window;
use crate::assets::mesh_file::MeshData;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::RenderFrameContext;
use crate::renderer::contexts::pipeline_ctx::pipeline_builder::PipelineBuilder;
use crate::renderer::contexts::pipeline_ctx::shader::create_shader_module;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::deletion_queue::Deletion;
use crate::renderer::contexts::resource_ctx::descriptor_builder::DescriptorBuilder;
use crate::renderer::contexts::resource_ctx::resource_allocator::MemoryAllocator;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::resources::handle::Handle;
use crate::renderer::resources::image::create_image_view;
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::{upload_mesh, GpuMesh};
use crate::renderer::resources::render_object::{RenderObject, RenderObjectList};
use crate::renderer::resources::texture::{load_image_from_file, upload_texture, Texture};
use crate::renderer::resources::vertex::VertexInputDescription;
use crate::renderer::shader_data::MeshPushConstants;

pub struct Renderer {
    res: RenderResourceContext,
    frm: RenderFrameContext,
    pip: RenderPipelineContext,

    render_objects: RenderObjectList,
    config: RenderConfig,
    resize_requested: bool,

    // Dropped last: everything above was created from this device
    dev: RenderDeviceContext,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: RenderConfig,
    ) -> Result<Self> {
        let mut dev = RenderDeviceContext::new(Some(window), &config)?;
        let mut res = RenderResourceContext::new(&dev.device)?;

        let target = match dev.target.as_ref() {
            Some(target) => target,
            None => {
                destroy_contexts(&mut dev, &mut res, None, None);
                bail!("Renderer needs a presentation target");
            }
        };
        let mut pip = match RenderPipelineContext::new(&dev.device, &target.swapchain, &mut res.deletion_queue) {
            Ok(pip) => pip,
            Err(e) => {
                destroy_contexts(&mut dev, &mut res, None, None);
                return Err(e);
            }
        };
        let frm = match RenderFrameContext::new(&dev.device, &mut res, config.max_objects) {
            Ok(frm) => frm,
            Err(e) => {
                destroy_contexts(&mut dev, &mut res, Some(&mut pip), None);
                return Err(e);
            }
        };

        log::info!(
            "Renderer ready: {}x{} swapchain, {} frames in flight",
            target.swapchain.extent.width,
            target.swapchain.extent.height,
            frm.frames.len(),
        );

        Ok(Self {
            res,
            frm,
            pip,
            render_objects: RenderObjectList::new(),
            config,
            resize_requested: false,
            dev,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frm.frame_count
    }

    pub fn render_object_count(&self) -> usize {
        self.render_objects.len()
    }

    /// Size of the images being rendered to
    pub fn extent(&self) -> vk::Extent2D {
        self.dev.target
            .as_ref()
            .map(|target| target.swapchain.extent)
            .unwrap_or_default()
    }

    /// Load a mesh file from the model directory.
    /// An unreadable file gives the invalid handle.
    pub fn load_mesh(&mut self, name: &str, file: &str) -> Result<Handle<GpuMesh>> {
        let path = self.config.model_dir().join(file);
        let mesh = match MeshData::load(&path) {
            Ok(mesh) => mesh,
            Err(e) => {
                log::error!("Failed to load mesh {} from {}: {:?}", name, path.display(), e);
                return Ok(Handle::INVALID);
            }
        };
        self.register_mesh(name, &mesh)
    }

    pub fn register_mesh(&mut self, name: &str, mesh: &MeshData) -> Result<Handle<GpuMesh>> {
        let device = &self.dev.device;
        let gpu_mesh = upload_mesh(&*device.allocator, &*device.upload, mesh, name)?;
        log::debug!("Registered mesh {} ({} vertices)", name, gpu_mesh.vertex_count);
        Ok(self.res.meshes.insert_named(name, gpu_mesh))
    }

    /// Load an image from the texture directory.
    /// An unreadable file gives the invalid handle.
    pub fn load_texture(&mut self, name: &str, file: &str) -> Result<Handle<Texture>> {
        let path = self.config.texture_dir().join(file);
        match load_image_from_file(&path) {
            Some(pixels) => self.register_texture(name, pixels.width, pixels.height, &pixels.rgba),
            None => Ok(Handle::INVALID),
        }
    }

    pub fn register_texture(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<Handle<Texture>> {
        let device = &self.dev.device;
        let image = upload_texture(&*device.allocator, &*device.upload, width, height, rgba, name)?;
        let view = match create_image_view(
            &device.logical,
            image.image,
            image.format,
            image.aspect,
            image.mip_levels,
        ) {
            Ok(view) => view,
            Err(e) => {
                device.allocator.destroy_image(image)?;
                return Err(e);
            }
        };

        Ok(self.res.textures.insert_named(name, Texture { image, view }))
    }

    /// Build a pipeline from two shaders in the shader directory.
    /// A shader that cannot be loaded gives the invalid handle.
    pub fn load_material(
        &mut self,
        name: &str,
        vert_file: &str,
        frag_file: &str,
        vertex_description: &VertexInputDescription,
    ) -> Result<Handle<Material>> {
        let device = self.dev.device.logical.clone();
        let shader_dir = self.config.shader_dir();

        let vert = match create_shader_module(&shader_dir.join(vert_file), &device) {
            Ok(module) => module,
            Err(e) => {
                log::error!("Skipping material {}: {:?}", name, e);
                return Ok(Handle::INVALID);
            }
        };
        let frag = match create_shader_module(&shader_dir.join(frag_file), &device) {
            Ok(module) => module,
            Err(e) => {
                log::error!("Skipping material {}: {:?}", name, e);
                unsafe { device.destroy_shader_module(vert, None) };
                return Ok(Handle::INVALID);
            }
        };

        let pipeline = self.create_pipeline(vert, frag, vertex_description);
        unsafe {
            device.destroy_shader_module(vert, None);
            device.destroy_shader_module(frag, None);
        }
        let (pipeline, pipeline_layout) = pipeline?;

        log::debug!("Created material {}", name);
        Ok(self.res.materials.insert_named(name, Material::new(pipeline, pipeline_layout)))
    }

    fn create_pipeline(
        &mut self,
        vert: vk::ShaderModule,
        frag: vk::ShaderModule,
        vertex_description: &VertexInputDescription,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let device = &self.dev.device.logical;

        let set_layouts = [
            self.res.global_layout,
            self.res.object_layout,
            self.res.texture_layout,
        ];
        let push_constant_ranges = [
            vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: size_of::<MeshPushConstants>() as u32,
            },
        ];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };
        self.res.deletion_queue.push(Deletion::PipelineLayout(pipeline_layout));

        let pipeline = PipelineBuilder::new()
            .with_shader_stage(vk::ShaderStageFlags::VERTEX, vert)
            .with_shader_stage(vk::ShaderStageFlags::FRAGMENT, frag)
            .with_pipeline_layout(pipeline_layout)
            .with_vertex_input(vertex_description.clone())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::LESS_OR_EQUAL))
            .build(device, self.pip.render_pass)?;
        self.res.deletion_queue.push(Deletion::Pipeline(pipeline));

        Ok((pipeline, pipeline_layout))
    }

    /// New material sharing the pipeline of `material`, optionally sampling `texture`.
    /// An invalid texture handle gives an untextured instance.
    pub fn create_material_instance(
        &mut self,
        name: &str,
        material: Handle<Material>,
        texture: Handle<Texture>,
    ) -> Handle<Material> {
        let Some(base) = self.res.materials.get(material).copied() else {
            log::error!("Cannot create material instance {}: unknown material {:?}", name, material);
            return Handle::INVALID;
        };

        let texture_set = if texture.is_valid() {
            self.create_texture_set(name, texture)
        } else {
            None
        };

        self.res.materials.insert_named(name, base.instance(texture_set))
    }

    fn create_texture_set(&mut self, name: &str, texture: Handle<Texture>) -> Option<vk::DescriptorSet> {
        let Some(view) = self.res.textures.get(texture).map(|texture| texture.view) else {
            log::warn!("Material instance {} refers to unknown texture {:?}", name, texture);
            return None;
        };

        let image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let sampler_info = vk::DescriptorImageInfo {
            sampler: self.res.sampler,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        };
        let set = DescriptorBuilder::begin(&mut self.res.layout_cache, &mut self.res.descriptor_allocator)
            .bind_image(
                0,
                image_info,
                vk::DescriptorType::SAMPLED_IMAGE,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .bind_image(
                1,
                sampler_info,
                vk::DescriptorType::SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .build()
            .map(|(set, _)| set);
        if set.is_none() {
            log::warn!("Out of descriptor sets, material instance {} is untextured", name);
        }
        set
    }

    /// Queue an object for drawing. Objects whose mesh or material is unknown are skipped.
    pub fn add_render_object(&mut self, object: RenderObject) {
        if self.res.meshes.get(object.mesh).is_none() {
            log::warn!("Skipping render object: unknown mesh {:?}", object.mesh);
            return;
        }
        let Some(material) = self.res.materials.get(object.material) else {
            log::warn!("Skipping render object: unknown material {:?}", object.material);
            return;
        };

        self.render_objects.insert(object, material.pipeline);
    }

    /// Vertex input state a pipeline needs to draw `mesh`
    pub fn mesh_vertex_input(&self, mesh: Handle<GpuMesh>) -> Option<&VertexInputDescription> {
        self.res.meshes.get(mesh).map(|mesh| &mesh.vertex_input)
    }

    pub fn find_mesh(&self, name: &str) -> Handle<GpuMesh> {
        self.res.meshes.find(name)
    }

    pub fn find_texture(&self, name: &str) -> Handle<Texture> {
        self.res.textures.find(name)
    }

    pub fn find_material(&self, name: &str) -> Handle<Material> {
        self.res.materials.find(name)
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Rebuild the swapchain and everything sized after it.
    /// A minimized window keeps the request pending.
    pub fn resize(&mut self) -> Result<()> {
        let Some(target) = self.dev.target.as_mut() else {
            return Ok(());
        };

        let extent = target.window_extent();
        if extent.width == 0 || extent.height == 0 {
            self.resize_requested = true;
            return Ok(());
        }

        // Nothing in flight may still reference the old framebuffers
        self.dev.device.wait_idle()?;
        self.pip.destroy_swapchain_resources(&self.dev.device)?;
        target.recreate_swapchain(&self.dev.instance, &self.dev.device)?;
        self.pip.create_swapchain_resources(&self.dev.device, &target.swapchain)?;

        log::debug!(
            "Resized to {}x{}",
            target.swapchain.extent.width,
            target.swapchain.extent.height,
        );
        self.resize_requested = false;

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        destroy_contexts(&mut self.dev, &mut self.res, Some(&mut self.pip), Some(&mut self.frm));
    }
}

/// Release everything created from the device, newest first.
/// Runs on shutdown and when construction fails part way.
fn destroy_contexts(
    dev: &mut RenderDeviceContext,
    res: &mut RenderResourceContext,
    pip: Option<&mut RenderPipelineContext>,
    frm: Option<&mut RenderFrameContext>,
) {
    if let Err(e) = dev.device.wait_idle() {
        log::error!("Failed to wait for device idle on shutdown: {:?}", e);
    }
    if let Some(pip) = pip {
        if let Err(e) = pip.destroy_swapchain_resources(&dev.device) {
            log::error!("Failed to destroy swapchain resources: {:?}", e);
        }
    }

    res.release_resources();
    if let Some(frm) = frm {
        frm.release(&mut res.deletion_queue);
    }
    res.deletion_queue.flush(&mut dev.device);
    res.cleanup();
}
