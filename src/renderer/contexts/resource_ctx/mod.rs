pub mod deletion_queue;
pub mod descriptor_allocator;
pub mod descriptor_builder;
pub mod layout_cache;
pub mod resource_allocator;

use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::{AshDevice, RenderDevice};
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::descriptor_allocator::DescriptorAllocator;
use crate::renderer::contexts::resource_ctx::layout_cache::{DescriptorLayoutCache, LayoutBinding, LayoutDevice};
use crate::renderer::resources::handle::ResourceMap;
use crate::renderer::resources::image::create_sampler;
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::GpuMesh;
use crate::renderer::resources::texture::Texture;

/// Set 0: camera and scene blocks, both read through dynamic offsets
pub fn global_bindings() -> [LayoutBinding; 2] {
    [
        LayoutBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::VERTEX),
        LayoutBinding::new(
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ),
    ]
}

/// Set 1: per-frame object storage buffer
pub fn object_bindings() -> [LayoutBinding; 1] {
    [LayoutBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)]
}

/// Set 2: material texture and its sampler
pub fn texture_bindings() -> [LayoutBinding; 2] {
    [
        LayoutBinding::new(0, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT),
        LayoutBinding::new(1, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT),
    ]
}

/// Global, object and texture layouts, in set order.
/// If one cannot be created the cache is emptied again.
pub fn create_set_layouts<D: LayoutDevice>(
    layout_cache: &mut DescriptorLayoutCache<D>,
) -> Result<[vk::DescriptorSetLayout; 3]> {
    let global = global_bindings();
    let object = object_bindings();
    let texture = texture_bindings();

    let mut layouts = [vk::DescriptorSetLayout::null(); 3];
    for (layout, bindings) in layouts.iter_mut().zip([&global[..], &object[..], &texture[..]]) {
        match layout_cache.get_layout(bindings) {
            Ok(created) => *layout = created,
            Err(e) => {
                layout_cache.cleanup();
                return Err(e);
            }
        }
    }
    Ok(layouts)
}

/// Responsibilities:
/// - Allocate descriptor sets and cache their layouts
/// - Store meshes, textures and materials behind handles
/// - Track objects to release at shutdown
pub struct RenderResourceContext {
    pub descriptor_allocator: DescriptorAllocator<AshDevice>,
    pub layout_cache: DescriptorLayoutCache<AshDevice>,
    pub deletion_queue: DeletionQueue,

    pub global_layout: vk::DescriptorSetLayout,
    pub object_layout: vk::DescriptorSetLayout,
    pub texture_layout: vk::DescriptorSetLayout,
    pub sampler: vk::Sampler,

    pub meshes: ResourceMap<GpuMesh>,
    pub textures: ResourceMap<Texture>,
    pub materials: ResourceMap<Material>,
}

impl RenderResourceContext {
    pub fn new(dev: &RenderDevice) -> Result<Self> {
        let descriptor_allocator = DescriptorAllocator::new(dev.ash());
        let mut layout_cache = DescriptorLayoutCache::new(dev.ash());
        let mut deletion_queue = DeletionQueue::new();

        let [global_layout, object_layout, texture_layout] = create_set_layouts(&mut layout_cache)?;
        let sampler = match create_sampler(&dev.logical) {
            Ok(sampler) => sampler,
            Err(e) => {
                layout_cache.cleanup();
                return Err(e);
            }
        };
        deletion_queue.push(Deletion::Sampler(sampler));

        Ok(Self {
            descriptor_allocator,
            layout_cache,
            deletion_queue,
            global_layout,
            object_layout,
            texture_layout,
            sampler,
            meshes: ResourceMap::new(),
            textures: ResourceMap::new(),
            materials: ResourceMap::new(),
        })
    }

    /// Queue every mesh and texture for destruction. Material pipelines
    /// were queued when they were created.
    pub fn release_resources(&mut self) {
        for mesh in self.meshes.drain() {
            mesh.release(&mut self.deletion_queue);
        }
        for texture in self.textures.drain() {
            texture.release(&mut self.deletion_queue);
        }
    }

    /// Destroy all descriptor pools and layouts
    pub fn cleanup(&mut self) {
        self.descriptor_allocator.cleanup();
        self.layout_cache.cleanup();
    }
}
