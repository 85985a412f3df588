use ash::vk;
use crate::renderer::contexts::device_ctx::device::AshDevice;
use crate::renderer::contexts::resource_ctx::descriptor_allocator::{DescriptorAllocator, DescriptorPoolDevice};
use crate::renderer::contexts::resource_ctx::layout_cache::{DescriptorLayoutCache, LayoutBinding, LayoutDevice};

#[derive(Debug, Clone, Copy)]
pub enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// A single descriptor update for a freshly allocated set
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: DescriptorInfo,
}

pub trait DescriptorWriter {
    fn write_descriptors(&self, writes: &[DescriptorWrite]);
}

/// Builds a descriptor set together with its layout, going through the
/// layout cache and the descriptor allocator
pub struct DescriptorBuilder<'a, L, A>
where
    L: LayoutDevice,
    A: DescriptorPoolDevice + DescriptorWriter,
{
    cache: &'a mut DescriptorLayoutCache<L>,
    allocator: &'a mut DescriptorAllocator<A>,
    bindings: Vec<LayoutBinding>,
    infos: Vec<(u32, vk::DescriptorType, DescriptorInfo)>,
}

impl<'a, L, A> DescriptorBuilder<'a, L, A>
where
    L: LayoutDevice,
    A: DescriptorPoolDevice + DescriptorWriter,
{
    pub fn begin(
        cache: &'a mut DescriptorLayoutCache<L>,
        allocator: &'a mut DescriptorAllocator<A>,
    ) -> Self {
        Self {
            cache,
            allocator,
            bindings: Vec::new(),
            infos: Vec::new(),
        }
    }

    pub fn bind_buffer(
        mut self,
        binding: u32,
        buffer_info: vk::DescriptorBufferInfo,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(LayoutBinding::new(binding, descriptor_type, stage_flags));
        self.infos.push((binding, descriptor_type, DescriptorInfo::Buffer(buffer_info)));
        self
    }

    pub fn bind_image(
        mut self,
        binding: u32,
        image_info: vk::DescriptorImageInfo,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(LayoutBinding::new(binding, descriptor_type, stage_flags));
        self.infos.push((binding, descriptor_type, DescriptorInfo::Image(image_info)));
        self
    }

    /// `None` when the layout cannot be created or no set can be allocated
    pub fn build(self) -> Option<(vk::DescriptorSet, vk::DescriptorSetLayout)> {
        let layout = match self.cache.get_layout(&self.bindings) {
            Ok(layout) => layout,
            Err(e) => {
                log::error!("Failed to create descriptor set layout: {:?}", e);
                return None;
            }
        };

        let set = self.allocator.allocate(layout)?;

        let writes = self.infos
            .iter()
            .map(|(binding, descriptor_type, info)| DescriptorWrite {
                set,
                binding: *binding,
                descriptor_type: *descriptor_type,
                info: *info,
            })
            .collect::<Vec<_>>();
        self.allocator.device().write_descriptors(&writes);

        Some((set, layout))
    }
}

impl DescriptorWriter for AshDevice {
    fn write_descriptors(&self, writes: &[DescriptorWrite]) {
        let vk_writes = writes
            .iter()
            .map(|write| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.descriptor_type);
                match &write.info {
                    DescriptorInfo::Buffer(buffer_info) => {
                        vk_write.buffer_info(std::slice::from_ref(buffer_info))
                    }
                    DescriptorInfo::Image(image_info) => {
                        vk_write.image_info(std::slice::from_ref(image_info))
                    }
                }
            })
            .collect::<Vec<_>>();

        unsafe {
            self.0.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::{MockDescriptorDevice, MockLayoutDevice};
    use ash::vk::Handle;

    #[test]
    fn build_allocates_and_writes_every_binding() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let mut allocator = DescriptorAllocator::new(MockDescriptorDevice::new(8));

        let buffer_info = vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(5),
            offset: 0,
            range: 64,
        };
        let image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: vk::ImageView::from_raw(6),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };

        let (set, layout) = DescriptorBuilder::begin(&mut cache, &mut allocator)
            .bind_buffer(0, buffer_info, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
            .bind_image(1, image_info, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT)
            .build()
            .unwrap();

        assert_ne!(layout, vk::DescriptorSetLayout::null());
        let writes = allocator.device().writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| w.set == set));
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
    }

    #[test]
    fn identical_bindings_reuse_the_cached_layout() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let mut allocator = DescriptorAllocator::new(MockDescriptorDevice::new(8));
        let buffer_info = vk::DescriptorBufferInfo::default();

        let (set_a, layout_a) = DescriptorBuilder::begin(&mut cache, &mut allocator)
            .bind_buffer(0, buffer_info, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)
            .build()
            .unwrap();
        let (set_b, layout_b) = DescriptorBuilder::begin(&mut cache, &mut allocator)
            .bind_buffer(0, buffer_info, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)
            .build()
            .unwrap();

        assert_eq!(layout_a, layout_b);
        assert_ne!(set_a, set_b);
    }

    #[test]
    fn exhausted_allocator_yields_nothing() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let mut allocator = DescriptorAllocator::new(MockDescriptorDevice::new(0));

        let built = DescriptorBuilder::begin(&mut cache, &mut allocator)
            .bind_buffer(
                0,
                vk::DescriptorBufferInfo::default(),
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .build();

        assert!(built.is_none());
        assert!(allocator.device().writes().is_empty());
    }
}
