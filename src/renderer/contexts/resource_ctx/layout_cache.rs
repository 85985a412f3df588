use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::AshDevice;

/// One slot of a descriptor set layout. Always a single descriptor per
/// binding unless `count` says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl LayoutBinding {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            count: 1,
            stage_flags,
        }
    }

    fn sort_key(&self) -> (u32, i32, u32, u32) {
        (
            self.binding,
            self.descriptor_type.as_raw(),
            self.count,
            self.stage_flags.as_raw(),
        )
    }
}

/// Binding list in canonical order, used as the cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLayoutInfo {
    bindings: Vec<LayoutBinding>,
}

impl DescriptorLayoutInfo {
    pub fn new(bindings: &[LayoutBinding]) -> Self {
        let mut bindings = bindings.to_vec();
        bindings.sort_by_key(LayoutBinding::sort_key);
        Self { bindings }
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn structural_hash(&self) -> u64 {
        self.bindings.iter().fold(self.bindings.len() as u64, |hash, b| {
            let packed = b.binding as u64
                | (b.descriptor_type.as_raw() as u64) << 8
                | (b.count as u64) << 16
                | (b.stage_flags.as_raw() as u64) << 24;
            hash ^ packed
        })
    }
}

impl Hash for DescriptorLayoutInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

pub trait LayoutDevice {
    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> Result<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
}

/// Deduplicates descriptor set layouts. Structurally identical binding
/// lists map to one native layout no matter the order they were given in.
pub struct DescriptorLayoutCache<D: LayoutDevice> {
    device: D,
    layouts: HashMap<DescriptorLayoutInfo, vk::DescriptorSetLayout>,
}

impl<D: LayoutDevice> DescriptorLayoutCache<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            layouts: HashMap::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn get_layout(&mut self, bindings: &[LayoutBinding]) -> Result<vk::DescriptorSetLayout> {
        let info = DescriptorLayoutInfo::new(bindings);
        if let Some(layout) = self.layouts.get(&info) {
            return Ok(*layout);
        }

        let layout = self.device.create_descriptor_set_layout(info.bindings())?;
        self.layouts.insert(info, layout);
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn cleanup(&mut self) {
        for (_, layout) in self.layouts.drain() {
            self.device.destroy_descriptor_set_layout(layout);
        }
    }
}

impl LayoutDevice for AshDevice {
    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        let bindings = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stage_flags)
            })
            .collect::<Vec<_>>();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings);

        Ok(unsafe {
            self.0.create_descriptor_set_layout(&layout_info, None)?
        })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe {
            self.0.destroy_descriptor_set_layout(layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::MockLayoutDevice;

    fn bindings() -> [LayoutBinding; 3] {
        [
            LayoutBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::VERTEX),
            LayoutBinding::new(
                1,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ),
            LayoutBinding::new(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]
    }

    fn permutations(items: &[LayoutBinding]) -> Vec<Vec<LayoutBinding>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first);
                result.push(tail);
            }
        }
        result
    }

    #[test]
    fn every_ordering_maps_to_one_layout() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let orderings = permutations(&bindings());
        assert_eq!(orderings.len(), 6);

        let first = cache.get_layout(&orderings[0]).unwrap();
        for ordering in &orderings[1..] {
            assert_eq!(cache.get_layout(ordering).unwrap(), first);
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.device().created(), 1);
    }

    #[test]
    fn created_layout_sees_sorted_bindings() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let mut reversed = bindings();
        reversed.reverse();

        cache.get_layout(&reversed).unwrap();

        let seen = cache.device().last_bindings();
        assert_eq!(seen.iter().map(|b| b.binding).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn differing_stage_flags_are_distinct_layouts() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        let vertex = [LayoutBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)];
        let fragment = [LayoutBinding::new(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::FRAGMENT)];

        let a = cache.get_layout(&vertex).unwrap();
        let b = cache.get_layout(&fragment).unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn hash_ignores_input_order() {
        let mut reversed = bindings();
        reversed.reverse();
        assert_eq!(
            DescriptorLayoutInfo::new(&bindings()).structural_hash(),
            DescriptorLayoutInfo::new(&reversed).structural_hash(),
        );
    }

    #[test]
    fn cleanup_destroys_every_layout() {
        let mut cache = DescriptorLayoutCache::new(MockLayoutDevice::default());
        cache.get_layout(&bindings()).unwrap();
        cache.get_layout(&bindings()[..1]).unwrap();

        cache.cleanup();

        assert!(cache.is_empty());
        assert_eq!(cache.device().destroyed(), 2);
    }
}
