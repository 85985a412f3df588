use ash::vk;
use color_eyre::Result;
use gpu_descriptor::{CreatePoolError, DescriptorTotalCount, DeviceAllocationError};
use crate::renderer::contexts::device_ctx::device::AshDevice;

/// Sets every pool can hold
const POOL_MAX_SETS: u32 = 1000;

/// Descriptors of each type per pool, relative to [`POOL_MAX_SETS`]
const POOL_SIZE_RATIOS: &[(vk::DescriptorType, f32)] = &[
    (vk::DescriptorType::SAMPLER, 0.5),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (vk::DescriptorType::SAMPLED_IMAGE, 4.0),
    (vk::DescriptorType::STORAGE_IMAGE, 1.0),
    (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::STORAGE_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
    (vk::DescriptorType::STORAGE_BUFFER, 2.0),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::INPUT_ATTACHMENT, 0.5),
];

/// Descriptor counts of a freshly created pool
pub fn pool_descriptor_count() -> DescriptorTotalCount {
    let count_of = |ty: vk::DescriptorType| {
        POOL_SIZE_RATIOS
            .iter()
            .find(|(t, _)| *t == ty)
            .map_or(0, |(_, ratio)| (ratio * POOL_MAX_SETS as f32) as u32)
    };

    DescriptorTotalCount {
        sampler: count_of(vk::DescriptorType::SAMPLER),
        combined_image_sampler: count_of(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        sampled_image: count_of(vk::DescriptorType::SAMPLED_IMAGE),
        storage_image: count_of(vk::DescriptorType::STORAGE_IMAGE),
        uniform_texel_buffer: count_of(vk::DescriptorType::UNIFORM_TEXEL_BUFFER),
        storage_texel_buffer: count_of(vk::DescriptorType::STORAGE_TEXEL_BUFFER),
        uniform_buffer: count_of(vk::DescriptorType::UNIFORM_BUFFER),
        storage_buffer: count_of(vk::DescriptorType::STORAGE_BUFFER),
        uniform_buffer_dynamic: count_of(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
        storage_buffer_dynamic: count_of(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC),
        input_attachment: count_of(vk::DescriptorType::INPUT_ATTACHMENT),
        acceleration_structure: 0,
        inline_uniform_block_bytes: 0,
        inline_uniform_block_bindings: 0,
    }
}

/// Device operations the descriptor allocator needs
pub trait DescriptorPoolDevice {
    fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
    ) -> Result<vk::DescriptorPool, CreatePoolError>;

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceAllocationError>;
}

/// Hands out descriptor sets from a growing list of pools.
///
/// Every pool is in exactly one place: the free list, the used list,
/// or `current_pool`. Pools are only destroyed by [`DescriptorAllocator::cleanup`].
pub struct DescriptorAllocator<D: DescriptorPoolDevice> {
    device: D,
    current_pool: Option<vk::DescriptorPool>,
    used_pools: Vec<vk::DescriptorPool>,
    free_pools: Vec<vk::DescriptorPool>,
}

impl<D: DescriptorPoolDevice> DescriptorAllocator<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            current_pool: None,
            used_pools: Vec::new(),
            free_pools: Vec::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Allocate one set. A full or fragmented pool is swapped for a fresh one
    /// and the allocation retried once; anything else yields `None`.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        let pool = match self.current_pool {
            Some(pool) => pool,
            None => self.grab_pool()?,
        };

        match self.device.allocate_descriptor_set(pool, layout) {
            Ok(set) => return Some(set),
            Err(DeviceAllocationError::FragmentedPool)
            | Err(DeviceAllocationError::OutOfPoolMemory) => {
                log::debug!("Descriptor pool {:?} exhausted, switching pools", pool);
            }
            Err(e) => {
                log::error!("Failed to allocate descriptor set: {:?}", e);
                return None;
            }
        }

        let pool = self.grab_pool()?;
        match self.device.allocate_descriptor_set(pool, layout) {
            Ok(set) => Some(set),
            Err(e) => {
                log::error!("Failed to allocate descriptor set from a fresh pool: {:?}", e);
                None
            }
        }
    }

    /// Recycle every pool. Sets allocated before this call become invalid.
    /// A pool that fails to reset stays in the used list and the first failure is returned.
    pub fn reset_pools(&mut self) -> Result<()> {
        if let Some(pool) = self.current_pool.take() {
            self.used_pools.push(pool);
        }

        let mut first_error = None;
        let mut failed = Vec::new();
        for pool in std::mem::take(&mut self.used_pools) {
            match self.device.reset_descriptor_pool(pool) {
                Ok(()) => self.free_pools.push(pool),
                Err(e) => {
                    log::error!("Failed to reset descriptor pool {:?}: {:?}", pool, e);
                    failed.push(pool);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.used_pools = failed;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Destroy every pool, wherever it currently sits
    pub fn cleanup(&mut self) {
        let pools = self.free_pools
            .drain(..)
            .chain(self.used_pools.drain(..))
            .chain(self.current_pool.take());
        for pool in pools {
            self.device.destroy_descriptor_pool(pool);
        }
    }

    pub fn free_pool_count(&self) -> usize {
        self.free_pools.len()
    }

    pub fn used_pool_count(&self) -> usize {
        self.used_pools.len()
    }

    pub fn has_current_pool(&self) -> bool {
        self.current_pool.is_some()
    }

    /// Retire the current pool and make another one current,
    /// preferring the most recently freed pool over a new one
    fn grab_pool(&mut self) -> Option<vk::DescriptorPool> {
        if let Some(pool) = self.current_pool.take() {
            self.used_pools.push(pool);
        }

        let pool = match self.free_pools.pop() {
            Some(pool) => pool,
            None => match self.device.create_descriptor_pool(&pool_descriptor_count(), POOL_MAX_SETS) {
                Ok(pool) => pool,
                Err(e) => {
                    log::error!("Failed to create descriptor pool: {:?}", e);
                    return None;
                }
            },
        };

        self.current_pool = Some(pool);
        Some(pool)
    }
}

impl DescriptorPoolDevice for AshDevice {
    fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let counts = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count.combined_image_sampler),
            (vk::DescriptorType::SAMPLED_IMAGE, descriptor_count.sampled_image),
            (vk::DescriptorType::STORAGE_IMAGE, descriptor_count.storage_image),
            (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, descriptor_count.uniform_texel_buffer),
            (vk::DescriptorType::STORAGE_TEXEL_BUFFER, descriptor_count.storage_texel_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER, descriptor_count.uniform_buffer),
            (vk::DescriptorType::STORAGE_BUFFER, descriptor_count.storage_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count.uniform_buffer_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count.storage_buffer_dynamic),
            (vk::DescriptorType::INPUT_ATTACHMENT, descriptor_count.input_attachment),
        ];
        let pool_sizes: smallvec::SmallVec<[vk::DescriptorPoolSize; 11]> = counts
            .iter()
            .filter(|(_, count)| *count != 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect();

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::empty());

        match unsafe { self.0.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(CreatePoolError::OutOfDeviceMemory),
            // Every other code the driver may return counts as host memory exhaustion
            Err(_) => Err(CreatePoolError::OutOfHostMemory),
        }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
        unsafe {
            self.0.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.0.destroy_descriptor_pool(pool, None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DeviceAllocationError> {
        let set_layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);

        match unsafe { self.0.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(DeviceAllocationError::OutOfDeviceMemory),
            Err(_) => Err(DeviceAllocationError::OutOfHostMemory),
        }
    }
}
