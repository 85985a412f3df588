use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, AllocatedImage};

/// A GPU object waiting to be released
pub enum Deletion {
    Buffer(AllocatedBuffer),
    Image(AllocatedImage),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    RenderPass(vk::RenderPass),
    ShaderModule(vk::ShaderModule),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
    CommandPool(vk::CommandPool),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
}

impl Deletion {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Sampler(_) => "sampler",
            Self::Framebuffer(_) => "framebuffer",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::RenderPass(_) => "render pass",
            Self::ShaderModule(_) => "shader module",
            Self::Semaphore(_) => "semaphore",
            Self::Fence(_) => "fence",
            Self::CommandPool(_) => "command pool",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
        }
    }
}

/// Knows how to release each kind of [`Deletion`]
pub trait ResourceDestroyer {
    fn destroy(&mut self, deletion: Deletion) -> Result<()>;
}

/// Deferred teardown of objects that live as long as the renderer.
/// Objects are released in reverse order of registration, so anything
/// created on top of another object goes away before it.
#[derive(Default)]
pub struct DeletionQueue {
    deletions: Vec<Deletion>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, deletion: Deletion) {
        self.deletions.push(deletion);
    }

    /// Release everything, newest first. A failed release is logged and
    /// teardown carries on with the rest.
    pub fn flush(&mut self, destroyer: &mut impl ResourceDestroyer) {
        while let Some(deletion) = self.deletions.pop() {
            let kind = deletion.kind();
            if let Err(e) = destroyer.destroy(deletion) {
                log::error!("Failed to destroy {}: {:?}", kind, e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Default)]
    struct RecordingDestroyer {
        destroyed: Vec<(&'static str, u64)>,
    }

    impl ResourceDestroyer for RecordingDestroyer {
        fn destroy(&mut self, deletion: Deletion) -> Result<()> {
            let raw = match &deletion {
                Deletion::Sampler(s) => s.as_raw(),
                Deletion::Fence(f) => f.as_raw(),
                Deletion::Semaphore(s) => s.as_raw(),
                Deletion::Pipeline(p) => p.as_raw(),
                _ => 0,
            };
            self.destroyed.push((deletion.kind(), raw));
            Ok(())
        }
    }

    #[test]
    fn flush_runs_newest_first() {
        let mut queue = DeletionQueue::new();
        queue.push(Deletion::Fence(vk::Fence::from_raw(1)));
        queue.push(Deletion::Semaphore(vk::Semaphore::from_raw(2)));
        queue.push(Deletion::Sampler(vk::Sampler::from_raw(3)));

        let mut destroyer = RecordingDestroyer::default();
        queue.flush(&mut destroyer);

        assert_eq!(
            destroyer.destroyed,
            vec![("sampler", 3), ("semaphore", 2), ("fence", 1)],
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn second_flush_is_a_no_op() {
        let mut queue = DeletionQueue::new();
        queue.push(Deletion::Pipeline(vk::Pipeline::from_raw(7)));

        let mut destroyer = RecordingDestroyer::default();
        queue.flush(&mut destroyer);
        queue.flush(&mut destroyer);

        assert_eq!(destroyer.destroyed.len(), 1);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn failed_release_does_not_stop_teardown() {
        struct FailingOnFence(Vec<&'static str>);

        impl ResourceDestroyer for FailingOnFence {
            fn destroy(&mut self, deletion: Deletion) -> Result<()> {
                self.0.push(deletion.kind());
                match deletion {
                    Deletion::Fence(_) => Err(color_eyre::eyre::eyre!("lost")),
                    _ => Ok(()),
                }
            }
        }

        let mut queue = DeletionQueue::new();
        queue.push(Deletion::Sampler(vk::Sampler::from_raw(1)));
        queue.push(Deletion::Fence(vk::Fence::from_raw(2)));

        let mut destroyer = FailingOnFence(Vec::new());
        queue.flush(&mut destroyer);

        assert_eq!(destroyer.0, vec!["fence", "sampler"]);
    }
}
