use crate::renderer::shader_data::{GpuCameraData, GpuSceneData};

/// Round `size` up to the next multiple of `min_alignment`.
/// Alignments are powers of two; zero means no requirement.
pub fn pad_uniform_buffer_size(size: u64, min_alignment: u64) -> u64 {
    if min_alignment > 0 {
        (size + min_alignment - 1) & !(min_alignment - 1)
    } else {
        size
    }
}

/// Placement of every frame's camera and scene block inside the shared uniform buffer.
///
/// Slice `i` starts at `camera_offset(i)` and holds the camera block followed by the
/// scene block, both padded to the device alignment so they can be bound as dynamic offsets.
/// The buffer has room for one slice more than there are frames in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    camera_size: u64,
    scene_size: u64,
    frame_overlap: usize,
}

impl UniformLayout {
    pub fn new(min_alignment: u64, frame_overlap: usize) -> Self {
        Self {
            camera_size: pad_uniform_buffer_size(size_of::<GpuCameraData>() as u64, min_alignment),
            scene_size: pad_uniform_buffer_size(size_of::<GpuSceneData>() as u64, min_alignment),
            frame_overlap,
        }
    }

    pub fn stride(&self) -> u64 {
        self.camera_size + self.scene_size
    }

    pub fn camera_offset(&self, frame_index: usize) -> u64 {
        self.stride() * frame_index as u64
    }

    pub fn scene_offset(&self, frame_index: usize) -> u64 {
        self.camera_offset(frame_index) + self.camera_size
    }

    pub fn buffer_size(&self) -> u64 {
        self.camera_offset(self.frame_overlap + 1)
    }

    /// Dynamic offsets for the global set, in binding order
    pub fn dynamic_offsets(&self, frame_index: usize) -> [u32; 2] {
        [
            self.camera_offset(frame_index) as u32,
            self.scene_offset(frame_index) as u32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_alignment() {
        assert_eq!(pad_uniform_buffer_size(192, 256), 256);
        assert_eq!(pad_uniform_buffer_size(256, 256), 256);
        assert_eq!(pad_uniform_buffer_size(257, 256), 512);
        assert_eq!(pad_uniform_buffer_size(48, 64), 64);
        assert_eq!(pad_uniform_buffer_size(48, 0), 48);
    }

    #[test]
    fn camera_offsets_advance_by_a_constant_stride() {
        for alignment in [0, 1, 16, 64, 256] {
            let layout = UniformLayout::new(alignment, 2);
            let expected = pad_uniform_buffer_size(size_of::<GpuCameraData>() as u64, alignment)
                + pad_uniform_buffer_size(size_of::<GpuSceneData>() as u64, alignment);

            for i in 0..8 {
                assert_eq!(layout.camera_offset(i + 1) - layout.camera_offset(i), expected);
            }
            assert_eq!(layout.stride(), expected);
        }
    }

    #[test]
    fn offsets_respect_device_alignment() {
        let layout = UniformLayout::new(256, 2);
        for i in 0..3 {
            assert_eq!(layout.camera_offset(i) % 256, 0);
            assert_eq!(layout.scene_offset(i) % 256, 0);
        }
    }

    #[test]
    fn scene_block_follows_camera_block() {
        let layout = UniformLayout::new(64, 2);
        assert_eq!(layout.scene_offset(1) - layout.camera_offset(1), 192);
        assert_eq!(layout.dynamic_offsets(1), [256, 448]);
        assert_eq!(layout.dynamic_offsets(2), [512, 704]);
    }

    #[test]
    fn buffer_holds_one_slice_more_than_frames_in_flight() {
        let layout = UniformLayout::new(256, 2);
        assert_eq!(layout.buffer_size(), layout.stride() * 3);
        assert!(layout.scene_offset(2) + 48 <= layout.buffer_size());
    }
}
