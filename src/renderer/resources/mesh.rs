use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use crate::assets::mesh_file::MeshData;
use crate::renderer::contexts::device_ctx::transfer_ctx::Uploader;
use crate::renderer::contexts::resource_ctx::deletion_queue::{Deletion, DeletionQueue};
use crate::renderer::contexts::resource_ctx::resource_allocator::{AllocatedBuffer, MemoryAllocator};
use crate::renderer::resources::buffer::upload_buffer;
use crate::renderer::resources::vertex::VertexInputDescription;

/// Mesh living in device-local memory
pub struct GpuMesh {
    pub vertex_buffer: AllocatedBuffer,
    // Meshes without indices are drawn as a plain vertex list
    pub index_buffer: Option<AllocatedBuffer>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_input: VertexInputDescription,
}

impl GpuMesh {
    /// Hand the buffers to the deletion queue
    pub fn release(self, deletion_queue: &mut DeletionQueue) {
        deletion_queue.push(Deletion::Buffer(self.vertex_buffer));
        if let Some(index_buffer) = self.index_buffer {
            deletion_queue.push(Deletion::Buffer(index_buffer));
        }
    }
}

pub fn upload_mesh<A, U>(
    allocator: &A,
    uploader: &U,
    mesh: &MeshData,
    name: &str,
) -> Result<GpuMesh>
where
    A: MemoryAllocator + ?Sized,
    U: Uploader,
{
    if mesh.vertices.is_empty() {
        bail!("Mesh {} has no vertices", name);
    }
    let stride = mesh.vertex_stride() as usize;
    if stride == 0 || mesh.vertices.len() % stride != 0 {
        bail!(
            "Mesh {} has {} vertex bytes, not a multiple of its {} byte stride",
            name,
            mesh.vertices.len(),
            stride,
        );
    }

    let vertex_buffer = upload_buffer(
        allocator,
        uploader,
        &mesh.vertices,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        &format!("{} vertices", name),
    )?;

    let index_buffer = if mesh.indices.is_empty() {
        None
    } else {
        match upload_buffer(
            allocator,
            uploader,
            bytemuck::cast_slice(&mesh.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &format!("{} indices", name),
        ) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                allocator.destroy_buffer(vertex_buffer)?;
                return Err(e);
            }
        }
    };

    Ok(GpuMesh {
        vertex_buffer,
        index_buffer,
        vertex_count: mesh.vertex_count() as u32,
        index_count: mesh.indices.len() as u32,
        vertex_input: VertexInputDescription::from_attributes(&mesh.attributes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_allocator::MemoryLocation;
    use crate::renderer::contexts::device_ctx::transfer_ctx::UploadContext;
    use crate::renderer::resources::vertex::VertexAttribute;
    use crate::renderer::testing::{test_queue, MockAllocator, MockUploadDevice};

    fn uploader(device: &MockUploadDevice) -> UploadContext<MockUploadDevice> {
        UploadContext::new(test_queue(), device.clone(), 1_000_000_000).unwrap()
    }

    fn destroy(allocator: &MockAllocator, mesh: GpuMesh) {
        allocator.destroy_buffer(mesh.vertex_buffer).unwrap();
        if let Some(index_buffer) = mesh.index_buffer {
            allocator.destroy_buffer(index_buffer).unwrap();
        }
    }

    #[test]
    fn cube_gets_vertex_and_index_buffers() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let mesh = upload_mesh(&allocator, &uploader(&device), &MeshData::cube(), "cube").unwrap();

        assert_eq!(mesh.vertex_count, 24);
        assert_eq!(mesh.index_count, 36);
        assert_eq!(mesh.vertex_input.bindings[0].stride, 44);
        assert_eq!(device.submissions(), 2);
        // Only the two device-local buffers survive the upload
        assert_eq!(allocator.live_buffer_count(), 2);

        let gpu_only = allocator
            .buffers()
            .into_iter()
            .filter(|b| b.location == MemoryLocation::GpuOnly)
            .map(|b| b.usage)
            .collect::<Vec<_>>();
        assert_eq!(
            gpu_only,
            vec![
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            ],
        );

        destroy(&allocator, mesh);
        assert_eq!(allocator.live_buffer_count(), 0);
    }

    #[test]
    fn mesh_without_indices_has_no_index_buffer() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let positions: [[f32; 3]; 3] = [[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let data = MeshData::from_vertices(vec![VertexAttribute::Vec3], &positions, Vec::new()).unwrap();

        let mesh = upload_mesh(&allocator, &uploader(&device), &data, "triangle").unwrap();

        assert!(mesh.index_buffer.is_none());
        assert_eq!(mesh.vertex_count, 3);
        assert_eq!(device.submissions(), 1);
        destroy(&allocator, mesh);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let result = upload_mesh(&allocator, &uploader(&device), &MeshData::default(), "empty");

        assert!(result.is_err());
        assert_eq!(device.submissions(), 0);
        assert!(allocator.buffers().is_empty());
    }

    #[test]
    fn release_queues_every_buffer() {
        let allocator = MockAllocator::default();
        let device = MockUploadDevice::default();
        let mesh = upload_mesh(&allocator, &uploader(&device), &MeshData::cube(), "cube").unwrap();

        let mut queue = DeletionQueue::new();
        mesh.release(&mut queue);
        assert_eq!(queue.len(), 2);

        struct Destroyer<'a>(&'a MockAllocator);
        impl crate::renderer::contexts::resource_ctx::deletion_queue::ResourceDestroyer for Destroyer<'_> {
            fn destroy(&mut self, deletion: Deletion) -> Result<()> {
                match deletion {
                    Deletion::Buffer(buffer) => self.0.destroy_buffer(buffer),
                    _ => Ok(()),
                }
            }
        }
        queue.flush(&mut Destroyer(&allocator));
        assert_eq!(allocator.live_buffer_count(), 0);
    }
}
