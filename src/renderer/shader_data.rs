use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Camera matrices, bound at set 0 binding 0 with a dynamic offset
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

/// Scene lighting, bound at set 0 binding 1 with a dynamic offset
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuSceneData {
    pub ambient_color: Vec4,
    // w holds the sun power
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

/// One element of the per-frame object storage buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model_matrix: Mat4,
    pub color: Vec4,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub render_matrix: Mat4,
}
