use glam::{Mat4, Vec3};
use crate::renderer::shader_data::GpuCameraData;
use crate::renderer::util;

/// Fly camera steered by yaw and pitch
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    world_up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 8.0))
    }
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 70.0;
    const MAX_PITCH_DEG: f32 = 89.0;

    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            world_up: Vec3::Y,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 200.0,
        }
    }

    /// Turn by the given angles in degrees. Pitch stops just short of straight up or down.
    pub fn rotate(&mut self, yaw_deg: f32, pitch_deg: f32) {
        self.yaw += yaw_deg.to_radians();
        let max_pitch = Self::MAX_PITCH_DEG.to_radians();
        self.pitch = (self.pitch + pitch_deg.to_radians()).clamp(-max_pitch, max_pitch);
    }

    /// Move relative to where the camera is looking
    pub fn translate_local(&mut self, forward: f32, right: f32, up: f32) {
        let front = self.get_forward();
        let right_dir = front.cross(self.world_up).normalize();
        self.position += front * forward + right_dir * right + self.world_up * up;
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.get_forward(), self.world_up)
    }

    pub fn get_proj_mat(&self, aspect_ratio: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        // Vulkan clip space has Y pointing down
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn camera_data(&self, aspect_ratio: f32) -> GpuCameraData {
        let view = self.get_view_mat();
        let projection = self.get_proj_mat(aspect_ratio);
        GpuCameraData {
            view,
            projection,
            view_projection: projection * view,
        }
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_forward(&self) -> Vec3 {
        util::calculate_direction(self.pitch, self.yaw)
    }

    pub fn get_pitch(&self) -> f32 {
        self.pitch
    }
}
