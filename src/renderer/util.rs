use glam::Vec3;

/// Unit vector pointing along `yaw` and `pitch`, both in radians.
/// A yaw of zero looks down negative Z.
pub fn calculate_direction(pitch: f32, yaw: f32) -> Vec3 {
    Vec3::new(
        yaw.sin() * pitch.cos(),
        pitch.sin(),
        -yaw.cos() * pitch.cos(),
    )
}

pub fn calculate_pitch(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.y.clamp(-1.0, 1.0).asin()
}
