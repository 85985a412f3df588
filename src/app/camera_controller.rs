use glam::{Vec2, Vec3};
use winit::dpi::PhysicalPosition;
use winit::keyboard::KeyCode;
use winit::window::Window;
use crate::app::input_state::InputState;
use crate::config::{CVar, ConsoleVariables};
use crate::renderer::camera::Camera;

pub const CAMERA_SPEED: &str = "camera.speed";
pub const CAMERA_SENSITIVITY: &str = "camera.sensitivity";

/// Fly camera: WASD, space and ctrl move, dragging with the right mouse button looks around
pub struct CameraController {
    camera: Camera,
    speed: CVar<f32>,
    sensitivity: CVar<f32>,
}

impl CameraController {
    pub fn new(camera: Camera, vars: &mut ConsoleVariables) -> Self {
        Self {
            camera,
            // Units per second
            speed: CVar::register(vars, CAMERA_SPEED, 5.0),
            // Degrees per pixel
            sensitivity: CVar::register(vars, CAMERA_SENSITIVITY, 0.2),
        }
    }

    pub fn get_camera(&self) -> &Camera {
        &self.camera
    }

    pub fn process_input(
        &mut self,
        input_state: &mut InputState,
        vars: &ConsoleVariables,
        window: &Window,
        delta_time: f32,
    ) {
        if input_state.mouse_right_just_pressed {
            window.set_cursor_visible(false);
        } else if input_state.mouse_right_just_released {
            window.set_cursor_visible(true);
            // Put the cursor back where the drag started
            self.set_window_mouse_pos(window, input_state.mouse_right_just_pressed_pos);
            input_state.mouse_curr_pos = input_state.mouse_right_just_pressed_pos;
            input_state.mouse_prev_pos = input_state.mouse_curr_pos;
        }

        if input_state.mouse_right_down {
            let (yaw, pitch) = look_angles(input_state.mouse_delta(), self.sensitivity.get(vars));
            self.camera.rotate(yaw, pitch);
        }

        let movement = movement_axes(input_state) * self.speed.get(vars) * delta_time;
        if movement != Vec3::ZERO {
            self.camera.translate_local(movement.z, movement.x, movement.y);
        }
    }

    fn set_window_mouse_pos(&self, window: &Window, pos: Vec2) {
        if let Err(e) = window.set_cursor_position(PhysicalPosition::new(pos.x as f64, pos.y as f64)) {
            log::error!("Failed to set cursor position: {e}");
        }
    }
}

/// Camera-relative movement requested by the keyboard: x right, y up, z forward
pub fn movement_axes(input_state: &InputState) -> Vec3 {
    let axis = |positive: KeyCode, negative: KeyCode| {
        input_state.is_key_down(positive) as i32 as f32 - input_state.is_key_down(negative) as i32 as f32
    };
    Vec3::new(
        axis(KeyCode::KeyD, KeyCode::KeyA),
        axis(KeyCode::Space, KeyCode::ControlLeft),
        axis(KeyCode::KeyW, KeyCode::KeyS),
    )
}

/// Yaw and pitch in degrees for a mouse movement. Moving the mouse up looks up.
pub fn look_angles(mouse_delta: Vec2, sensitivity: f32) -> (f32, f32) {
    (mouse_delta.x * sensitivity, -mouse_delta.y * sensitivity)
}
