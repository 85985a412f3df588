use std::collections::HashSet;
use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Default)]
pub struct InputState {
    pub mouse_curr_pos: Vec2,
    pub mouse_prev_pos: Vec2,

    pub mouse_right_just_pressed: bool,
    pub mouse_right_just_released: bool,
    pub mouse_right_down: bool,
    pub mouse_right_just_pressed_pos: Vec2,

    keys_down: HashSet<KeyCode>,
    keys_just_pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn process_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                match state {
                    ElementState::Pressed => {
                        self.mouse_right_just_pressed = true;
                        self.mouse_right_just_released = false;
                        self.mouse_right_down = true;
                        self.mouse_right_just_pressed_pos = self.mouse_curr_pos;
                    }
                    ElementState::Released => {
                        self.mouse_right_just_pressed = false;
                        self.mouse_right_just_released = true;
                        self.mouse_right_down = false;
                    }
                }
            }
            WindowEvent::CursorMoved {
                position,
                ..
            } => {
                self.mouse_curr_pos = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state,
                    repeat,
                    ..
                },
                ..
            } => self.process_key(*code, *state, *repeat),
            WindowEvent::Focused(false) => {
                self.keys_down.clear();
                self.mouse_right_down = false;
            }
            _ => {}
        }
    }

    pub fn process_key(&mut self, code: KeyCode, state: ElementState, repeat: bool) {
        match state {
            ElementState::Pressed => {
                if !repeat {
                    self.keys_just_pressed.insert(code);
                }
                self.keys_down.insert(code);
            }
            ElementState::Released => {
                self.keys_down.remove(&code);
            }
        }
    }

    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys_down.contains(&code)
    }

    /// Pressed since the last [`InputState::reset_frame`], ignoring key repeat
    pub fn is_key_just_pressed(&self, code: KeyCode) -> bool {
        self.keys_just_pressed.contains(&code)
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_curr_pos - self.mouse_prev_pos
    }

    /// Reset the input states for the next frame.
    pub fn reset_frame(&mut self) {
        self.mouse_prev_pos = self.mouse_curr_pos;
        self.mouse_right_just_pressed = false;
        self.mouse_right_just_released = false;
        self.keys_just_pressed.clear();
    }
}
