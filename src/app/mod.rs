mod camera_controller;
mod input_state;
mod scene;

use std::sync::Arc;
use std::time::{Duration, Instant};
use color_eyre::eyre::{OptionExt, Report};
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::event::{StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId};
use crate::app::camera_controller::CameraController;
use crate::app::input_state::InputState;
use crate::config::{CVar, ConsoleVariables};
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::Renderer;

pub const SHOW_STATS: &str = "ui.show_stats";

/// Frame timing accumulated between two reports
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u32,
    elapsed: Duration,
}

impl FrameStats {
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Count one frame. Returns (fps, ms per frame) once a full interval has passed.
    pub fn record(&mut self, frame_time: Duration) -> Option<(f32, f32)> {
        self.frames += 1;
        self.elapsed += frame_time;
        if self.elapsed < Self::REPORT_INTERVAL {
            return None;
        }

        let secs = self.elapsed.as_secs_f32();
        let report = (self.frames as f32 / secs, secs * 1000.0 / self.frames as f32);
        *self = Self::default();
        Some(report)
    }
}

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    event_loop: Option<EventLoop<()>>,
    camera_controller: CameraController,
    config: RenderConfig,

    vars: ConsoleVariables,
    show_stats: CVar<bool>,

    // State
    input_state: InputState,
    prev_frame_time: Instant,
    delta_time: Duration,
    stats: FrameStats,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut vars = ConsoleVariables::new();
        let camera_controller = CameraController::new(Camera::default(), &mut vars);
        let show_stats = CVar::register(&mut vars, SHOW_STATS, false);

        Ok(Self {
            window: None,
            renderer: None,
            event_loop: Some(event_loop),
            camera_controller,
            config,

            vars,
            show_stats,

            input_state: InputState::default(),
            prev_frame_time: Instant::now(),
            delta_time: Duration::ZERO,
            stats: FrameStats::default(),
            close_requested: false,
            error: None,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = self.event_loop
            .take()
            .ok_or_eyre("Event loop already ran")?;
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop the event loop and hand `e` back from [`App::run`]
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: Report) {
        log::error!("{:?}", e);
        self.error = Some(e);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(event_loop.create_window(
            Window::default_attributes().with_title("tessera"),
        )?);
        self.window = Some(window.clone());

        let mut renderer = Renderer::new(window, self.config.clone())?;
        scene::populate(&mut renderer)?;
        self.renderer = Some(renderer);

        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        self.camera_controller.process_input(
            &mut self.input_state,
            &self.vars,
            window,
            self.delta_time.as_secs_f32(),
        );

        if self.input_state.is_key_just_pressed(KeyCode::F1) {
            let show = !self.show_stats.get(&self.vars);
            self.show_stats.set(&mut self.vars, show);
            log::info!("{}: {}", SHOW_STATS, show);
        }

        if self.input_state.is_key_just_pressed(KeyCode::KeyP) {
            let extent = renderer.extent();
            let mut pixels = vec![0u8; extent.width as usize * extent.height as usize * 4];
            let written = renderer.draw_to_buffer(self.camera_controller.get_camera(), &mut pixels)?;
            log::info!(
                "Captured frame {}: {}x{}, {} bytes",
                renderer.frame_count(),
                extent.width,
                extent.height,
                written,
            );
        } else {
            renderer.draw(self.camera_controller.get_camera())?;
        }

        if let Some((fps, frame_ms)) = self.stats.record(self.delta_time) {
            if self.show_stats.get(&self.vars) {
                log::info!(
                    "{:.0} fps, {:.2} ms/frame, {} objects",
                    fps,
                    frame_ms,
                    renderer.render_object_count(),
                );
            }
        }

        self.input_state.reset_frame();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time = curr_frame_time.duration_since(self.prev_frame_time);
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.wrap_err("Failed to start renderer"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().is_none_or(|window| window.id() != window_id) {
            return;
        }

        self.input_state.process_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }

        if self.input_state.is_key_just_pressed(KeyCode::Escape) {
            self.close_requested = true;
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The renderer has to go before the window it presents to
        self.renderer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_report_once_per_interval() {
        let mut stats = FrameStats::default();
        let frame = Duration::from_millis(250);

        assert_eq!(stats.record(frame), None);
        assert_eq!(stats.record(frame), None);
        assert_eq!(stats.record(frame), None);

        let (fps, frame_ms) = stats.record(frame).unwrap();
        assert!((fps - 4.0).abs() < 1e-3);
        assert!((frame_ms - 250.0).abs() < 1e-3);

        // Counters start over after a report
        assert_eq!(stats.record(frame), None);
    }
}
