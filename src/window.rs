use std::path::PathBuf;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::error::AppError;
use crate::gpu::GpuState;
use crate::input::{Command, Controls, Pointer, PointerEvent};
use crate::mesh::MeshLoader;
use crate::params::Params;
use crate::time::Time;

const TITLE: &str = "particle-morph";

pub struct App {
    params: Params,
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
    pointer: Pointer,
    controls: Controls,
    time: Time,
    mesh_loader: Option<MeshLoader>,
    error: Option<AppError>,
}

impl App {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            window: None,
            gpu_state: None,
            pointer: Pointer::default(),
            controls: Controls::default(),
            time: Time::new(),
            mesh_loader: None,
            error: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let window_attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let size = window.inner_size();
        self.pointer.set_window_size(size.width, size.height);

        let gpu_state = pollster::block_on(GpuState::new(window.clone(), &self.params))?;
        self.window = Some(window);
        self.gpu_state = Some(gpu_state);

        match (&self.params.mesh_a, &self.params.mesh_b) {
            (Some(a), Some(b)) => {
                self.mesh_loader = Some(MeshLoader::spawn(PathBuf::from(a), PathBuf::from(b)));
            }
            _ => log::info!("no attraction meshes configured"),
        }
        Ok(())
    }

    fn poll_meshes(&mut self) {
        let Some(result) = self.mesh_loader.as_mut().and_then(MeshLoader::poll) else {
            return;
        };
        self.mesh_loader = None;

        match result {
            Ok(pair) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.set_mesh_attract_targets(&pair.mesh_a.vertices, &pair.mesh_b.vertices, &self.params);
                }
            }
            Err(e) => log::warn!("mesh attraction disabled: {}", e),
        }
    }

    fn run_command(&mut self, command: Command) {
        let Some(gpu_state) = &mut self.gpu_state else {
            return;
        };
        match command {
            Command::Adjust(adjustment) => {
                self.params.apply(adjustment);
                gpu_state.system.apply_params(&self.params);
                log::debug!("{:?} -> {:?}", adjustment, self.params);
            }
            Command::LogCamera => {
                let camera = &gpu_state.camera;
                log::info!(
                    "camera position {:?} target {:?} forward {:?} right {:?} up {:?}",
                    camera.position,
                    camera.target,
                    camera.forward,
                    camera.right,
                    camera.up
                );
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.poll_meshes();

        if self.time.update() {
            if let Some(window) = &self.window {
                window.set_title(&format!("{} - {:.0} fps", TITLE, self.time.fps()));
            }
        }

        if let Some(gpu_state) = &mut self.gpu_state {
            match gpu_state.render(self.time.elapsed_millis(), self.params.rotate_camera) {
                Ok(_) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    gpu_state.resize(winit::dpi::PhysicalSize {
                        width: gpu_state.config.width,
                        height: gpu_state.config.height,
                    })
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("surface out of memory");
                    event_loop.exit();
                }
                Err(e) => log::warn!("render error: {:?}", e),
            }
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(change) = self.pointer.handle_event(&event) {
            if let Some(gpu_state) = &mut self.gpu_state {
                match change {
                    PointerEvent::Pressed { mode, ndc } => gpu_state.set_attract(mode, ndc),
                    PointerEvent::Released => gpu_state.set_attract(self.pointer.mode(), self.pointer.ndc()),
                }
            }
        }
        if let Some(command) = self.controls.handle_event(&event) {
            self.run_command(command);
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                self.pointer.set_window_size(physical_size.width, physical_size.height);
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}
