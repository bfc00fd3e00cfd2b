//! Pointer and keyboard input.
//!
//! [`Pointer`] turns raw mouse events into the attract/repel state consumed by
//! the simulation. [`Controls`] maps key presses to parameter edits.

use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::params::{Adjustment, MeshSelect};

/// Direction of the pointer force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttractMode {
    #[default]
    Off,
    Attract,
    Repel,
}

impl AttractMode {
    /// Value of the `is_attract` uniform.
    pub fn as_uniform(self) -> i32 {
        match self {
            AttractMode::Off => 0,
            AttractMode::Attract => 1,
            AttractMode::Repel => -1,
        }
    }
}

/// Something the pointer wants the simulation to know.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// A force started at this point, in normalized device coordinates.
    Pressed { mode: AttractMode, ndc: Vec2 },
    Released,
}

/// Mouse state, tracked in window pixels and NDC.
#[derive(Debug, Default)]
pub struct Pointer {
    mode: AttractMode,
    position: Vec2,
    ndc: Vec2,
    window_size: (u32, u32),
}

impl Pointer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window_size: (width, height),
            ..Default::default()
        }
    }

    pub fn mode(&self) -> AttractMode {
        self.mode
    }

    pub fn ndc(&self) -> Vec2 {
        self.ndc
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Feed a window event. Returns a change in force state, if any.
    ///
    /// Motion while a button is held only updates the tracked position.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<PointerEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.move_to(Vec2::new(position.x as f32, position.y as f32));
                None
            }
            WindowEvent::MouseInput { state, button, .. } => self.button(*state, *button),
            _ => None,
        }
    }

    fn move_to(&mut self, position: Vec2) {
        self.position = position;
        let (w, h) = self.window_size;
        if w > 0 && h > 0 {
            self.ndc = Vec2::new(
                (position.x / w as f32) * 2.0 - 1.0,
                1.0 - (position.y / h as f32) * 2.0,
            );
        }
    }

    fn button(&mut self, state: ElementState, button: MouseButton) -> Option<PointerEvent> {
        match state {
            ElementState::Pressed => {
                let mode = match button {
                    MouseButton::Left => AttractMode::Attract,
                    MouseButton::Right => AttractMode::Repel,
                    _ => return None,
                };
                self.mode = mode;
                Some(PointerEvent::Pressed { mode, ndc: self.ndc })
            }
            ElementState::Released => {
                if self.mode == AttractMode::Off {
                    return None;
                }
                self.mode = AttractMode::Off;
                Some(PointerEvent::Released)
            }
        }
    }
}

/// What a key press asks the application to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Adjust(Adjustment),
    LogCamera,
}

/// Keyboard bindings for live parameter editing.
#[derive(Debug, Clone, Copy)]
pub struct Controls {
    pub size_step: f32,
    pub freq_step: i32,
    pub breath_step: i32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            size_step: 0.1,
            freq_step: 1,
            breath_step: 1,
        }
    }
}

impl Controls {
    pub fn command(&self, key: KeyCode) -> Option<Command> {
        let adjust = match key {
            KeyCode::Space => Adjustment::ToggleRotation,
            KeyCode::Digit0 => Adjustment::Mesh(MeshSelect::None),
            KeyCode::Digit1 => Adjustment::Mesh(MeshSelect::MeshA),
            KeyCode::Digit2 => Adjustment::Mesh(MeshSelect::MeshB),
            KeyCode::BracketLeft => Adjustment::ParticleSize(-self.size_step),
            KeyCode::BracketRight => Adjustment::ParticleSize(self.size_step),
            KeyCode::Minus => Adjustment::ColorFreq(-self.freq_step),
            KeyCode::Equal => Adjustment::ColorFreq(self.freq_step),
            KeyCode::Comma => Adjustment::BreathRate(-self.breath_step),
            KeyCode::Period => Adjustment::BreathRate(self.breath_step),
            KeyCode::KeyC => return Some(Command::LogCamera),
            _ => return None,
        };
        Some(Command::Adjust(adjust))
    }

    /// Command for a key-down event. Releases and repeats are ignored.
    pub fn handle_event(&self, event: &WindowEvent) -> Option<Command> {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return None;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return None;
        }
        match event.physical_key {
            PhysicalKey::Code(code) => self.command(code),
            PhysicalKey::Unidentified(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_ndc() {
        let mut pointer = Pointer::new(800, 600);

        pointer.move_to(Vec2::new(400.0, 300.0));
        assert!(pointer.ndc().abs_diff_eq(Vec2::ZERO, 1e-6));

        pointer.move_to(Vec2::new(800.0, 0.0));
        assert!(pointer.ndc().abs_diff_eq(Vec2::new(1.0, 1.0), 1e-6));
    }

    #[test]
    fn test_buttons_set_mode() {
        let mut pointer = Pointer::new(800, 600);
        pointer.move_to(Vec2::new(200.0, 150.0));

        let event = pointer.button(ElementState::Pressed, MouseButton::Left);
        assert_eq!(
            event,
            Some(PointerEvent::Pressed {
                mode: AttractMode::Attract,
                ndc: Vec2::new(-0.5, 0.5),
            })
        );
        assert_eq!(pointer.mode().as_uniform(), 1);

        assert_eq!(pointer.button(ElementState::Released, MouseButton::Left), Some(PointerEvent::Released));
        assert_eq!(pointer.mode(), AttractMode::Off);

        pointer.button(ElementState::Pressed, MouseButton::Right);
        assert_eq!(pointer.mode().as_uniform(), -1);
    }

    #[test]
    fn test_motion_keeps_force_state() {
        let mut pointer = Pointer::new(100, 100);
        pointer.button(ElementState::Pressed, MouseButton::Right);
        pointer.move_to(Vec2::new(10.0, 90.0));
        assert_eq!(pointer.mode(), AttractMode::Repel);
    }

    #[test]
    fn test_middle_button_ignored() {
        let mut pointer = Pointer::new(100, 100);
        assert_eq!(pointer.button(ElementState::Pressed, MouseButton::Middle), None);
        assert_eq!(pointer.button(ElementState::Released, MouseButton::Middle), None);
        assert_eq!(pointer.mode(), AttractMode::Off);
    }

    #[test]
    fn test_key_bindings() {
        let controls = Controls::default();

        assert_eq!(
            controls.command(KeyCode::Digit2),
            Some(Command::Adjust(Adjustment::Mesh(MeshSelect::MeshB)))
        );
        assert_eq!(
            controls.command(KeyCode::BracketLeft),
            Some(Command::Adjust(Adjustment::ParticleSize(-0.1)))
        );
        assert_eq!(
            controls.command(KeyCode::Equal),
            Some(Command::Adjust(Adjustment::ColorFreq(1)))
        );
        assert_eq!(
            controls.command(KeyCode::Comma),
            Some(Command::Adjust(Adjustment::BreathRate(-1)))
        );
        assert_eq!(controls.command(KeyCode::KeyC), Some(Command::LogCamera));
        assert_eq!(controls.command(KeyCode::KeyQ), None);
    }
}
