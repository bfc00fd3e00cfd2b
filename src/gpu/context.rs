//! Per-run state shared by the simulation and render passes.
//!
//! The current generation index and the active program live here instead of
//! in globals, so every pass receives them explicitly and the single swap
//! point is easy to find.

use std::sync::atomic::{AtomicU32, Ordering};

use super::program::ShaderProgram;

/// Opaque identity of a [`ShaderProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u32);

impl ProgramId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ProgramId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which of the two particle generations is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation {
    current: usize,
}

impl Generation {
    /// Generation read by the simulation and drawn by the render pass.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Generation the simulation writes this frame.
    pub fn destination(&self) -> usize {
        1 - self.current
    }

    /// Make the destination generation current.
    pub(crate) fn swap(&mut self) {
        self.current = self.destination();
    }
}

/// Explicit state threaded through every pass invocation.
#[derive(Debug, Default)]
pub struct FrameContext {
    pub(crate) generation: Generation,
    active_program: Option<ProgramId>,
    program_switches: u64,
    frames: u64,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Completed simulation passes.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn active_program(&self) -> Option<ProgramId> {
        self.active_program
    }

    /// How many times the active program actually changed.
    pub fn program_switches(&self) -> u64 {
        self.program_switches
    }

    /// Make `program` the active one and commit its staged uniforms.
    ///
    /// Re-activating the active program changes nothing but still uploads
    /// uniforms staged since the last call.
    pub fn use_program(&mut self, program: &mut ShaderProgram, queue: &wgpu::Queue) {
        self.activate(program.id());
        program.flush(queue);
    }

    /// Record `id` as active. Returns `true` when this was a switch.
    pub(crate) fn activate(&mut self, id: ProgramId) -> bool {
        if self.active_program == Some(id) {
            return false;
        }
        log::trace!("activating program {:?}", id);
        self.active_program = Some(id);
        self.program_switches += 1;
        true
    }

    /// Close out a frame's simulation: flip generations exactly once.
    pub(crate) fn finish_simulation(&mut self) {
        self.generation.swap();
        self.frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_alternates() {
        let mut ctx = FrameContext::new();
        assert_eq!(ctx.generation().current(), 0);

        for frame in 1..=101u64 {
            let before = ctx.generation();
            ctx.finish_simulation();
            assert_eq!(ctx.generation().current(), before.destination());
            assert_eq!(ctx.generation().current() as u64, frame % 2);
            assert_eq!(ctx.frames(), frame);
        }
    }

    #[test]
    fn test_destination_is_other_generation() {
        let mut generation = Generation::default();
        assert_eq!((generation.current(), generation.destination()), (0, 1));
        generation.swap();
        assert_eq!((generation.current(), generation.destination()), (1, 0));
    }

    #[test]
    fn test_activation_is_cached() {
        let mut ctx = FrameContext::new();
        let a = ProgramId::next();
        let b = ProgramId::next();

        assert!(ctx.activate(a));
        assert!(!ctx.activate(a));
        assert!(ctx.activate(b));
        assert!(!ctx.activate(b));
        assert!(ctx.activate(a));

        assert_eq!(ctx.program_switches(), 3);
        assert_eq!(ctx.active_program(), Some(a));
    }
}
