//! Simulation pass: advance every particle by one step.

use super::context::FrameContext;
use super::particle_buffers::{ChannelView, ParticleBuffers};
use super::program::{ProgramSource, ShaderProgram};
use crate::error::ShaderError;
use crate::particles::Channel;
use crate::shader::{SIMULATE_ENTRY, SIMULATE_SOURCE, WORKGROUP_SIZE};

/// Where the pass is within one encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    /// Pipeline and source inputs are bound.
    Bound,
    /// Destination outputs are bound and the dispatch has been recorded.
    FeedbackActive,
}

impl PassState {
    /// Successor in the cycle `Idle -> Bound -> FeedbackActive -> Idle`.
    pub fn next(self) -> Self {
        match self {
            PassState::Idle => PassState::Bound,
            PassState::Bound => PassState::FeedbackActive,
            PassState::FeedbackActive => PassState::Idle,
        }
    }

    /// Move to `to`, which must be the successor of `self`.
    fn advance(&mut self, to: PassState) {
        debug_assert_eq!(self.next(), to, "simulation pass cannot go from {:?} to {:?}", self, to);
        *self = to;
    }
}

/// Bind group indices used by the simulation kernel.
pub const INPUT_GROUP: u32 = 1;
pub const FEEDBACK_GROUP: u32 = 2;

pub struct SimulationPass {
    program: ShaderProgram,
    state: PassState,
}

impl SimulationPass {
    pub async fn new(device: &wgpu::Device, buffers: &ParticleBuffers) -> Result<Self, ShaderError> {
        let source = ProgramSource::compile("Simulate", SIMULATE_SOURCE)?;
        let program = ShaderProgram::compute(
            device,
            source,
            SIMULATE_ENTRY,
            &[buffers.input_layout(), buffers.feedback_layout()],
        )
        .await?;

        Ok(Self {
            program,
            state: PassState::Idle,
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    /// Record one simulation step and flip generations.
    ///
    /// Reads `ctx.generation().current()`, writes its destination, and leaves
    /// the destination current for the render pass that follows.
    pub fn encode(
        &mut self,
        ctx: &mut FrameContext,
        queue: &wgpu::Queue,
        buffers: &ParticleBuffers,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        debug_assert_eq!(self.state, PassState::Idle);
        ctx.use_program(&mut self.program, queue);
        let Some(pipeline) = self.program.compute_pipeline() else {
            log::error!("{} is not a compute program; skipping step", self.program.label());
            return;
        };

        let source = ctx.generation().current();
        let destination = ctx.generation().destination();
        debug_assert!(Channel::ALL
            .iter()
            .filter_map(|channel| buffers.channel_buffer(source, *channel))
            .all(|buffer| ChannelView::Simulation.accepts(buffer)));

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulation Pass"),
                timestamp_writes: None,
            });

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, self.program.bind_group(), &[]);
            pass.set_bind_group(INPUT_GROUP, buffers.simulation_inputs(source), &[]);
            self.state.advance(PassState::Bound);

            pass.set_bind_group(FEEDBACK_GROUP, buffers.feedback(destination), &[]);
            let workgroups = (buffers.count() as u32).div_ceil(WORKGROUP_SIZE);
            pass.dispatch_workgroups(workgroups, 1, 1);
            self.state.advance(PassState::FeedbackActive);
        }

        self.state.advance(PassState::Idle);
        ctx.finish_simulation();
        log::trace!("simulated generation {} -> {}", source, destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_cycle() {
        let mut state = PassState::Idle;
        for expected in [PassState::Bound, PassState::FeedbackActive, PassState::Idle] {
            state.advance(expected);
            assert_eq!(state, expected);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cannot go from Idle to FeedbackActive")]
    fn test_skipping_bind_panics() {
        let mut state = PassState::Idle;
        state.advance(PassState::FeedbackActive);
    }
}
