//! WGSL sources of the two particle programs.

/// Compute kernel advancing every particle by one step.
pub const SIMULATE_SOURCE: &str = include_str!("shaders/simulate.wgsl");
/// Instanced billboard renderer.
pub const DRAW_SOURCE: &str = include_str!("shaders/draw.wgsl");

/// Entry point of [`SIMULATE_SOURCE`].
pub const SIMULATE_ENTRY: &str = "main";

/// Invocations per simulation workgroup.
pub const WORKGROUP_SIZE: u32 = 64;
