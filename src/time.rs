//! Frame timing.
//!
//! Tracks wall-clock time since startup, the frame count, and a frame rate
//! averaged over short windows for the title bar.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Time {
    start: Instant,
    last_frame: Instant,
    elapsed: Duration,
    delta_secs: f32,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed: Duration::ZERO,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Call once per frame. Returns `true` when the FPS figure was refreshed.
    pub fn update(&mut self) -> bool {
        self.tick(Instant::now())
    }

    fn tick(&mut self, now: Instant) -> bool {
        self.delta_secs = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.elapsed = now.duration_since(self.start);
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed < self.fps_update_interval {
            return false;
        }
        let frames_since = self.frame_count - self.fps_frame_count;
        self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
        self.fps_frame_count = self.frame_count;
        self.fps_update_time = now;
        true
    }

    /// Seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Milliseconds since start, the unit of the `time` uniform.
    #[inline]
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed.as_secs_f32() * 1000.0
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_new() {
        let time = Time::new();
        assert_eq!(time.frame(), 0);
        assert_eq!(time.fps(), 0.0);
        assert_eq!(time.elapsed_millis(), 0.0);
    }

    #[test]
    fn test_tick_advances() {
        let mut time = Time::new();
        let start = time.start;

        time.tick(start + Duration::from_millis(16));
        assert_eq!(time.frame(), 1);
        assert!((time.elapsed_millis() - 16.0).abs() < 1e-3);
        assert!((time.delta() - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_fps_window() {
        let mut time = Time::new();
        let start = time.start;

        let mut refreshed = false;
        for frame in 1..=30u64 {
            refreshed = time.tick(start + Duration::from_millis(20 * frame));
        }
        // 30 frames over 600ms: one refresh at 500ms.
        assert!(!refreshed);
        assert!((time.fps() - 50.0).abs() < 1e-3);
    }
}
