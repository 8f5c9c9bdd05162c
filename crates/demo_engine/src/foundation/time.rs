//! Frame timing

use std::time::{Duration, Instant};

/// Frame timer with a once-per-second FPS sample
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
    window_frames: u32,
    window_time: f32,
    fps: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            window_frames: 0,
            window_time: 0.0,
            fps: 0,
        }
    }

    /// Record the end of a frame; returns true when a new FPS sample is ready
    pub fn update(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.advance(elapsed)
    }

    /// Record a frame of length `elapsed`
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        self.delta_time = elapsed.as_secs_f32();
        self.total_time += self.delta_time;
        self.frame_count += 1;

        self.window_frames += 1;
        self.window_time += self.delta_time;
        if self.window_time >= 1.0 {
            self.fps = (self.window_frames as f32 / self.window_time).round() as u32;
            self.window_frames = 0;
            self.window_time = 0.0;
            return true;
        }
        false
    }

    /// Seconds taken by the last frame
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds since the timer started
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Frames recorded so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second over the last complete one-second window
    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Caps the frame rate by sleeping off the unused part of each frame
pub struct FramePacer {
    frame_budget: Duration,
    frame_start: Instant,
}

impl FramePacer {
    /// Pace to `target_fps`; zero disables pacing
    pub fn new(target_fps: u32) -> Self {
        let frame_budget = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(target_fps))
        };
        Self {
            frame_budget,
            frame_start: Instant::now(),
        }
    }

    /// Mark the start of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time left in the frame budget after `elapsed`
    pub fn residual(&self, elapsed: Duration) -> Duration {
        self.frame_budget.saturating_sub(elapsed)
    }

    /// Sleep for whatever remains of the current frame's budget
    pub fn wait(&self) {
        let remaining = self.residual(self.frame_start.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fps_sampled_once_per_second() {
        let mut timer = Timer::new();
        let frame = Duration::from_millis(20);
        let mut samples = 0;
        for _ in 0..100 {
            if timer.advance(frame) {
                samples += 1;
            }
        }
        assert_eq!(samples, 2);
        assert_eq!(timer.fps(), 50);
        assert_eq!(timer.frame_count(), 100);
        assert_relative_eq!(timer.total_time(), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_fps_is_zero_before_first_sample() {
        let mut timer = Timer::new();
        assert!(!timer.advance(Duration::from_millis(16)));
        assert_eq!(timer.fps(), 0);
        assert_relative_eq!(timer.delta_time(), 0.016, epsilon = 1e-6);
    }

    #[test]
    fn test_pacer_residual() {
        let pacer = FramePacer::new(50);
        assert_eq!(pacer.residual(Duration::from_millis(5)), Duration::from_millis(15));
        assert_eq!(pacer.residual(Duration::from_millis(30)), Duration::ZERO);
    }

    #[test]
    fn test_zero_target_disables_pacing() {
        let pacer = FramePacer::new(0);
        assert_eq!(pacer.residual(Duration::ZERO), Duration::ZERO);
    }
}
