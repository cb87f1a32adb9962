// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Installs the process-wide `tracing` subscriber. Filtering follows
/// `RUST_LOG`; calling this more than once is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Counts rendered frames and reports a rate roughly once per second.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    last: std::time::Instant,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self {
            frames: 0,
            last: std::time::Instant::now(),
        }
    }
}

impl FpsCounter {
    pub fn frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.frames = 0;
        self.last = std::time::Instant::now();
    }

    /// Logs and returns the frame count once at least a second has passed.
    pub fn tick(&mut self, now: std::time::Instant) -> Option<u32> {
        if now.duration_since(self.last).as_secs_f32() < 1.0 {
            return None;
        }
        let fps = self.frames;
        tracing::info!("fps ~ {}", fps);
        self.frames = 0;
        self.last = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fps_counter_reports_after_one_second() {
        let mut c = FpsCounter::default();
        let start = c.last;
        c.frame();
        c.frame();
        assert_eq!(c.tick(start + Duration::from_millis(500)), None);
        assert_eq!(c.tick(start + Duration::from_millis(1001)), Some(2));
        assert_eq!(c.frames, 0);
    }
}
