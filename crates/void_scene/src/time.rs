//! Fixed timestep clock

/// Turns variable frame times into a whole number of fixed updates
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedTimestep {
    /// Clock with the given step length and per-frame step limit
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step,
            max_steps: max_steps.max(1),
            accumulator: 0.0,
        }
    }

    /// Step length in seconds
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Add frame time and return the number of fixed updates to run.
    ///
    /// Time beyond `max_steps` updates is dropped so a long frame cannot
    /// snowball into ever longer ones.
    pub fn accumulate(&mut self, frame_time: f32) -> u32 {
        if frame_time.is_finite() && frame_time > 0.0 {
            self.accumulator += frame_time;
        }

        let limit = self.step * self.max_steps as f32;
        if self.accumulator > limit {
            log::warn!(
                "Fixed update falling behind by {:.3}s, dropping {:.3}s",
                self.accumulator,
                self.accumulator - limit
            );
            self.accumulator = limit;
        }

        let steps = (self.accumulator / self.step) as u32;
        self.accumulator -= steps as f32 * self.step;
        steps
    }

    /// How far between two fixed updates the clock is, in [0, 1)
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.step
    }

    /// Drop accumulated time
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_whole_steps() {
        let mut clock = FixedTimestep::new(0.25, 4);
        assert_eq!(clock.accumulate(0.5), 2);
        assert!(clock.alpha().abs() < 0.001);

        assert_eq!(clock.accumulate(0.125), 0);
        assert!((clock.alpha() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_long_frame_is_clamped() {
        let mut clock = FixedTimestep::new(0.25, 4);
        assert_eq!(clock.accumulate(10.0), 4);
        assert_eq!(clock.accumulate(0.0), 0);
    }

    #[test]
    fn test_ignores_bad_frame_times() {
        let mut clock = FixedTimestep::new(0.1, 4);
        assert_eq!(clock.accumulate(f32::NAN), 0);
        assert_eq!(clock.accumulate(-1.0), 0);
        clock.accumulate(0.05);
        clock.reset();
        assert_eq!(clock.alpha(), 0.0);
    }
}
