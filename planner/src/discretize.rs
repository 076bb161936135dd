//! Placement of constraint checks inside one solver step.

use kinematics::Configuration;

use crate::ode::StepInterpolant;

/// Spacing of constraint checks in joint space.
///
/// A step is split into `n` equal time slices. `n` comes from the peak
/// speed of each DOF inside the step, so no DOF moves further than its
/// resolution divided by `multiplier` between two consecutive checks, even
/// where the step accelerates.
#[derive(Debug, Clone)]
pub struct CheckResolution {
    resolutions: Configuration,
    multiplier: f64,
}

impl CheckResolution {
    pub fn new(resolutions: Configuration, multiplier: f64) -> Self {
        Self {
            resolutions,
            multiplier,
        }
    }

    /// Number of checks needed for the step.
    pub fn check_count(&self, step: &StepInterpolant) -> usize {
        let duration = step.t1() - step.t0();
        let ratio = step
            .max_speed(step.t0(), step.t1())
            .iter()
            .zip(self.resolutions.iter())
            .map(|(speed, resolution)| speed * duration / resolution)
            .fold(0.0_f64, f64::max);

        ((ratio * self.multiplier).ceil() as usize).max(1)
    }

    /// Samples strictly after the step start, ending exactly at its end.
    pub fn samples<'s>(
        &self,
        step: &'s StepInterpolant,
    ) -> impl Iterator<Item = (f64, Configuration)> + use<'s> {
        let count = self.check_count(step);
        let (t0, t1) = (step.t0(), step.t1());
        (1..=count).map(move |k| {
            let t = if k == count {
                t1
            } else {
                t0 + (t1 - t0) * k as f64 / count as f64
            };
            (t, step.sample(t))
        })
    }
}
