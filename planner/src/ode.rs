//! Dormand-Prince 5(4) solver with local error control.
//!
//! Every accepted step is handed to the caller as a [`StepInterpolant`], a
//! cubic Hermite extension through the step's endpoints and slopes, so the
//! solution can be resampled anywhere inside the step.

use kinematics::Configuration;

use crate::error::Fault;

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Fifth- minus fourth-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const MIN_STEP: f64 = 1e-12;

/// One accepted solver step and its continuous extension.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInterpolant {
    t0: f64,
    t1: f64,
    y0: Configuration,
    y1: Configuration,
    f0: Configuration,
    f1: Configuration,
}

impl StepInterpolant {
    pub fn new(
        (t0, y0, f0): (f64, Configuration, Configuration),
        (t1, y1, f1): (f64, Configuration, Configuration),
    ) -> Self {
        Self { t0, t1, y0, y1, f0, f1 }
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn t1(&self) -> f64 {
        self.t1
    }

    pub fn start(&self) -> &Configuration {
        &self.y0
    }

    pub fn end(&self) -> &Configuration {
        &self.y1
    }

    pub fn sample(&self, t: f64) -> Configuration {
        let h = self.t1 - self.t0;
        if h <= 0.0 || t >= self.t1 {
            return self.y1.clone();
        }
        if t <= self.t0 {
            return self.y0.clone();
        }

        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        &self.y0 * h00 + &self.f0 * (h10 * h) + &self.y1 * h01 + &self.f1 * (h11 * h)
    }

    /// Largest per-DOF speed of the interpolant over `[from, to]`.
    pub fn max_speed(&self, from: f64, to: f64) -> Configuration {
        let h = self.t1 - self.t0;
        if h <= 0.0 {
            return Configuration::zeros(self.y0.len());
        }
        let s_from = ((from - self.t0) / h).clamp(0.0, 1.0);
        let s_to = ((to - self.t0) / h).clamp(0.0, 1.0);

        // dq/dt = a s^2 + b s + f0 in the normalized step time s.
        let chord = (&self.y1 - &self.y0) / h;
        let a = &self.f0 * 3.0 + &self.f1 * 3.0 - &chord * 6.0;
        let b = &chord * 6.0 - &self.f0 * 4.0 - &self.f1 * 2.0;

        Configuration::from_fn(self.y0.len(), |i, _| {
            let speed = |s: f64| (a[i] * s * s + b[i] * s + self.f0[i]).abs();
            let mut bound = speed(s_from).max(speed(s_to));
            if a[i] != 0.0 {
                let vertex = -b[i] / (2.0 * a[i]);
                if vertex > s_from && vertex < s_to {
                    bound = bound.max(speed(vertex));
                }
            }
            bound
        })
    }
}

/// Piecewise continuous solution assembled from accepted steps.
#[derive(Debug, Clone)]
pub struct ContinuousSolution {
    initial: Configuration,
    steps: Vec<StepInterpolant>,
}

impl ContinuousSolution {
    pub fn new(initial: Configuration) -> Self {
        Self {
            initial,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: StepInterpolant) {
        self.steps.push(step);
    }

    pub fn end_time(&self) -> f64 {
        self.steps.last().map_or(0.0, StepInterpolant::t1)
    }

    pub fn sample(&self, t: f64) -> Configuration {
        let index = self.steps.partition_point(|step| step.t1 < t);
        match self.steps.get(index) {
            Some(step) if t > step.t0 => step.sample(t),
            Some(step) => step.start().clone(),
            None => self
                .steps
                .last()
                .map_or_else(|| self.initial.clone(), |step| step.end().clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverExit {
    /// Integrated all the way to the requested end time.
    Completed,
    /// The step callback asked to stop.
    Interrupted,
}

/// Right-hand side of the ODE plus the consumer of accepted steps.
pub trait OdeSystem {
    fn velocity(&mut self, t: f64, y: &Configuration) -> Result<Configuration, Fault>;

    fn on_step(&mut self, step: &StepInterpolant) -> StepControl;
}

/// A field closure paired with a step closure.
impl<F, S> OdeSystem for (F, S)
where
    F: FnMut(f64, &Configuration) -> Configuration,
    S: FnMut(&StepInterpolant) -> StepControl,
{
    fn velocity(&mut self, t: f64, y: &Configuration) -> Result<Configuration, Fault> {
        Ok((self.0)(t, y))
    }

    fn on_step(&mut self, step: &StepInterpolant) -> StepControl {
        (self.1)(step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DormandPrince {
    pub first_step: f64,
    pub atol: f64,
    pub rtol: f64,
    pub max_steps: usize,
}

impl DormandPrince {
    /// Integrates `dy/dt = system.velocity(t, y)` from `t = 0` to `t_end`,
    /// handing every accepted step to the system in time order.
    pub fn integrate<S: OdeSystem>(
        &self,
        system: &mut S,
        y0: Configuration,
        t_end: f64,
    ) -> Result<SolverExit, Fault> {
        let mut t = 0.0;
        let mut y = y0;
        let mut k1 = evaluate(system, t, &y)?;
        let mut h = self.first_step.min(t_end);
        let mut attempts = 0;

        while t < t_end {
            if attempts >= self.max_steps {
                return Err(Fault::integrator(format!(
                    "exceeded {} steps at t = {t:.6}",
                    self.max_steps
                )));
            }
            attempts += 1;

            h = h.min(t_end - t);
            if h <= MIN_STEP * t.abs().max(1.0) {
                return Err(Fault::integrator(format!("step size underflow at t = {t:.6}")));
            }

            let k2 = evaluate(system, t + C2 * h, &stage(&y, h, &[(A21, &k1)]))?;
            let k3 = evaluate(system, t + C3 * h, &stage(&y, h, &[(A31, &k1), (A32, &k2)]))?;
            let k4 = evaluate(
                system,
                t + C4 * h,
                &stage(&y, h, &[(A41, &k1), (A42, &k2), (A43, &k3)]),
            )?;
            let k5 = evaluate(
                system,
                t + C5 * h,
                &stage(&y, h, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
            )?;
            let k6 = evaluate(
                system,
                t + h,
                &stage(&y, h, &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)]),
            )?;
            let y_new = stage(&y, h, &[(B1, &k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)]);
            let k7 = evaluate(system, t + h, &y_new)?;

            let error = stage(
                &Configuration::zeros(y.len()),
                h,
                &[(E1, &k1), (E3, &k3), (E4, &k4), (E5, &k5), (E6, &k6), (E7, &k7)],
            );
            let norm = self.error_norm(&error, &y, &y_new);
            if !norm.is_finite() {
                return Err(Fault::integrator(format!("non-finite error estimate at t = {t:.6}")));
            }

            if norm <= 1.0 {
                let t_next = if t_end - (t + h) <= f64::EPSILON * t_end.abs().max(1.0) {
                    t_end
                } else {
                    t + h
                };
                let step = StepInterpolant::new((t, y, k1), (t_next, y_new, k7));
                let control = system.on_step(&step);

                t = step.t1;
                y = step.y1;
                k1 = step.f1;
                h *= growth_factor(norm);

                if control == StepControl::Stop {
                    return Ok(SolverExit::Interrupted);
                }
            } else {
                h *= growth_factor(norm).min(1.0);
            }
        }

        Ok(SolverExit::Completed)
    }

    fn error_norm(&self, error: &Configuration, y: &Configuration, y_new: &Configuration) -> f64 {
        if error.is_empty() {
            return 0.0;
        }
        let sum: f64 = error
            .iter()
            .zip(y.iter().zip(y_new.iter()))
            .map(|(e, (a, b))| {
                let scale = self.atol + self.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / error.len() as f64).sqrt()
    }
}

fn growth_factor(norm: f64) -> f64 {
    if norm == 0.0 {
        MAX_FACTOR
    } else {
        (SAFETY * norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
    }
}

fn stage(y: &Configuration, h: f64, terms: &[(f64, &Configuration)]) -> Configuration {
    let mut out = y.clone();
    for (coefficient, k) in terms {
        out.axpy(h * coefficient, *k, 1.0);
    }
    out
}

fn evaluate<S: OdeSystem>(system: &mut S, t: f64, y: &Configuration) -> Result<Configuration, Fault> {
    let velocity = system.velocity(t, y)?;
    if velocity.len() != y.len() {
        return Err(Fault::integrator(format!(
            "velocity field returned {} components for {} DOF",
            velocity.len(),
            y.len()
        )));
    }
    if velocity.iter().any(|v| !v.is_finite()) {
        return Err(Fault::integrator(format!(
            "velocity field returned a non-finite value at t = {t:.6}"
        )));
    }
    Ok(velocity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver() -> DormandPrince {
        DormandPrince {
            first_step: 0.1,
            atol: 1e-6,
            rtol: 1e-6,
            max_steps: 10_000,
        }
    }

    fn constant(_: f64, _: &Configuration) -> Configuration {
        Configuration::from_vec(vec![1.0])
    }

    #[test]
    fn test_exponential_decay() {
        let mut solution = ContinuousSolution::new(Configuration::from_vec(vec![1.0]));
        let exit = {
            let mut system = (
                |_: f64, y: &Configuration| -> Configuration { -y },
                |step: &StepInterpolant| {
                    solution.push(step.clone());
                    StepControl::Continue
                },
            );
            solver()
                .integrate(&mut system, Configuration::from_vec(vec![1.0]), 1.0)
                .unwrap()
        };

        assert_eq!(exit, SolverExit::Completed);
        assert_eq!(solution.end_time(), 1.0);
        assert_relative_eq!(solution.sample(1.0)[0], (-1.0_f64).exp(), epsilon = 1e-5);
        assert_relative_eq!(solution.sample(0.37)[0], (-0.37_f64).exp(), epsilon = 1e-4);
    }

    #[test]
    fn test_constant_field_grows_steps() {
        let mut widths = Vec::new();
        {
            let mut system = (constant, |step: &StepInterpolant| {
                widths.push(step.t1() - step.t0());
                let probe = step.t0() + 0.05;
                assert_relative_eq!(step.sample(probe)[0], probe, epsilon = 1e-9);
                StepControl::Continue
            });
            solver()
                .integrate(&mut system, Configuration::from_vec(vec![0.0]), 10.0)
                .unwrap();
        }

        assert_relative_eq!(widths[0], 0.1);
        assert_relative_eq!(widths[1], 1.0, epsilon = 1e-9);
        assert!(widths.len() <= 4);
    }

    #[test]
    fn test_stop_interrupts() {
        let mut calls = 0;
        let exit = {
            let mut system = (constant, |_: &StepInterpolant| {
                calls += 1;
                StepControl::Stop
            });
            solver()
                .integrate(&mut system, Configuration::from_vec(vec![0.0]), 10.0)
                .unwrap()
        };

        assert_eq!(exit, SolverExit::Interrupted);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_non_finite_field_fails() {
        let mut system = (
            |_: f64, _: &Configuration| Configuration::from_vec(vec![f64::NAN]),
            |_: &StepInterpolant| StepControl::Continue,
        );
        let result = solver().integrate(&mut system, Configuration::from_vec(vec![0.0]), 1.0);
        assert!(matches!(result, Err(Fault::IntegratorFailure(_))));
    }

    #[test]
    fn test_max_speed_of_cubic_step() {
        // Endpoint data of q = t^3 on [0, 1], which the Hermite cubic
        // reproduces exactly.
        let step = StepInterpolant::new(
            (0.0, Configuration::from_vec(vec![0.0]), Configuration::from_vec(vec![0.0])),
            (1.0, Configuration::from_vec(vec![1.0]), Configuration::from_vec(vec![3.0])),
        );

        assert_relative_eq!(step.max_speed(0.0, 1.0)[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(step.max_speed(0.0, 0.5)[0], 0.75, epsilon = 1e-12);
        assert_relative_eq!(step.sample(0.5)[0], 0.125, epsilon = 1e-12);
    }

    #[test]
    fn test_max_speed_finds_interior_peak() {
        // q = 3t^2 - 2t^3 peaks in speed at t = 0.5 with 1.5.
        let step = StepInterpolant::new(
            (0.0, Configuration::from_vec(vec![0.0]), Configuration::from_vec(vec![0.0])),
            (1.0, Configuration::from_vec(vec![1.0]), Configuration::from_vec(vec![0.0])),
        );
        assert_relative_eq!(step.max_speed(0.0, 1.0)[0], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_solution_sample_before_first_step() {
        let solution = ContinuousSolution::new(Configuration::from_vec(vec![2.0]));
        assert_eq!(solution.sample(0.0)[0], 2.0);
        assert_eq!(solution.end_time(), 0.0);
    }
}
