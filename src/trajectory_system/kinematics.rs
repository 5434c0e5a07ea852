use std::ops::{Add, Mul};

use crate::errors::SimulationError;
use crate::utils::sampling::linspace;

/// A state vector that can be advanced by an explicit integrator.
pub trait OdeState: Copy + Add<Output = Self> + Mul<f64, Output = Self> {
    fn is_finite(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<S> {
    times: Vec<f64>,
    states: Vec<S>,
}

impl<S: Copy> TimeSeries<S> {
    fn with_capacity(capacity: usize) -> Self {
        TimeSeries {
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, time: f64, state: S) {
        self.times.push(time);
        self.states.push(state);
    }

    pub(crate) fn replace_last(&mut self, time: f64, state: S) {
        if let (Some(t), Some(s)) = (self.times.last_mut(), self.states.last_mut()) {
            *t = time;
            *s = state;
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn first(&self) -> Option<(f64, S)> {
        Some((*self.times.first()?, *self.states.first()?))
    }

    pub fn last(&self) -> Option<(f64, S)> {
        Some((*self.times.last()?, *self.states.last()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, S)> + '_ {
        self.times.iter().copied().zip(self.states.iter().copied())
    }

    /// Extracts one scalar channel of the state, e.g. `|s| s.velocity`.
    pub fn component<F>(&self, channel: F) -> Vec<f64>
    where
        F: Fn(&S) -> f64,
    {
        self.states.iter().map(channel).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self, SimulationError> {
        if points.is_empty() {
            return Err(SimulationError::InvalidTimeGrid(
                "grid must contain at least one point".to_string(),
            ));
        }
        if let Some(bad) = points.iter().find(|t| !t.is_finite()) {
            return Err(SimulationError::InvalidTimeGrid(format!(
                "non-finite time {}",
                bad
            )));
        }
        if let Some(pair) = points.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(SimulationError::InvalidTimeGrid(format!(
                "times must be strictly increasing ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        Ok(TimeGrid { points })
    }

    /// `count` evenly spaced points from `start` to `end`, both included.
    pub fn linspace(start: f64, end: f64, count: usize) -> Result<Self, SimulationError> {
        TimeGrid::new(linspace(start, end, count))
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntegratorOptions {
    /// Largest internal RK4 step. Grid intervals wider than this are split
    /// into equal substeps.
    pub max_step: Option<f64>,
}

/// Classical RK4, sampled at every grid point.
pub fn integrate_grid<S, F>(
    derivative: F,
    initial: S,
    grid: &TimeGrid,
    options: &IntegratorOptions,
) -> Result<TimeSeries<S>, SimulationError>
where
    S: OdeState,
    F: Fn(&S, f64) -> S,
{
    if let Some(max_step) = options.max_step {
        if !(max_step.is_finite() && max_step > 0.0) {
            return Err(SimulationError::DomainError {
                quantity: "max_step",
                requirement: "finite and positive",
                value: max_step,
            });
        }
    }

    let points = grid.points();
    let mut series = TimeSeries::with_capacity(points.len());
    if !initial.is_finite() {
        return Err(SimulationError::NonFiniteState { time: points[0] });
    }
    series.push(points[0], initial);

    let mut state = initial;
    for window in points.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        let interval = t1 - t0;
        let substeps = match options.max_step {
            // the slack keeps round-off from adding a whole extra substep
            Some(max_step) => (interval / max_step * (1.0 - 1e-9)).ceil().max(1.0) as usize,
            None => 1,
        };
        let h = interval / substeps as f64;

        for i in 0..substeps {
            state = rk4_step(&derivative, state, t0 + h * i as f64, h);
        }
        if !state.is_finite() {
            return Err(SimulationError::NonFiniteState { time: t1 });
        }
        series.push(t1, state);
    }

    Ok(series)
}

fn rk4_step<S, F>(derivative: &F, state: S, t: f64, h: f64) -> S
where
    S: OdeState,
    F: Fn(&S, f64) -> S,
{
    let k1 = derivative(&state, t);
    let k2 = derivative(&(state + k1 * (h / 2.0)), t + h / 2.0);
    let k3 = derivative(&(state + k2 * (h / 2.0)), t + h / 2.0);
    let k4 = derivative(&(state + k3 * h), t + h);

    state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
}

/// Explicit-Euler stepper. Yields the initial state, then every step up to
/// and including the first state failing `continue_while`; after
/// `max_steps` it yields [`SimulationError::RunawayIntegration`].
pub struct EventStepper<S, F, P> {
    derivative: F,
    continue_while: P,
    state: S,
    start_time: f64,
    time: f64,
    dt: f64,
    steps: usize,
    max_steps: usize,
    started: bool,
    finished: bool,
}

impl<S, F, P> EventStepper<S, F, P>
where
    S: OdeState,
    F: Fn(&S, f64) -> S,
    P: Fn(&S) -> bool,
{
    pub fn new(
        derivative: F,
        initial: S,
        start_time: f64,
        dt: f64,
        continue_while: P,
        max_steps: usize,
    ) -> Result<Self, SimulationError> {
        SimulationError::require_positive("time step", dt)?;
        SimulationError::require_finite("start time", start_time)?;
        if !initial.is_finite() {
            return Err(SimulationError::NonFiniteState { time: start_time });
        }
        Ok(EventStepper {
            derivative,
            continue_while,
            state: initial,
            start_time,
            time: start_time,
            dt,
            steps: 0,
            max_steps,
            started: false,
            finished: false,
        })
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn into_series(self) -> Result<TimeSeries<S>, SimulationError> {
        let mut series = TimeSeries::with_capacity(1024);
        for sample in self {
            let (time, state) = sample?;
            series.push(time, state);
        }
        Ok(series)
    }
}

impl<S, F, P> Iterator for EventStepper<S, F, P>
where
    S: OdeState,
    F: Fn(&S, f64) -> S,
    P: Fn(&S) -> bool,
{
    type Item = Result<(f64, S), SimulationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if !self.started {
            self.started = true;
            if !(self.continue_while)(&self.state) {
                self.finished = true;
            }
            return Some(Ok((self.time, self.state)));
        }

        if self.steps >= self.max_steps {
            self.finished = true;
            return Some(Err(SimulationError::RunawayIntegration {
                steps: self.steps,
                time: self.time,
            }));
        }

        let rate = (self.derivative)(&self.state, self.time);
        self.state = self.state + rate * self.dt;
        self.steps += 1;
        // recomputed from the step count so long runs do not accumulate drift
        self.time = self.start_time + self.dt * self.steps as f64;

        if !self.state.is_finite() {
            self.finished = true;
            return Some(Err(SimulationError::NonFiniteState { time: self.time }));
        }
        if !(self.continue_while)(&self.state) {
            self.finished = true;
        }

        Some(Ok((self.time, self.state)))
    }
}

/// Second-order central difference on a possibly non-uniform grid,
/// one-sided at the two ends.
pub fn central_difference(values: &[f64], times: &[f64]) -> Result<Vec<f64>, SimulationError> {
    if values.len() != times.len() {
        return Err(SimulationError::InvalidTimeGrid(format!(
            "{} values sampled at {} times",
            values.len(),
            times.len()
        )));
    }

    let n = values.len();
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![0.0]),
        _ => {}
    }

    let mut gradient = vec![0.0; n];
    gradient[0] = (values[1] - values[0]) / (times[1] - times[0]);
    gradient[n - 1] = (values[n - 1] - values[n - 2]) / (times[n - 1] - times[n - 2]);

    for i in 1..n - 1 {
        let hs = times[i] - times[i - 1];
        let hd = times[i + 1] - times[i];
        gradient[i] = (hs * hs * values[i + 1] + (hd * hd - hs * hs) * values[i]
            - hd * hd * values[i - 1])
            / (hs * hd * (hd + hs));
    }

    Ok(gradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Oscillator {
        position: f64,
        velocity: f64,
    }

    crate::impl_phase_state!(Oscillator, position, velocity);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Fall {
        velocity: f64,
        height: f64,
    }

    crate::impl_phase_state!(Fall, velocity, height);

    fn unit_oscillator(state: &Oscillator, _t: f64) -> Oscillator {
        Oscillator::new(state.velocity, -state.position)
    }

    #[test]
    fn test_linspace_includes_endpoints() {
        let grid = TimeGrid::linspace(0.0, 3.0, 3001).unwrap();
        assert_eq!(grid.len(), 3001);
        assert_eq!(grid.points()[0], 0.0);
        assert_eq!(grid.points()[3000], 3.0);
        assert_relative_eq!(grid.points()[1], 0.001, epsilon = 1e-15);
    }

    #[test]
    fn test_invalid_grids_are_rejected() {
        assert!(matches!(
            TimeGrid::new(Vec::new()),
            Err(SimulationError::InvalidTimeGrid(_))
        ));
        assert!(matches!(
            TimeGrid::new(vec![0.0, 1.0, 1.0]),
            Err(SimulationError::InvalidTimeGrid(_))
        ));
        assert!(matches!(
            TimeGrid::new(vec![0.0, f64::NAN]),
            Err(SimulationError::InvalidTimeGrid(_))
        ));
        assert!(TimeGrid::linspace(1.0, 0.0, 5).is_err());
    }

    #[test]
    fn test_rk4_tracks_harmonic_oscillator() {
        let grid = TimeGrid::linspace(0.0, 2.0 * std::f64::consts::PI, 629).unwrap();
        let series = integrate_grid(
            unit_oscillator,
            Oscillator::new(0.0, 1.0),
            &grid,
            &IntegratorOptions::default(),
        )
        .unwrap();

        assert_eq!(series.len(), grid.len());
        for (t, state) in series.iter() {
            assert_relative_eq!(state.position, t.sin(), epsilon = 1e-7);
            assert_relative_eq!(state.velocity, t.cos(), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_max_step_subdivides_coarse_grid() {
        let grid = TimeGrid::linspace(0.0, 5.0, 6).unwrap();
        let decay = |state: &Fall, _t: f64| Fall::new(-state.velocity, 0.0);

        let coarse = integrate_grid(
            decay,
            Fall::new(1.0, 0.0),
            &grid,
            &IntegratorOptions::default(),
        )
        .unwrap();
        let fine = integrate_grid(
            decay,
            Fall::new(1.0, 0.0),
            &grid,
            &IntegratorOptions {
                max_step: Some(0.01),
            },
        )
        .unwrap();

        let exact = (-5.0_f64).exp();
        let coarse_error = (coarse.last().unwrap().1.velocity - exact).abs();
        let fine_error = (fine.last().unwrap().1.velocity - exact).abs();
        assert!(fine_error < coarse_error);
        assert!(fine_error < 1e-10, "fine error {}", fine_error);
        assert_eq!(fine.len(), 6);
    }

    #[test]
    fn test_non_finite_state_is_reported() {
        let grid = TimeGrid::linspace(0.0, 1.0, 11).unwrap();
        let blow_up = |state: &Fall, _t: f64| Fall::new(state.velocity * 1e300, 0.0);
        let result = integrate_grid(
            blow_up,
            Fall::new(1e10, 0.0),
            &grid,
            &IntegratorOptions::default(),
        );
        assert!(matches!(
            result,
            Err(SimulationError::NonFiniteState { .. })
        ));
    }

    #[test]
    fn test_event_stepper_stops_after_predicate_fails() {
        let gravity = |state: &Fall, _t: f64| Fall::new(9.81, -state.velocity);
        let stepper = EventStepper::new(
            gravity,
            Fall::new(0.0, 10.0),
            0.0,
            0.01,
            |state: &Fall| state.height > 0.0,
            10_000,
        )
        .unwrap();

        let series = stepper.into_series().unwrap();
        let (_, last) = series.last().unwrap();
        assert!(last.height <= 0.0);
        let heights = series.component(|s| s.height);
        assert!(heights[..heights.len() - 1].iter().all(|h| *h > 0.0));
        assert_eq!(series.first().unwrap(), (0.0, Fall::new(0.0, 10.0)));
    }

    #[test]
    fn test_event_stepper_applies_euler_update() {
        let gravity = |_state: &Fall, _t: f64| Fall::new(2.0, -1.0);
        let mut stepper = EventStepper::new(
            gravity,
            Fall::new(0.0, 1.0),
            0.0,
            0.5,
            |state: &Fall| state.height > 0.0,
            10,
        )
        .unwrap();

        assert_eq!(stepper.next().unwrap().unwrap(), (0.0, Fall::new(0.0, 1.0)));
        assert_eq!(stepper.next().unwrap().unwrap(), (0.5, Fall::new(1.0, 0.5)));
        assert_eq!(stepper.next().unwrap().unwrap(), (1.0, Fall::new(2.0, 0.0)));
        assert!(stepper.next().is_none());
        assert_eq!(stepper.steps_taken(), 2);
    }

    #[test]
    fn test_event_stepper_detects_runaway() {
        let hover = |_state: &Fall, _t: f64| Fall::new(0.0, 0.0);
        let stepper = EventStepper::new(
            hover,
            Fall::new(0.0, 5.0),
            0.0,
            0.001,
            |state: &Fall| state.height > 0.0,
            500,
        )
        .unwrap();

        match stepper.into_series() {
            Err(SimulationError::RunawayIntegration { steps, time }) => {
                assert_eq!(steps, 500);
                assert_relative_eq!(time, 0.5, epsilon = 1e-12);
            }
            other => panic!("expected runaway, got {:?}", other),
        }
    }

    #[test]
    fn test_event_stepper_rejects_bad_time_step() {
        let hover = |_state: &Fall, _t: f64| Fall::new(0.0, 0.0);
        let result = EventStepper::new(
            hover,
            Fall::new(0.0, 5.0),
            0.0,
            0.0,
            |state: &Fall| state.height > 0.0,
            10,
        );
        assert!(matches!(result, Err(SimulationError::DomainError { .. })));
    }

    #[test]
    fn test_central_difference_of_quadratic() {
        let times = vec![0.0, 0.1, 0.3, 0.6, 1.0];
        let values: Vec<f64> = times.iter().map(|t| t * t).collect();
        let gradient = central_difference(&values, &times).unwrap();

        // exact for quadratics in the interior, first order at the edges
        for i in 1..times.len() - 1 {
            assert_relative_eq!(gradient[i], 2.0 * times[i], epsilon = 1e-12);
        }
        assert_relative_eq!(gradient[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(gradient[4], 1.6, epsilon = 1e-12);
    }

    #[test]
    fn test_central_difference_edge_cases() {
        assert!(central_difference(&[], &[]).unwrap().is_empty());
        assert_eq!(central_difference(&[3.0], &[0.0]).unwrap(), vec![0.0]);
        assert!(central_difference(&[1.0, 2.0], &[0.0]).is_err());
    }
}
