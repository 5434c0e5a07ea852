use log::debug;

use crate::constants::{DESCENT_TIME_STEP, MAX_DESCENT_STEPS};
use crate::environment::PhysicalConstants;
use crate::errors::SimulationError;
use crate::impl_phase_state;

use super::aerodynamics::{calculate_drag, calculate_terminal_velocity};
use super::kinematics::{central_difference, EventStepper, TimeSeries};

/// Falling-body state. Velocity is positive downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentState {
    pub velocity: f64,
    pub height: f64,
}

impl_phase_state!(DescentState, velocity, height);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentSettings {
    pub time_step: f64,
    pub max_steps: usize,
}

impl Default for DescentSettings {
    fn default() -> Self {
        DescentSettings {
            time_step: DESCENT_TIME_STEP,
            max_steps: MAX_DESCENT_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentModel {
    constants: PhysicalConstants,
    mass: f64,
    thrust: f64,
}

impl DescentModel {
    pub fn new(
        constants: PhysicalConstants,
        mass: f64,
        thrust: f64,
    ) -> Result<Self, SimulationError> {
        Ok(DescentModel {
            constants,
            mass: SimulationError::require_positive("payload mass", mass)?,
            thrust: SimulationError::require_non_negative("thrust", thrust)?,
        })
    }

    pub fn with_thrust(&self, thrust: f64) -> Result<Self, SimulationError> {
        DescentModel::new(self.constants, self.mass, thrust)
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn thrust(&self) -> f64 {
        self.thrust
    }

    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    pub fn weight(&self) -> f64 {
        self.mass * self.constants.gravity()
    }

    /// `None` when the payload never settles to a constant descent speed.
    pub fn terminal_velocity(&self) -> Option<f64> {
        calculate_terminal_velocity(&self.constants, self.mass, self.thrust)
    }

    /// Downward acceleration at the given velocity.
    pub fn acceleration(&self, velocity: f64) -> f64 {
        let drag = calculate_drag(&self.constants, velocity);
        let net_force = self.weight() - drag - self.thrust;
        net_force / self.mass
    }

    pub fn derivative(&self, state: &DescentState, _time: f64) -> DescentState {
        DescentState::new(self.acceleration(state.velocity), -state.velocity)
    }

    /// The final step is cut where the height crosses zero.
    pub fn simulate(
        &self,
        initial: DescentState,
        settings: &DescentSettings,
    ) -> Result<DescentTrajectory, SimulationError> {
        let stepper = EventStepper::new(
            |state: &DescentState, time: f64| self.derivative(state, time),
            initial,
            0.0,
            settings.time_step,
            |state: &DescentState| state.height > 0.0,
            settings.max_steps,
        )?;
        let mut series = stepper.into_series()?;

        let len = series.len();
        if len >= 2 {
            let (t0, before) = (series.times()[len - 2], series.states()[len - 2]);
            let (t1, after) = (series.times()[len - 1], series.states()[len - 1]);
            if after.height < 0.0 {
                let fraction = before.height / (before.height - after.height);
                let mut contact = before + (after - before) * fraction;
                contact.height = 0.0;
                series.replace_last(t0 + (t1 - t0) * fraction, contact);
            }
        }

        let trajectory = DescentTrajectory::from_series(series)?;
        debug!(
            "Descent reached the ground after {:.3} s at {:.4} m/s (thrust {:.3} N)",
            trajectory.descent_time(),
            trajectory.impact_velocity(),
            self.thrust
        );
        Ok(trajectory)
    }

    pub fn impact_velocity(
        &self,
        initial: DescentState,
        settings: &DescentSettings,
    ) -> Result<f64, SimulationError> {
        Ok(self.simulate(initial, settings)?.impact_velocity())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescentTrajectory {
    series: TimeSeries<DescentState>,
    contact_time: f64,
    contact: DescentState,
}

impl DescentTrajectory {
    fn from_series(series: TimeSeries<DescentState>) -> Result<Self, SimulationError> {
        let (contact_time, contact) = series.last().ok_or_else(|| {
            SimulationError::InvalidTimeGrid("descent produced no samples".to_string())
        })?;
        Ok(DescentTrajectory {
            series,
            contact_time,
            contact,
        })
    }

    pub fn series(&self) -> &TimeSeries<DescentState> {
        &self.series
    }

    pub fn impact_velocity(&self) -> f64 {
        self.contact.velocity
    }

    pub fn descent_time(&self) -> f64 {
        self.contact_time
    }

    pub fn velocities(&self) -> Vec<f64> {
        self.series.component(|s| s.velocity)
    }

    pub fn heights(&self) -> Vec<f64> {
        self.series.component(|s| s.height)
    }

    pub fn accelerations(&self) -> Result<Vec<f64>, SimulationError> {
        central_difference(&self.velocities(), self.series.times())
    }
}
