use serde::Deserialize;

use crate::constants::{IMPACT_DURATION, IMPACT_MAX_STEP, IMPACT_RESOLUTION};
use crate::environment::PhysicalConstants;
use crate::errors::SimulationError;
use crate::impl_phase_state;
use crate::trajectory_system::kinematics::{
    central_difference, integrate_grid, IntegratorOptions, TimeGrid, TimeSeries,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactState {
    pub displacement: f64,
    pub velocity: f64,
}

impl_phase_state!(ImpactState, displacement, velocity);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelerationSource {
    /// Evaluate the equation of motion at every sample.
    #[default]
    Derivative,
    /// Differentiate the velocity samples numerically.
    VelocityGradient,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactSettings {
    pub duration: f64,
    pub resolution: usize,
    pub max_step: Option<f64>,
    pub initial_displacement: f64,
    pub acceleration_source: AccelerationSource,
}

impl Default for ImpactSettings {
    fn default() -> Self {
        ImpactSettings {
            duration: IMPACT_DURATION,
            resolution: IMPACT_RESOLUTION,
            max_step: Some(IMPACT_MAX_STEP),
            initial_displacement: 0.0,
            acceleration_source: AccelerationSource::Derivative,
        }
    }
}

impl ImpactSettings {
    pub fn time_grid(&self) -> Result<TimeGrid, SimulationError> {
        SimulationError::require_positive("impact duration", self.duration)?;
        if self.resolution < 2 {
            return Err(SimulationError::InvalidTimeGrid(format!(
                "impact resolution must be at least 2 samples, got {}",
                self.resolution
            )));
        }
        TimeGrid::linspace(0.0, self.duration, self.resolution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactModel {
    constants: PhysicalConstants,
    mass: f64,
    spring_constant: f64,
    damping_coefficient: f64,
    gravity_bias: bool,
}

impl ImpactModel {
    pub fn new(
        constants: PhysicalConstants,
        mass: f64,
        spring_constant: f64,
        damping_coefficient: f64,
    ) -> Result<Self, SimulationError> {
        Ok(ImpactModel {
            constants,
            mass: SimulationError::require_positive("capsule mass", mass)?,
            spring_constant: SimulationError::require_non_negative(
                "spring constant",
                spring_constant,
            )?,
            damping_coefficient: SimulationError::require_non_negative(
                "damping coefficient",
                damping_coefficient,
            )?,
            gravity_bias: false,
        })
    }

    /// Adds the capsule's own weight to the equation of motion.
    pub fn with_gravity_bias(mut self, enabled: bool) -> Self {
        self.gravity_bias = enabled;
        self
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn spring_constant(&self) -> f64 {
        self.spring_constant
    }

    pub fn damping_coefficient(&self) -> f64 {
        self.damping_coefficient
    }

    pub fn acceleration(&self, state: &ImpactState) -> f64 {
        let spring_force = -self.spring_constant * state.displacement;
        let damping_force = -self.damping_coefficient * state.velocity;
        let bias = if self.gravity_bias {
            self.constants.gravity()
        } else {
            0.0
        };

        (spring_force + damping_force) / self.mass + bias
    }

    pub fn derivative(&self, state: &ImpactState, _time: f64) -> ImpactState {
        ImpactState::new(state.velocity, self.acceleration(state))
    }

    /// Kinetic plus spring potential energy, ½·m·v² + ½·k·x².
    pub fn mechanical_energy(&self, state: &ImpactState) -> f64 {
        0.5 * self.mass * state.velocity.powi(2)
            + 0.5 * self.spring_constant * state.displacement.powi(2)
    }

    pub fn simulate(
        &self,
        impact_velocity: f64,
        settings: &ImpactSettings,
    ) -> Result<ImpactResponse, SimulationError> {
        SimulationError::require_finite("impact velocity", impact_velocity)?;
        let grid = settings.time_grid()?;
        let initial = ImpactState::new(settings.initial_displacement, impact_velocity);
        let options = IntegratorOptions {
            max_step: settings.max_step,
        };

        let series = integrate_grid(
            |state: &ImpactState, time: f64| self.derivative(state, time),
            initial,
            &grid,
            &options,
        )?;

        let accelerations = match settings.acceleration_source {
            AccelerationSource::Derivative => series
                .states()
                .iter()
                .map(|state| self.acceleration(state))
                .collect(),
            AccelerationSource::VelocityGradient => {
                central_difference(&series.component(|s| s.velocity), series.times())?
            }
        };

        Ok(ImpactResponse::new(
            series,
            accelerations,
            self.constants.gravity(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactResponse {
    series: TimeSeries<ImpactState>,
    accelerations: Vec<f64>,
    gravity: f64,
    peak_displacement: f64,
    peak_to_peak_displacement: f64,
    peak_acceleration: f64,
}

impl ImpactResponse {
    fn new(series: TimeSeries<ImpactState>, accelerations: Vec<f64>, gravity: f64) -> Self {
        let displacements = series.component(|s| s.displacement);
        let highest = displacements.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lowest = displacements.iter().copied().fold(f64::INFINITY, f64::min);
        let peak_displacement = displacements.iter().fold(0.0, |peak: f64, x| peak.max(x.abs()));
        let peak_acceleration = accelerations.iter().fold(0.0, |peak: f64, a| peak.max(a.abs()));

        ImpactResponse {
            series,
            accelerations,
            gravity,
            peak_displacement,
            peak_to_peak_displacement: highest - lowest,
            peak_acceleration,
        }
    }

    pub fn series(&self) -> &TimeSeries<ImpactState> {
        &self.series
    }

    pub fn times(&self) -> &[f64] {
        self.series.times()
    }

    pub fn displacements(&self) -> Vec<f64> {
        self.series.component(|s| s.displacement)
    }

    pub fn velocities(&self) -> Vec<f64> {
        self.series.component(|s| s.velocity)
    }

    pub fn accelerations(&self) -> &[f64] {
        &self.accelerations
    }

    pub fn peak_displacement(&self) -> f64 {
        self.peak_displacement
    }

    /// max(x) − min(x) over the run.
    pub fn peak_to_peak_displacement(&self) -> f64 {
        self.peak_to_peak_displacement
    }

    pub fn peak_acceleration(&self) -> f64 {
        self.peak_acceleration
    }

    pub fn peak_g_force(&self) -> f64 {
        self.peak_acceleration / self.gravity
    }

    pub fn g_forces(&self) -> Vec<f64> {
        self.accelerations.iter().map(|a| a / self.gravity).collect()
    }
}

/// Peak acceleration for every (k, c) pair; rows follow `spring_constants`.
pub fn sweep_peak_acceleration(
    constants: PhysicalConstants,
    mass: f64,
    impact_velocity: f64,
    spring_constants: &[f64],
    damping_coefficients: &[f64],
    settings: &ImpactSettings,
) -> Result<Vec<Vec<f64>>, SimulationError> {
    spring_constants
        .iter()
        .map(|&k| {
            damping_coefficients
                .iter()
                .map(|&c| {
                    let response = ImpactModel::new(constants, mass, k, c)?
                        .simulate(impact_velocity, settings)?;
                    Ok(response.peak_acceleration())
                })
                .collect()
        })
        .collect()
}
