//! Scores candidate capsule designs as a cost plus named residuals.

use log::trace;
use serde::Deserialize;

use crate::absorption_system::impact::{ImpactModel, ImpactResponse, ImpactSettings};
use crate::constants::{
    DISPLACEMENT_WEIGHT, G_FORCE_WEIGHT, INFEASIBLE_PENALTY, MAX_ACCELERATION, TARGET_DISPLACEMENT,
};
use crate::environment::PhysicalConstants;
use crate::errors::{DesignError, InfeasiblePoint, SimulationError};
use crate::trajectory_system::descent::{DescentModel, DescentSettings, DescentState};

use super::parameters::{ParameterBounds, ParameterVector};
use super::problem::{ConstraintKind, Evaluation, NonlinearProblem, Residual};

/// Whether the displacement target is only a cost term or also a hard
/// equality constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementMode {
    #[default]
    Bounded,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementMeasure {
    /// max(x) − min(x)
    #[default]
    PeakToPeak,
    /// max |x|
    Peak,
}

impl DisplacementMeasure {
    pub fn of(&self, response: &ImpactResponse) -> f64 {
        match self {
            DisplacementMeasure::PeakToPeak => response.peak_to_peak_displacement(),
            DisplacementMeasure::Peak => response.peak_displacement(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignTargets {
    pub target_displacement: f64,
    pub max_acceleration: f64,
    pub max_displacement: Option<f64>,
    pub mode: DisplacementMode,
    pub measure: DisplacementMeasure,
}

impl Default for DesignTargets {
    fn default() -> Self {
        DesignTargets {
            target_displacement: TARGET_DISPLACEMENT,
            max_acceleration: MAX_ACCELERATION,
            max_displacement: None,
            mode: DisplacementMode::default(),
            measure: DisplacementMeasure::default(),
        }
    }
}

impl DesignTargets {
    pub fn validate(&self) -> Result<(), SimulationError> {
        SimulationError::require_positive("target displacement", self.target_displacement)?;
        SimulationError::require_positive("maximum acceleration", self.max_acceleration)?;
        if let Some(limit) = self.max_displacement {
            SimulationError::require_positive("maximum displacement", limit)?;
        }
        Ok(())
    }
}

/// Units the two cost terms are measured in before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostScale {
    /// Displacement error in metres plus peak g-force in g.
    Absolute,
    /// Displacement error over the target plus peak g-force over the limit.
    #[default]
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub displacement: f64,
    pub g_force: f64,
    pub scale: CostScale,
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights {
            displacement: DISPLACEMENT_WEIGHT,
            g_force: G_FORCE_WEIGHT,
            scale: CostScale::default(),
        }
    }
}

/// Descent that is re-run for every candidate thrust.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentScenario {
    pub model: DescentModel,
    pub initial: DescentState,
    pub settings: DescentSettings,
}

impl DescentScenario {
    pub fn impact_velocity(&self, thrust: Option<f64>) -> Result<f64, SimulationError> {
        let model = match thrust {
            Some(thrust) => self.model.with_thrust(thrust)?,
            None => self.model,
        };
        model.impact_velocity(self.initial, &self.settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ImpactSource {
    Fixed(f64),
    Descent(DescentScenario),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignEvaluator {
    constants: PhysicalConstants,
    capsule_mass: f64,
    gravity_bias: bool,
    impact_settings: ImpactSettings,
    source: ImpactSource,
    targets: DesignTargets,
    weights: CostWeights,
    bounds: ParameterBounds,
}

impl DesignEvaluator {
    pub fn new(
        constants: PhysicalConstants,
        capsule_mass: f64,
        impact_velocity: f64,
        targets: DesignTargets,
    ) -> Result<Self, DesignError> {
        SimulationError::require_positive("capsule mass", capsule_mass)?;
        SimulationError::require_finite("impact velocity", impact_velocity)?;
        targets.validate()?;

        Ok(DesignEvaluator {
            constants,
            capsule_mass,
            gravity_bias: false,
            impact_settings: ImpactSettings::default(),
            source: ImpactSource::Fixed(impact_velocity),
            targets,
            weights: CostWeights::default(),
            bounds: ParameterBounds::default(),
        })
    }

    /// Makes thrust a design variable: every candidate re-runs `descent`
    /// with its own thrust to get the impact velocity.
    pub fn with_thrust_search(mut self, descent: DescentScenario) -> Self {
        self.source = ImpactSource::Descent(descent);
        self
    }

    pub fn with_targets(mut self, targets: DesignTargets) -> Result<Self, SimulationError> {
        targets.validate()?;
        self.targets = targets;
        Ok(self)
    }

    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_impact_settings(mut self, settings: ImpactSettings) -> Self {
        self.impact_settings = settings;
        self
    }

    pub fn with_gravity_bias(mut self, enabled: bool) -> Self {
        self.gravity_bias = enabled;
        self
    }

    pub fn optimizes_thrust(&self) -> bool {
        matches!(self.source, ImpactSource::Descent(_))
    }

    pub fn targets(&self) -> &DesignTargets {
        &self.targets
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    pub fn impact_velocity(&self, params: &ParameterVector) -> Result<f64, SimulationError> {
        match &self.source {
            ImpactSource::Fixed(velocity) => Ok(*velocity),
            ImpactSource::Descent(descent) => descent.impact_velocity(params.thrust),
        }
    }

    pub fn impact_model(&self, params: &ParameterVector) -> Result<ImpactModel, SimulationError> {
        Ok(ImpactModel::new(
            self.constants,
            self.capsule_mass,
            params.spring_constant,
            params.damping_coefficient,
        )?
        .with_gravity_bias(self.gravity_bias))
    }

    pub fn simulate(&self, params: &ParameterVector) -> Result<ImpactResponse, SimulationError> {
        let impact_velocity = self.impact_velocity(params)?;
        self.impact_model(params)?
            .simulate(impact_velocity, &self.impact_settings)
    }

    pub fn cost(&self, response: &ImpactResponse) -> f64 {
        let target = self.targets.target_displacement;
        let displacement_error = (target - self.targets.measure.of(response)).abs();
        let g_force = response.peak_g_force();

        let (displacement_term, g_force_term) = match self.weights.scale {
            CostScale::Absolute => (displacement_error, g_force),
            CostScale::Normalized => {
                let g_force_limit = self.targets.max_acceleration / self.constants.gravity();
                (displacement_error / target, g_force / g_force_limit)
            }
        };
        self.weights.displacement * displacement_term + self.weights.g_force * g_force_term
    }

    fn constraints(&self, response: &ImpactResponse) -> Vec<Residual> {
        let mut constraints = vec![Residual::inequality(
            "acceleration_limit",
            self.targets.max_acceleration - response.peak_acceleration(),
        )];
        if let Some(limit) = self.targets.max_displacement {
            constraints.push(Residual::inequality(
                "displacement_limit",
                limit - response.peak_displacement(),
            ));
        }
        if self.targets.mode == DisplacementMode::Exact {
            constraints.push(Residual::equality(
                "displacement",
                self.targets.target_displacement - self.targets.measure.of(response),
            ));
        }
        constraints
    }

    fn score(&self, params: &ParameterVector) -> Result<Evaluation, InfeasiblePoint> {
        let response = self.simulate(params)?;
        let cost = self.cost(&response);
        if !cost.is_finite() {
            return Err(InfeasiblePoint::NonFinite("cost"));
        }
        let constraints = self.constraints(&response);
        if let Some(residual) = constraints.iter().find(|r| !r.value.is_finite()) {
            return Err(InfeasiblePoint::NonFinite(residual.name));
        }

        Ok(Evaluation {
            cost,
            constraints,
            bounds: self.bounds.residuals(params),
        })
    }

    fn penalty(&self, params: &ParameterVector) -> Evaluation {
        let mut names = vec![("acceleration_limit", ConstraintKind::Inequality)];
        if self.targets.max_displacement.is_some() {
            names.push(("displacement_limit", ConstraintKind::Inequality));
        }
        if self.targets.mode == DisplacementMode::Exact {
            names.push(("displacement", ConstraintKind::Equality));
        }

        Evaluation {
            cost: INFEASIBLE_PENALTY,
            constraints: names
                .into_iter()
                .map(|(name, kind)| match kind {
                    ConstraintKind::Inequality => Residual::inequality(name, -INFEASIBLE_PENALTY),
                    ConstraintKind::Equality => Residual::equality(name, INFEASIBLE_PENALTY),
                })
                .collect(),
            bounds: self.bounds.residuals(params),
        }
    }

    /// Designs that cannot be simulated get penalty values.
    pub fn evaluate_design(&self, params: &ParameterVector) -> Evaluation {
        match self.score(params) {
            Ok(evaluation) => evaluation,
            Err(reason) => {
                trace!("Infeasible design {}: {}", params, reason);
                self.penalty(params)
            }
        }
    }
}

impl NonlinearProblem for DesignEvaluator {
    fn dimension(&self) -> usize {
        if self.optimizes_thrust() {
            3
        } else {
            2
        }
    }

    fn evaluate(&self, x: &[f64]) -> Evaluation {
        match ParameterVector::from_slice(x) {
            Ok(params) => self.evaluate_design(&params),
            Err(err) => {
                trace!("Rejected design vector {:?}: {}", x, err);
                self.penalty(&ParameterVector::default())
            }
        }
    }
}
