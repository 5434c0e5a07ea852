//! TOML configuration of a design study.
//!
//! Every field is optional; anything left out takes the reference value
//! from `constants.rs`.

use std::path::Path;

use serde::Deserialize;

use crate::absorption_system::impact::{AccelerationSource, ImpactSettings};
use crate::constants::*;
use crate::design_system::evaluator::{
    CostScale, CostWeights, DescentScenario, DesignTargets, DisplacementMeasure, DisplacementMode,
};
use crate::design_system::optimizer::OptimizerOptions;
use crate::design_system::parameters::{ParameterBounds, ParameterVector};
use crate::design_system::sqp::SolverOptions;
use crate::design_system::study::DesignStudy;
use crate::environment::PhysicalConstants;
use crate::errors::{ConfigError, DesignError};
use crate::trajectory_system::descent::{DescentModel, DescentSettings, DescentState};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConstantsConfig {
    pub gravity: f64,
    pub air_density: f64,
    pub nose_diameter: f64,
    pub drag_coefficient: f64,
}

impl Default for ConstantsConfig {
    fn default() -> Self {
        ConstantsConfig {
            gravity: GRAVITY,
            air_density: AIR_DENSITY_SEA_LEVEL,
            nose_diameter: NOSE_CONE_DIAMETER,
            drag_coefficient: NOSE_CONE_DRAG_COEFFICIENT,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DescentConfig {
    pub payload_mass: f64,
    pub height: f64,
    /// Downward speed when the payload is released.
    pub velocity: f64,
    pub thrust: f64,
    pub time_step: f64,
    pub max_steps: usize,
}

impl Default for DescentConfig {
    fn default() -> Self {
        DescentConfig {
            payload_mass: PAYLOAD_MASS,
            height: DEPLOYMENT_HEIGHT,
            velocity: DEPLOYMENT_VELOCITY,
            thrust: 0.0,
            time_step: DESCENT_TIME_STEP,
            max_steps: MAX_DESCENT_STEPS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImpactConfig {
    pub capsule_mass: f64,
    pub duration: f64,
    pub resolution: usize,
    pub max_step: f64,
    pub initial_displacement: f64,
    pub gravity_bias: bool,
    pub acceleration_source: AccelerationSource,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        ImpactConfig {
            capsule_mass: CAPSULE_MASS,
            duration: IMPACT_DURATION,
            resolution: IMPACT_RESOLUTION,
            max_step: IMPACT_MAX_STEP,
            initial_displacement: 0.0,
            gravity_bias: false,
            acceleration_source: AccelerationSource::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TargetsConfig {
    pub target_displacement: f64,
    pub max_acceleration: f64,
    pub max_displacement: Option<f64>,
    pub mode: DisplacementMode,
    pub measure: DisplacementMeasure,
    pub displacement_weight: f64,
    pub g_force_weight: f64,
    pub cost_scale: CostScale,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        TargetsConfig {
            target_displacement: TARGET_DISPLACEMENT,
            max_acceleration: MAX_ACCELERATION,
            max_displacement: None,
            mode: DisplacementMode::default(),
            measure: DisplacementMeasure::default(),
            displacement_weight: DISPLACEMENT_WEIGHT,
            g_force_weight: G_FORCE_WEIGHT,
            cost_scale: CostScale::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsConfig {
    pub spring_constant_min: f64,
    pub spring_constant_max: f64,
    pub damping_coefficient_min: f64,
    pub damping_coefficient_max: f64,
    pub thrust_max: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        BoundsConfig {
            spring_constant_min: SPRING_CONSTANT_MIN,
            spring_constant_max: SPRING_CONSTANT_MAX,
            damping_coefficient_min: DAMPING_COEFFICIENT_MIN,
            damping_coefficient_max: DAMPING_COEFFICIENT_MAX,
            thrust_max: THRUST_MAX,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub initial_spring_constant: f64,
    pub initial_damping_coefficient: f64,
    pub initial_thrust: f64,
    pub optimize_thrust: bool,
    pub max_iterations: usize,
    pub max_evaluations: usize,
    pub tolerance: f64,
    pub restarts: usize,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            initial_spring_constant: INITIAL_SPRING_CONSTANT,
            initial_damping_coefficient: INITIAL_DAMPING_COEFFICIENT,
            initial_thrust: INITIAL_THRUST,
            optimize_thrust: false,
            max_iterations: MAX_ITERATIONS,
            max_evaluations: MAX_EVALUATIONS,
            tolerance: OPTIMIZER_TOLERANCE,
            restarts: OPTIMIZER_RESTARTS,
            seed: OPTIMIZER_SEED,
        }
    }
}

/// Everything a design study needs, one TOML table per concern.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct DesignConfig {
    pub constants: ConstantsConfig,
    pub descent: DescentConfig,
    pub impact: ImpactConfig,
    pub targets: TargetsConfig,
    pub bounds: BoundsConfig,
    pub optimizer: OptimizerConfig,
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl DesignConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        DesignConfig::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: DesignConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.constants;
        require(positive(c.gravity), "constants.gravity must be positive")?;
        require(non_negative(c.air_density), "constants.air_density must be non-negative")?;
        require(non_negative(c.nose_diameter), "constants.nose_diameter must be non-negative")?;
        require(
            non_negative(c.drag_coefficient),
            "constants.drag_coefficient must be non-negative",
        )?;

        let d = &self.descent;
        require(positive(d.payload_mass), "descent.payload_mass must be positive")?;
        require(d.height.is_finite(), "descent.height must be finite")?;
        require(d.velocity.is_finite(), "descent.velocity must be finite")?;
        require(non_negative(d.thrust), "descent.thrust must be non-negative")?;
        require(positive(d.time_step), "descent.time_step must be positive")?;
        require(d.max_steps > 0, "descent.max_steps must be at least 1")?;

        let i = &self.impact;
        require(positive(i.capsule_mass), "impact.capsule_mass must be positive")?;
        require(positive(i.duration), "impact.duration must be positive")?;
        require(i.resolution >= 2, "impact.resolution must be at least 2")?;
        require(positive(i.max_step), "impact.max_step must be positive")?;
        require(
            i.initial_displacement.is_finite(),
            "impact.initial_displacement must be finite",
        )?;

        let t = &self.targets;
        require(
            positive(t.target_displacement),
            "targets.target_displacement must be positive",
        )?;
        require(positive(t.max_acceleration), "targets.max_acceleration must be positive")?;
        require(
            t.max_displacement.map_or(true, positive),
            "targets.max_displacement must be positive",
        )?;
        require(
            non_negative(t.displacement_weight) && non_negative(t.g_force_weight),
            "targets weights must be non-negative",
        )?;

        let b = &self.bounds;
        require(
            non_negative(b.spring_constant_min) && b.spring_constant_min < b.spring_constant_max,
            "bounds.spring_constant_min must be non-negative and below spring_constant_max",
        )?;
        require(b.spring_constant_max.is_finite(), "bounds.spring_constant_max must be finite")?;
        require(
            non_negative(b.damping_coefficient_min)
                && b.damping_coefficient_min < b.damping_coefficient_max,
            "bounds.damping_coefficient_min must be non-negative and below damping_coefficient_max",
        )?;
        require(
            b.damping_coefficient_max.is_finite(),
            "bounds.damping_coefficient_max must be finite",
        )?;
        require(positive(b.thrust_max), "bounds.thrust_max must be positive")?;

        let o = &self.optimizer;
        require(o.max_iterations > 0, "optimizer.max_iterations must be at least 1")?;
        require(o.max_evaluations > 0, "optimizer.max_evaluations must be at least 1")?;
        require(positive(o.tolerance), "optimizer.tolerance must be positive")?;
        Ok(())
    }

    pub fn to_study(&self) -> Result<DesignStudy, DesignError> {
        self.validate()?;

        let c = &self.constants;
        let constants = PhysicalConstants::from_diameter(
            c.gravity,
            c.air_density,
            c.nose_diameter,
            c.drag_coefficient,
        )?;

        let d = &self.descent;
        let descent = DescentScenario {
            model: DescentModel::new(constants, d.payload_mass, d.thrust)?,
            initial: DescentState::new(d.velocity, d.height),
            settings: DescentSettings {
                time_step: d.time_step,
                max_steps: d.max_steps,
            },
        };

        let i = &self.impact;
        let t = &self.targets;
        let b = &self.bounds;
        let o = &self.optimizer;

        let mut initial_guess =
            ParameterVector::new(o.initial_spring_constant, o.initial_damping_coefficient);
        if o.optimize_thrust {
            initial_guess = initial_guess.with_thrust(o.initial_thrust);
        }

        Ok(DesignStudy {
            constants,
            descent,
            capsule_mass: i.capsule_mass,
            impact_settings: ImpactSettings {
                duration: i.duration,
                resolution: i.resolution,
                max_step: Some(i.max_step),
                initial_displacement: i.initial_displacement,
                acceleration_source: i.acceleration_source,
            },
            gravity_bias: i.gravity_bias,
            targets: DesignTargets {
                target_displacement: t.target_displacement,
                max_acceleration: t.max_acceleration,
                max_displacement: t.max_displacement,
                mode: t.mode,
                measure: t.measure,
            },
            weights: CostWeights {
                displacement: t.displacement_weight,
                g_force: t.g_force_weight,
                scale: t.cost_scale,
            },
            bounds: ParameterBounds {
                spring_constant: (b.spring_constant_min, b.spring_constant_max),
                damping_coefficient: (b.damping_coefficient_min, b.damping_coefficient_max),
                thrust_max: b.thrust_max,
            },
            initial_guess,
            optimize_thrust: o.optimize_thrust,
            optimizer: OptimizerOptions {
                solver: SolverOptions {
                    max_iterations: o.max_iterations,
                    max_evaluations: o.max_evaluations,
                    tolerance: o.tolerance,
                    ..SolverOptions::default()
                },
                restarts: o.restarts,
                seed: o.seed,
            },
        })
    }
}
