use log::{debug, info};

use crate::absorption_system::impact::ImpactSettings;
use crate::constants::{CAPSULE_MASS, DEPLOYMENT_HEIGHT, DEPLOYMENT_VELOCITY, PAYLOAD_MASS};
use crate::environment::PhysicalConstants;
use crate::errors::DesignError;
use crate::telemetry_system::telemetry::DesignReport;
use crate::trajectory_system::descent::{DescentModel, DescentSettings, DescentState};

use super::evaluator::{CostWeights, DescentScenario, DesignEvaluator, DesignTargets};
use super::optimizer::{optimize_design, OptimizerOptions};
use super::parameters::{ParameterBounds, ParameterVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignStudy {
    pub constants: PhysicalConstants,
    pub descent: DescentScenario,
    pub capsule_mass: f64,
    pub impact_settings: ImpactSettings,
    pub gravity_bias: bool,
    pub targets: DesignTargets,
    pub weights: CostWeights,
    pub bounds: ParameterBounds,
    pub initial_guess: ParameterVector,
    pub optimize_thrust: bool,
    pub optimizer: OptimizerOptions,
}

impl DesignStudy {
    /// Study of the reference payload with every setting at its default.
    pub fn reference() -> Result<Self, DesignError> {
        let constants = PhysicalConstants::default();
        Ok(DesignStudy {
            constants,
            descent: DescentScenario {
                model: DescentModel::new(constants, PAYLOAD_MASS, 0.0)?,
                initial: DescentState::new(DEPLOYMENT_VELOCITY, DEPLOYMENT_HEIGHT),
                settings: DescentSettings::default(),
            },
            capsule_mass: CAPSULE_MASS,
            impact_settings: ImpactSettings::default(),
            gravity_bias: false,
            targets: DesignTargets::default(),
            weights: CostWeights::default(),
            bounds: ParameterBounds::default(),
            initial_guess: ParameterVector::default(),
            optimize_thrust: false,
            optimizer: OptimizerOptions::default(),
        })
    }

    pub fn evaluator(&self, impact_velocity: f64) -> Result<DesignEvaluator, DesignError> {
        let evaluator = DesignEvaluator::new(
            self.constants,
            self.capsule_mass,
            impact_velocity,
            self.targets,
        )?
        .with_weights(self.weights)
        .with_bounds(self.bounds)
        .with_impact_settings(self.impact_settings)
        .with_gravity_bias(self.gravity_bias);

        Ok(if self.optimize_thrust {
            evaluator.with_thrust_search(self.descent)
        } else {
            evaluator
        })
    }

    pub fn run(&self) -> Result<DesignReport, DesignError> {
        let baseline = self
            .descent
            .model
            .simulate(self.descent.initial, &self.descent.settings)?;
        info!(
            "Payload reaches the ground at {:.3} m/s after {:.2} s",
            baseline.impact_velocity(),
            baseline.descent_time()
        );
        if let Some(terminal) = self.descent.model.terminal_velocity() {
            debug!("Terminal velocity of the payload: {:.3} m/s", terminal);
        }

        let evaluator = self.evaluator(baseline.impact_velocity())?;
        let result = optimize_design(&evaluator, &self.initial_guess, &self.optimizer)?;

        let params = result.parameters;
        let residual = result
            .evaluation
            .most_violated(self.optimizer.solver.tolerance)
            .copied();
        let candidate = |source| DesignError::Candidate {
            params,
            residual,
            source,
        };
        let descent = match params.thrust {
            Some(thrust) => self
                .descent
                .model
                .with_thrust(thrust)
                .and_then(|model| model.simulate(self.descent.initial, &self.descent.settings))
                .map_err(candidate)?,
            None => baseline,
        };
        let response = evaluator.simulate(&params).map_err(candidate)?;

        info!(
            "Design {} peaks at {:.2} g over {:.4} m",
            params,
            response.peak_g_force(),
            response.peak_displacement()
        );
        Ok(DesignReport::new(result, descent, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SimulationError;
    use approx::assert_relative_eq;

    #[test]
    fn test_evaluator_follows_study_settings() {
        let mut study = DesignStudy::reference().unwrap();
        assert!(!study.evaluator(6.0).unwrap().optimizes_thrust());

        study.optimize_thrust = true;
        let evaluator = study.evaluator(6.0).unwrap();
        assert!(evaluator.optimizes_thrust());
        assert_eq!(evaluator.targets(), &study.targets);
    }

    #[test]
    fn test_invalid_capsule_mass_is_reported() {
        let mut study = DesignStudy::reference().unwrap();
        study.capsule_mass = 0.0;
        assert!(matches!(study.run(), Err(DesignError::Simulation(_))));
    }

    #[test]
    fn test_failed_final_design_names_violated_constraint() {
        let mut study = DesignStudy::reference().unwrap();
        study.descent.initial = DescentState::new(4.0, 2.0);
        // a single-sample impact grid cannot be simulated, so every candidate is a penalty
        study.impact_settings.resolution = 1;
        study.optimizer.restarts = 0;

        match study.run() {
            Err(DesignError::Candidate {
                residual: Some(residual),
                source: SimulationError::InvalidTimeGrid(_),
                ..
            }) => {
                assert_eq!(residual.name, "acceleration_limit");
                assert!(residual.violation() > 1.0);
            }
            other => panic!("expected a failed candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_report_matches_final_design() {
        let mut study = DesignStudy::reference().unwrap();
        study.descent.initial = DescentState::new(4.0, 2.0);
        let report = study.run().unwrap();

        let evaluator = study.evaluator(report.impact_velocity()).unwrap();
        let response = evaluator.simulate(&report.result().parameters).unwrap();
        assert_relative_eq!(
            report.response().peak_acceleration(),
            response.peak_acceleration(),
            epsilon = 1e-12
        );
        assert!(study.bounds.contains(&report.result().parameters));
    }
}
