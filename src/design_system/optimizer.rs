use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{INITIAL_THRUST, OPTIMIZER_RESTARTS, OPTIMIZER_SEED};
use crate::errors::DesignError;

use super::evaluator::{DesignEvaluator, DesignTargets, DisplacementMode};
use super::parameters::ParameterVector;
use super::problem::{Evaluation, Residual};
use super::sqp::{minimize, BoxBounds, SolverOptions, SolverOutcome};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerOptions {
    pub solver: SolverOptions,
    /// Extra runs from random starting points when a run does not converge.
    pub restarts: usize,
    pub seed: u64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        OptimizerOptions {
            solver: SolverOptions::default(),
            restarts: OPTIMIZER_RESTARTS,
            seed: OPTIMIZER_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub parameters: ParameterVector,
    pub objective: f64,
    pub converged: bool,
    pub iterations: usize,
    pub evaluations: usize,
    pub max_violation: f64,
    pub message: String,
    pub evaluation: Evaluation,
}

impl OptimizationResult {
    pub fn constraint(&self, name: &str) -> Option<&Residual> {
        self.evaluation.residual(name)
    }
}

/// Ranks finished runs: converged first, then feasible with lower cost,
/// then smaller violation.
fn is_better(candidate: &SolverOutcome, incumbent: &SolverOutcome, tolerance: f64) -> bool {
    if candidate.converged != incumbent.converged {
        return candidate.converged;
    }
    let candidate_feasible = candidate.evaluation.is_feasible(tolerance);
    let incumbent_feasible = incumbent.evaluation.is_feasible(tolerance);
    match (candidate_feasible, incumbent_feasible) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => candidate.evaluation.cost < incumbent.evaluation.cost,
        (false, false) => {
            candidate.evaluation.max_violation() < incumbent.evaluation.max_violation()
        }
    }
}

/// Non-convergence is not an error: the best design found is returned with
/// `converged == false`. An exact-displacement run that does not converge is
/// retried from the optimum of the bounded problem before any random restart.
pub fn optimize_design(
    evaluator: &DesignEvaluator,
    initial_guess: &ParameterVector,
    options: &OptimizerOptions,
) -> Result<OptimizationResult, DesignError> {
    let bounds = evaluator.bounds();
    bounds.validate()?;

    let with_thrust = evaluator.optimizes_thrust();
    let guess = ParameterVector {
        thrust: if with_thrust {
            Some(initial_guess.thrust.unwrap_or(INITIAL_THRUST))
        } else {
            None
        },
        ..*initial_guess
    };
    let guess = bounds.clamp(&guess);
    let box_bounds = BoxBounds::new(bounds.lower(with_thrust), bounds.upper(with_thrust))?;

    info!("Optimizing capsule design from {}", guess);
    let mut best = minimize(evaluator, &guess.to_vec(), &box_bounds, &options.solver)?;
    let mut iterations = best.iterations;
    let mut evaluations = best.evaluations;

    if !best.converged && evaluator.targets().mode == DisplacementMode::Exact {
        let bounded = evaluator.with_targets(DesignTargets {
            mode: DisplacementMode::Bounded,
            ..*evaluator.targets()
        })?;
        let relaxed = minimize(&bounded, &guess.to_vec(), &box_bounds, &options.solver)?;
        debug!(
            "Warm-starting exact displacement run from bounded optimum {:?} after: {}",
            relaxed.x, best.message
        );

        let outcome = minimize(evaluator, &relaxed.x, &box_bounds, &options.solver)?;
        iterations += relaxed.iterations + outcome.iterations;
        evaluations += relaxed.evaluations + outcome.evaluations;
        if is_better(&outcome, &best, options.solver.tolerance) {
            best = outcome;
        }
    }

    if !best.converged && options.restarts > 0 {
        let mut rng = StdRng::seed_from_u64(options.seed);
        for restart in 1..=options.restarts {
            let start: Vec<f64> = box_bounds
                .lower()
                .iter()
                .zip(box_bounds.upper())
                .map(|(lo, hi)| rng.gen_range(*lo..*hi))
                .collect();
            debug!("Restart {} from {:?} after: {}", restart, start, best.message);

            let outcome = minimize(evaluator, &start, &box_bounds, &options.solver)?;
            iterations += outcome.iterations;
            evaluations += outcome.evaluations;
            if is_better(&outcome, &best, options.solver.tolerance) {
                best = outcome;
            }
            if best.converged {
                break;
            }
        }
    }

    let parameters = ParameterVector::from_slice(&best.x)?;
    let result = OptimizationResult {
        parameters,
        objective: best.evaluation.cost,
        converged: best.converged,
        iterations,
        evaluations,
        max_violation: best.evaluation.max_violation(),
        message: best.message,
        evaluation: best.evaluation,
    };

    if result.converged {
        info!(
            "Optimization converged after {} iterations ({} evaluations): {}",
            result.iterations, result.evaluations, result.parameters
        );
    } else {
        warn!(
            "Optimization did not converge ({}); best design {} violates constraints by {:.3e}",
            result.message, result.parameters, result.max_violation
        );
    }
    Ok(result)
}
