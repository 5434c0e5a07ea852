//! Sequential quadratic programming over a box, with a damped-BFGS
//! Lagrangian Hessian and an L1 merit line search. Iterates live in
//! coordinates scaled to the unit box.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::constants::{
    INFEASIBLE_PENALTY, MAX_EVALUATIONS, MAX_ITERATIONS, OPTIMIZER_TOLERANCE,
};
use crate::errors::DesignError;

use super::problem::{ConstraintKind, Evaluation, NonlinearProblem, Residual};
use super::qp::{solve_qp, LinearRow};

const ARMIJO_FRACTION: f64 = 0.1;
const MAX_LINE_SEARCH_STEPS: usize = 10;
const ELASTIC_WEIGHT: f64 = 1e3;
const BUDGET_EXHAUSTED: &str = "evaluation budget exhausted";

/// Lower and upper limits for every variable, `lower[i] < upper[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxBounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl BoxBounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, DesignError> {
        if lower.len() != upper.len() {
            return Err(DesignError::InvalidProblem(format!(
                "{} lower bounds but {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        for (i, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(DesignError::InvalidProblem(format!(
                    "bounds of variable {} must be finite with lower < upper, got [{}, {}]",
                    i, lo, hi
                )));
            }
        }
        Ok(BoxBounds { lower, upper })
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect()
    }

    fn to_unit(&self, x: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(self.lower.iter().zip(&self.upper))
                .map(|(v, (lo, hi))| ((v - lo) / (hi - lo)).clamp(0.0, 1.0)),
        )
    }

    fn from_unit(&self, u: &DVector<f64>) -> Vec<f64> {
        u.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(v, (lo, hi))| (lo + v * (hi - lo)).clamp(*lo, *hi))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub max_iterations: usize,
    pub max_evaluations: usize,
    pub tolerance: f64,
    /// In unit-box coordinates.
    pub finite_difference_step: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: MAX_ITERATIONS,
            max_evaluations: MAX_EVALUATIONS,
            tolerance: OPTIMIZER_TOLERANCE,
            finite_difference_step: 1.49e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub x: Vec<f64>,
    pub evaluation: Evaluation,
    pub converged: bool,
    pub iterations: usize,
    pub evaluations: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
struct Sample {
    u: DVector<f64>,
    evaluation: Evaluation,
}

impl Sample {
    fn cost(&self) -> f64 {
        self.evaluation.cost
    }

    fn constraints(&self) -> &[Residual] {
        &self.evaluation.constraints
    }

    fn total_violation(&self) -> f64 {
        self.constraints().iter().map(Residual::violation).sum()
    }

    fn merit(&self, penalties: &DVector<f64>) -> f64 {
        self.cost()
            + self
                .constraints()
                .iter()
                .zip(penalties.iter())
                .map(|(residual, mu)| mu * residual.violation())
                .sum::<f64>()
    }
}

/// Replaces NaN/Inf with large finite penalties.
pub(crate) fn sanitize(mut evaluation: Evaluation) -> Evaluation {
    if !evaluation.cost.is_finite() {
        evaluation.cost = INFEASIBLE_PENALTY;
    }
    for residual in evaluation
        .constraints
        .iter_mut()
        .chain(evaluation.bounds.iter_mut())
    {
        if !residual.value.is_finite() {
            residual.value = match residual.kind {
                ConstraintKind::Inequality => -INFEASIBLE_PENALTY,
                ConstraintKind::Equality => INFEASIBLE_PENALTY,
            };
        }
    }
    evaluation
}

struct Sampler<'a, P> {
    problem: &'a P,
    bounds: &'a BoxBounds,
    max_evaluations: usize,
    evaluations: usize,
    constraint_count: Option<usize>,
}

impl<P: NonlinearProblem> Sampler<'_, P> {
    /// `Ok(None)` once the evaluation budget is spent.
    fn sample(&mut self, u: DVector<f64>) -> Result<Option<Sample>, DesignError> {
        if self.evaluations >= self.max_evaluations {
            return Ok(None);
        }
        self.evaluations += 1;

        let x = self.bounds.from_unit(&u);
        let evaluation = sanitize(self.problem.evaluate(&x));
        match self.constraint_count {
            None => self.constraint_count = Some(evaluation.constraints.len()),
            Some(count) if count != evaluation.constraints.len() => {
                return Err(DesignError::InvalidProblem(format!(
                    "problem returned {} constraints after previously returning {}",
                    evaluation.constraints.len(),
                    count
                )))
            }
            Some(_) => {}
        }
        Ok(Some(Sample { u, evaluation }))
    }

    /// Forward differences, stepping backwards at the upper edge of the box.
    fn gradients(
        &mut self,
        at: &Sample,
        step: f64,
    ) -> Result<Option<(DVector<f64>, DMatrix<f64>)>, DesignError> {
        let n = at.u.len();
        let m = at.constraints().len();
        let mut cost_gradient = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(m, n);

        for i in 0..n {
            let h = if at.u[i] + step <= 1.0 { step } else { -step };
            let mut shifted_u = at.u.clone();
            shifted_u[i] += h;
            let Some(shifted) = self.sample(shifted_u)? else {
                return Ok(None);
            };

            cost_gradient[i] = (shifted.cost() - at.cost()) / h;
            for j in 0..m {
                jacobian[(j, i)] = (shifted.constraints()[j].value - at.constraints()[j].value) / h;
            }
        }
        Ok(Some((cost_gradient, jacobian)))
    }
}

fn lagrangian_gradient(
    cost_gradient: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    multipliers: &DVector<f64>,
) -> DVector<f64> {
    cost_gradient - jacobian.tr_mul(multipliers)
}

/// Powell-damped BFGS: stays positive definite under negative curvature.
fn damped_bfgs_update(hessian: &mut DMatrix<f64>, step: &DVector<f64>, gradient_change: &DVector<f64>) {
    let bs = &*hessian * step;
    let sbs = step.dot(&bs);
    if sbs <= 1e-16 {
        return;
    }
    let sy = step.dot(gradient_change);
    let theta = if sy >= 0.2 * sbs {
        1.0
    } else {
        0.8 * sbs / (sbs - sy)
    };
    let damped = gradient_change * theta + &bs * (1.0 - theta);
    let s_damped = step.dot(&damped);

    *hessian += &damped * damped.transpose() / s_damped - &bs * bs.transpose() / sbs;
}

/// Linearised constraints plus the box rows `0 ≤ u + d ≤ 1`.
fn subproblem_rows(sample: &Sample, jacobian: &DMatrix<f64>) -> Vec<LinearRow> {
    let n = sample.u.len();
    let mut rows: Vec<LinearRow> = sample
        .constraints()
        .iter()
        .enumerate()
        .map(|(j, residual)| {
            LinearRow::new(jacobian.row(j).transpose(), -residual.value, residual.kind)
        })
        .collect();

    for i in 0..n {
        let lower = DVector::from_fn(n, |k, _| if k == i { 1.0 } else { 0.0 });
        rows.push(LinearRow::new(lower.clone(), -sample.u[i], ConstraintKind::Inequality));
        rows.push(LinearRow::new(-lower, -(1.0 - sample.u[i]), ConstraintKind::Inequality));
    }
    rows
}

/// When the linearised constraints are inconsistent, the violated ones move
/// into the objective as a quadratic penalty while the box and the satisfied
/// constraints stay hard, which is always feasible at `d = 0`.
fn search_direction(
    hessian: &DMatrix<f64>,
    cost_gradient: &DVector<f64>,
    rows: &[LinearRow],
    constraint_count: usize,
) -> Option<(DVector<f64>, DVector<f64>)> {
    if let Some(solution) = solve_qp(hessian, cost_gradient, rows) {
        let multipliers = solution.multipliers.rows(0, constraint_count).into_owned();
        return Some((solution.step, multipliers));
    }

    debug!("Linearised constraints are inconsistent, switching to elastic subproblem");
    let mut elastic_hessian = hessian.clone();
    let mut elastic_gradient = cost_gradient.clone();
    let mut hard_rows = Vec::new();
    let mut penalised = Vec::new();

    for (j, row) in rows.iter().enumerate() {
        let violated = j < constraint_count
            && (row.kind == ConstraintKind::Equality || row.rhs > 0.0);
        if violated {
            elastic_gradient -= &row.coefficients * (ELASTIC_WEIGHT * row.rhs);
            elastic_hessian +=
                &row.coefficients * row.coefficients.transpose() * ELASTIC_WEIGHT;
            penalised.push(j);
        } else {
            hard_rows.push(LinearRow::new(
                row.coefficients.clone(),
                row.rhs,
                ConstraintKind::Inequality,
            ));
        }
    }

    let solution = solve_qp(&elastic_hessian, &elastic_gradient, &hard_rows)?;
    let mut multipliers = DVector::zeros(constraint_count);
    for j in penalised {
        let shortfall = rows[j].rhs - rows[j].activity(&solution.step);
        multipliers[j] = match rows[j].kind {
            ConstraintKind::Equality => ELASTIC_WEIGHT * shortfall,
            ConstraintKind::Inequality => ELASTIC_WEIGHT * shortfall.max(0.0),
        };
    }
    Some((solution.step, multipliers))
}

struct BestPoint {
    sample: Sample,
    tolerance: f64,
}

impl BestPoint {
    fn offer(&mut self, candidate: &Sample) {
        let feasible = |s: &Sample| s.total_violation() <= self.tolerance;
        let better = match (feasible(candidate), feasible(&self.sample)) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => candidate.cost() < self.sample.cost(),
            (false, false) => candidate.total_violation() < self.sample.total_violation(),
        };
        if better {
            self.sample = candidate.clone();
        }
    }
}

/// A run that does not converge reports the best point it saw: lowest cost
/// among feasible points, otherwise smallest violation.
pub fn minimize<P: NonlinearProblem>(
    problem: &P,
    x0: &[f64],
    bounds: &BoxBounds,
    options: &SolverOptions,
) -> Result<SolverOutcome, DesignError> {
    let n = bounds.dimension();
    if problem.dimension() != n || x0.len() != n {
        return Err(DesignError::InvalidProblem(format!(
            "problem has {} variables, bounds {} and initial guess {}",
            problem.dimension(),
            n,
            x0.len()
        )));
    }
    if options.max_evaluations == 0 || !(options.tolerance > 0.0) {
        return Err(DesignError::InvalidProblem(
            "solver needs a positive tolerance and evaluation budget".to_string(),
        ));
    }

    let mut sampler = Sampler {
        problem,
        bounds,
        max_evaluations: options.max_evaluations,
        evaluations: 0,
        constraint_count: None,
    };

    let Some(mut current) = sampler.sample(bounds.to_unit(x0))? else {
        return Err(DesignError::InvalidProblem("no evaluations allowed".to_string()));
    };
    let mut best = BestPoint {
        sample: current.clone(),
        tolerance: options.tolerance,
    };
    let m = current.constraints().len();

    let finish = |best: &BestPoint,
                  last: &Sample,
                  converged: bool,
                  iterations: usize,
                  evaluations: usize,
                  message: &str| {
        let chosen = if converged { last } else { &best.sample };
        SolverOutcome {
            x: bounds.from_unit(&chosen.u),
            evaluation: chosen.evaluation.clone(),
            converged,
            iterations,
            evaluations,
            message: message.to_string(),
        }
    };

    let Some((mut cost_gradient, mut jacobian)) =
        sampler.gradients(&current, options.finite_difference_step)?
    else {
        return Ok(finish(
            &best,
            &current,
            false,
            0,
            sampler.evaluations,
            BUDGET_EXHAUSTED,
        ));
    };

    let mut hessian = DMatrix::identity(n, n);
    let mut penalties = DVector::zeros(m);

    for iteration in 1..=options.max_iterations {
        let rows = subproblem_rows(&current, &jacobian);
        let Some((direction, multipliers)) = search_direction(&hessian, &cost_gradient, &rows, m)
        else {
            return Ok(finish(
                &best,
                &current,
                false,
                iteration,
                sampler.evaluations,
                "quadratic subproblem has no solution",
            ));
        };

        for (mu, lambda) in penalties.iter_mut().zip(multipliers.iter()) {
            *mu = lambda.abs().max(0.5 * (*mu + lambda.abs()));
        }

        let merit_start = current.merit(&penalties);
        let slope = cost_gradient.dot(&direction)
            - current
                .constraints()
                .iter()
                .zip(penalties.iter())
                .map(|(residual, mu)| mu * residual.violation())
                .sum::<f64>();

        let mut alpha = 1.0;
        let mut trial = None;
        for _ in 0..MAX_LINE_SEARCH_STEPS {
            let u = (&current.u + &direction * alpha).map(|v| v.clamp(0.0, 1.0));
            let Some(candidate) = sampler.sample(u)? else {
                break;
            };
            let accepted = candidate.merit(&penalties)
                <= merit_start + ARMIJO_FRACTION * alpha * slope.min(0.0);
            trial = Some((candidate, alpha));
            if accepted {
                break;
            }
            alpha *= 0.5;
        }
        // the last trial is taken even when no step passed the merit test
        let Some((next, alpha)) = trial else {
            return Ok(finish(
                &best,
                &current,
                false,
                iteration,
                sampler.evaluations,
                BUDGET_EXHAUSTED,
            ));
        };
        best.offer(&next);

        let Some((next_cost_gradient, next_jacobian)) =
            sampler.gradients(&next, options.finite_difference_step)?
        else {
            return Ok(finish(
                &best,
                &next,
                false,
                iteration,
                sampler.evaluations,
                BUDGET_EXHAUSTED,
            ));
        };

        let step = &next.u - &current.u;
        let gradient_change = lagrangian_gradient(&next_cost_gradient, &next_jacobian, &multipliers)
            - lagrangian_gradient(&cost_gradient, &jacobian, &multipliers);
        damped_bfgs_update(&mut hessian, &step, &gradient_change);

        let cost_change = (next.cost() - current.cost()).abs();
        let step_length = step.norm();

        current = next;
        cost_gradient = next_cost_gradient;
        jacobian = next_jacobian;

        debug!(
            "SQP iteration {}: cost {:.6e}, violation {:.3e}, alpha {:.3e}, step {:.3e}",
            iteration,
            current.cost(),
            current.total_violation(),
            alpha,
            step_length
        );
        trace!("SQP iterate x = {:?}", bounds.from_unit(&current.u));

        if (cost_change < options.tolerance || step_length < options.tolerance)
            && current.total_violation() < options.tolerance
        {
            return Ok(finish(
                &best,
                &current,
                true,
                iteration,
                sampler.evaluations,
                "optimization converged",
            ));
        }
    }

    Ok(finish(
        &best,
        &current,
        false,
        options.max_iterations,
        sampler.evaluations,
        "iteration limit reached",
    ))
}
