//! Dense quadratic subproblem `min ½·dᵀBd + gᵀd` over linear rows, with `B`
//! positive definite. Working sets are enumerated smallest first; the first
//! KKT point that is primal and dual feasible is the minimiser.

use nalgebra::{DMatrix, DVector};

use super::problem::ConstraintKind;

const SINGULAR_PIVOT: f64 = 1e-12;
const PRIMAL_TOLERANCE: f64 = 1e-9;
const DUAL_TOLERANCE: f64 = 1e-10;

/// `coefficients·d ≥ rhs`, or `= rhs` for equality rows.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinearRow {
    pub coefficients: DVector<f64>,
    pub rhs: f64,
    pub kind: ConstraintKind,
}

impl LinearRow {
    pub fn new(coefficients: DVector<f64>, rhs: f64, kind: ConstraintKind) -> Self {
        LinearRow {
            coefficients,
            rhs,
            kind,
        }
    }

    pub fn activity(&self, step: &DVector<f64>) -> f64 {
        self.coefficients.dot(step)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QpSolution {
    pub step: DVector<f64>,
    /// Zero for rows outside the working set.
    pub multipliers: DVector<f64>,
}

/// All `size`-element subsets of `items`, in lexicographic order.
fn combinations(items: &[usize], size: usize) -> Vec<Vec<usize>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    if items.len() < size {
        return Vec::new();
    }
    let mut result = Vec::new();
    for (position, &first) in items.iter().enumerate() {
        for mut rest in combinations(&items[position + 1..], size - 1) {
            rest.insert(0, first);
            result.push(rest);
        }
    }
    result
}

pub(crate) fn solve_qp(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    rows: &[LinearRow],
) -> Option<QpSolution> {
    let n = gradient.len();
    let (equalities, inequalities): (Vec<usize>, Vec<usize>) =
        (0..rows.len()).partition(|&i| rows[i].kind == ConstraintKind::Equality);
    if equalities.len() > n {
        return None;
    }

    for size in 0..=(n - equalities.len()) {
        for subset in combinations(&inequalities, size) {
            let active: Vec<usize> = equalities.iter().copied().chain(subset).collect();
            let Some(solution) = solve_working_set(hessian, gradient, rows, &active) else {
                continue;
            };
            let primal_ok = inequalities.iter().all(|&i| {
                let row = &rows[i];
                row.activity(&solution.step) >= row.rhs - PRIMAL_TOLERANCE * (1.0 + row.rhs.abs())
            });
            let dual_ok = active.iter().all(|&i| {
                rows[i].kind == ConstraintKind::Equality
                    || solution.multipliers[i] >= -DUAL_TOLERANCE
            });
            if primal_ok && dual_ok {
                return Some(solution);
            }
        }
    }
    None
}

/// LU solve that also rejects pivots tiny relative to the largest entry.
fn solve_kkt(matrix: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let scale = matrix.amax();
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let lu = matrix.lu();
    if lu.u().diagonal().iter().any(|pivot| pivot.abs() <= SINGULAR_PIVOT * scale) {
        return None;
    }
    lu.solve(rhs)
}

/// ```text
/// [ B  -Aᵀ ] [d]   [-g]
/// [ A   0  ] [λ] = [ b]
/// ```
fn solve_working_set(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    rows: &[LinearRow],
    active: &[usize],
) -> Option<QpSolution> {
    let n = gradient.len();
    let size = n + active.len();
    let mut kkt = DMatrix::zeros(size, size);
    let mut rhs = DVector::zeros(size);

    kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
    rhs.rows_mut(0, n).copy_from(&(-gradient));
    for (k, &row_index) in active.iter().enumerate() {
        let row = &rows[row_index];
        kkt.view_mut((0, n + k), (n, 1)).copy_from(&(-&row.coefficients));
        kkt.view_mut((n + k, 0), (1, n))
            .copy_from(&row.coefficients.transpose());
        rhs[n + k] = row.rhs;
    }

    let solution = solve_kkt(kkt, &rhs)?;
    let mut multipliers = DVector::zeros(rows.len());
    for (k, &row_index) in active.iter().enumerate() {
        multipliers[row_index] = solution[n + k];
    }
    Some(QpSolution {
        step: solution.rows(0, n).into_owned(),
        multipliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(coefficients: &[f64], rhs: f64, kind: ConstraintKind) -> LinearRow {
        LinearRow::new(DVector::from_column_slice(coefficients), rhs, kind)
    }

    #[test]
    fn test_kkt_solve_rejects_singular_systems() {
        let matrix = DMatrix::from_row_slice(2, 2, &[0.0, 2.0, 3.0, 1.0]);
        let solution = solve_kkt(matrix, &DVector::from_vec(vec![4.0, 5.0])).unwrap();
        assert_relative_eq!(solution[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solution[1], 2.0, epsilon = 1e-12);

        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(solve_kkt(singular, &DVector::from_vec(vec![1.0, 2.0])).is_none());
        assert!(solve_kkt(DMatrix::zeros(2, 2), &DVector::zeros(2)).is_none());
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(&[0, 1, 2], 2),
            vec![vec![0, 1], vec![0, 2], vec![1, 2]]
        );
        assert_eq!(combinations(&[4, 5], 0), vec![Vec::<usize>::new()]);
        assert!(combinations(&[4], 2).is_empty());
    }

    #[test]
    fn test_unconstrained_step_is_newton_step() {
        let gradient = DVector::from_vec(vec![2.0, -4.0]);
        let solution = solve_qp(&DMatrix::identity(2, 2), &gradient, &[]).unwrap();
        assert_relative_eq!(solution.step, DVector::from_vec(vec![-2.0, 4.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_inactive_constraint_has_zero_multiplier() {
        let rows = [row(&[1.0, 0.0], -10.0, ConstraintKind::Inequality)];
        let gradient = DVector::from_vec(vec![1.0, 1.0]);
        let solution = solve_qp(&DMatrix::identity(2, 2), &gradient, &rows).unwrap();
        assert_relative_eq!(solution.step, DVector::from_vec(vec![-1.0, -1.0]), epsilon = 1e-12);
        assert_eq!(solution.multipliers[0], 0.0);
    }

    #[test]
    fn test_active_inequality() {
        // min ½|d|² - d₀ - d₁  s.t. -d₀ - d₁ ≥ -1  →  d = (½, ½), λ = ½
        let rows = [row(&[-1.0, -1.0], -1.0, ConstraintKind::Inequality)];
        let gradient = DVector::from_vec(vec![-1.0, -1.0]);
        let solution = solve_qp(&DMatrix::identity(2, 2), &gradient, &rows).unwrap();
        assert_relative_eq!(solution.step[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.step[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.multipliers[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_equality_row() {
        let rows = [row(&[1.0, 1.0], 1.0, ConstraintKind::Equality)];
        let solution = solve_qp(&DMatrix::identity(2, 2), &DVector::zeros(2), &rows).unwrap();
        assert_relative_eq!(solution.step[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.step[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_inconsistent_rows_have_no_solution() {
        let rows = [
            row(&[1.0], 1.0, ConstraintKind::Inequality),
            row(&[-1.0], 0.0, ConstraintKind::Inequality),
        ];
        assert!(solve_qp(&DMatrix::identity(1, 1), &DVector::zeros(1), &rows).is_none());
    }
}
