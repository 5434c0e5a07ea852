use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Satisfied when the residual is ≥ 0.
    Inequality,
    /// Satisfied when the residual is 0.
    Equality,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub name: &'static str,
    pub kind: ConstraintKind,
    pub value: f64,
}

impl Residual {
    pub fn inequality(name: &'static str, value: f64) -> Self {
        Residual {
            name,
            kind: ConstraintKind::Inequality,
            value,
        }
    }

    pub fn equality(name: &'static str, value: f64) -> Self {
        Residual {
            name,
            kind: ConstraintKind::Equality,
            value,
        }
    }

    pub fn violation(&self) -> f64 {
        match self.kind {
            ConstraintKind::Inequality => (-self.value).max(0.0),
            ConstraintKind::Equality => self.value.abs(),
        }
    }

    pub fn is_satisfied(&self, tolerance: f64) -> bool {
        self.violation() <= tolerance
    }
}

impl fmt::Display for Residual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relation = match self.kind {
            ConstraintKind::Inequality => ">= 0",
            ConstraintKind::Equality => "== 0",
        };
        write!(f, "{} = {:.6} ({})", self.name, self.value, relation)
    }
}

/// `bounds` restate the box bounds in residual form and are not linearised.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub cost: f64,
    pub constraints: Vec<Residual>,
    pub bounds: Vec<Residual>,
}

impl Evaluation {
    pub fn max_violation(&self) -> f64 {
        self.constraints
            .iter()
            .chain(self.bounds.iter())
            .map(Residual::violation)
            .fold(0.0, f64::max)
    }

    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.max_violation() <= tolerance
    }

    /// The residual furthest outside its constraint, if any exceeds `tolerance`.
    pub fn most_violated(&self, tolerance: f64) -> Option<&Residual> {
        self.constraints
            .iter()
            .chain(self.bounds.iter())
            .filter(|residual| residual.violation() > tolerance)
            .max_by(|a, b| a.violation().total_cmp(&b.violation()))
    }

    pub fn residual(&self, name: &str) -> Option<&Residual> {
        self.constraints
            .iter()
            .chain(self.bounds.iter())
            .find(|residual| residual.name == name)
    }
}

/// Implementations must be free of side effects.
pub trait NonlinearProblem: Sync {
    fn dimension(&self) -> usize;

    fn evaluate(&self, x: &[f64]) -> Evaluation;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_follows_sign_convention() {
        assert_eq!(Residual::inequality("a", 2.0).violation(), 0.0);
        assert_eq!(Residual::inequality("a", -2.0).violation(), 2.0);
        assert_eq!(Residual::equality("b", -0.5).violation(), 0.5);
        assert_eq!(Residual::equality("b", 0.0).violation(), 0.0);
        assert!(Residual::equality("b", 1e-9).is_satisfied(1e-6));
    }

    #[test]
    fn test_evaluation_summary() {
        let evaluation = Evaluation {
            cost: 1.0,
            constraints: vec![Residual::inequality("acceleration_limit", -3.0)],
            bounds: vec![Residual::inequality("spring_constant_lower", 1.0)],
        };

        assert_eq!(evaluation.max_violation(), 3.0);
        assert!(!evaluation.is_feasible(1e-6));
        assert_eq!(
            evaluation.residual("spring_constant_lower").map(|r| r.value),
            Some(1.0)
        );
        assert!(evaluation.residual("missing").is_none());
        assert_eq!(
            evaluation.most_violated(1e-6).map(|r| r.name),
            Some("acceleration_limit")
        );
        assert!(evaluation.most_violated(5.0).is_none());
    }

    #[test]
    fn test_display() {
        let residual = Residual::inequality("acceleration_limit", 1.5);
        assert_eq!(residual.to_string(), "acceleration_limit = 1.500000 (>= 0)");
    }
}
