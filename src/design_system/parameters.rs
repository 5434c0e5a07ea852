use std::fmt;

use crate::constants::{
    DAMPING_COEFFICIENT_MAX, DAMPING_COEFFICIENT_MIN, INITIAL_DAMPING_COEFFICIENT,
    INITIAL_SPRING_CONSTANT, SPRING_CONSTANT_MAX, SPRING_CONSTANT_MIN, THRUST_MAX,
};
use crate::errors::DesignError;

use super::problem::Residual;

/// Design variables of the capsule. `thrust` is only present when the
/// descent thrust is part of the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterVector {
    pub spring_constant: f64,
    pub damping_coefficient: f64,
    pub thrust: Option<f64>,
}

impl ParameterVector {
    pub fn new(spring_constant: f64, damping_coefficient: f64) -> Self {
        ParameterVector {
            spring_constant,
            damping_coefficient,
            thrust: None,
        }
    }

    pub fn with_thrust(self, thrust: f64) -> Self {
        ParameterVector {
            thrust: Some(thrust),
            ..self
        }
    }

    pub fn dimension(&self) -> usize {
        if self.thrust.is_some() {
            3
        } else {
            2
        }
    }

    /// Flattens to `[k, c]` or `[k, c, thrust]`.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut values = vec![self.spring_constant, self.damping_coefficient];
        values.extend(self.thrust);
        values
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, DesignError> {
        match *values {
            [k, c] => Ok(ParameterVector::new(k, c)),
            [k, c, thrust] => Ok(ParameterVector::new(k, c).with_thrust(thrust)),
            _ => Err(DesignError::InvalidProblem(format!(
                "expected 2 or 3 design variables, got {}",
                values.len()
            ))),
        }
    }
}

impl Default for ParameterVector {
    fn default() -> Self {
        ParameterVector::new(INITIAL_SPRING_CONSTANT, INITIAL_DAMPING_COEFFICIENT)
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k = {:.4} N/m, c = {:.4} N·s/m",
            self.spring_constant, self.damping_coefficient
        )?;
        if let Some(thrust) = self.thrust {
            write!(f, ", thrust = {:.4} N", thrust)?;
        }
        Ok(())
    }
}

/// Box bounds of the design variables. Thrust always starts at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterBounds {
    pub spring_constant: (f64, f64),
    pub damping_coefficient: (f64, f64),
    pub thrust_max: f64,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        ParameterBounds {
            spring_constant: (SPRING_CONSTANT_MIN, SPRING_CONSTANT_MAX),
            damping_coefficient: (DAMPING_COEFFICIENT_MIN, DAMPING_COEFFICIENT_MAX),
            thrust_max: THRUST_MAX,
        }
    }
}

impl ParameterBounds {
    pub fn validate(&self) -> Result<(), DesignError> {
        let ranges = [
            ("spring constant", self.spring_constant),
            ("damping coefficient", self.damping_coefficient),
            ("thrust", (0.0, self.thrust_max)),
        ];
        for (name, (lo, hi)) in ranges {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(DesignError::InvalidProblem(format!(
                    "{} bounds must be finite with lower < upper, got [{}, {}]",
                    name, lo, hi
                )));
            }
        }
        if self.spring_constant.0 < 0.0 || self.damping_coefficient.0 < 0.0 {
            return Err(DesignError::InvalidProblem(
                "spring constant and damping coefficient bounds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lower(&self, with_thrust: bool) -> Vec<f64> {
        let mut lower = vec![self.spring_constant.0, self.damping_coefficient.0];
        if with_thrust {
            lower.push(0.0);
        }
        lower
    }

    pub fn upper(&self, with_thrust: bool) -> Vec<f64> {
        let mut upper = vec![self.spring_constant.1, self.damping_coefficient.1];
        if with_thrust {
            upper.push(self.thrust_max);
        }
        upper
    }

    pub fn clamp(&self, params: &ParameterVector) -> ParameterVector {
        ParameterVector {
            spring_constant: params
                .spring_constant
                .clamp(self.spring_constant.0, self.spring_constant.1),
            damping_coefficient: params
                .damping_coefficient
                .clamp(self.damping_coefficient.0, self.damping_coefficient.1),
            thrust: params.thrust.map(|t| t.clamp(0.0, self.thrust_max)),
        }
    }

    pub fn contains(&self, params: &ParameterVector) -> bool {
        self.residuals(params).iter().all(|r| r.value >= 0.0)
    }

    /// Bound constraints in residual form (`≥ 0` when satisfied).
    pub fn residuals(&self, params: &ParameterVector) -> Vec<Residual> {
        let mut residuals = vec![
            Residual::inequality(
                "spring_constant_lower",
                params.spring_constant - self.spring_constant.0,
            ),
            Residual::inequality(
                "spring_constant_upper",
                self.spring_constant.1 - params.spring_constant,
            ),
            Residual::inequality(
                "damping_coefficient_lower",
                params.damping_coefficient - self.damping_coefficient.0,
            ),
            Residual::inequality(
                "damping_coefficient_upper",
                self.damping_coefficient.1 - params.damping_coefficient,
            ),
        ];
        if let Some(thrust) = params.thrust {
            residuals.push(Residual::inequality("thrust_lower", thrust));
            residuals.push(Residual::inequality("thrust_upper", self.thrust_max - thrust));
        }
        residuals
    }
}
