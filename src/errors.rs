use thiserror::Error;

use crate::design_system::parameters::ParameterVector;
use crate::design_system::problem::Residual;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Domain error: {quantity} must be {requirement}, got {value}")]
    DomainError {
        quantity: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("Runaway integration: termination predicate still unsatisfied after {steps} steps (t = {time:.3} s)")]
    RunawayIntegration { steps: usize, time: f64 },

    #[error("Non-finite state at t = {time:.6} s")]
    NonFiniteState { time: f64 },

    #[error("Invalid time grid: {0}")]
    InvalidTimeGrid(String),
}

impl SimulationError {
    /// Checks that `value` is finite and strictly positive.
    pub fn require_positive(quantity: &'static str, value: f64) -> Result<f64, SimulationError> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(SimulationError::DomainError {
                quantity,
                requirement: "finite and positive",
                value,
            })
        }
    }

    /// Checks that `value` is finite and not negative.
    pub fn require_non_negative(
        quantity: &'static str,
        value: f64,
    ) -> Result<f64, SimulationError> {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(SimulationError::DomainError {
                quantity,
                requirement: "finite and non-negative",
                value,
            })
        }
    }

    pub fn require_finite(quantity: &'static str, value: f64) -> Result<f64, SimulationError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SimulationError::DomainError {
                quantity,
                requirement: "finite",
                value,
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum DesignError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Design {params} failed{}: {source}", violated_suffix(.residual))]
    Candidate {
        params: ParameterVector,
        /// Worst constraint of the design as the optimizer last scored it.
        residual: Option<Residual>,
        #[source]
        source: SimulationError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid optimization problem: {0}")]
    InvalidProblem(String),
}

fn violated_suffix(residual: &Option<Residual>) -> String {
    match residual {
        Some(residual) => format!(" (violates {})", residual),
        None => String::new(),
    }
}

/// Why a candidate design could not be scored. Never leaves the evaluator:
/// it is logged and replaced by penalty values.
#[derive(Debug, Error)]
pub(crate) enum InfeasiblePoint {
    #[error("simulation produced a non-finite {0}")]
    NonFinite(&'static str),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
