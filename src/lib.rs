pub mod absorption_system;
pub mod config;
pub mod constants;
pub mod design_system;
pub mod environment;
pub mod errors;
pub mod telemetry_system;
pub mod trajectory_system;
pub mod utils;

pub use constants::*;
pub use config::DesignConfig;
pub use environment::PhysicalConstants;
pub use errors::{ConfigError, DesignError, SimulationError};

// Re-export commonly used items from the simulation phases
pub use absorption_system::impact::{
    sweep_peak_acceleration, AccelerationSource, ImpactModel, ImpactResponse, ImpactSettings,
    ImpactState,
};
pub use trajectory_system::descent::{
    DescentModel, DescentSettings, DescentState, DescentTrajectory,
};
pub use trajectory_system::kinematics::{integrate_grid, EventStepper, TimeGrid, TimeSeries};

// Re-export commonly used items from design_system
pub use design_system::evaluator::{
    CostScale, CostWeights, DescentScenario, DesignEvaluator, DesignTargets, DisplacementMeasure,
    DisplacementMode,
};
pub use design_system::optimizer::{optimize_design, OptimizationResult, OptimizerOptions};
pub use design_system::parameters::{ParameterBounds, ParameterVector};
pub use design_system::problem::{ConstraintKind, Evaluation, NonlinearProblem, Residual};
pub use design_system::study::DesignStudy;

// Re-export commonly used items from telemetry_system
pub use telemetry_system::telemetry::DesignReport;

// Re-export commonly used utilities
pub use utils::sampling::linspace;
