// Physical Constants
pub const GRAVITY: f64 = 9.81; // m/s²
pub const AIR_DENSITY_SEA_LEVEL: f64 = 1.225; // kg/m³

// Nose Cone Constants
pub const NOSE_CONE_DIAMETER: f64 = 0.127; // m
pub const NOSE_CONE_DRAG_COEFFICIENT: f64 = 0.3;

// Descent Constants
pub const PAYLOAD_MASS: f64 = 3.0; // kg
pub const DEPLOYMENT_HEIGHT: f64 = 130.0; // m
pub const DEPLOYMENT_VELOCITY: f64 = 4.0; // m/s, positive downward
pub const DESCENT_TIME_STEP: f64 = 0.001; // s
pub const MAX_DESCENT_STEPS: usize = 1_000_000;

// Capsule (spring-mass-damper) Constants
pub const CAPSULE_MASS: f64 = 0.2; // kg
pub const IMPACT_DURATION: f64 = 3.0; // s
pub const IMPACT_RESOLUTION: usize = 3001; // samples, 1 ms spacing
pub const IMPACT_MAX_STEP: f64 = 0.001; // s

// Safety Thresholds
pub const TARGET_DISPLACEMENT: f64 = 0.13; // m (about 5 in)
pub const MAX_ACCELERATION: f64 = 120.0; // m/s²

// Design Bounds
pub const SPRING_CONSTANT_MIN: f64 = 0.001; // N/m
pub const SPRING_CONSTANT_MAX: f64 = 999.0; // N/m
pub const DAMPING_COEFFICIENT_MIN: f64 = 0.001; // N·s/m
pub const DAMPING_COEFFICIENT_MAX: f64 = 99.0; // N·s/m
pub const THRUST_MAX: f64 = 29.0; // N

// Optimizer Parameters
pub const INITIAL_SPRING_CONSTANT: f64 = 10.0;
pub const INITIAL_DAMPING_COEFFICIENT: f64 = 1.0;
pub const INITIAL_THRUST: f64 = 0.0;
pub const DISPLACEMENT_WEIGHT: f64 = 1.0;
pub const G_FORCE_WEIGHT: f64 = 0.4;
pub const MAX_ITERATIONS: usize = 100;
pub const MAX_EVALUATIONS: usize = 5_000;
pub const OPTIMIZER_TOLERANCE: f64 = 1e-6;
pub const OPTIMIZER_RESTARTS: usize = 2;
pub const OPTIMIZER_SEED: u64 = 0x5EED;

// Penalty assigned to points where the simulation produced NaN/Inf or failed
pub const INFEASIBLE_PENALTY: f64 = 1e10;
