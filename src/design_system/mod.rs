pub mod evaluator;
pub mod optimizer;
pub mod parameters;
pub mod problem;
mod qp;
pub mod sqp;
pub mod study;
