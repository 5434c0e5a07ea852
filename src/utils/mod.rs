pub mod phase_state;
pub mod sampling;
