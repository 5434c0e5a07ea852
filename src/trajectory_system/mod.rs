pub mod aerodynamics;
pub mod descent;
pub mod kinematics;
