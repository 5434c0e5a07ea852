use crate::environment::PhysicalConstants;

/// Dynamic pressure ½·ρ·v² for a speed in m/s.
pub fn calculate_dynamic_pressure(air_density: f64, speed: f64) -> f64 {
    0.5 * air_density * speed.powi(2)
}

/// Quadratic drag ½·ρ·v·|v|·Cd·A along the velocity axis.
///
/// The result carries the sign of `velocity`, so subtracting it from the
/// other forces always opposes the motion.
pub fn calculate_drag(constants: &PhysicalConstants, velocity: f64) -> f64 {
    let dynamic_pressure = calculate_dynamic_pressure(constants.air_density(), velocity);
    let drag_magnitude =
        dynamic_pressure * constants.drag_coefficient() * constants.cross_sectional_area();

    drag_magnitude * velocity.signum()
}

/// Downward speed at which drag and thrust balance the weight of `mass`.
///
/// Returns `None` when there is no such speed: thrust at least as large as
/// the weight, or no drag at all.
pub fn calculate_terminal_velocity(
    constants: &PhysicalConstants,
    mass: f64,
    thrust: f64,
) -> Option<f64> {
    let excess_force = mass * constants.gravity() - thrust;
    let drag_factor = 0.5
        * constants.air_density()
        * constants.drag_coefficient()
        * constants.cross_sectional_area();

    if excess_force <= 0.0 || drag_factor <= 0.0 {
        None
    } else {
        Some((excess_force / drag_factor).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-12;

    fn sphere() -> PhysicalConstants {
        PhysicalConstants::new(9.8, 1.225, 0.05, 0.3).unwrap()
    }

    #[test]
    fn test_dynamic_pressure() {
        assert_relative_eq!(calculate_dynamic_pressure(1.225, 10.0), 61.25, epsilon = EPSILON);
    }

    #[test]
    fn test_drag_preserves_direction() {
        let constants = sphere();
        let down = calculate_drag(&constants, 10.0);
        let up = calculate_drag(&constants, -10.0);

        assert_relative_eq!(down, 0.91875, epsilon = EPSILON);
        assert_relative_eq!(up, -0.91875, epsilon = EPSILON);
        assert_eq!(calculate_drag(&constants, 0.0), 0.0);
    }

    #[test]
    fn test_no_drag_without_coefficient() {
        let constants = sphere().without_drag();
        assert_eq!(calculate_drag(&constants, 50.0), 0.0);
        assert_eq!(calculate_terminal_velocity(&constants, 2.0, 0.0), None);
    }

    #[test]
    fn test_terminal_velocity_balances_forces() {
        let constants = sphere();
        let mass = 2.0;
        let thrust = 5.0;
        let terminal = calculate_terminal_velocity(&constants, mass, thrust).unwrap();

        let net = mass * constants.gravity() - calculate_drag(&constants, terminal) - thrust;
        assert_relative_eq!(net, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_terminal_velocity_when_thrust_exceeds_weight() {
        let constants = sphere();
        assert_eq!(calculate_terminal_velocity(&constants, 2.0, 19.6), None);
        assert_eq!(calculate_terminal_velocity(&constants, 2.0, 25.0), None);
    }
}
