use crate::constants::{
    AIR_DENSITY_SEA_LEVEL, GRAVITY, NOSE_CONE_DIAMETER, NOSE_CONE_DRAG_COEFFICIENT,
};
use crate::errors::SimulationError;

/// Validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalConstants {
    gravity: f64,
    air_density: f64,
    cross_sectional_area: f64,
    drag_coefficient: f64,
}

impl PhysicalConstants {
    pub fn new(
        gravity: f64,
        air_density: f64,
        cross_sectional_area: f64,
        drag_coefficient: f64,
    ) -> Result<Self, SimulationError> {
        Ok(PhysicalConstants {
            gravity: SimulationError::require_positive("gravity", gravity)?,
            air_density: SimulationError::require_non_negative("air density", air_density)?,
            cross_sectional_area: SimulationError::require_non_negative(
                "cross-sectional area",
                cross_sectional_area,
            )?,
            drag_coefficient: SimulationError::require_non_negative(
                "drag coefficient",
                drag_coefficient,
            )?,
        })
    }

    /// Builds the constants for a round nose cone of the given diameter.
    pub fn from_diameter(
        gravity: f64,
        air_density: f64,
        diameter: f64,
        drag_coefficient: f64,
    ) -> Result<Self, SimulationError> {
        let diameter = SimulationError::require_non_negative("diameter", diameter)?;
        let area = std::f64::consts::PI * (diameter / 2.0).powi(2);
        PhysicalConstants::new(gravity, air_density, area, drag_coefficient)
    }

    /// Same environment with drag switched off.
    pub fn without_drag(&self) -> Self {
        PhysicalConstants {
            drag_coefficient: 0.0,
            ..*self
        }
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn air_density(&self) -> f64 {
        self.air_density
    }

    pub fn cross_sectional_area(&self) -> f64 {
        self.cross_sectional_area
    }

    pub fn drag_coefficient(&self) -> f64 {
        self.drag_coefficient
    }
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        PhysicalConstants {
            gravity: GRAVITY,
            air_density: AIR_DENSITY_SEA_LEVEL,
            cross_sectional_area: std::f64::consts::PI * (NOSE_CONE_DIAMETER / 2.0).powi(2),
            drag_coefficient: NOSE_CONE_DRAG_COEFFICIENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_constants() {
        let constants = PhysicalConstants::default();
        assert_eq!(constants.gravity(), 9.81);
        assert_eq!(constants.air_density(), 1.225);
        assert_relative_eq!(
            constants.cross_sectional_area(),
            0.012667686977437444,
            epsilon = 1e-15
        );
        assert_eq!(constants.drag_coefficient(), 0.3);
    }

    #[test]
    fn test_from_diameter_matches_default() {
        let constants = PhysicalConstants::from_diameter(9.81, 1.225, 0.127, 0.3).unwrap();
        assert_eq!(constants, PhysicalConstants::default());
    }

    #[test]
    fn test_invalid_constants_are_rejected() {
        assert!(matches!(
            PhysicalConstants::new(0.0, 1.225, 0.01, 0.3),
            Err(SimulationError::DomainError { quantity: "gravity", .. })
        ));
        assert!(matches!(
            PhysicalConstants::new(9.81, -1.0, 0.01, 0.3),
            Err(SimulationError::DomainError { quantity: "air density", .. })
        ));
        assert!(matches!(
            PhysicalConstants::new(9.81, 1.225, -0.01, 0.3),
            Err(SimulationError::DomainError {
                quantity: "cross-sectional area",
                ..
            })
        ));
        assert!(PhysicalConstants::new(9.81, 1.225, 0.01, f64::NAN).is_err());
        assert!(PhysicalConstants::from_diameter(9.81, 1.225, -0.1, 0.3).is_err());
    }

    #[test]
    fn test_without_drag() {
        let constants = PhysicalConstants::default().without_drag();
        assert_eq!(constants.drag_coefficient(), 0.0);
        assert_eq!(constants.gravity(), 9.81);
    }
}
