use crate::absorption_system::impact::ImpactResponse;
use crate::design_system::optimizer::OptimizationResult;
use crate::trajectory_system::descent::DescentTrajectory;

/// Final design together with the descent and impact it was re-simulated
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignReport {
    result: OptimizationResult,
    descent: DescentTrajectory,
    response: ImpactResponse,
}

impl DesignReport {
    pub fn new(
        result: OptimizationResult,
        descent: DescentTrajectory,
        response: ImpactResponse,
    ) -> Self {
        DesignReport {
            result,
            descent,
            response,
        }
    }

    pub fn result(&self) -> &OptimizationResult {
        &self.result
    }

    pub fn descent(&self) -> &DescentTrajectory {
        &self.descent
    }

    pub fn response(&self) -> &ImpactResponse {
        &self.response
    }

    pub fn impact_velocity(&self) -> f64 {
        self.descent.impact_velocity()
    }

    fn format_time(elapsed_time: f64) -> String {
        if elapsed_time >= 60.0 {
            let minutes = (elapsed_time / 60.0).floor();
            let seconds = elapsed_time % 60.0;
            format!("{:.0}m {:.2}s", minutes, seconds)
        } else {
            format!("{:.2}s", elapsed_time)
        }
    }

    fn format_displacement(displacement: f64) -> String {
        if displacement < 0.1 {
            format!("{:.1} mm", displacement * 1000.0)
        } else {
            format!("{:.4} m", displacement)
        }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let params = &self.result.parameters;
        let mut lines = vec![
            format!("Spring Constant: {:.4} N/m", params.spring_constant),
            format!("Damping Coefficient: {:.4} N·s/m", params.damping_coefficient),
        ];
        if let Some(thrust) = params.thrust {
            lines.push(format!("Thrust: {:.4} N", thrust));
        }
        lines.push(format!(
            "Peak G-Force: {:.2} g ({:.2} m/s²)",
            self.response.peak_g_force(),
            self.response.peak_acceleration()
        ));
        lines.push(format!(
            "Peak Displacement: {}",
            Self::format_displacement(self.response.peak_displacement())
        ));
        lines.push(format!(
            "Peak-to-Peak Displacement: {}",
            Self::format_displacement(self.response.peak_to_peak_displacement())
        ));
        lines.push(format!("Impact Velocity: {:.4} m/s", self.impact_velocity()));
        lines.push(format!(
            "Descent Time: {}",
            Self::format_time(self.descent.descent_time())
        ));
        lines
    }

    pub fn display_data(&self) {
        println!("--- Capsule Design ---");
        for line in self.summary_lines() {
            println!("{}", line);
        }

        println!("\n--- Optimizer ---");
        println!(
            "Status: {} ({})",
            if self.result.converged {
                "converged"
            } else {
                "not converged"
            },
            self.result.message
        );
        println!("Objective: {:.6}", self.result.objective);
        println!(
            "Iterations: {} ({} evaluations)",
            self.result.iterations, self.result.evaluations
        );
        println!("Max Constraint Violation: {:.3e}", self.result.max_violation);

        println!("\n--- Constraints ---");
        for residual in &self.result.evaluation.constraints {
            println!("{}", residual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(DesignReport::format_time(5.234), "5.23s");
        assert_eq!(DesignReport::format_time(75.5), "1m 15.50s");
    }

    #[test]
    fn test_format_displacement() {
        assert_eq!(DesignReport::format_displacement(0.0523), "52.3 mm");
        assert_eq!(DesignReport::format_displacement(0.13), "0.1300 m");
    }
}
