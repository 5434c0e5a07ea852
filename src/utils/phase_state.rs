/// Implements the arithmetic an integrator needs for a two-component state
/// struct: `+`, `-`, `* f64`, `f64 *`, unary `-` and [`OdeState`].
///
/// [`OdeState`]: crate::trajectory_system::kinematics::OdeState
#[macro_export]
macro_rules! impl_phase_state {
    ($state:ident, $first:ident, $second:ident) => {
        impl $state {
            pub fn new($first: f64, $second: f64) -> Self {
                $state { $first, $second }
            }
        }

        impl ::std::ops::Add for $state {
            type Output = Self;

            fn add(self, other: Self) -> Self {
                $state::new(self.$first + other.$first, self.$second + other.$second)
            }
        }

        impl ::std::ops::Sub for $state {
            type Output = Self;

            fn sub(self, other: Self) -> Self {
                $state::new(self.$first - other.$first, self.$second - other.$second)
            }
        }

        impl ::std::ops::Mul<f64> for $state {
            type Output = Self;

            fn mul(self, scalar: f64) -> Self {
                $state::new(self.$first * scalar, self.$second * scalar)
            }
        }

        impl ::std::ops::Mul<$state> for f64 {
            type Output = $state;

            fn mul(self, state: $state) -> $state {
                $state::new(self * state.$first, self * state.$second)
            }
        }

        impl ::std::ops::Neg for $state {
            type Output = Self;

            fn neg(self) -> Self {
                $state::new(-self.$first, -self.$second)
            }
        }

        impl $crate::trajectory_system::kinematics::OdeState for $state {
            fn is_finite(&self) -> bool {
                self.$first.is_finite() && self.$second.is_finite()
            }
        }
    };
}
