//! Inverse kinematics by Newton-Raphson iteration.

use libm::sqrtf;

use crate::{ArmPose, Config, Len, Point};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SolveError {
    /// No arm radius in range puts the pen on the target. The radius is zero
    /// if the target is closer to the pivot than the pen offset.
    #[error("target needs an arm radius of {radius:.2}mm, outside the rack's travel")]
    TargetOutOfRange { radius: f32 },
    #[error("target needs an arm angle of {theta_deg:.2} degrees, outside the sweep")]
    OutsideSweep { theta_deg: f32 },
    #[error("jacobian is singular (determinant {det})")]
    Singular { det: f32 },
    #[error("no convergence after {iterations} iterations (residual {residual}mm)")]
    NoConvergence { iterations: u32, residual: f32 },
}

impl SolveError {
    /// Whether the target is mechanically unreachable, as opposed to the
    /// iteration failing numerically.
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            SolveError::TargetOutOfRange { .. } | SolveError::OutsideSweep { .. }
        )
    }
}

impl Config {
    /// Finds the arm pose that puts the pen on `target`.
    ///
    /// `seed` is where the iteration starts, normally the pose the arm is in
    /// right now. Consecutive waypoints are close together, so this is almost
    /// always within a couple of iterations of the answer. If the seed turns
    /// out to be too far away to converge from, we try again from a few
    /// spread-out poses before giving up.
    pub fn solve(&self, target: &Point, seed: &ArmPose) -> Result<ArmPose, SolveError> {
        let radius = self
            .required_radius(target)
            .ok_or(SolveError::TargetOutOfRange { radius: 0.0 })?;
        if !self.radius_in_range(radius) {
            return Err(SolveError::TargetOutOfRange {
                radius: radius.get(),
            });
        }

        let first_err = match self.newton(target, seed) {
            Ok(pose) => return self.normalize(pose),
            Err(e) => e,
        };
        log::debug!("solve from seed {seed:?} failed ({first_err}), retrying");

        // Any converged pose has a positive radius, and for positive radii the
        // solution is unique up to whole turns. So it doesn't matter which seed
        // gets us there.
        let mid = self.center_pose();
        for theta in [mid.theta, self.theta_min, self.theta_max] {
            if let Ok(pose) = self.newton(target, &ArmPose::new(theta, radius)) {
                return self.normalize(pose);
            }
        }
        Err(first_err)
    }

    fn newton(&self, target: &Point, seed: &ArmPose) -> Result<ArmPose, SolveError> {
        let mut pose = ArmPose::new(seed.theta, self.clamp_radius(seed.radius));
        let mut residual = *target - self.forward(&pose);
        let mut iterations = 0;
        let max_step = self.max_theta_step.radians;

        while sqrtf(residual.square_length()) > self.tolerance.get() {
            if iterations == self.max_iterations {
                return Err(SolveError::NoConvergence {
                    iterations,
                    residual: sqrtf(residual.square_length()),
                });
            }

            let jac = self.jacobian(&pose);
            let (d_theta, d_radius) = jac
                .solve(residual, self.singular_threshold)
                .ok_or(SolveError::Singular { det: jac.det() })?;

            pose.theta.radians += d_theta.clamp(-max_step, max_step);
            pose.radius = self.clamp_radius(pose.radius + Len::new(d_radius));
            residual = *target - self.forward(&pose);
            iterations += 1;
        }

        log::trace!("solved {target:?} -> {pose:?} in {iterations} iterations");
        Ok(pose)
    }

    fn normalize(&self, pose: ArmPose) -> Result<ArmPose, SolveError> {
        let theta = self
            .normalize_theta(pose.theta)
            .ok_or(SolveError::OutsideSweep {
                theta_deg: pose.theta.to_degrees(),
            })?;
        Ok(ArmPose::new(theta, pose.radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Angle, ConfigBuilder, LenExt as _};
    use proptest::prelude::*;

    fn close(p: &Point, q: &Point, tol: f32) -> bool {
        (*p - *q).square_length() <= tol * tol
    }

    fn home(cfg: &Config) -> ArmPose {
        ArmPose::new(cfg.theta_min, cfg.radius_min)
    }

    proptest! {
        // Every reachable target is solved, and the forward map reproduces it.
        #[test]
        fn reachable_targets_converge(
            theta_frac in 0.0..1.0f32,
            r_frac in 0.0..1.0f32,
            seed_theta_frac in 0.0..1.0f32,
            seed_r_frac in 0.0..1.0f32,
        ) {
            let cfg = Config::default();
            let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
            let pose = ArmPose::new(
                Angle::radians(lerp(cfg.theta_min.radians, cfg.theta_max.radians, theta_frac)),
                lerp(cfg.radius_min.get(), cfg.radius_max.get(), r_frac).mm(),
            );
            let seed = ArmPose::new(
                Angle::radians(lerp(cfg.theta_min.radians, cfg.theta_max.radians, seed_theta_frac)),
                lerp(cfg.radius_min.get(), cfg.radius_max.get(), seed_r_frac).mm(),
            );
            let target = cfg.forward(&pose);

            let solved = cfg.solve(&target, &seed).unwrap();
            prop_assert!(close(&cfg.forward(&solved), &target, cfg.tolerance.get()));
            prop_assert!(cfg.contains(&solved));
            prop_assert!((solved.theta.radians - pose.theta.radians).abs() < 1e-2);
            prop_assert!((solved.radius.get() - pose.radius.get()).abs() < 1e-2);
        }

        // Targets further from the pivot than the rack allows are rejected up front.
        #[test]
        fn far_targets_are_out_of_range(angle in 0.0..6.28f32, extra in 1.0..500.0f32) {
            let cfg = ConfigBuilder::default()
                .with_pivot(Point::origin())
                .with_pen_offset(0.0.mm())
                .with_radius_range(2.0.mm(), 100.0.mm())
                .build();
            let dist = 100.0 + extra;
            let target = Point::new(dist * libm::cosf(angle), dist * libm::sinf(angle));
            let err = cfg.solve(&target, &home(&cfg)).unwrap_err();
            let out_of_range = matches!(err, SolveError::TargetOutOfRange { .. });
            prop_assert!(out_of_range, "{err:?}");
        }
    }

    #[test]
    fn near_targets_are_out_of_range() {
        let cfg = Config::default();
        let target = cfg.pivot + euclid::vec2(10.0, 10.0);
        assert_eq!(
            cfg.solve(&target, &home(&cfg)),
            Err(SolveError::TargetOutOfRange { radius: 0.0 })
        );

        let target = cfg.pivot + euclid::vec2(60.0, 0.0);
        assert!(matches!(
            cfg.solve(&target, &home(&cfg)),
            Err(SolveError::TargetOutOfRange { .. })
        ));
    }

    #[test]
    fn targets_outside_the_sweep_are_rejected() {
        let cfg = Config::default();
        // Right of the pivot: the arm would have to point at about 0 degrees.
        let target = cfg.forward(&ArmPose::new(Angle::degrees(0.0), 150.0.mm()));
        let err = cfg.solve(&target, &home(&cfg)).unwrap_err();
        assert!(matches!(err, SolveError::OutsideSweep { .. }));
        assert!(err.is_out_of_range());
    }

    #[test]
    fn degenerate_jacobians_are_singular() {
        // With a zero pen offset the determinant is just minus the radius, so
        // a big enough threshold makes every pose singular.
        let mut cfg = ConfigBuilder::default()
            .with_pivot(Point::origin())
            .with_pen_offset(0.0.mm())
            .with_radius_range(0.0.mm(), 100.0.mm())
            .with_theta_range(Angle::degrees(-180.0), Angle::degrees(180.0))
            .build();
        cfg.singular_threshold = 1000.0;
        let seed = ArmPose::new(Angle::degrees(0.0), 10.0.mm());
        let err = cfg.solve(&Point::new(0.0, 50.0), &seed).unwrap_err();
        assert!(matches!(err, SolveError::Singular { det } if (det + 10.0).abs() < 1e-3));
        assert!(!err.is_out_of_range());
    }

    #[test]
    fn solving_from_the_answer_takes_no_iterations() {
        let cfg = ConfigBuilder::default().with_max_iterations(0).build();
        let pose = ArmPose::new(Angle::degrees(180.0), 150.0.mm());
        let target = cfg.forward(&pose);
        assert_eq!(cfg.solve(&target, &pose), Ok(pose));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let cfg = ConfigBuilder::default().with_max_iterations(1).build();
        let target = cfg.forward(&ArmPose::new(Angle::degrees(250.0), 250.0.mm()));
        let err = cfg.solve(&target, &home(&cfg)).unwrap_err();
        assert!(matches!(err, SolveError::NoConvergence { iterations: 1, .. }));
    }

    #[test]
    fn plain_polar_arm() {
        let cfg = ConfigBuilder::default()
            .with_pivot(Point::origin())
            .with_pen_offset(0.0.mm())
            .with_radius_range(2.0.mm(), 100.0.mm())
            .with_theta_range(Angle::degrees(-180.0), Angle::degrees(180.0))
            .build();
        let seed = ArmPose::new(Angle::degrees(0.0), 10.0.mm());
        let pose = cfg.solve(&Point::new(10.0, 10.0), &seed).unwrap();
        assert!((pose.theta.to_degrees() - 45.0).abs() < 1e-2);
        assert!((pose.radius.get() - 200.0f32.sqrt()).abs() < 1e-2);
    }
}
