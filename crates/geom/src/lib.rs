//! Basic geometry of the polar plotter, including the forward kinematics
//! of the arm and the numerical inverse (see [`Config::solve`]).
//!
//! The arm rotates about a fixed pivot and carries the pen on a rack, so
//! the two motor-driven quantities are the arm angle `theta` and the arm
//! extension `radius`. The pen sits a fixed distance to the side of the
//! rack (the "pen offset"), which is what makes the inverse problem
//! nonlinear enough that we solve it iteratively.
//!
//! This crate supports `no_std` and uses `libm` to allow for running in
//! embedded contexts.

#![cfg_attr(not(feature = "std"), no_std)]

use core::f32::consts::PI;
use libm::{cosf, floorf, sinf, sqrtf};

mod solver;

pub use solver::SolveError;

pub type Angle = euclid::Angle<f32>;
pub type Point = euclid::Point2D<f32, Mm>;
pub type Vector = euclid::Vector2D<f32, Mm>;
pub type Len = euclid::Length<f32, Mm>;

pub struct Mm;

fn square<T: core::ops::Mul<T> + Copy>(x: T) -> <T as core::ops::Mul<T>>::Output {
    x * x
}

pub trait LenExt {
    fn mm(self) -> Len;
}

impl LenExt for f32 {
    fn mm(self) -> Len {
        Len::new(self)
    }
}

/// The two motor-controlled degrees of freedom of the arm.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArmPose {
    /// Angle of the arm, measured counter-clockwise from the positive x axis.
    pub theta: Angle,
    /// Distance from the pivot to the pen carriage, along the arm.
    pub radius: Len,
}

impl ArmPose {
    pub fn new(theta: Angle, radius: Len) -> Self {
        Self { theta, radius }
    }
}

/// The derivative of the forward map at some pose, stored as its two columns.
#[derive(Debug, Clone, Copy)]
pub struct Jacobian {
    pub d_theta: Vector,
    pub d_radius: Vector,
}

impl Jacobian {
    pub fn det(&self) -> f32 {
        self.d_theta.x * self.d_radius.y - self.d_radius.x * self.d_theta.y
    }

    /// Solves `J * (d_theta, d_radius) = v` by Cramer's rule.
    ///
    /// Returns `None` if the determinant is smaller than `threshold`.
    pub fn solve(&self, v: Vector, threshold: f32) -> Option<(f32, f32)> {
        let det = self.det();
        if det.abs() < threshold {
            return None;
        }
        let d_theta = (v.x * self.d_radius.y - self.d_radius.x * v.y) / det;
        let d_radius = (self.d_theta.x * v.y - v.x * self.d_theta.y) / det;
        Some((d_theta, d_radius))
    }
}

pub struct ConfigBuilder {
    pivot: Point,
    pen_offset: Len,
    radius_min: Len,
    radius_max: Len,
    theta_min: Angle,
    theta_max: Angle,
    tolerance: Len,
    max_iterations: u32,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            pivot: Point::new(270.0, 90.0),
            pen_offset: 42.0.mm(),
            radius_min: 75.0.mm(),
            radius_max: 262.0.mm(),
            theta_min: Angle::degrees(100.0),
            theta_max: Angle::degrees(260.0),
            tolerance: 1e-3.mm(),
            max_iterations: 64,
        }
    }
}

impl ConfigBuilder {
    pub fn build(&self) -> Config {
        Config {
            pivot: self.pivot,
            pen_offset: self.pen_offset,
            radius_min: self.radius_min,
            radius_max: self.radius_max,
            theta_min: self.theta_min,
            theta_max: self.theta_max,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            singular_threshold: 1e-3,
            max_theta_step: Angle::radians(0.5),
        }
    }

    pub fn with_pivot(&mut self, pivot: Point) -> &mut Self {
        self.pivot = pivot;
        self
    }

    pub fn with_pen_offset(&mut self, offset: Len) -> &mut Self {
        self.pen_offset = offset;
        self
    }

    pub fn with_radius_range(&mut self, min: Len, max: Len) -> &mut Self {
        self.radius_min = min;
        self.radius_max = max;
        self
    }

    pub fn with_theta_range(&mut self, min: Angle, max: Angle) -> &mut Self {
        self.theta_min = min;
        self.theta_max = max;
        self
    }

    pub fn with_tolerance(&mut self, tolerance: Len) -> &mut Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(&mut self, iterations: u32) -> &mut Self {
        self.max_iterations = iterations;
        self
    }
}

/// The geometric configuration of the arm.
///
/// All lengths are in millimeters, in the same coordinate system as the
/// drawing commands.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// The point the arm rotates around.
    pub pivot: Point,
    /// How far the pen tip sits to the side of the rack. Positive offsets put
    /// the pen clockwise of the arm.
    pub pen_offset: Len,
    /// The carriage can't travel all the way to the pivot, or past the end of
    /// the rack.
    pub radius_min: Len,
    pub radius_max: Len,
    /// The sweep of the arm. `theta_max - theta_min` must be less than a full
    /// turn.
    pub theta_min: Angle,
    pub theta_max: Angle,
    /// The solver stops once the pen would be this close to the target.
    pub tolerance: Len,
    pub max_iterations: u32,
    /// Jacobians with a determinant (in mm) below this are treated as singular.
    pub singular_threshold: f32,
    /// The most the solver will rotate the arm in a single iteration. Full
    /// Newton steps from a far-away seed can swing the arm the wrong way round.
    pub max_theta_step: Angle,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    /// Where the pen ends up for a given arm pose.
    pub fn forward(&self, pose: &ArmPose) -> Point {
        let (s, c) = (sinf(pose.theta.radians), cosf(pose.theta.radians));
        let r = pose.radius.get();
        let d = self.pen_offset.get();
        Point::new(
            self.pivot.x + r * c + d * s,
            self.pivot.y + r * s - d * c,
        )
    }

    pub fn jacobian(&self, pose: &ArmPose) -> Jacobian {
        let (s, c) = (sinf(pose.theta.radians), cosf(pose.theta.radians));
        let r = pose.radius.get();
        let d = self.pen_offset.get();
        Jacobian {
            d_theta: Vector::new(d * c - r * s, d * s + r * c),
            d_radius: Vector::new(c, s),
        }
    }

    /// The arm radius needed to put the pen on `p`, regardless of angle.
    ///
    /// Returns `None` for points closer to the pivot than the pen offset,
    /// which no radius can reach.
    pub fn required_radius(&self, p: &Point) -> Option<Len> {
        let r2 = (*p - self.pivot).square_length() - square(self.pen_offset.get());
        (r2 >= 0.0).then(|| sqrtf(r2).mm())
    }

    pub fn radius_in_range(&self, r: Len) -> bool {
        self.radius_min.get() <= r.get() && r.get() <= self.radius_max.get()
    }

    pub fn theta_in_range(&self, theta: Angle) -> bool {
        self.theta_min.radians <= theta.radians && theta.radians <= self.theta_max.radians
    }

    pub fn contains(&self, pose: &ArmPose) -> bool {
        self.radius_in_range(pose.radius) && self.theta_in_range(pose.theta)
    }

    pub fn is_reachable(&self, p: &Point) -> bool {
        self.required_radius(p)
            .is_some_and(|r| self.radius_in_range(r))
    }

    pub fn clamp_radius(&self, r: Len) -> Len {
        r.get()
            .clamp(self.radius_min.get(), self.radius_max.get())
            .mm()
    }

    /// Shifts `theta` by whole turns so that it lies in the sweep, if possible.
    pub fn normalize_theta(&self, theta: Angle) -> Option<Angle> {
        // Slack for solutions that land a hair outside the sweep.
        const SLACK: f32 = 1e-4;

        let min = self.theta_min.radians;
        let max = self.theta_max.radians;
        let turns = floorf((theta.radians - min + SLACK) / (2.0 * PI));
        let t = theta.radians - turns * 2.0 * PI;
        (t <= max + SLACK).then(|| Angle::radians(t.clamp(min, max)))
    }

    /// The pose in the middle of the arm's range of motion.
    pub fn center_pose(&self) -> ArmPose {
        ArmPose {
            theta: Angle::radians((self.theta_min.radians + self.theta_max.radians) / 2.0),
            radius: ((self.radius_min.get() + self.radius_max.get()) / 2.0).mm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    impl Arbitrary for Config {
        type Parameters = ();
        type Strategy = BoxedStrategy<Config>;

        fn arbitrary_with(_: ()) -> Self::Strategy {
            (
                -100.0..100.0f32,
                -100.0..100.0f32,
                0.0..50.0f32,
                20.0..80.0f32,
                50.0..200.0f32,
            )
                .prop_map(|(px, py, d, rmin, span)| {
                    ConfigBuilder::default()
                        .with_pivot(Point::new(px, py))
                        .with_pen_offset(d.mm())
                        .with_radius_range(rmin.mm(), (rmin + span).mm())
                        .build()
                })
                .boxed()
        }
    }

    proptest! {
        // Check the jacobian against a difference quotient.
        #[test]
        fn test_jacobian(cfg: Config, theta in 0.0..6.0f32, r in 20.0..250.0f32, dt in -1.0..1.0f32, dr in -1.0..1.0f32) {
            let pose = ArmPose::new(Angle::radians(theta), r.mm());
            let h = 1e-2;
            let ahead = ArmPose::new(Angle::radians(theta + dt * h), (r + dr * h).mm());
            let behind = ArmPose::new(Angle::radians(theta - dt * h), (r - dr * h).mm());
            let jac = cfg.jacobian(&pose);
            let approx = (cfg.forward(&ahead) - cfg.forward(&behind)) / (2.0 * h);
            let exact = jac.d_theta * dt + jac.d_radius * dr;

            prop_assert!((approx.x - exact.x).abs() < 5e-2);
            prop_assert!((approx.y - exact.y).abs() < 5e-2);
        }

        // The pen is always `sqrt(r^2 + d^2)` from the pivot, so the required radius
        // recovers the pose's radius.
        #[test]
        fn test_required_radius(cfg: Config, theta in 0.0..6.0f32, r in 20.0..250.0f32) {
            let pose = ArmPose::new(Angle::radians(theta), r.mm());
            let p = cfg.forward(&pose);
            let q = cfg.required_radius(&p).unwrap();
            prop_assert!((q.get() - r).abs() < 1e-2);
        }
    }

    #[test]
    fn jacobian_determinant_is_minus_radius() {
        let cfg = Config::default();
        let pose = ArmPose::new(Angle::degrees(150.0), 120.0.mm());
        assert!((cfg.jacobian(&pose).det() + 120.0).abs() < 1e-3);
    }

    #[test]
    fn normalize_theta_wraps_whole_turns() {
        let cfg = Config::default();
        let t = cfg.normalize_theta(Angle::degrees(150.0 - 360.0)).unwrap();
        assert!((t.to_degrees() - 150.0).abs() < 1e-3);
        let t = cfg.normalize_theta(Angle::degrees(150.0 + 720.0)).unwrap();
        assert!((t.to_degrees() - 150.0).abs() < 1e-2);
        assert!(cfg.normalize_theta(Angle::degrees(0.0)).is_none());
        assert!(cfg.normalize_theta(Angle::degrees(300.0)).is_none());
    }

    #[test]
    fn points_inside_the_pen_offset_are_unreachable() {
        let cfg = Config::default();
        assert!(cfg.required_radius(&cfg.pivot).is_none());
        assert!(!cfg.is_reachable(&cfg.pivot));
    }
}
