//! The plotter's firmware-side logic: driving the motors, homing, and
//! running a job.
//!
//! Nothing in here knows about particular hardware. Motors and limit
//! switches come in through [`AxisDriver`], the serial link through
//! [`SyncLink`], and the timer through [`Ticker`], so the same code runs on
//! a microcontroller and in the host-side simulator.

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

use libm::roundf;
use polarplot_geom::{Angle, ArmPose, LenExt as _};
use polarplot_planner::{Direction, Limits};
use polarplot_protocol::{FrameError, ParseError};
use serde::{Deserialize, Serialize};

pub mod control;
pub mod driver;
pub mod homing;
pub mod motion;
pub mod sim;
pub mod sync;

pub use control::{JobSummary, NoWait, Plotter, StartInput, StopInput, Ticker};
pub use driver::{AxisDriver, StepDirDriver};
pub use homing::{HomingConfig, HomingStatus};
pub use motion::MotionController;
pub use sync::{sync_frame, SyncLink, SyncReporter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisId {
    Theta,
    Radius,
    PenLift,
}

impl AxisId {
    pub const ALL: [AxisId; 3] = [AxisId::Theta, AxisId::Radius, AxisId::PenLift];
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AxisId::Theta => "theta",
            AxisId::Radius => "radius",
            AxisId::PenLift => "pen-lift",
        })
    }
}

/// One of something for each axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Axes<T> {
    pub theta: T,
    pub radius: T,
    pub pen: T,
}

impl<T> Axes<T> {
    pub fn new(theta: T, radius: T, pen: T) -> Self {
        Axes { theta, radius, pen }
    }

    pub fn get(&self, axis: AxisId) -> &T {
        match axis {
            AxisId::Theta => &self.theta,
            AxisId::Radius => &self.radius,
            AxisId::PenLift => &self.pen,
        }
    }

    pub fn get_mut(&mut self, axis: AxisId) -> &mut T {
        match axis {
            AxisId::Theta => &mut self.theta,
            AxisId::Radius => &mut self.radius,
            AxisId::PenLift => &mut self.pen,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Axes<U> {
        Axes {
            theta: f(self.theta),
            radius: f(self.radius),
            pen: f(self.pen),
        }
    }
}

/// Where the mechanism is, as far as the step counts say.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MechanismState {
    pub theta: Angle,
    /// Millimeters.
    pub radius: f32,
    pub pen_down: bool,
}

impl MechanismState {
    pub fn pose(&self) -> ArmPose {
        ArmPose::new(self.theta, self.radius.mm())
    }
}

/// How one of the arm's motors maps onto the arm, and how fast it can go.
///
/// "Units" are radians for the theta axis and millimeters for the radius
/// axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub steps_per_unit: f32,
    /// Where the axis is (in units) when its homing switch trips.
    pub home_position: f32,
    /// Swap the meaning of the direction line.
    pub invert: bool,
    /// Steps per second.
    pub max_rate: f32,
    /// Steps per second per second.
    pub accel: f32,
    pub homing: HomingConfig,
}

impl AxisConfig {
    pub fn to_steps(&self, value: f32) -> i32 {
        roundf((value - self.home_position) * self.steps_per_unit) as i32
    }

    pub fn from_steps(&self, steps: i32) -> f32 {
        self.home_position + steps as f32 / self.steps_per_unit
    }

    pub fn limits(&self) -> Limits {
        Limits::new(self.max_rate, self.accel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PenConfig {
    /// Step positions, relative to the homing switch.
    pub up_steps: i32,
    pub down_steps: i32,
    /// How long to wait after moving the pen before doing anything else.
    pub settle_ms: u32,
    pub invert: bool,
    pub homing: HomingConfig,
}

/// Everything about the physical machine.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MachineConfig {
    pub geometry: polarplot_geom::Config,
    pub theta: AxisConfig,
    pub radius: AxisConfig,
    pub pen: PenConfig,
    /// Microseconds per control tick.
    pub control_period_us: u32,
}

const MICROSTEPS_PER_REV: f32 = 1600.0;
const ARM_GEARING: f32 = 6.0;
const RACK_MM_PER_REV: f32 = 40.0;

impl Default for MachineConfig {
    fn default() -> Self {
        let geometry = polarplot_geom::Config::default();
        let theta_steps_per_rad = MICROSTEPS_PER_REV * ARM_GEARING / (2.0 * core::f32::consts::PI);
        let radius_steps_per_mm = MICROSTEPS_PER_REV / RACK_MM_PER_REV;
        MachineConfig {
            geometry,
            theta: AxisConfig {
                steps_per_unit: theta_steps_per_rad,
                home_position: geometry.theta_min.radians,
                invert: false,
                max_rate: 3000.0,
                accel: 12000.0,
                homing: HomingConfig {
                    rate: theta_steps_per_rad / 2.0,
                    direction: Direction::Backward,
                    max_steps: 6000,
                    backoff_steps: 200,
                },
            },
            radius: AxisConfig {
                steps_per_unit: radius_steps_per_mm,
                home_position: geometry.radius_min.get(),
                invert: false,
                max_rate: 3000.0,
                accel: 12000.0,
                homing: HomingConfig {
                    // 20mm/s.
                    rate: radius_steps_per_mm * 20.0,
                    direction: Direction::Backward,
                    max_steps: 9000,
                    backoff_steps: 200,
                },
            },
            pen: PenConfig {
                up_steps: 178,
                down_steps: 291,
                settle_ms: 50,
                invert: false,
                homing: HomingConfig {
                    rate: 1000.0,
                    direction: Direction::Backward,
                    max_steps: 1000,
                    backoff_steps: 20,
                },
            },
            control_period_us: 100,
        }
    }
}

impl MachineConfig {
    /// Seconds per control tick.
    pub fn period(&self) -> f32 {
        self.control_period_us as f32 * 1e-6
    }

    pub fn settle_ticks(&self) -> u32 {
        (self.pen.settle_ms * 1000).div_ceil(self.control_period_us.max(1))
    }

    pub fn homing(&self) -> Axes<HomingConfig> {
        Axes::new(self.theta.homing, self.radius.homing, self.pen.homing)
    }
}

/// Why a job (or part of one) failed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PlotError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("({x}, {y}) is out of reach: {source}")]
    TargetOutOfRange {
        x: f32,
        y: f32,
        source: polarplot_geom::SolveError,
    },
    #[error("failed to solve for ({x}, {y}): {source}")]
    Kinematics {
        x: f32,
        y: f32,
        source: polarplot_geom::SolveError,
    },
    #[error("{axis} axis never found its homing switch")]
    HomingFault { axis: AxisId },
    #[error("sync link is busy, frame dropped")]
    LinkOverrun,
    #[error("bad sync frame: {0}")]
    Frame(FrameError),
    #[error("the machine isn't homed")]
    NotHomed,
    #[error("job aborted")]
    Aborted,
    #[error("{axis} driver fault")]
    DriverFault { axis: AxisId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_conversion() {
        let cfg = MachineConfig::default();
        let theta = &cfg.theta;
        assert_eq!(theta.to_steps(theta.home_position), 0);
        let quarter = theta.to_steps(theta.home_position + core::f32::consts::FRAC_PI_2);
        assert_eq!(quarter, 2400);
        assert!((theta.from_steps(quarter) - theta.home_position - core::f32::consts::FRAC_PI_2).abs() < 1e-5);

        assert_eq!(cfg.radius.to_steps(100.0), 1000);
        assert_eq!(cfg.radius.from_steps(-40), 74.0);
    }

    #[test]
    fn default_homing_rates() {
        let cfg = MachineConfig::default();
        assert_eq!(cfg.radius.homing.rate, 800.0);
        assert_eq!(cfg.pen.homing.rate, 1000.0);
        // Half a radian per second.
        assert!((cfg.theta.homing.rate - cfg.theta.steps_per_unit / 2.0).abs() < 1e-3);
    }

    #[test]
    fn frame_errors_carry_through() {
        let err = PlotError::Frame(FrameError::Oversize);
        assert_eq!(err.clone(), err);
        assert_eq!(err.to_string(), "bad sync frame: frame longer than 11 bytes");
    }

    #[test]
    fn default_timing() {
        let cfg = MachineConfig::default();
        assert_eq!(cfg.settle_ticks(), 500);
        assert!((cfg.period() - 1e-4).abs() < 1e-9);
    }
}
