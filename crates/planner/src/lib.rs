//! Step scheduling for the plotter's motors.
//!
//! Everything here runs off a fixed control period: once per period the
//! caller ticks each axis, and each axis says whether it wants a step pulse.
//! An axis never asks for more than one pulse per tick, so the control
//! period bounds the step rate.

#![cfg_attr(not(test), no_std)]

use libm::sqrtf;
use serde::{Deserialize, Serialize};

mod pen;
mod ramp;

pub use pen::PenLift;
pub use ramp::{synchronize, AxisTarget, TickOutcome};

/// Which way a motor turns, in the axis's own coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Increasing step count.
    Forward,
    /// Decreasing step count.
    Backward,
}

impl Direction {
    /// The direction that moves `distance` steps closer to zero distance,
    /// or `None` if we're already there.
    pub fn toward(distance: i32) -> Option<Direction> {
        match distance.signum() {
            1 => Some(Direction::Forward),
            -1 => Some(Direction::Backward),
            _ => None,
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub fn reverse(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Speed and acceleration limits for one axis, in steps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Steps per second.
    pub max_rate: f32,
    /// Steps per second per second.
    pub accel: f32,
}

impl Limits {
    pub fn new(max_rate: f32, accel: f32) -> Self {
        Self { max_rate, accel }
    }

    /// The slowest we'll go while there's still distance to cover. This is
    /// the speed reached after accelerating through a single step.
    pub fn min_rate(&self) -> f32 {
        sqrtf(2.0 * self.accel).min(self.max_rate)
    }

    /// These limits, restricted to what can be done with one pulse per
    /// control period. Degenerate limits are raised to one step per second
    /// (and per second squared) so that every move eventually finishes.
    pub fn capped(&self, period: f32) -> Limits {
        Limits {
            max_rate: self.max_rate.max(1.0).min(1.0 / period),
            accel: self.accel.max(1.0),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_rate: 1000.0,
            accel: 4000.0,
        }
    }
}
