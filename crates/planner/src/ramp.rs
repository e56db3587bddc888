use crate::{Direction, Limits};

/// What an axis wants done in the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    /// A pulse to emit this tick, if any.
    pub step: Option<Direction>,
    /// Whether the axis is at its target (after taking `step`).
    pub reached: bool,
}

/// One axis following a trapezoidal speed profile towards a target step count.
///
/// The speed ramps up by `accel` per second until it hits `max_rate`, and
/// starts ramping down as soon as the distance it would take to stop
/// covers the remaining distance. Steps are emitted by accumulating
/// `speed * period` into a phase and pulsing whenever the phase crosses one.
#[derive(Clone, Debug, Default)]
pub struct AxisTarget {
    position: i32,
    target: i32,
    /// Steps per second.
    speed: f32,
    /// Fractional progress towards the next step.
    phase: f32,
    limits: Limits,
}

impl AxisTarget {
    pub fn new(position: i32) -> Self {
        AxisTarget {
            position,
            target: position,
            ..Default::default()
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn remaining(&self) -> i32 {
        self.target - self.position
    }

    pub fn is_reached(&self) -> bool {
        self.position == self.target
    }

    /// Starts a new move from wherever we are now. The ramp starts over from
    /// rest.
    pub fn move_to(&mut self, target: i32, limits: Limits) {
        self.target = target;
        self.limits = limits;
        self.speed = 0.0;
        self.phase = 0.0;
    }

    /// Redefines the current position, dropping any move in progress.
    pub fn reset(&mut self, position: i32) {
        self.position = position;
        self.target = position;
        self.speed = 0.0;
        self.phase = 0.0;
    }

    /// Drops any move in progress, staying where we are.
    pub fn stop(&mut self) {
        self.reset(self.position);
    }

    /// Advances by one control period of `period` seconds.
    pub fn tick(&mut self, period: f32) -> TickOutcome {
        let remaining = self.remaining();
        let Some(dir) = Direction::toward(remaining) else {
            self.speed = 0.0;
            self.phase = 0.0;
            return TickOutcome {
                step: None,
                reached: true,
            };
        };

        let limits = self.limits.capped(period);
        let braking_distance = self.speed * self.speed / (2.0 * limits.accel);
        if braking_distance >= remaining.unsigned_abs() as f32 {
            self.speed -= limits.accel * period;
        } else {
            self.speed += limits.accel * period;
        }
        self.speed = self.speed.clamp(limits.min_rate(), limits.max_rate);

        self.phase += self.speed * period;
        let step = if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.position += dir.sign();
            Some(dir)
        } else {
            None
        };

        TickOutcome {
            step,
            reached: self.is_reached(),
        }
    }
}

/// Scales the limits of several simultaneous moves so that they all take
/// the same time.
///
/// Each entry is a move distance (in steps) and that axis's limits. Every
/// moving axis gets the same speed and acceleration as a fraction of its own
/// distance, so the axes move in proportion and the pen follows
/// (approximately) the straight line between the endpoints in step space.
/// Axes that aren't moving keep their limits.
pub fn synchronize<const N: usize>(moves: [(i32, Limits); N]) -> [Limits; N] {
    let mut rate_per_step = f32::INFINITY;
    let mut accel_per_step = f32::INFINITY;
    for (distance, limits) in &moves {
        if *distance != 0 {
            let d = distance.unsigned_abs() as f32;
            rate_per_step = rate_per_step.min(limits.max_rate / d);
            accel_per_step = accel_per_step.min(limits.accel / d);
        }
    }

    moves.map(|(distance, limits)| {
        if distance == 0 {
            limits
        } else {
            let d = distance.unsigned_abs() as f32;
            Limits {
                max_rate: rate_per_step * d,
                accel: accel_per_step * d,
            }
        }
    })
}
