//! Finding the limit switches.
//!
//! Until every axis has been homed the step counts mean nothing, so the
//! motion controller refuses to move. Homing goes in two stages: the pen
//! lift first, so the pen is clear of the paper, then the two arm axes
//! together.

use polarplot_planner::Direction;
use serde::{Deserialize, Serialize};

use crate::{AxisId, Axes};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HomingConfig {
    /// Steps per second.
    pub rate: f32,
    /// Which way to go to find the switch.
    pub direction: Direction,
    /// Give up after this many steps without finding the switch.
    pub max_steps: u32,
    /// How far to back away from the switch once it's found.
    pub backoff_steps: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomingStatus {
    NotHomed,
    Seeking,
    Homed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no homing switch found on the {axis} axis")]
pub struct HomingFault {
    pub axis: AxisId,
}

/// What the homing machine wants from an axis this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomingAction {
    Idle,
    Step(Direction),
    /// The switch just tripped: this is the new zero, and we should
    /// immediately pulse out `backoff` steps in direction `away`.
    Found { away: Direction, backoff: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// Started, but we haven't looked at the switch yet.
    Pending,
    /// The switch was already tripped when we started, so we're backing off
    /// until it releases.
    Clearing,
    Seeking,
    Homed,
}

/// Homing for a single axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct AxisHoming {
    phase: Phase,
    travelled: u32,
    step_phase: f32,
}

impl AxisHoming {
    pub fn status(&self) -> HomingStatus {
        match self.phase {
            Phase::Idle => HomingStatus::NotHomed,
            Phase::Pending | Phase::Clearing | Phase::Seeking => HomingStatus::Seeking,
            Phase::Homed => HomingStatus::Homed,
        }
    }

    pub fn begin(&mut self) {
        *self = AxisHoming {
            phase: Phase::Pending,
            ..Default::default()
        };
    }

    pub fn reset(&mut self) {
        *self = AxisHoming::default();
    }

    /// Advances one control period. `triggered` is the switch reading at the
    /// start of the tick.
    pub fn tick(
        &mut self,
        axis: AxisId,
        triggered: bool,
        cfg: &HomingConfig,
        period: f32,
    ) -> Result<HomingAction, HomingFault> {
        let toward = cfg.direction;
        let dir = match self.phase {
            Phase::Idle | Phase::Homed => return Ok(HomingAction::Idle),
            Phase::Pending if triggered => {
                self.phase = Phase::Clearing;
                toward.reverse()
            }
            Phase::Clearing if triggered => toward.reverse(),
            Phase::Pending | Phase::Clearing => {
                self.phase = Phase::Seeking;
                toward
            }
            Phase::Seeking if triggered => {
                self.phase = Phase::Homed;
                return Ok(HomingAction::Found {
                    away: toward.reverse(),
                    backoff: cfg.backoff_steps,
                });
            }
            Phase::Seeking => toward,
        };

        self.step_phase += (cfg.rate * period).min(1.0);
        if self.step_phase < 1.0 {
            return Ok(HomingAction::Idle);
        }
        if self.travelled >= cfg.max_steps {
            return Err(HomingFault { axis });
        }
        self.step_phase -= 1.0;
        self.travelled += 1;
        Ok(HomingAction::Step(dir))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Idle,
    PenLift,
    Arm,
}

/// Homing for the whole machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Homing {
    axes: Axes<AxisHoming>,
    stage: Stage,
}

impl Homing {
    pub fn status(&self, axis: AxisId) -> HomingStatus {
        self.axes.get(axis).status()
    }

    /// Whether every axis is homed, meaning that it's safe to move.
    pub fn is_ready(&self) -> bool {
        AxisId::ALL
            .iter()
            .all(|&a| self.status(a) == HomingStatus::Homed)
    }

    pub fn start(&mut self) {
        self.reset();
        self.stage = Stage::PenLift;
        self.axes.pen.begin();
    }

    pub fn reset(&mut self) {
        *self = Homing::default();
    }

    /// Advances one control period, given the current switch readings.
    pub fn tick(
        &mut self,
        triggered: Axes<bool>,
        cfg: &Axes<HomingConfig>,
        period: f32,
    ) -> Result<Axes<HomingAction>, HomingFault> {
        let mut actions = Axes::new(HomingAction::Idle, HomingAction::Idle, HomingAction::Idle);
        let active: &[AxisId] = match self.stage {
            Stage::Idle => &[],
            Stage::PenLift => &[AxisId::PenLift],
            Stage::Arm => &[AxisId::Theta, AxisId::Radius],
        };

        for &axis in active {
            let result = self
                .axes
                .get_mut(axis)
                .tick(axis, *triggered.get(axis), cfg.get(axis), period);
            let action = match result {
                Ok(action) => action,
                Err(fault) => {
                    self.stage = Stage::Idle;
                    return Err(fault);
                }
            };
            if let HomingAction::Found { .. } = action {
                log::info!("{axis} axis homed");
            }
            *actions.get_mut(axis) = action;
        }

        if self.stage == Stage::PenLift && self.axes.pen.status() == HomingStatus::Homed {
            self.stage = Stage::Arm;
            self.axes.theta.begin();
            self.axes.radius.begin();
        }
        Ok(actions)
    }
}
