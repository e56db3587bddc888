//! A pretend motor, for running the controller without hardware.

use core::convert::Infallible;

use polarplot_planner::Direction;

use crate::driver::AxisDriver;

/// A stepper that just counts.
///
/// The limit switch sits at a fixed (physical) step position and is
/// triggered whenever the axis is at or past it, on the side given when
/// the switch was installed.
#[derive(Clone, Debug)]
pub struct SimAxis {
    position: i32,
    direction: Direction,
    enabled: bool,
    switch: Option<(i32, Direction)>,
    pulses: u64,
    ignored_pulses: u64,
}

impl SimAxis {
    /// An axis sitting at `position`, with no switch.
    pub fn new(position: i32) -> Self {
        SimAxis {
            position,
            direction: Direction::Forward,
            enabled: false,
            switch: None,
            pulses: 0,
            ignored_pulses: 0,
        }
    }

    /// Installs a limit switch at `at`, triggered by positions beyond it in
    /// direction `side`.
    pub fn with_switch(mut self, at: i32, side: Direction) -> Self {
        self.switch = Some((at, side));
        self
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pulses that actually moved the motor.
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    /// Pulses sent while the driver was disabled.
    pub fn ignored_pulses(&self) -> u64 {
        self.ignored_pulses
    }

    fn switch_triggered(&self) -> bool {
        match self.switch {
            Some((at, Direction::Forward)) => self.position >= at,
            Some((at, Direction::Backward)) => self.position <= at,
            None => false,
        }
    }
}

impl AxisDriver for SimAxis {
    type Error = Infallible;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Infallible> {
        self.enabled = enabled;
        Ok(())
    }

    fn set_direction(&mut self, dir: Direction) -> Result<(), Infallible> {
        self.direction = dir;
        Ok(())
    }

    fn step(&mut self) -> Result<(), Infallible> {
        if self.enabled {
            self.position += self.direction.sign();
            self.pulses += 1;
        } else {
            self.ignored_pulses += 1;
        }
        Ok(())
    }

    fn limit_triggered(&mut self) -> Result<bool, Infallible> {
        Ok(self.switch_triggered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_switches() {
        let mut axis = SimAxis::new(2).with_switch(0, Direction::Backward);
        axis.step().unwrap();
        assert_eq!(axis.position(), 2);
        assert_eq!(axis.ignored_pulses(), 1);

        axis.set_enabled(true).unwrap();
        axis.set_direction(Direction::Backward).unwrap();
        axis.step().unwrap();
        assert!(!axis.limit_triggered().unwrap());
        axis.step().unwrap();
        assert!(axis.limit_triggered().unwrap());
        assert_eq!(axis.pulses(), 2);
        assert_eq!(axis.position(), 0);
    }
}
