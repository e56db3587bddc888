use core::fmt::Debug;

use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin, PinState};
use polarplot_planner::Direction;

/// A stepper motor, its driver chip, and the limit switch at one end of
/// its travel.
pub trait AxisDriver {
    type Error: Debug;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Sets the direction of subsequent steps.
    fn set_direction(&mut self, dir: Direction) -> Result<(), Self::Error>;

    /// Emits one step pulse.
    fn step(&mut self) -> Result<(), Self::Error>;

    fn limit_triggered(&mut self) -> Result<bool, Self::Error>;
}

/// A driver chip with step, direction and (active-low) enable inputs, plus a
/// normally-closed limit switch. The switch input reads high when the
/// switch is open, which is also what a broken wire looks like.
///
/// The direction line is high for [`Direction::Forward`].
pub struct StepDirDriver<S, D, E, L> {
    step: S,
    dir: D,
    enable: E,
    limit: L,
}

impl<S, D, E, L> StepDirDriver<S, D, E, L>
where
    S: OutputPin,
    D: OutputPin,
    E: OutputPin,
    L: InputPin,
{
    pub fn new(step: S, dir: D, enable: E, limit: L) -> Self {
        StepDirDriver {
            step,
            dir,
            enable,
            limit,
        }
    }

    pub fn release(self) -> (S, D, E, L) {
        (self.step, self.dir, self.enable, self.limit)
    }
}

impl<S, D, E, L> AxisDriver for StepDirDriver<S, D, E, L>
where
    S: OutputPin,
    D: OutputPin,
    E: OutputPin,
    L: InputPin,
{
    type Error = ErrorKind;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), ErrorKind> {
        self.enable
            .set_state(PinState::from(!enabled))
            .map_err(|e| e.kind())
    }

    fn set_direction(&mut self, dir: Direction) -> Result<(), ErrorKind> {
        self.dir
            .set_state(PinState::from(dir == Direction::Forward))
            .map_err(|e| e.kind())
    }

    fn step(&mut self) -> Result<(), ErrorKind> {
        self.step.set_high().map_err(|e| e.kind())?;
        self.step.set_low().map_err(|e| e.kind())
    }

    fn limit_triggered(&mut self) -> Result<bool, ErrorKind> {
        self.limit.is_high().map_err(|e| e.kind())
    }
}
