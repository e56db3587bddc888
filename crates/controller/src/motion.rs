use polarplot_geom::{Angle, ArmPose};
use polarplot_planner::{synchronize, AxisTarget, Direction, PenLift};

use crate::{
    driver::AxisDriver,
    homing::{Homing, HomingAction, HomingFault, HomingStatus},
    AxisId, Axes, MachineConfig, MechanismState, PlotError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MotionError {
    #[error("the machine isn't homed")]
    NotHomed,
    #[error(transparent)]
    HomingFault(#[from] HomingFault),
    #[error("{axis} driver fault")]
    DriverFault { axis: AxisId },
}

impl From<MotionError> for PlotError {
    fn from(e: MotionError) -> PlotError {
        match e {
            MotionError::NotHomed => PlotError::NotHomed,
            MotionError::HomingFault(HomingFault { axis }) => PlotError::HomingFault { axis },
            MotionError::DriverFault { axis } => PlotError::DriverFault { axis },
        }
    }
}

/// Owns the motors and keeps track of where they are.
///
/// Positions are only ever derived from the steps we've actually pulsed
/// out, and they only mean something once homing has finished. Until then,
/// everything that would move the arm or the pen fails with
/// [`MotionError::NotHomed`].
pub struct MotionController<D> {
    config: MachineConfig,
    drivers: Axes<D>,
    theta: AxisTarget,
    radius: AxisTarget,
    pen: PenLift,
    homing: Homing,
}

impl<D: AxisDriver> MotionController<D> {
    pub fn new(config: MachineConfig, drivers: Axes<D>) -> Self {
        MotionController {
            pen: PenLift::new(
                config.pen.up_steps,
                config.pen.down_steps,
                config.settle_ticks(),
            ),
            config,
            drivers,
            theta: AxisTarget::new(0),
            radius: AxisTarget::new(0),
            homing: Homing::default(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn drivers(&self) -> &Axes<D> {
        &self.drivers
    }

    pub fn into_drivers(self) -> Axes<D> {
        self.drivers
    }

    pub fn homing_status(&self, axis: AxisId) -> HomingStatus {
        self.homing.status(axis)
    }

    pub fn is_ready(&self) -> bool {
        self.homing.is_ready()
    }

    pub fn state(&self) -> MechanismState {
        MechanismState {
            theta: Angle::radians(self.config.theta.from_steps(self.theta.position())),
            radius: self.config.radius.from_steps(self.radius.position()),
            pen_down: self.pen.is_down(),
        }
    }

    fn ensure_ready(&self) -> Result<(), MotionError> {
        if self.homing.is_ready() {
            Ok(())
        } else {
            Err(MotionError::NotHomed)
        }
    }

    /// Starts moving the arm towards `pose`, which is clamped to the arm's
    /// range of motion. Both axes are timed to arrive together.
    pub fn move_to(&mut self, pose: &ArmPose) -> Result<(), MotionError> {
        self.ensure_ready()?;

        let geom = &self.config.geometry;
        let theta = pose
            .theta
            .radians
            .clamp(geom.theta_min.radians, geom.theta_max.radians);
        let radius = geom.clamp_radius(pose.radius).get();
        let theta_target = self.config.theta.to_steps(theta);
        let radius_target = self.config.radius.to_steps(radius);

        let period = self.config.period();
        let [theta_limits, radius_limits] = synchronize([
            (
                theta_target - self.theta.position(),
                self.config.theta.limits().capped(period),
            ),
            (
                radius_target - self.radius.position(),
                self.config.radius.limits().capped(period),
            ),
        ]);
        log::debug!(
            "moving to steps ({theta_target}, {radius_target}) from ({}, {})",
            self.theta.position(),
            self.radius.position()
        );
        self.theta.move_to(theta_target, theta_limits);
        self.radius.move_to(radius_target, radius_limits);
        Ok(())
    }

    /// Raises or lowers the pen, returning whether that changed anything.
    ///
    /// The pen travel is pulsed out immediately; keep calling [`tick`] until
    /// it reports that everything has settled.
    ///
    /// [`tick`]: MotionController::tick
    pub fn set_pen(&mut self, down: bool) -> Result<bool, MotionError> {
        self.ensure_ready()?;
        match self.pen.actuate(down) {
            Some(delta) => {
                self.burst(AxisId::PenLift, delta)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Advances one control period, returning whether the current move (and
    /// any pen movement) has finished.
    pub fn tick(&mut self) -> Result<bool, MotionError> {
        self.ensure_ready()?;
        let period = self.config.period();

        let theta = self.theta.tick(period);
        if let Some(dir) = theta.step {
            self.pulse(AxisId::Theta, dir)?;
        }
        let radius = self.radius.tick(period);
        if let Some(dir) = radius.step {
            self.pulse(AxisId::Radius, dir)?;
        }
        let settled = self.pen.tick();
        Ok(theta.reached && radius.reached && settled)
    }

    /// Powers up the motors and starts looking for the limit switches.
    pub fn start_homing(&mut self) -> Result<(), MotionError> {
        self.theta.stop();
        self.radius.stop();
        for axis in AxisId::ALL {
            self.driver_op(axis, |d| d.set_enabled(true))?;
        }
        self.homing.start();
        log::info!("homing");
        Ok(())
    }

    /// Advances homing by one control period. Returns true once every axis is
    /// homed and the pen is parked (up) and settled.
    pub fn tick_homing(&mut self) -> Result<bool, MotionError> {
        if self.homing.is_ready() {
            return Ok(self.pen.tick());
        }

        let mut triggered = Axes::new(false, false, false);
        for axis in AxisId::ALL {
            *triggered.get_mut(axis) = self.driver_op(axis, |d| d.limit_triggered())?;
        }

        let actions = match self
            .homing
            .tick(triggered, &self.config.homing(), self.config.period())
        {
            Ok(actions) => actions,
            Err(fault) => {
                log::error!("{fault}");
                if let Err(e) = self.disable_all() {
                    log::error!("failed to disable drivers: {e}");
                }
                self.homing.reset();
                return Err(fault.into());
            }
        };

        self.pen.tick();
        for axis in AxisId::ALL {
            match *actions.get(axis) {
                HomingAction::Idle => {}
                HomingAction::Step(dir) => self.pulse(axis, dir)?,
                HomingAction::Found { away, backoff } => {
                    let offset = away.sign() * backoff as i32;
                    self.burst(axis, offset)?;
                    match axis {
                        AxisId::Theta => self.theta.reset(offset),
                        AxisId::Radius => self.radius.reset(offset),
                        AxisId::PenLift => {
                            // Parking is the last part of the pen's back-off.
                            self.pen.rezero(offset);
                            if let Some(delta) = self.pen.actuate(false) {
                                self.burst(axis, delta)?;
                            }
                            log::debug!("pen parked at step {}", self.pen.position());
                        }
                    }
                }
            }
        }

        if self.homing.is_ready() {
            log::info!("homing complete");
            return Ok(self.pen.is_settled());
        }
        Ok(false)
    }

    /// Stops all motion immediately and powers down the motors. The machine
    /// has to be homed again before it will move.
    pub fn halt(&mut self) -> Result<(), MotionError> {
        self.theta.stop();
        self.radius.stop();
        self.homing.reset();
        self.disable_all()
    }

    fn disable_all(&mut self) -> Result<(), MotionError> {
        let mut ret = Ok(());
        for axis in AxisId::ALL {
            let res = self.driver_op(axis, |d| d.set_enabled(false));
            ret = ret.and(res);
        }
        ret
    }

    fn inverted(&self, axis: AxisId) -> bool {
        match axis {
            AxisId::Theta => self.config.theta.invert,
            AxisId::Radius => self.config.radius.invert,
            AxisId::PenLift => self.config.pen.invert,
        }
    }

    fn driver_op<T>(
        &mut self,
        axis: AxisId,
        op: impl FnOnce(&mut D) -> Result<T, D::Error>,
    ) -> Result<T, MotionError> {
        op(self.drivers.get_mut(axis)).map_err(|e| {
            log::error!("{axis} driver: {e:?}");
            MotionError::DriverFault { axis }
        })
    }

    fn pulse(&mut self, axis: AxisId, dir: Direction) -> Result<(), MotionError> {
        let dir = if self.inverted(axis) {
            dir.reverse()
        } else {
            dir
        };
        self.driver_op(axis, |d| {
            d.set_direction(dir)?;
            d.step()
        })
    }

    fn burst(&mut self, axis: AxisId, steps: i32) -> Result<(), MotionError> {
        if let Some(dir) = Direction::toward(steps) {
            for _ in 0..steps.unsigned_abs() {
                self.pulse(axis, dir)?;
            }
        }
        Ok(())
    }
}
