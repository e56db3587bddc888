//! The top-level control loop.

use polarplot_geom::Point;
use polarplot_protocol::{MotionDirective, ParseError};

use crate::{
    driver::AxisDriver,
    motion::MotionController,
    sync::{sync_frame, SyncLink, SyncReporter},
    PlotError,
};

/// Paces the control loop: `wait` returns once per control period.
pub trait Ticker {
    fn wait(&mut self);
}

/// A ticker that doesn't wait at all, for running as fast as possible.
pub struct NoWait;

impl Ticker for NoWait {
    fn wait(&mut self) {}
}

/// Polled once per tick; a `true` aborts the job.
pub trait StopInput {
    fn stop_requested(&mut self) -> bool;
}

impl<F: FnMut() -> bool> StopInput for F {
    fn stop_requested(&mut self) -> bool {
        self()
    }
}

/// The start button: polled once per tick between homing and the job.
pub trait StartInput {
    fn start_requested(&mut self) -> bool;
}

impl<F: FnMut() -> bool> StartInput for F {
    fn start_requested(&mut self) -> bool {
        self()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub completed: u32,
    pub skipped: u32,
    pub frames_sent: u32,
    pub frames_dropped: u32,
}

pub struct Plotter<D, L, T> {
    motion: MotionController<D>,
    sync: SyncReporter<L>,
    ticker: T,
}

impl<D: AxisDriver, L: SyncLink, T: Ticker> Plotter<D, L, T> {
    pub fn new(motion: MotionController<D>, link: L, ticker: T) -> Self {
        Plotter {
            motion,
            sync: SyncReporter::new(link),
            ticker,
        }
    }

    pub fn motion(&self) -> &MotionController<D> {
        &self.motion
    }

    pub fn sync(&self) -> &SyncReporter<L> {
        &self.sync
    }

    pub fn into_parts(self) -> (MotionController<D>, L, T) {
        (self.motion, self.sync.into_link(), self.ticker)
    }

    /// Homes every axis, returning once the machine is ready to draw.
    pub fn home<S: StopInput + ?Sized>(&mut self, stop: &mut S) -> Result<(), PlotError> {
        self.motion.start_homing()?;
        loop {
            self.check_stop(stop)?;
            self.ticker.wait();
            if self.motion.tick_homing()? {
                return Ok(());
            }
        }
    }

    /// Holds a homed machine still until `start` is pressed.
    pub fn wait_for_start<A, S>(&mut self, start: &mut A, stop: &mut S) -> Result<(), PlotError>
    where
        A: StartInput + ?Sized,
        S: StopInput + ?Sized,
    {
        if !self.motion.is_ready() {
            return Err(PlotError::NotHomed);
        }
        log::info!("waiting for start");
        loop {
            self.check_stop(stop)?;
            if start.start_requested() {
                log::info!("started");
                return Ok(());
            }
            self.ticker.wait();
        }
    }

    /// Draws a job, one directive at a time.
    ///
    /// Directives that can't be parsed or reached are logged and skipped.
    /// Anything else that goes wrong ends the job, as does `stop`.
    pub fn run<I, S>(&mut self, directives: I, stop: &mut S) -> Result<JobSummary, PlotError>
    where
        I: IntoIterator<Item = Result<MotionDirective, ParseError>>,
        S: StopInput + ?Sized,
    {
        if !self.motion.is_ready() {
            return Err(PlotError::NotHomed);
        }
        let sent_before = self.sync.sent();
        let dropped_before = self.sync.dropped();
        let mut summary = JobSummary::default();

        for directive in directives {
            match self.execute(directive, stop) {
                Ok(()) => summary.completed += 1,
                Err(
                    e @ (PlotError::Parse(_)
                    | PlotError::TargetOutOfRange { .. }
                    | PlotError::Kinematics { .. }),
                ) => {
                    log::warn!("skipping directive: {e}");
                    summary.skipped += 1;
                }
                Err(e) => {
                    log::error!("{e} after {} directives", summary.completed);
                    return Err(e);
                }
            }
        }

        summary.frames_sent = self.sync.sent() - sent_before;
        summary.frames_dropped = self.sync.dropped() - dropped_before;
        log::info!(
            "job finished: {} completed, {} skipped, {} frames sent, {} dropped",
            summary.completed,
            summary.skipped,
            summary.frames_sent,
            summary.frames_dropped
        );
        Ok(summary)
    }

    fn execute<S: StopInput + ?Sized>(
        &mut self,
        directive: Result<MotionDirective, ParseError>,
        stop: &mut S,
    ) -> Result<(), PlotError> {
        self.check_stop(stop)?;
        match directive? {
            MotionDirective::PenUp => self.pen(false, stop),
            MotionDirective::PenDown => self.pen(true, stop),
            MotionDirective::MoveTo { x, y } => self.move_to(x, y, stop),
        }
    }

    fn pen<S: StopInput + ?Sized>(&mut self, down: bool, stop: &mut S) -> Result<(), PlotError> {
        if self.motion.set_pen(down)? {
            log::debug!("pen {}", if down { "down" } else { "up" });
            self.finish(stop)?;
            self.report();
        }
        Ok(())
    }

    fn move_to<S: StopInput + ?Sized>(&mut self, x: f32, y: f32, stop: &mut S) -> Result<(), PlotError> {
        let seed = self.motion.state().pose();
        let pose = self
            .motion
            .config()
            .geometry
            .solve(&Point::new(x, y), &seed)
            .map_err(|source| {
                if source.is_out_of_range() {
                    PlotError::TargetOutOfRange { x, y, source }
                } else {
                    PlotError::Kinematics { x, y, source }
                }
            })?;
        log::debug!("({x}, {y}) -> {pose:?}");
        self.motion.move_to(&pose)?;
        self.finish(stop)?;
        self.report();
        Ok(())
    }

    /// Ticks until the current move is done.
    fn finish<S: StopInput + ?Sized>(&mut self, stop: &mut S) -> Result<(), PlotError> {
        loop {
            self.check_stop(stop)?;
            self.ticker.wait();
            if self.motion.tick()? {
                return Ok(());
            }
        }
    }

    fn check_stop<S: StopInput + ?Sized>(&mut self, stop: &mut S) -> Result<(), PlotError> {
        if stop.stop_requested() {
            log::warn!("stop requested, halting");
            self.motion.halt()?;
            return Err(PlotError::Aborted);
        }
        Ok(())
    }

    fn report(&mut self) {
        let frame = sync_frame(&self.motion.config().geometry, &self.motion.state());
        if let Err(e) = self.sync.send(&frame) {
            log::warn!("{e} ({} dropped so far)", self.sync.dropped());
        }
    }
}
