use std::time::{Duration, Instant};

use polarplot_controller::{sim::SimAxis, AxisId, Axes, MachineConfig, Ticker};

/// A simulated machine, with each axis parked halfway along its homing
/// search range from its switch.
pub fn machine(config: &MachineConfig) -> Axes<SimAxis> {
    config.homing().map(|homing| {
        let start = -homing.direction.sign() * (homing.max_steps / 2) as i32;
        SimAxis::new(start).with_switch(0, homing.direction)
    })
}

/// Paces the control loop to wall-clock time.
pub struct RealTime {
    period: Duration,
    next: Instant,
}

impl RealTime {
    pub fn new(period: Duration) -> Self {
        RealTime {
            period,
            next: Instant::now(),
        }
    }
}

impl Ticker for RealTime {
    fn wait(&mut self) {
        self.next += self.period;
        let now = Instant::now();
        if let Some(remaining) = self.next.checked_duration_since(now) {
            std::thread::sleep(remaining);
        } else if now - self.next > self.period * 100 {
            // Hopelessly behind (probably suspended); don't try to catch up.
            log::debug!("ticker fell behind by {:?}", now - self.next);
            self.next = now;
        }
    }
}

pub fn report(axes: &Axes<SimAxis>) {
    for id in AxisId::ALL {
        let axis = axes.get(id);
        log::info!(
            "{id}: {} pulses, ends at step {}",
            axis.pulses(),
            axis.position()
        );
        if axis.ignored_pulses() > 0 {
            log::warn!("{id}: {} pulses while disabled", axis.ignored_pulses());
        }
    }
}
