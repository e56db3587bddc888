/// The pen-lift axis.
///
/// The pen only has two positions, and moving between them is quick
/// enough that we don't bother ramping: the whole travel is pulsed out at
/// once and then we wait a fixed number of ticks for the mechanism to
/// settle.
#[derive(Clone, Debug)]
pub struct PenLift {
    up: i32,
    down: i32,
    settle_ticks: u32,
    position: i32,
    /// `None` until the first actuation after (re)homing.
    lowered: Option<bool>,
    settle_left: u32,
}

impl PenLift {
    /// `up` and `down` are step positions relative to the homing switch.
    pub fn new(up: i32, down: i32, settle_ticks: u32) -> Self {
        PenLift {
            up,
            down,
            settle_ticks,
            position: 0,
            lowered: None,
            settle_left: 0,
        }
    }

    /// Redefines the current step position. The pen state becomes unknown,
    /// so the next actuation always moves.
    pub fn rezero(&mut self, position: i32) {
        self.position = position;
        self.lowered = None;
        self.settle_left = 0;
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn is_down(&self) -> bool {
        self.lowered == Some(true)
    }

    pub fn is_settled(&self) -> bool {
        self.settle_left == 0
    }

    /// Raises or lowers the pen.
    ///
    /// Returns the (signed) number of steps to pulse out right now, or
    /// `None` if the pen is already where it was asked to be.
    pub fn actuate(&mut self, down: bool) -> Option<i32> {
        if self.lowered == Some(down) {
            return None;
        }
        let target = if down { self.down } else { self.up };
        let delta = target - self.position;
        self.position = target;
        self.lowered = Some(down);
        self.settle_left = self.settle_ticks;
        log::trace!("pen {}: {delta} steps", if down { "down" } else { "up" });
        Some(delta)
    }

    /// Advances one control period, returning whether the pen has settled.
    pub fn tick(&mut self) -> bool {
        self.settle_left = self.settle_left.saturating_sub(1);
        self.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuation_and_settling() {
        let mut pen = PenLift::new(178, 291, 3);
        pen.rezero(20);
        assert!(!pen.is_down());

        assert_eq!(pen.actuate(false), Some(158));
        assert!(!pen.is_settled());
        assert!(!pen.tick());
        assert!(!pen.tick());
        assert!(pen.tick());
        assert!(pen.tick());

        // Already up: nothing to do, and no waiting either.
        assert_eq!(pen.actuate(false), None);
        assert!(pen.is_settled());

        assert_eq!(pen.actuate(true), Some(113));
        assert!(pen.is_down());
        assert_eq!(pen.position(), 291);
        assert_eq!(pen.actuate(false), Some(-113));
        assert_eq!(pen.position(), 178);
    }

    #[test]
    fn rezero_forgets_the_state() {
        let mut pen = PenLift::new(10, 30, 0);
        assert_eq!(pen.actuate(false), Some(10));
        pen.rezero(5);
        assert_eq!(pen.actuate(false), Some(5));
        assert!(pen.tick());
    }
}
