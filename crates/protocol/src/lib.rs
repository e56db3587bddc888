#![cfg_attr(not(feature = "std"), no_std)]

use serde::{Deserialize, Serialize};

pub mod command;
pub mod frame;

pub use command::{directives, parse_line, Directives, ParseError, ParseErrorKind};
pub use frame::{FrameDecoder, FrameError, MAX_FRAME_LEN};

/// One step of a drawing: lift the pen, lower it, or move it in a straight
/// line to an absolute position (in millimeters).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionDirective {
    PenUp,
    PenDown,
    MoveTo { x: f32, y: f32 },
}

/// What the plotter tells the host after each completed move or pen change.
///
/// The position is where the pen actually is (recomputed from the motor
/// positions), not where it was asked to go.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncFrame {
    pub x: f32,
    pub y: f32,
    pub pen_down: bool,
}
