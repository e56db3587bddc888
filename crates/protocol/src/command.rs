//! The line-oriented command format.
//!
//! Each line holds at most one command:
//!
//! ```text
//! # comments run to the end of the line
//! PU            # pen up
//! PA 10.5 20    # move to (10.5, 20)
//! PD;           # pen down (a trailing semicolon is allowed)
//! ```

use core::fmt;

use crate::MotionDirective;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unrecognized opcode")]
    UnknownOpcode,
    #[error("malformed number")]
    BadNumber,
    #[error("expected {expected} arguments, found {found}")]
    ArgumentCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// One-based line number.
    pub line: usize,
    pub kind: ParseErrorKind,
}

fn parse_number(word: &str) -> Option<f32> {
    word.parse::<f32>().ok().filter(|x| x.is_finite())
}

/// Parses a single line. Blank lines and comments produce `Ok(None)`.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<MotionDirective>, ParseError> {
    let err = |kind| ParseError {
        line: line_no,
        kind,
    };

    let code = line.split_once('#').map_or(line, |(code, _comment)| code).trim();
    let code = code.strip_suffix(';').unwrap_or(code);
    let mut words = code.split_whitespace();
    let Some(opcode) = words.next() else {
        return Ok(None);
    };

    let mut args = [0.0f32; 2];
    let mut found = 0;
    for word in words {
        if let Some(arg) = args.get_mut(found) {
            *arg = parse_number(word).ok_or(err(ParseErrorKind::BadNumber))?;
        }
        found += 1;
    }
    let expect = |expected| {
        if found == expected {
            Ok(())
        } else {
            Err(err(ParseErrorKind::ArgumentCount { expected, found }))
        }
    };

    if opcode.eq_ignore_ascii_case("PU") {
        expect(0)?;
        Ok(Some(MotionDirective::PenUp))
    } else if opcode.eq_ignore_ascii_case("PD") {
        expect(0)?;
        Ok(Some(MotionDirective::PenDown))
    } else if opcode.eq_ignore_ascii_case("PA") {
        expect(2)?;
        Ok(Some(MotionDirective::MoveTo {
            x: args[0],
            y: args[1],
        }))
    } else {
        Err(err(ParseErrorKind::UnknownOpcode))
    }
}

/// A lazy iterator over the directives in some text.
///
/// Cloning it gives an independent iterator starting from the same place,
/// so a job can be replayed from the start by keeping a clone around.
#[derive(Clone, Debug)]
pub struct Directives<'a> {
    lines: core::iter::Enumerate<core::str::Lines<'a>>,
}

pub fn directives(text: &str) -> Directives<'_> {
    Directives {
        lines: text.lines().enumerate(),
    }
}

impl<'a> Iterator for Directives<'a> {
    type Item = Result<MotionDirective, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        for (idx, line) in self.lines.by_ref() {
            if let Some(item) = parse_line(line, idx + 1).transpose() {
                return Some(item);
            }
        }
        None
    }
}

/// Formats a directive as a line that [`parse_line`] accepts.
impl fmt::Display for MotionDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionDirective::PenUp => f.write_str("PU"),
            MotionDirective::PenDown => f.write_str("PD"),
            MotionDirective::MoveTo { x, y } => write!(f, "PA {x} {y}"),
        }
    }
}
