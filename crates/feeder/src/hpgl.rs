//! Importing HPGL plot files.
//!
//! Only pen-up and pen-down commands (with their coordinate lists) matter
//! to us; everything else (`IN`, `SP`, ...) is skipped. Coordinates are in
//! plotter units. Long moves are broken up so that no single move covers
//! more than [`MAX_STEP_MM`] along either axis, which keeps the pen close
//! to a straight line between the endpoints.

use anyhow::{bail, Context as _};
use kurbo::{Line, ParamCurve as _, Point};
use polarplot_protocol::MotionDirective;

/// HPGL plotter units per inch.
pub const UNITS_PER_INCH: f64 = 1016.0;
pub const MAX_STEP_MM: f64 = 0.5;

fn units_to_mm(units: f64) -> f64 {
    units / UNITS_PER_INCH * 25.4
}

fn move_to(p: Point) -> MotionDirective {
    MotionDirective::MoveTo {
        x: p.x as f32,
        y: p.y as f32,
    }
}

/// The moves along `line`, not including its start.
fn subdivide(line: Line, out: &mut Vec<MotionDirective>) {
    let d = line.p1 - line.p0;
    // The slack keeps unit-conversion rounding from adding a piece.
    let pieces = (d.x.abs().max(d.y.abs()) / MAX_STEP_MM - 1e-9)
        .ceil()
        .max(1.0) as usize;
    for i in 1..pieces {
        out.push(move_to(line.eval(i as f64 / pieces as f64)));
    }
    out.push(move_to(line.p1));
}

pub fn import(text: &str) -> anyhow::Result<Vec<MotionDirective>> {
    let mut out = Vec::new();
    let mut prev: Option<Point> = None;

    for (idx, cmd) in text.split(';').enumerate() {
        let cmd = cmd.trim();
        let pen = match cmd.get(..2) {
            Some(op) if op.eq_ignore_ascii_case("PU") => MotionDirective::PenUp,
            Some(op) if op.eq_ignore_ascii_case("PD") => MotionDirective::PenDown,
            _ => {
                if !cmd.is_empty() {
                    log::trace!("ignoring HPGL command {cmd:?}");
                }
                continue;
            }
        };
        out.push(pen);

        let coords = cmd[2..]
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>()
                    .with_context(|| format!("bad coordinate {s:?} in HPGL command {}", idx + 1))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if coords.len() % 2 != 0 {
            bail!("odd number of coordinates in HPGL command {}: {cmd:?}", idx + 1);
        }

        for pair in coords.chunks_exact(2) {
            let p = Point::new(units_to_mm(pair[0]), units_to_mm(pair[1]));
            match prev {
                Some(from) => subdivide(Line::new(from, p), &mut out),
                None => out.push(move_to(p)),
            }
            prev = Some(p);
        }
    }
    log::debug!("imported {} directives", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use MotionDirective::*;

    fn coords(ds: &[MotionDirective]) -> Vec<(f32, f32)> {
        ds.iter()
            .filter_map(|d| match d {
                MoveTo { x, y } => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn units_and_pens() {
        let ds = import("IN;SP1;PU0,0;PD40,0;PU;").unwrap();
        // 40 units is a millimeter, which takes two moves.
        assert_eq!(
            ds,
            vec![
                PenUp,
                MoveTo { x: 0.0, y: 0.0 },
                PenDown,
                MoveTo { x: 0.5, y: 0.0 },
                MoveTo { x: 1.0, y: 0.0 },
                PenUp,
            ]
        );
    }

    #[test]
    fn moves_are_short() {
        let ds = import("PU1016,1016;PD2032,1116,1016,4000;PU0,0;").unwrap();
        let pts = coords(&ds);
        for w in pts.windows(2) {
            let (dx, dy) = (w[1].0 - w[0].0, w[1].1 - w[0].1);
            assert!(dx.abs() <= 0.5 + 1e-4 && dy.abs() <= 0.5 + 1e-4, "{w:?}");
        }
        assert_eq!(pts[0], (25.4, 25.4));
        assert_eq!(pts.last(), Some(&(0.0, 0.0)));
        assert!(pts
            .iter()
            .any(|&(x, y)| x == 50.8 && (y - 27.9).abs() < 1e-4));
    }

    #[test]
    fn whitespace_separated_coordinates() {
        let ds = import("PU 0 0; PD 0 20;").unwrap();
        assert_eq!(coords(&ds), vec![(0.0, 0.0), (0.0, 0.5)]);
    }

    #[test]
    fn bad_input() {
        assert!(import("PU0,0;PD1,2,3;").is_err());
        assert!(import("PU0,zero;").is_err());
    }
}
