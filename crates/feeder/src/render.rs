//! Drawing a captured sync stream, to see what the plotter would have
//! drawn.

use std::path::Path;

use kurbo::{Point, Rect};
use polarplot_geom::{ArmPose, Len};
use polarplot_protocol::{FrameDecoder, SyncFrame};
use svg::{
    node::element::{path::Data, Circle, Path as SvgPath},
    Document,
};

/// Multiply all dimensions by 10 because browsers don't like small svgs.
const SCALE: f64 = 10.0;
const MARGIN_MM: f64 = 5.0;

/// Decodes a byte stream into frames, also returning how many frames were
/// unreadable.
pub fn decode(bytes: &[u8]) -> (Vec<SyncFrame>, usize) {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut bad = 0;
    for frame in decoder.feed(bytes) {
        match frame {
            Ok(f) => frames.push(f),
            Err(e) => {
                log::warn!("skipping frame: {e}");
                bad += 1;
            }
        }
    }
    (frames, bad)
}

/// A polyline the pen followed, either drawing or travelling.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub drawn: bool,
    pub points: Vec<Point>,
}

fn point(f: &SyncFrame) -> Point {
    Point::new(f.x as f64, f.y as f64)
}

fn from_geom(p: polarplot_geom::Point) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

/// The arm at one pose: the pivot, the end of the rack where the carriage
/// sits, and the pen tip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArmOverlay {
    pub pivot: Point,
    pub carriage: Point,
    pub pen: Point,
}

impl ArmOverlay {
    pub fn new(geometry: &polarplot_geom::Config, pose: &ArmPose) -> Self {
        let rack = polarplot_geom::Config {
            pen_offset: Len::new(0.0),
            ..*geometry
        };
        ArmOverlay {
            pivot: from_geom(geometry.pivot),
            carriage: from_geom(rack.forward(pose)),
            pen: from_geom(geometry.forward(pose)),
        }
    }

    fn points(&self) -> [Point; 3] {
        [self.pivot, self.carriage, self.pen]
    }
}

/// Joins consecutive frames into strokes. A hop between two frames is drawn
/// if the pen was down at both ends.
pub fn strokes(frames: &[SyncFrame]) -> Vec<Stroke> {
    let mut ret: Vec<Stroke> = Vec::new();
    for w in frames.windows(2) {
        let (a, b) = (point(&w[0]), point(&w[1]));
        if a == b {
            continue;
        }
        let drawn = w[0].pen_down && w[1].pen_down;
        match ret.last_mut() {
            Some(s) if s.drawn == drawn && s.points.last() == Some(&a) => s.points.push(b),
            _ => ret.push(Stroke {
                drawn,
                points: vec![a, b],
            }),
        }
    }
    ret
}

pub fn document(frames: &[SyncFrame], arm: Option<&ArmOverlay>) -> Document {
    // The plotter's y axis points up; svg's points down.
    let flip = |p: Point| Point::new(p.x * SCALE, -p.y * SCALE);

    let bbox = frames
        .iter()
        .map(point)
        .chain(arm.into_iter().flat_map(ArmOverlay::points))
        .map(flip)
        .fold(None, |acc: Option<Rect>, p| {
            Some(acc.map_or(Rect::from_points(p, p), |r| r.union_pt(p)))
        })
        .unwrap_or_default()
        .inflate(MARGIN_MM * SCALE, MARGIN_MM * SCALE);

    let mut document = Document::new().set(
        "viewBox",
        (
            bbox.x0 as f32,
            bbox.y0 as f32,
            bbox.width() as f32,
            bbox.height() as f32,
        ),
    );
    for stroke in strokes(frames) {
        let mut points = stroke.points.into_iter().map(flip);
        let Some(start) = points.next() else {
            continue;
        };
        let data = points.fold(
            Data::new().move_to((start.x as f32, start.y as f32)),
            |d, p| d.line_to((p.x as f32, p.y as f32)),
        );
        let (color, width) = if stroke.drawn {
            ("black", 2)
        } else {
            ("lightgrey", 1)
        };
        document = document.add(
            SvgPath::new()
                .set("fill", "none")
                .set("stroke", color)
                .set("stroke-width", width)
                .set("d", data),
        );
    }

    if let Some(arm) = arm {
        let [pivot, carriage, pen] = arm.points().map(flip);
        let data = Data::new()
            .move_to((pivot.x as f32, pivot.y as f32))
            .line_to((carriage.x as f32, carriage.y as f32))
            .line_to((pen.x as f32, pen.y as f32));
        document = document.add(
            SvgPath::new()
                .set("fill", "none")
                .set("stroke", "steelblue")
                .set("stroke-width", 3)
                .set("d", data),
        );
        for (p, color) in [(pivot, "steelblue"), (carriage, "steelblue"), (pen, "red")] {
            document = document.add(
                Circle::new()
                    .set("cx", p.x as f32)
                    .set("cy", p.y as f32)
                    .set("r", SCALE as f32)
                    .set("fill", color),
            );
        }
    }
    document
}

pub fn save(path: &Path, frames: &[SyncFrame], arm: Option<&ArmOverlay>) -> anyhow::Result<()> {
    svg::save(path, &document(frames, arm))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use polarplot_geom::{Angle, ConfigBuilder, LenExt as _};
    use polarplot_protocol::MAX_FRAME_LEN;

    use super::*;

    fn frame(x: f32, y: f32, pen_down: bool) -> SyncFrame {
        SyncFrame { x, y, pen_down }
    }

    #[test]
    fn decode_skips_garbage() {
        let mut bytes = vec![7, 7, 7, 0];
        let mut buf = [0; MAX_FRAME_LEN];
        bytes.extend_from_slice(frame(1.0, 2.0, true).encode(&mut buf).unwrap());
        let (frames, bad) = decode(&bytes);
        assert_eq!(frames, vec![frame(1.0, 2.0, true)]);
        assert_eq!(bad, 1);
    }

    #[test]
    fn square_with_a_gap() {
        let frames = [
            frame(10.0, 0.0, false),
            frame(10.0, 0.0, true),
            frame(10.0, 10.0, true),
            frame(0.0, 10.0, true),
            frame(0.0, 10.0, false),
            frame(0.0, 0.0, false),
            frame(0.0, 0.0, true),
            frame(10.0, 0.0, true),
        ];
        let s = strokes(&frames);
        assert_eq!(
            s,
            vec![
                Stroke {
                    drawn: true,
                    points: vec![
                        Point::new(10.0, 0.0),
                        Point::new(10.0, 10.0),
                        Point::new(0.0, 10.0)
                    ],
                },
                Stroke {
                    drawn: false,
                    points: vec![Point::new(0.0, 10.0), Point::new(0.0, 0.0)],
                },
                Stroke {
                    drawn: true,
                    points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
                },
            ]
        );

        let text = document(&frames, None).to_string();
        assert_eq!(text.matches("<path").count(), 3);
        assert!(text.contains("lightgrey"));
        assert!(!text.contains("<circle"));
    }

    #[test]
    fn arm_overlay() {
        let geometry = ConfigBuilder::default()
            .with_pivot(polarplot_geom::Point::new(0.0, 100.0))
            .with_pen_offset(2.0.mm())
            .build();
        let pose = ArmPose::new(Angle::degrees(-90.0), 50.0.mm());
        let arm = ArmOverlay::new(&geometry, &pose);
        assert_eq!(arm.pivot, Point::new(0.0, 100.0));
        assert!((arm.carriage - Point::new(0.0, 50.0)).hypot() < 1e-4);
        assert!(((arm.pen - arm.carriage).hypot() - 2.0).abs() < 1e-4);
        let pen = geometry.forward(&pose);
        assert!((arm.pen - Point::new(pen.x as f64, pen.y as f64)).hypot() < 1e-6);

        let frames = [frame(0.0, 0.0, false), frame(0.0, 10.0, true)];
        let text = document(&frames, Some(&arm)).to_string();
        assert_eq!(text.matches("<circle").count(), 3);
        assert_eq!(text.matches("<path").count(), 2);
    }
}
