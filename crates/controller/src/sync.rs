use polarplot_protocol::{SyncFrame, MAX_FRAME_LEN};

use crate::{MechanismState, PlotError};

/// The outgoing half of the serial link to the host.
pub trait SyncLink {
    /// Queues an encoded frame for sending, without blocking. If there's no
    /// room the frame is refused, and it will never be sent.
    fn try_send(&mut self, frame: &[u8]) -> Result<(), LinkBusy>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("sync link busy")]
pub struct LinkBusy;

#[cfg(feature = "std")]
impl SyncLink for std::sync::mpsc::SyncSender<Vec<u8>> {
    fn try_send(&mut self, frame: &[u8]) -> Result<(), LinkBusy> {
        std::sync::mpsc::SyncSender::try_send(self, frame.to_vec()).map_err(|_| LinkBusy)
    }
}

/// Collects everything, never refusing.
#[cfg(feature = "std")]
impl SyncLink for Vec<u8> {
    fn try_send(&mut self, frame: &[u8]) -> Result<(), LinkBusy> {
        self.extend_from_slice(frame);
        Ok(())
    }
}

/// The frame describing where the pen is now.
pub fn sync_frame(geometry: &polarplot_geom::Config, state: &MechanismState) -> SyncFrame {
    let p = geometry.forward(&state.pose());
    SyncFrame {
        x: p.x,
        y: p.y,
        pen_down: state.pen_down,
    }
}

/// Encodes frames onto a [`SyncLink`], keeping count of how many made it.
pub struct SyncReporter<L> {
    link: L,
    sent: u32,
    dropped: u32,
}

impl<L: SyncLink> SyncReporter<L> {
    pub fn new(link: L) -> Self {
        SyncReporter {
            link,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Sends a frame. A busy link drops the frame (and counts it) rather
    /// than waiting.
    pub fn send(&mut self, frame: &SyncFrame) -> Result<(), PlotError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let bytes = frame.encode(&mut buf).map_err(PlotError::Frame)?;
        match self.link.try_send(bytes) {
            Ok(()) => {
                self.sent += 1;
                log::trace!("sent {frame:?}");
                Ok(())
            }
            Err(LinkBusy) => {
                self.dropped += 1;
                Err(PlotError::LinkOverrun)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use polarplot_geom::Angle;
    use polarplot_protocol::FrameDecoder;

    use super::*;

    struct Full;

    impl SyncLink for Full {
        fn try_send(&mut self, _frame: &[u8]) -> Result<(), LinkBusy> {
            Err(LinkBusy)
        }
    }

    #[test]
    fn frames_come_from_forward_kinematics() {
        let geom = polarplot_geom::Config::default();
        let state = MechanismState {
            theta: Angle::degrees(180.0),
            radius: 100.0,
            pen_down: true,
        };
        let frame = sync_frame(&geom, &state);
        assert!(frame.pen_down);
        // Pointing left, with the pen offset pushing it up.
        assert!((frame.x - (geom.pivot.x - 100.0)).abs() < 1e-3);
        assert!((frame.y - (geom.pivot.y + geom.pen_offset.get())).abs() < 1e-3);
    }

    #[test]
    fn reporter_counts() {
        let frame = SyncFrame {
            x: 1.0,
            y: 2.0,
            pen_down: false,
        };
        let mut reporter = SyncReporter::new(Vec::<u8>::new());
        reporter.send(&frame).unwrap();
        reporter.send(&frame).unwrap();
        assert_eq!(reporter.sent(), 2);
        let bytes = reporter.into_link();
        let frames: Vec<_> = FrameDecoder::new().feed(&bytes).collect();
        assert_eq!(frames, vec![Ok(frame), Ok(frame)]);

        let mut reporter = SyncReporter::new(Full);
        assert_eq!(reporter.send(&frame), Err(PlotError::LinkOverrun));
        assert_eq!((reporter.sent(), reporter.dropped()), (0, 1));
    }
}
