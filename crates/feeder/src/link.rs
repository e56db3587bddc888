//! The host end of the sync link.

use std::{
    io::{self, Write},
    sync::mpsc::{sync_channel, SyncSender},
    thread::JoinHandle,
};

use polarplot_controller::sync::{LinkBusy, SyncLink};

/// Starts a thread that writes frames to `out` as they arrive. At most
/// `capacity` frames wait in the queue; past that, sending fails instead of
/// blocking.
///
/// The thread exits when the sender is dropped, returning how many bytes it
/// wrote.
pub fn spawn_writer<W>(mut out: W, capacity: usize) -> (SyncSender<Vec<u8>>, JoinHandle<io::Result<u64>>)
where
    W: Write + Send + 'static,
{
    let (tx, rx) = sync_channel::<Vec<u8>>(capacity);
    let handle = std::thread::spawn(move || {
        let mut written = 0u64;
        for frame in rx {
            out.write_all(&frame)?;
            written += frame.len() as u64;
        }
        out.flush()?;
        Ok(written)
    });
    (tx, handle)
}

/// Forwards frames to a writer thread (if there is one) and keeps a copy
/// of everything that went through (if asked to).
#[derive(Default)]
pub struct Tee {
    pub sender: Option<SyncSender<Vec<u8>>>,
    pub capture: Option<Vec<u8>>,
}

impl SyncLink for Tee {
    fn try_send(&mut self, frame: &[u8]) -> Result<(), LinkBusy> {
        if let Some(sender) = &mut self.sender {
            SyncLink::try_send(sender, frame)?;
        }
        if let Some(capture) = &mut self.capture {
            capture.extend_from_slice(frame);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_everything_then_exits() {
        let out = Shared::default();
        let (tx, handle) = spawn_writer(out.clone(), 4);
        let mut tee = Tee {
            sender: Some(tx),
            capture: Some(Vec::new()),
        };
        tee.try_send(&[1, 2, 0]).unwrap();
        tee.try_send(&[3, 0]).unwrap();
        let captured = tee.capture.take().unwrap();
        drop(tee);

        assert_eq!(handle.join().unwrap().unwrap(), 5);
        assert_eq!(*out.0.lock().unwrap(), vec![1, 2, 0, 3, 0]);
        assert_eq!(captured, vec![1, 2, 0, 3, 0]);
    }

    #[test]
    fn full_queue_refuses() {
        // Nobody reads this channel.
        let (tx, _rx) = sync_channel(1);
        let mut tee = Tee {
            sender: Some(tx),
            capture: Some(Vec::new()),
        };
        tee.try_send(&[1, 0]).unwrap();
        assert_eq!(tee.try_send(&[2, 0]), Err(LinkBusy));
        // Refused frames aren't captured either.
        assert_eq!(tee.capture, Some(vec![1, 0]));
    }
}
