//! Wire format for [`SyncFrame`]s.
//!
//! A frame is the postcard serialization of a `SyncFrame`:
//!
//! | bytes | field      | encoding                  |
//! |-------|------------|---------------------------|
//! | 0..4  | `x`        | `f32`, little-endian      |
//! | 4..8  | `y`        | `f32`, little-endian      |
//! | 8     | `pen_down` | `0` or `1`                |
//!
//! COBS-encoded and followed by a single `0x00`. COBS guarantees that the
//! encoded body has no zero bytes, so a reader that loses a byte can always
//! resynchronize at the next zero.

use crate::SyncFrame;

/// The most bytes a frame can take on the wire, including the delimiter.
pub const MAX_FRAME_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame longer than {MAX_FRAME_LEN} bytes")]
    Oversize,
    #[error("malformed frame: {0}")]
    Malformed(postcard::Error),
    #[error("failed to encode frame: {0}")]
    Encode(postcard::Error),
}

impl SyncFrame {
    /// Encodes this frame, delimiter included, into the start of `buf`.
    pub fn encode<'b>(&self, buf: &'b mut [u8; MAX_FRAME_LEN]) -> Result<&'b mut [u8], FrameError> {
        postcard::to_slice_cobs(self, buf).map_err(FrameError::Encode)
    }

    /// Decodes a single COBS-encoded frame, with or without its delimiter.
    /// The buffer is used as scratch space.
    pub fn decode(bytes: &mut [u8]) -> Result<SyncFrame, FrameError> {
        let bytes = match bytes.split_last_mut() {
            Some((0, body)) => body,
            _ => bytes,
        };
        postcard::from_bytes_cobs(bytes).map_err(FrameError::Malformed)
    }
}

/// Reassembles frames from a byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
    overflowed: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds in one byte, returning a frame (or the reason it was bad) whenever
    /// a delimiter ends one.
    pub fn push(&mut self, byte: u8) -> Option<Result<SyncFrame, FrameError>> {
        if byte != 0 {
            match self.buf.get_mut(self.len) {
                Some(slot) => {
                    *slot = byte;
                    self.len += 1;
                }
                None => self.overflowed = true,
            }
            return None;
        }

        let len = core::mem::take(&mut self.len);
        if core::mem::take(&mut self.overflowed) {
            return Some(Err(FrameError::Oversize));
        }
        // Back-to-back delimiters are just line noise.
        if len == 0 {
            return None;
        }
        Some(SyncFrame::decode(&mut self.buf[..len]))
    }

    /// Feeds in a chunk of bytes, yielding every frame it completes.
    pub fn feed<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> impl Iterator<Item = Result<SyncFrame, FrameError>> + 'a {
        bytes.iter().filter_map(move |&b| self.push(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(frame: SyncFrame) -> Vec<u8> {
        let mut buf = [0; MAX_FRAME_LEN];
        frame.encode(&mut buf).unwrap().to_vec()
    }

    #[test]
    fn layout() {
        let frame = SyncFrame {
            x: 1.0,
            y: -2.0,
            pen_down: true,
        };
        let mut raw = [0u8; 16];
        let raw = postcard::to_slice(&frame, &mut raw).unwrap();
        assert_eq!(raw, &[0, 0, 0x80, 0x3f, 0, 0, 0, 0xc0, 1]);

        let bytes = encoded(frame);
        assert_eq!(bytes.len(), MAX_FRAME_LEN);
        assert_eq!(bytes.last(), Some(&0));
        assert!(!bytes[..bytes.len() - 1].contains(&0));

        let mut bytes = bytes;
        assert_eq!(SyncFrame::decode(&mut bytes), Ok(frame));
    }

    #[test]
    fn decoder_splits_stream() {
        let a = SyncFrame {
            x: 10.0,
            y: 0.0,
            pen_down: false,
        };
        let b = SyncFrame {
            x: 10.0,
            y: 10.0,
            pen_down: true,
        };
        let mut stream = encoded(a);
        stream.push(0);
        stream.extend(encoded(b));

        let mut dec = FrameDecoder::new();
        let frames: Vec<_> = dec.feed(&stream).collect();
        assert_eq!(frames, vec![Ok(a), Ok(b)]);
    }

    #[test]
    fn decoder_resyncs_after_lost_byte() {
        let a = SyncFrame {
            x: 3.5,
            y: 4.25,
            pen_down: true,
        };
        let b = SyncFrame {
            x: -1.0,
            y: 2.0,
            pen_down: false,
        };
        let mut damaged = encoded(a);
        damaged.remove(3);
        let mut stream = vec![7, 7, 7];
        stream.extend(damaged);
        stream.extend(encoded(b));

        let mut dec = FrameDecoder::new();
        let frames: Vec<_> = dec.feed(&stream).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1], Ok(b));
    }

    #[test]
    fn decoder_rejects_oversize_runs() {
        let b = SyncFrame {
            x: 5.0,
            y: 6.0,
            pen_down: false,
        };
        let mut stream = vec![1; 40];
        stream.push(0);
        stream.extend(encoded(b));

        let mut dec = FrameDecoder::new();
        let frames: Vec<_> = dec.feed(&stream).collect();
        assert_eq!(frames, vec![Err(FrameError::Oversize), Ok(b)]);
    }

    #[test]
    fn short_frames_are_malformed() {
        // Valid COBS, but only two bytes of payload.
        let mut dec = FrameDecoder::new();
        let frames: Vec<_> = dec.feed(&[3, 1, 2, 0]).collect();
        assert_eq!(frames.len(), 1);
        let err = frames[0].clone().unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
        assert!(err.to_string().starts_with("malformed frame"));
    }
}
