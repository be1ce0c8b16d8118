//! Newline framing for watch response bodies.
//!
//! Raw reads accumulate in one growable buffer. A scan cursor remembers how far
//! the buffer has been searched for the delimiter, so every byte is scanned
//! once no matter how the stream is fragmented. Closed buffers are cut off the
//! front with `split_to` and judged for readiness and validity when draining.

use bytes::{Bytes, BytesMut};

pub const DELIMITER: u8 = b'\n';

/// Shortest buffer worth parsing: `{}\n`.
pub const MIN_READY_LEN: usize = 3;

/// A buffer is ready once it is long enough and closed by the delimiter.
pub fn is_ready(buf: &[u8]) -> bool {
    buf.len() >= MIN_READY_LEN && buf.last() == Some(&DELIMITER)
}

/// A lone delimiter, or more than one delimiter anywhere, is invalid.
pub fn is_valid(buf: &[u8]) -> bool {
    buf != [DELIMITER] && buf.iter().filter(|b| **b == DELIMITER).count() <= 1
}

/// Result of draining the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Ready and valid: one candidate JSON document plus its delimiter.
    Message(Bytes),
    /// Closed by a delimiter but never dispatchable (too short or malformed).
    Rejected(Bytes),
}

#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no delimiter.
    scanned: usize,
}

impl Framer {
    pub fn new() -> Self { Self::default() }

    /// Append one raw read. Nothing is split until [`Framer::drain`].
    pub fn submit(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    /// Cut every closed buffer off the front in arrival order. The open tail stays.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(off) = self.buf[self.scanned..].iter().position(|b| *b == DELIMITER) {
            let line = self.buf.split_to(self.scanned + off + 1).freeze();
            self.scanned = 0;
            if is_ready(&line) && is_valid(&line) {
                out.push(Frame::Message(line));
            } else {
                out.push(Frame::Rejected(line));
            }
        }
        self.scanned = self.buf.len();
        out
    }

    /// True when no bytes are waiting.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Bytes received but not yet drained.
    pub fn pending_bytes(&self) -> usize { self.buf.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = b"{\"type\":\"ADDED\",\"object\":{\"metadata\":{\"uid\":\"u1\"}}}\n";

    fn messages(frames: Vec<Frame>) -> Vec<Vec<u8>> {
        frames
            .into_iter()
            .filter_map(|f| match f { Frame::Message(m) => Some(m.to_vec()), Frame::Rejected(_) => None })
            .collect()
    }

    fn bytes(b: &'static [u8]) -> Bytes { Bytes::from_static(b) }

    #[test]
    fn readiness_and_validity() {
        assert!(!is_ready(b"\n"));
        assert!(!is_valid(b"\n"));
        assert!(!is_ready(b"{\n"));
        assert!(is_ready(b"{}\n"));
        assert!(!is_ready(b"{}"));
        assert!(is_valid(b""));
        assert!(is_valid(b"{}"));
        assert!(!is_valid(b"{}\n{}\n"));
        assert!(!is_valid(b"{\n}\n"));
    }

    #[test]
    fn every_split_point_yields_one_message() {
        for cut in 0..=DOC.len() {
            let mut f = Framer::new();
            f.submit(&DOC[..cut]);
            f.submit(&DOC[cut..]);
            let frames = f.drain();
            assert_eq!(frames, vec![Frame::Message(bytes(DOC))], "cut at {}", cut);
            assert_eq!(f.pending_bytes(), 0);
        }
    }

    #[test]
    fn byte_at_a_time() {
        let mut f = Framer::new();
        let mut got = Vec::new();
        for b in DOC {
            f.submit(std::slice::from_ref(b));
            got.extend(messages(f.drain()));
        }
        assert_eq!(got, vec![DOC.to_vec()]);
    }

    #[test]
    fn several_messages_in_one_read() {
        let mut f = Framer::new();
        f.submit(b"{\"a\":1}\n{\"b\":2}\n{\"c\":");
        let got = messages(f.drain());
        assert_eq!(got, vec![b"{\"a\":1}\n".to_vec(), b"{\"b\":2}\n".to_vec()]);
        assert_eq!(f.pending_bytes(), 5);
        f.submit(b"3}\n");
        assert_eq!(messages(f.drain()), vec![b"{\"c\":3}\n".to_vec()]);
    }

    #[test]
    fn incomplete_tail_is_retained() {
        let mut f = Framer::new();
        f.submit(b"{\"partial\":");
        assert!(f.drain().is_empty());
        assert!(!f.is_empty());
        assert_eq!(f.pending_bytes(), 11);
        // already-scanned bytes are kept when the delimiter finally arrives
        f.submit(b"1}\n");
        assert_eq!(messages(f.drain()), vec![b"{\"partial\":1}\n".to_vec()]);
        assert!(f.is_empty());
    }

    #[test]
    fn closed_short_buffers_are_rejected() {
        let mut f = Framer::new();
        f.submit(b"\n");
        f.submit(b"x\n");
        f.submit(b"{}\n");
        let frames = f.drain();
        assert_eq!(
            frames,
            vec![
                Frame::Rejected(bytes(b"\n")),
                Frame::Rejected(bytes(b"x\n")),
                Frame::Message(bytes(b"{}\n")),
            ]
        );
    }

    #[test]
    fn no_bytes_lost_across_reads() {
        let input = b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n{\"n\":4}\n";
        for size in 1..input.len() {
            let mut f = Framer::new();
            let mut got = Vec::new();
            for chunk in input.chunks(size) {
                f.submit(chunk);
                got.extend(messages(f.drain()));
            }
            assert_eq!(got.concat(), input.to_vec(), "chunk size {}", size);
            assert_eq!(got.len(), 4);
        }
    }
}
