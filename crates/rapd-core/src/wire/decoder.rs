use crate::wire::{DEFAULT_MAX_FRAME, END_MARKER, START_MARKER, WireError};

/// Incremental frame scanner over a byte stream.
///
/// Bytes are appended with [`FrameDecoder::push`] as they arrive; [`FrameDecoder::next_frame`]
/// yields a body only once both markers are buffered. Bytes ahead of a start marker are
/// dropped, so a peer that writes noise before a message does not poison the connection.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame: usize,
    discarded: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl FrameDecoder {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
            discarded: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame body, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<String>, WireError> {
        let start = START_MARKER.as_bytes();
        let end = END_MARKER.as_bytes();

        let Some(at) = find(&self.buf, start) else {
            // Keep a tail that may be the beginning of a split start marker.
            let keep = (start.len() - 1).min(self.buf.len());
            let drop = self.buf.len() - keep;
            self.discarded += drop;
            self.buf.drain(..drop);
            return Ok(None);
        };
        if at > 0 {
            self.discarded += at;
            self.buf.drain(..at);
        }

        let body = &self.buf[start.len()..];
        let Some(len) = find(body, end) else {
            if body.len() > self.max_frame + end.len() {
                self.buf.clear();
                return Err(WireError::Oversized {
                    limit: self.max_frame,
                });
            }
            return Ok(None);
        };
        if len > self.max_frame {
            self.buf.clear();
            return Err(WireError::Oversized {
                limit: self.max_frame,
            });
        }

        let frame: Vec<u8> = self.buf[start.len()..start.len() + len].to_vec();
        self.buf.drain(..start.len() + len + end.len());
        Ok(Some(String::from_utf8(frame)?))
    }

    /// `true` once a start marker has been seen and its frame is still incomplete.
    pub fn in_frame(&self) -> bool {
        self.buf.starts_with(START_MARKER.as_bytes())
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes dropped for lying outside any frame.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_end_marker() {
        let mut dec = FrameDecoder::default();
        dec.push(b"<rapd_start>{\"a\":");
        assert_eq!(dec.next_frame().unwrap(), None);
        assert!(dec.in_frame());

        dec.push(b"1}<rapd_end>");
        assert_eq!(dec.next_frame().unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn markers_split_across_pushes() {
        let mut dec = FrameDecoder::default();
        for chunk in ["<rapd_", "start>[1]<ra", "pd_e", "nd>"] {
            assert_eq!(dec.next_frame().unwrap(), None);
            dec.push(chunk.as_bytes());
        }
        assert_eq!(dec.next_frame().unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn noise_before_start_is_dropped() {
        let mut dec = FrameDecoder::default();
        dec.push(b"hello there<rapd_start>{}<rapd_end>");
        assert_eq!(dec.next_frame().unwrap().as_deref(), Some("{}"));
        assert_eq!(dec.discarded(), "hello there".len());
    }

    #[test]
    fn several_frames_in_one_read() {
        let mut dec = FrameDecoder::default();
        dec.push(b"<rapd_start>1<rapd_end><rapd_start>2<rapd_end><rapd_st");
        assert_eq!(dec.next_frame().unwrap().as_deref(), Some("1"));
        assert_eq!(dec.next_frame().unwrap().as_deref(), Some("2"));
        assert_eq!(dec.next_frame().unwrap(), None);
        assert_eq!(dec.buffered(), "<rapd_st".len());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut dec = FrameDecoder::new(8);
        dec.push(b"<rapd_start>0123456789abcdefghij");
        assert!(matches!(dec.next_frame(), Err(WireError::Oversized { limit: 8 })));
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn noise_only_stays_bounded() {
        let mut dec = FrameDecoder::new(8);
        dec.push(&[b'x'; 4096]);
        assert_eq!(dec.next_frame().unwrap(), None);
        assert!(dec.buffered() < START_MARKER.len());
    }
}
