//! Event-record framing for the workflow response body.
//!
//! The body arrives in arbitrary chunks. [`RecordBuffer`] accumulates raw
//! bytes and hands out complete records, each terminated by a blank line,
//! leaving any trailing partial record buffered. Splitting happens on bytes
//! before UTF-8 decoding, so a multi-byte character cut by a chunk boundary
//! is reassembled, and the records produced never depend on where the
//! chunks were cut.
//!
//! Only the first `data:` line of a record is read. Multi-line data is not
//! joined; the paired server never emits it.

use tracing::trace;

/// Incremental splitter of a byte stream into blank-line-delimited records.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    pending: Vec<u8>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Carriage returns are dropped so CRLF streams frame
    /// the same way as LF streams, whichever chunk the `\r` lands in.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
    }

    /// Take the next complete record off the front of the buffer. Empty
    /// records (runs of blank lines) are skipped.
    pub fn next_record(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.windows(2).position(|w| w == b"\n\n")?;
            let record: Vec<u8> = self.pending.drain(..pos + 2).take(pos).collect();
            if record.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let text = String::from_utf8_lossy(&record)
                .trim_start_matches('\n')
                .to_string();
            trace!("Framed record ({} bytes)", text.len());
            return Some(text);
        }
    }

    /// Bytes of an unterminated trailing record, if any.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

/// Payload of the record's first `data:` line, with the single optional
/// space after the colon removed. `None` when the record has no data line.
pub fn data_payload(record: &str) -> Option<&str> {
    record.lines().find_map(|line| {
        line.strip_prefix("data:")
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut buf = RecordBuffer::new();
        let mut out = Vec::new();
        for c in chunks {
            buf.push(c);
            while let Some(r) = buf.next_record() {
                out.push(r);
            }
        }
        out
    }

    #[test]
    fn split_mid_line_yields_one_record() {
        let whole = b"data: {\"event\":\"step_start\",\"step\":0,\"label\":\"A\",\"total\":1}\n\n";
        let (a, b) = whole.split_at(17);
        let records = frame_all(&[a, b]);
        assert_eq!(records.len(), 1);
        assert_eq!(records, frame_all(&[whole]));
    }

    #[test]
    fn every_split_point_frames_identically() {
        let body = "data: {\"event\":\"step_start\",\"step\":0}\n\ndata: {\"event\":\"complete\",\"filename\":\"résumé.pdf\"}\n\n";
        let bytes = body.as_bytes();
        let expected = frame_all(&[bytes]);
        assert_eq!(expected.len(), 2);
        for cut in 0..=bytes.len() {
            let (a, b) = bytes.split_at(cut);
            assert_eq!(frame_all(&[a, b]), expected, "cut at {cut}");
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(frame_all(&singles), expected);
    }

    #[test]
    fn partial_record_stays_buffered() {
        let mut buf = RecordBuffer::new();
        buf.push(b"data: {\"event\":\"complete\"");
        assert!(buf.next_record().is_none());
        assert!(buf.remaining() > 0);
        buf.push(b"}\n\n");
        assert!(buf.next_record().is_some());
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn crlf_and_blank_runs() {
        let records = frame_all(&[b"data: 1\r\n\r", b"\n\n\n\ndata: 2\r\n\r\n"]);
        assert_eq!(records, vec!["data: 1".to_string(), "data: 2".to_string()]);
    }

    #[test]
    fn only_first_data_line_is_read() {
        let rec = "event: progress\ndata: {\"a\":1}\ndata: {\"b\":2}";
        assert_eq!(data_payload(rec), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": keepalive"), None);
    }
}
