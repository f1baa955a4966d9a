/// Incremental stdout decoding for the extraction job.
/// A read chunk can end mid-line, so splitting is stateful: bytes are
/// buffered until a boundary is seen, and a trailing partial line is flushed
/// once the stream closes.

use crate::models::ProgressEvent;

/// Stateful line-boundary scanner over a byte chunk stream.
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        LineSplitter { buf: Vec::new() }
    }

    /// Feed one read chunk; returns every line completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush a final partial line after the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Try one stdout line as a structured progress event.
///
/// Returns `None` for anything that is not a well-formed progress object;
/// the caller downgrades such lines to raw output instead of dropping them.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::INDETERMINATE;

    #[test]
    fn splits_lines_across_chunk_boundaries() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed(b"par").is_empty());
        assert_eq!(splitter.feed(b"tial\nsecond li"), vec!["partial"]);
        assert_eq!(splitter.feed(b"ne\n"), vec!["second line"]);
    }

    #[test]
    fn handles_multiple_lines_in_one_chunk() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed(b"a\nb\nc\n"), vec!["a", "b", "c"]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn strips_carriage_returns() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed(b"dos line\r\n"), vec!["dos line"]);
    }

    #[test]
    fn finish_flushes_trailing_partial_line() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed(b"no newline at end").is_empty());
        assert_eq!(splitter.finish().as_deref(), Some("no newline at end"));
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn parses_a_progress_object() {
        let line = r#"{"stage":"transcribe","message":"Transcribing with Whisper","progress":60,"timestamp":1700000000.5}"#;
        let event = parse_progress_line(line).unwrap();
        assert_eq!(event.stage, "transcribe");
        assert_eq!(event.progress, 60);
        assert!(event.output_path.is_none());
    }

    #[test]
    fn missing_progress_defaults_to_indeterminate() {
        let event =
            parse_progress_line(r#"{"stage":"error","message":"Caption extraction failed"}"#)
                .unwrap();
        assert_eq!(event.progress, INDETERMINATE);
    }

    #[test]
    fn terminal_stage_carries_output_path() {
        let line = r#"{"stage":"complete","message":"Saved successfully","progress":100,"timestamp":1.0,"output_path":"/tmp/out.md"}"#;
        let event = parse_progress_line(line).unwrap();
        assert_eq!(event.output_path.as_deref(), Some("/tmp/out.md"));
    }

    #[test]
    fn plain_text_is_not_structured() {
        assert!(parse_progress_line("Analyzing: https://example.com").is_none());
    }

    #[test]
    fn malformed_json_is_not_structured() {
        assert!(parse_progress_line(r#"{"stage":"download""#).is_none());
        assert!(parse_progress_line(r#"{"no_stage":"x"}"#).is_none());
    }

    #[test]
    fn concatenated_objects_stay_one_raw_line() {
        // Two objects without a newline between them do not parse; the whole
        // line is forwarded verbatim as raw output.
        let line = r#"{"stage":"a","message":"m"}{"stage":"b","message":"n"}"#;
        assert!(parse_progress_line(line).is_none());
    }
}
