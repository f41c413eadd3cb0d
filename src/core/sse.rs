//! Incremental `text/event-stream` decoder
//!
//! Bytes arrive in arbitrary chunks; complete events come out as the joined
//! `data:` payload. Comment lines (the backend's `: heartbeat`) and the
//! `event:`/`id:`/`retry:` fields are skipped. An event whose line or data
//! grows past the size limit is discarded up to the next blank line.

use tracing::{trace, warn};

const BOM: char = '\u{feff}';

/// Largest line or event data accepted, in bytes
pub const MAX_EVENT_LEN: usize = 1024 * 1024;

#[derive(Debug)]
pub struct SseDecoder {
    /// Bytes of the line being assembled
    line: Vec<u8>,
    /// Data buffer of the event being assembled
    data: String,
    has_data: bool,
    /// Last byte was `\r`; a following `\n` belongs to the same line break
    pending_cr: bool,
    /// First line seen (BOM check done)
    started: bool,
    /// Current line overran the limit; drop bytes until its end
    skip_line: bool,
    /// Current event overran the limit; drop lines until the blank line
    skip_event: bool,
    max_len: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_len(MAX_EVENT_LEN)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            line: Vec::new(),
            data: String::new(),
            has_data: false,
            pending_cr: false,
            started: false,
            skip_line: false,
            skip_event: false,
            max_len,
        }
    }

    /// Feed a chunk, returning the data of every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.pending_cr = true;
                    self.end_line(&mut out);
                }
                b'\n' => self.end_line(&mut out),
                _ if self.skip_line => {}
                _ if self.line.len() >= self.max_len => {
                    warn!(max_len = self.max_len, "Event-stream line too long, discarding event");
                    self.line.clear();
                    self.skip_line = true;
                    self.discard_event();
                }
                _ => self.line.push(byte),
            }
        }
        out
    }

    fn discard_event(&mut self) {
        self.data.clear();
        self.has_data = false;
        self.skip_event = true;
    }

    fn end_line(&mut self, out: &mut Vec<String>) {
        if std::mem::take(&mut self.skip_line) {
            return;
        }
        let raw = std::mem::take(&mut self.line);
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.started {
            self.started = true;
            line = line.strip_prefix(BOM).unwrap_or(line);
        }

        if line.is_empty() {
            self.skip_event = false;
            if self.has_data {
                self.has_data = false;
                out.push(std::mem::take(&mut self.data));
            }
            return;
        }
        if self.skip_event || line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            if self.data.len() + value.len() + 1 > self.max_len {
                warn!(max_len = self.max_len, "Event-stream data too long, discarding event");
                self.discard_event();
                return;
            }
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value);
            self.has_data = true;
        } else {
            trace!(field, "Ignoring event-stream field");
        }
    }
}
