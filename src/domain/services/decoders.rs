#[cfg(test)]
#[path = "decoders_test.rs"]
mod tests;

use serde_derive::Deserialize;

use crate::domain::models::StreamDecoder;

/// Emits the longest valid UTF-8 prefix of `buffer`, keeping a trailing
/// incomplete sequence for the next chunk. Invalid bytes are replaced.
fn drain_utf8(buffer: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buffer) {
            Ok(text) => {
                out.push_str(text);
                buffer.clear();
                return out;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&buffer[..valid]));
                match err.error_len() {
                    // Incomplete sequence at the end, wait for more bytes.
                    None => {
                        buffer.drain(..valid);
                        return out;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        buffer.drain(..valid + len);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
pub struct RawTextDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder for RawTextDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let text = drain_utf8(&mut self.pending);
        if text.is_empty() {
            return vec![];
        }

        return vec![text];
    }

    fn finish(&mut self) -> Vec<String> {
        if self.pending.is_empty() {
            return vec![];
        }

        let text = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        return vec![text];
    }
}

#[derive(Debug, Deserialize)]
struct SsePayload {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    fn decode_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches('\r');
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            self.done = true;
            return None;
        }

        return match serde_json::from_str::<SsePayload>(data) {
            Ok(payload) => payload.content.filter(|e| return !e.is_empty()),
            Err(err) => {
                tracing::warn!(error = ?err, line = data, "Skipping malformed stream frame");
                None
            }
        };
    }
}

impl StreamDecoder for SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return vec![];
        }

        self.pending.extend_from_slice(bytes);
        let mut deltas = vec![];
        while let Some(pos) = self.pending.iter().position(|e| return *e == b'\n') {
            let raw = self.pending.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).to_string();
            if let Some(delta) = self.decode_line(&line) {
                deltas.push(delta);
            }
            if self.done {
                self.pending.clear();
                break;
            }
        }

        return deltas;
    }

    fn finish(&mut self) -> Vec<String> {
        if self.done || self.pending.is_empty() {
            return vec![];
        }

        let line = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        return self.decode_line(&line).into_iter().collect();
    }

    fn is_done(&self) -> bool {
        return self.done;
    }
}
