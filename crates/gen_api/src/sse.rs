use serde_json::Value;

use crate::events::GenStreamEvent;

/// Completion sentinel sent as the last line of a generation stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for server-pushed event lines.
///
/// Each line is either a JSON object carrying `text`, an error object, or the
/// completion sentinel. An optional `data:` prefix is accepted. Malformed
/// lines are skipped and counted.
#[derive(Debug, Default)]
pub struct EventLineParser {
    buffer: Vec<u8>,
    malformed: usize,
}

impl EventLineParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<GenStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Parse whatever remains after the transport closed, without a trailing newline.
    pub fn finish(&mut self) -> Vec<GenStreamEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.parse_line(&line).into_iter().collect()
    }

    /// Parse a complete payload string in one shot.
    pub fn parse_lines(input: &str) -> Vec<GenStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Number of lines skipped because they could not be decoded.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    fn parse_line(&mut self, raw: &str) -> Option<GenStreamEvent> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(':') || is_sse_field(line) {
            return None;
        }

        let payload = line
            .strip_prefix("data:")
            .map(str::trim)
            .unwrap_or(line);
        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            return Some(GenStreamEvent::Done);
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                let event = map_event(&value);
                if event.is_none() {
                    tracing::debug!(line = payload, "ignoring stream line without text");
                }
                event
            }
            Err(error) => {
                self.malformed += 1;
                tracing::warn!(%error, line = payload, "skipping malformed stream line");
                None
            }
        }
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn map_event(value: &Value) -> Option<GenStreamEvent> {
    let object = value.as_object()?;

    if let Some(error) = object.get("error").filter(|error| !error.is_null()) {
        let message = error
            .as_str()
            .map(ToString::to_string)
            .or_else(|| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| error.to_string());
        return Some(GenStreamEvent::Error { message });
    }

    if let Some(text) = object.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            return Some(GenStreamEvent::Text {
                text: text.to_owned(),
            });
        }
    }

    if object.get("done").and_then(Value::as_bool) == Some(true) {
        return Some(GenStreamEvent::Done);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::EventLineParser;
    use crate::events::GenStreamEvent;

    #[test]
    fn parse_event_lines_incrementally() {
        let mut parser = EventLineParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"data: {\"text\":\"Hel"));
        assert!(events.is_empty());
        events.extend(parser.feed(b"lo\"}\n"));
        assert_eq!(
            events,
            vec![GenStreamEvent::Text {
                text: "Hello".to_string()
            }]
        );

        events.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.last(), Some(&GenStreamEvent::Done));
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn multibyte_characters_split_across_chunks_survive() {
        let line = "{\"text\":\"héllo\"}\n".as_bytes();
        let (head, tail) = line.split_at(11);
        let mut parser = EventLineParser::default();
        let mut events = parser.feed(head);
        events.extend(parser.feed(tail));

        assert_eq!(
            events,
            vec![GenStreamEvent::Text {
                text: "héllo".to_string()
            }]
        );
    }
}
