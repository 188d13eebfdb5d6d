//! Line-oriented server-sent events decoding.
//!
//! Only `data:` lines matter to the chat streaming APIs. Bytes are buffered
//! until a full line is available, so lines and multi-byte characters split
//! across network chunks come out whole.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    Payload(String),
    /// The `[DONE]` sentinel
    Done,
}

#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    /// Feed raw bytes and drain every complete `data:` line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = parse_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Interpret whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<SseData> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    match data {
        "" => None,
        "[DONE]" => Some(SseData::Done),
        payload => Some(SseData::Payload(payload.to_string())),
    }
}
