//! Server-sent events transport
//!
//! Every provider streams its answer as SSE over a chunked HTTP body. The
//! decoder reassembles `data:` payloads across chunk boundaries; each
//! provider only supplies a [`StreamFormat`] that interprets a payload.

use super::backend::{CompletionStream, Fragment};
use super::error::{error_message_from_body, LlmError};
use std::collections::VecDeque;
use tracing::debug;

/// Meaning of one event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Output text
    Text(String),
    /// Bookkeeping event with no output
    Skip,
    /// The provider signalled the end of the answer
    Done,
}

/// Provider-specific interpretation of event payloads
pub trait StreamFormat: Send + 'static {
    fn decode(&mut self, data: &str) -> Result<Decoded, LlmError>;
}

/// Incremental SSE parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes; returns the payloads of completed events
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.accept_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            let rest = rest.trim_end_matches('\r');
            if let Some(event) = self.accept_line(rest) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // `event:`, `id:`, `retry:` and `:` comments carry nothing we use
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Finishing,
    Ended,
}

/// A [`CompletionStream`] reading SSE from an HTTP response
pub struct SseStream<F> {
    response: Option<reqwest::Response>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    format: F,
    state: State,
    /// Decode failure held back until earlier text has been delivered
    failure: Option<LlmError>,
}

impl<F: StreamFormat> SseStream<F> {
    pub fn new(response: reqwest::Response, format: F) -> Self {
        Self {
            response: Some(response),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            format,
            state: State::Streaming,
            failure: None,
        }
    }

    async fn pull(&mut self) -> Result<(), LlmError> {
        let chunk = match self.response.as_mut() {
            Some(response) => response.chunk().await?,
            None => None,
        };

        let payloads = match chunk {
            Some(bytes) => self.decoder.push(&bytes),
            None => {
                self.state = State::Finishing;
                self.decoder.finish().into_iter().collect()
            }
        };

        for data in payloads {
            match self.format.decode(&data) {
                Ok(Decoded::Text(text)) if !text.is_empty() => self.pending.push_back(text),
                Ok(Decoded::Text(_)) | Ok(Decoded::Skip) => {}
                Ok(Decoded::Done) => {
                    self.state = State::Finishing;
                    break;
                }
                Err(err) => {
                    self.failure = Some(err);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<F: StreamFormat> CompletionStream for SseStream<F> {
    async fn next_fragment(&mut self) -> Result<Option<Fragment>, LlmError> {
        loop {
            if let Some(text) = self.pending.pop_front() {
                return Ok(Some(Fragment::text(text)));
            }
            if let Some(err) = self.failure.take() {
                self.state = State::Ended;
                self.response = None;
                return Err(err);
            }
            match self.state {
                State::Ended => return Ok(None),
                State::Finishing => {
                    self.state = State::Ended;
                    self.response = None;
                    return Ok(Some(Fragment::terminal()));
                }
                State::Streaming => {}
            }
            if let Err(err) = self.pull().await {
                self.state = State::Ended;
                self.response = None;
                return Err(err);
            }
        }
    }
}

/// Send a streaming request and wrap a successful response
pub async fn open_event_stream<F: StreamFormat>(
    request: reqwest::RequestBuilder,
    format: F,
) -> Result<Box<dyn CompletionStream>, LlmError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!("Provider rejected request: {} {}", status, body);
        return Err(LlmError::from_status(
            status.as_u16(),
            error_message_from_body(status, &body),
        ));
    }

    Ok(Box::new(SseStream::new(response, format)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"hi\"}").is_empty());
        assert_eq!(decoder.push(b"\n\ndata: [DONE]\n\n"), vec!["{\"text\":\"hi\"}", "[DONE]"]);
    }

    #[test]
    fn test_multibyte_character_split() {
        let bytes = "data: café\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["café"]);
    }

    #[test]
    fn test_crlf_and_event_names() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: content_block_delta\r\ndata: x\r\n\r\n: keepalive\r\n\r\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn test_multiline_data() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: a\ndata: b\n\n"), vec!["a\nb"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
