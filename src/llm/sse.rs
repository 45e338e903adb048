use crate::error::BoxError;
use crate::llm::StreamChunk;
use axum::body::Bytes;
use futures::Stream;
use log::debug;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ Context, Poll };

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Incremental decoder for `data: {json}` event streams.
///
/// Chunks may split a record, or a UTF-8 sequence, at any byte. Output does not
/// depend on where the splits fall.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8_tail: Vec<u8>,
    line: String,
    accumulated: String,
    skipped_lines: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns the fragments it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode_utf8(chunk);
        let mut fragments = Vec::new();

        for piece in text.split_inclusive('\n') {
            self.line.push_str(piece);
            if self.line.ends_with('\n') {
                let line = std::mem::take(&mut self.line);
                self.process_line(&line, &mut fragments);
            }
        }

        fragments
    }

    /// Flushes what is left once the transport reports end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        let mut fragments = Vec::new();
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.line.push_str(&String::from_utf8_lossy(&tail));
        }
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.process_line(&line, &mut fragments);
        }
        fragments
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn into_text(self) -> String {
        self.accumulated
    }

    /// Number of `data:` lines whose payload failed to parse.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.utf8_tail.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.utf8_tail) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.utf8_tail.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.utf8_tail[..valid_up_to]));
                    match e.error_len() {
                        // incomplete sequence at the end, wait for the next chunk
                        None => {
                            self.utf8_tail.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.utf8_tail.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        out
    }

    fn process_line(&mut self, raw: &str, fragments: &mut Vec<String>) {
        if self.done {
            return;
        }

        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if payload == DONE_SENTINEL {
            debug!("Stream sentinel received after {} chars", self.accumulated.len());
            self.done = true;
            return;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(delta) = chunk.into_delta() {
                    self.accumulated.push_str(&delta);
                    fragments.push(delta);
                }
            }
            Err(e) => {
                self.skipped_lines += 1;
                debug!("Skipping unparseable stream record: {} ({})", payload, e);
            }
        }
    }
}

/// Lazy, single-pass stream of text fragments decoded from an event-stream body.
pub struct SseFragments {
    inner: ByteStream,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl SseFragments {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn skipped_lines(&self) -> usize {
        self.decoder.skipped_lines()
    }

    pub fn accumulated(&self) -> &str {
        self.decoder.accumulated()
    }

    pub fn into_text(self) -> String {
        self.decoder.into_text()
    }
}

impl Stream for SseFragments {
    type Item = Result<String, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => {
                    return Poll::Pending;
                }
                Poll::Ready(Some(Ok(chunk))) => {
                    let fragments = this.decoder.feed(&chunk);
                    this.ready.extend(fragments);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    let fragments = this.decoder.finish();
                    this.ready.extend(fragments);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    fn decode_all(chunks: &[&[u8]]) -> (Vec<String>, SseDecoder) {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        (out, decoder)
    }

    #[test]
    fn emits_deltas_in_order() {
        let body = format!("{}{}data: [DONE]\n\n", record("Hi"), record(" there"));
        let (fragments, decoder) = decode_all(&[body.as_bytes()]);
        assert_eq!(fragments, vec!["Hi", " there"]);
        assert_eq!(decoder.accumulated(), "Hi there");
        assert!(decoder.is_done());
    }

    #[test]
    fn split_at_every_byte_matches_unsplit() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            record("héllo "),
            record("wörld "),
            record("🦀✓")
        );
        let bytes = body.as_bytes();
        let (whole, _) = decode_all(&[bytes]);

        for split in 1..bytes.len() {
            let (left, right) = bytes.split_at(split);
            let (parts, _) = decode_all(&[left, right]);
            assert_eq!(parts.concat(), whole.concat(), "split at byte {}", split);
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let (parts, _) = decode_all(&singles);
        assert_eq!(parts, whole);
    }

    #[test]
    fn malformed_line_is_skipped_and_counted() {
        let body = format!("{}data: {{\"choices\": [\n{}", record("one"), record("two"));
        let (fragments, decoder) = decode_all(&[body.as_bytes()]);
        assert_eq!(fragments, vec!["one", "two"]);
        assert_eq!(decoder.skipped_lines(), 1);
    }

    #[test]
    fn done_sentinel_stops_emission_for_rest_of_stream() {
        let body = format!("{}data: [DONE]\n{}", record("kept"), record("dropped"));
        let (fragments, _) = decode_all(&[body.as_bytes()]);
        assert_eq!(fragments, vec!["kept"]);

        let late = record("also dropped");
        let (fragments, _) = decode_all(&[body.as_bytes(), late.as_bytes()]);
        assert_eq!(fragments, vec!["kept"]);
    }

    #[test]
    fn ignores_non_data_lines_and_crlf() {
        let body = "event: message\r\n: keep-alive\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n";
        let (fragments, decoder) = decode_all(&[body.as_bytes()]);
        assert_eq!(fragments, vec!["x"]);
        assert_eq!(decoder.skipped_lines(), 0);
    }

    #[test]
    fn unterminated_last_line_is_flushed_on_finish() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[test]
    fn invalid_utf8_becomes_replacement_character() {
        let mut bytes = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"b\"}}]}\n");
        let (fragments, _) = decode_all(&[&bytes]);
        assert_eq!(fragments, vec!["a\u{FFFD}b"]);
    }

    #[tokio::test]
    async fn fragments_stream_yields_until_transport_ends() {
        let body = format!("{}{}data: [DONE]\n\n", record("Hi"), record(" there"));
        let (a, b) = body.as_bytes().split_at(17);
        let chunks: Vec<Result<Bytes, BoxError>> = vec![
            Ok(Bytes::copy_from_slice(a)),
            Ok(Bytes::copy_from_slice(b))
        ];
        let mut fragments = SseFragments::new(Box::pin(futures::stream::iter(chunks)));

        let mut seen = Vec::new();
        while let Some(item) = fragments.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, vec!["Hi", " there"]);
        assert_eq!(fragments.into_text(), "Hi there");
    }

    #[tokio::test]
    async fn fragments_stream_surfaces_transport_error() {
        let chunks: Vec<Result<Bytes, BoxError>> = vec![
            Ok(Bytes::from(record("partial"))),
            Err("connection reset".into())
        ];
        let mut fragments = SseFragments::new(Box::pin(futures::stream::iter(chunks)));
        assert_eq!(fragments.next().await.unwrap().unwrap(), "partial");
        assert!(fragments.next().await.unwrap().is_err());
        assert!(fragments.next().await.is_none());
    }
}
