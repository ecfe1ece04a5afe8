//! Incremental server-sent event decoding.
//!
//! Events are blank-line separated blocks of `field: value` lines. Only the
//! `event`, `data` and `id` fields are recognized; comments (`:`-prefixed
//! lines) and unknown lines are ignored.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream::BoxStream};
use std::{collections::VecDeque, fmt, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }
}

/// Push-based decoder. Feed raw bytes, pull complete events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    ready: VecDeque<SseEvent>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        while let Some(end) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(end + 1);
            let line = String::from_utf8_lossy(&line[..end]);
            let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
            self.process_line(&line);
        }
    }

    /// Flushes a trailing block that was not terminated by a blank line.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            let rest = self.buf.split();
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line);
        }
        self.dispatch();
    }

    pub fn next_event(&mut self) -> Option<SseEvent> {
        self.ready.pop_front()
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event = self.event.take();
        let id = self.id.take();

        if self.data.is_empty() {
            return;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        self.ready.push_back(SseEvent { event, data, id });
    }
}

/// When a caller should stop consuming a stream.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    pub max_events: Option<usize>,
    pub needle: Option<String>,
    pub timeout: Option<Duration>,
}

impl StopPolicy {
    pub fn after(max_events: usize) -> Self {
        Self {
            max_events: Some(max_events),
            needle: None,
            timeout: None,
        }
    }

    pub fn until_match(mut self, needle: impl Into<String>) -> Self {
        self.needle = Some(needle.into());
        self
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Matched,
    Limit,
    Closed,
    TimedOut,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Matched => "matched",
            Self::Limit => "event limit reached",
            Self::Closed => "connection closed",
            Self::TimedOut => "timed out",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub events: Vec<SseEvent>,
    pub matched: bool,
    pub stop: StopReason,
}

/// Pull-based reader over a live byte stream.
///
/// Once the underlying connection closes the reader keeps returning `None`;
/// reading from the start again requires a new request.
pub struct SseReader {
    stream: BoxStream<'static, Result<Bytes>>,
    decoder: SseDecoder,
    closed: bool,
}

impl SseReader {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        let stream = stream
            .map(|chunk| chunk.map_err(|err| Error::connectivity("event stream", err)))
            .boxed();

        Self {
            stream,
            decoder: SseDecoder::new(),
            closed: false,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        let url = response.url().to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|err| Error::connectivity(url.clone(), err)));
        Self::new_checked(stream)
    }

    fn new_checked<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            decoder: SseDecoder::new(),
            closed: false,
        }
    }

    pub async fn next_event(&mut self) -> Option<Result<SseEvent>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Some(Ok(event));
            }

            if self.closed {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(err)) => {
                    self.closed = true;
                    return Some(Err(err));
                }
                None => {
                    self.closed = true;
                    self.decoder.finish();
                }
            }
        }
    }

    pub fn events(self) -> impl Stream<Item = Result<SseEvent>> {
        futures::stream::unfold(self, |mut reader| async move {
            let event = reader.next_event().await?;
            Some((event, reader))
        })
    }

    /// Consumes events until `policy` says to stop, then drops the
    /// connection.
    pub async fn collect(mut self, policy: &StopPolicy) -> Result<StreamSummary> {
        let mut events = Vec::new();
        let mut matched = false;

        let read = async {
            loop {
                let Some(event) = self.next_event().await else {
                    return Ok::<_, Error>(StopReason::Closed);
                };
                let event = event?;
                tracing::debug!(event = ?event.event, data = %event.data, "sse event");

                if let Some(needle) = &policy.needle {
                    if event.data.contains(needle.as_str()) {
                        matched = true;
                    }
                }
                events.push(event);

                if matched {
                    return Ok(StopReason::Matched);
                }
                if policy.max_events.is_some_and(|max| events.len() >= max) {
                    return Ok(StopReason::Limit);
                }
            }
        };

        let stop = match policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, read).await {
                Ok(stop) => stop?,
                Err(_) => StopReason::TimedOut,
            },
            None => read.await?,
        };

        Ok(StreamSummary {
            events,
            matched,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + use<> {
        let parts: Vec<_> = parts
            .iter()
            .map(|part| Ok(Bytes::from(part.to_string())))
            .collect();
        futures::stream::iter(parts)
    }

    #[test]
    fn decodes_event_and_data_fields() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"event: message\ndata: hello\n\ndata: second\n\n");

        assert_eq!(
            decoder.next_event(),
            Some(SseEvent {
                event: Some("message".into()),
                data: "hello".into(),
                id: None,
            })
        );
        assert_eq!(decoder.next_event(), Some(SseEvent::data("second")));
        assert_eq!(decoder.next_event(), None);
    }

    #[test]
    fn ignores_comments_and_unknown_lines() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b": keep-alive\nretry: 1000\nnonsense\ndata:x\n\n");

        assert_eq!(decoder.next_event(), Some(SseEvent::data("x")));
        assert_eq!(decoder.next_event(), None);
    }

    #[test]
    fn joins_multiple_data_lines() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"id: 7\r\ndata: one\r\ndata: two\r\n\r\n");

        let event = decoder.next_event().unwrap();
        assert_eq!(event.data, "one\ntwo");
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn block_without_data_yields_nothing() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"event: ping\n\n");
        assert_eq!(decoder.next_event(), None);
    }

    #[test]
    fn handles_fields_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"da");
        decoder.feed(b"ta: VALIDA");
        assert_eq!(decoder.next_event(), None);
        decoder.feed(b"TION_TEST\n");
        decoder.feed(b"\n");
        assert_eq!(decoder.next_event(), Some(SseEvent::data("VALIDATION_TEST")));
    }

    #[test]
    fn finish_flushes_unterminated_block() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: tail");
        assert_eq!(decoder.next_event(), None);
        decoder.finish();
        assert_eq!(decoder.next_event(), Some(SseEvent::data("tail")));
    }

    #[tokio::test]
    async fn yields_exactly_n_events_then_nothing() {
        let body: Vec<String> = (0..5)
            .map(|i| format!("event: output\ndata: line {i}\n\n"))
            .collect();
        let parts: Vec<&str> = body.iter().map(String::as_str).collect();
        let mut reader = SseReader::new(chunks(&parts));

        for i in 0..5 {
            let event = reader.next_event().await.unwrap().unwrap();
            assert_eq!(event.event.as_deref(), Some("output"));
            assert_eq!(event.data, format!("line {i}"));
        }

        assert!(reader.next_event().await.is_none());
        assert!(reader.next_event().await.is_none());
    }

    #[tokio::test]
    async fn events_stream_preserves_order() {
        let reader = SseReader::new(chunks(&["data: a\n\ndata: b\n", "\ndata: c\n\n"]));
        let events: Vec<_> = reader
            .events()
            .map(|event| event.unwrap().data)
            .collect()
            .await;
        assert_eq!(events, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn collect_stops_on_match() {
        let reader = SseReader::new(chunks(&[
            "data: starting\n\n",
            "data: VALIDATION_TEST\n\n",
            "data: never read\n\n",
        ]));
        let policy = StopPolicy::after(10).until_match("VALIDATION_TEST");
        let summary = reader.collect(&policy).await.unwrap();

        assert!(summary.matched);
        assert_eq!(summary.stop, StopReason::Matched);
        assert_eq!(summary.events.len(), 2);
    }

    #[tokio::test]
    async fn collect_stops_at_limit() {
        let body = "data: noise\n\n".repeat(20);
        let reader = SseReader::new(chunks(&[body.as_str()]));
        let summary = reader
            .collect(&StopPolicy::after(10).until_match("VALIDATION_TEST"))
            .await
            .unwrap();

        assert!(!summary.matched);
        assert_eq!(summary.stop, StopReason::Limit);
        assert_eq!(summary.events.len(), 10);
    }

    #[tokio::test]
    async fn collect_reports_close() {
        let reader = SseReader::new(chunks(&["data: only\n\n"]));
        let summary = reader.collect(&StopPolicy::after(10)).await.unwrap();
        assert_eq!(summary.stop, StopReason::Closed);
        assert_eq!(summary.events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collect_times_out_on_silent_stream() {
        let stream = futures::stream::pending::<std::result::Result<Bytes, Infallible>>();
        let reader = SseReader::new(stream);
        let policy = StopPolicy::after(10).within(Duration::from_secs(2));
        let summary = reader.collect(&policy).await.unwrap();

        assert_eq!(summary.stop, StopReason::TimedOut);
        assert!(summary.events.is_empty());
    }

    #[tokio::test]
    async fn stream_errors_surface_once() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("connection reset"),
        ]);
        let mut reader = SseReader::new(stream);

        assert_eq!(reader.next_event().await.unwrap().unwrap().data, "a");
        assert!(matches!(
            reader.next_event().await,
            Some(Err(Error::Connectivity { .. }))
        ));
        assert!(reader.next_event().await.is_none());
    }
}
