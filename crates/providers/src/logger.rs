//! Transcript decorator.
//!
//! Writes every exchange to a sink as a human-readable transcript:
//!
//! ```text
//! >>>>>
//! <last outgoing message>
//!
//! <<<<<
//! <reply>
//! ```
//!
//! Failures are written as `FAIL:` followed by the error. This is an I/O
//! transcript for the user, separate from the `tracing` diagnostics.
//! Sink write failures are ignored.

use async_trait::async_trait;
use chatter_core::{Chatter, ChatterError, Context, Message, Opt, Reply, Usage};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// How transcript entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    /// The rendered text of each message
    Text,
    /// Pretty-printed JSON, every line prefixed with `|`
    Json,
}

/// Writes every exchange of the wrapped chatter to a sink.
pub struct Logger {
    inner: Arc<dyn Chatter>,
    sink: Mutex<Box<dyn Write + Send>>,
    format: TranscriptFormat,
}

impl Logger {
    /// Log the exchanges of `inner` to `sink` in `format`.
    pub fn new(sink: Box<dyn Write + Send>, format: TranscriptFormat, inner: Arc<dyn Chatter>) -> Self {
        Self {
            inner,
            sink: Mutex::new(sink),
            format,
        }
    }

    /// A plain text transcript.
    pub fn text(sink: impl Write + Send + 'static, inner: Arc<dyn Chatter>) -> Self {
        Self::new(Box::new(sink), TranscriptFormat::Text, inner)
    }

    /// A JSON transcript.
    pub fn json(sink: impl Write + Send + 'static, inner: Arc<dyn Chatter>) -> Self {
        Self::new(Box::new(sink), TranscriptFormat::Json, inner)
    }

    fn write_entry<T>(&self, marker: &str, value: &T, text: String)
    where
        T: Serialize,
    {
        let body = match self.format {
            TranscriptFormat::Text => text,
            TranscriptFormat::Json => match serde_json::to_string_pretty(value) {
                Ok(json) => json.lines().map(|line| format!("|{line}")).collect::<Vec<_>>().join("\n"),
                Err(_) => return,
            },
        };

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = write!(sink, "\n{marker}\n{body}\n");
        let _ = sink.flush();
    }

    fn write_failure(&self, err: &ChatterError) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = write!(sink, "FAIL:\n\t{err}\n");
        let _ = sink.flush();
    }
}

#[async_trait]
impl Chatter for Logger {
    fn usage(&self) -> Usage {
        self.inner.usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        if let Some(last) = messages.last() {
            self.write_entry(">>>>>", last, last.to_string());
        }

        match self.inner.prompt(ctx, messages, opts).await {
            Ok(reply) => {
                self.write_entry("<<<<<", &reply, reply.to_string());
                Ok(reply)
            }
            Err(e) => {
                self.write_failure(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shared in-memory sink.
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Scripted(Result<Reply, ChatterError>);

    #[async_trait]
    impl Chatter for Scripted {
        fn usage(&self) -> Usage {
            Usage::new(7, 7)
        }

        async fn prompt(
            &self,
            _ctx: &Context,
            _messages: &[Message],
            _opts: &[Opt],
        ) -> std::result::Result<Reply, ChatterError> {
            self.0.clone()
        }
    }

    fn history() -> Vec<Message> {
        vec![Message::stratum("Be terse"), Message::text("Name a color")]
    }

    #[tokio::test]
    async fn text_transcript_shows_last_message_and_reply() {
        let sink = Sink::default();
        let logger = Logger::text(sink.clone(), Arc::new(Scripted(Ok(Reply::text("Blue")))));

        let reply = logger.prompt(&Context::background(), &history(), &[]).await.unwrap();

        assert_eq!(reply.to_string(), "Blue");
        assert_eq!(sink.contents(), "\n>>>>>\nName a color\n\n<<<<<\nBlue\n");
        assert_eq!(logger.usage(), Usage::new(7, 7));
    }

    #[tokio::test]
    async fn failures_are_logged_and_returned_unchanged() {
        let sink = Sink::default();
        let err = ChatterError::service_io("connection refused");
        let logger = Logger::text(sink.clone(), Arc::new(Scripted(Err(err.clone()))));

        let got = logger
            .prompt(&Context::background(), &history(), &[])
            .await
            .unwrap_err();

        assert_eq!(got, err);
        assert!(sink
            .contents()
            .ends_with("FAIL:\n\tservice I/O error: connection refused\n"));
    }

    #[tokio::test]
    async fn json_transcript_prefixes_every_line() {
        let sink = Sink::default();
        let logger = Logger::json(sink.clone(), Arc::new(Scripted(Ok(Reply::text("Blue")))));

        logger.prompt(&Context::background(), &history(), &[]).await.unwrap();

        let contents = sink.contents();
        assert!(contents.contains(r#"|  "kind": "text""#));
        assert!(contents.contains(r#""stage": "return""#));
        for line in contents.lines().filter(|l| !l.is_empty() && !l.starts_with(">>>>>") && !l.starts_with("<<<<<")) {
            assert!(line.starts_with('|'), "unprefixed line: {line}");
        }
    }
}
