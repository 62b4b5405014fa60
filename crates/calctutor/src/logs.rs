//! Tracing layer that keeps recent log lines in memory.
//!
//! [`LogCaptureLayer`] copies every event that passes the subscriber's
//! filters into a bounded [`LogBuffer`]. The web shell reads the tail of the
//! buffer into session snapshots so raw provider errors can be shown next to
//! the fixed fallback reply.
//!
//! Events carrying a `session_id` field, or emitted inside a span that
//! carries one, are tagged with that session so a snapshot only shows its
//! own lines.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use tracing::Subscriber;
use tracing::span::{Attributes, Id};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Field name that ties an event or span to a browser session.
pub const SESSION_FIELD: &str = "session_id";

/// Lines kept before the oldest are dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// One captured event.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Shared, bounded log line buffer.
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(128)))),
            capacity,
        }
    }

    pub fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The newest `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// The newest `n` lines at `min` level or above, oldest first.
    pub fn recent_at_least(&self, min: LogLevel, n: usize) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let mut picked: Vec<LogLine> = lines
            .iter()
            .rev()
            .filter(|l| l.level >= min)
            .take(n)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    /// Like [`recent_at_least`](Self::recent_at_least), restricted to lines
    /// tagged with `session_id`.
    pub fn recent_for_session(&self, session_id: &str, min: LogLevel, n: usize) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let mut picked: Vec<LogLine> = lines
            .iter()
            .rev()
            .filter(|l| l.level >= min && l.session_id.as_deref() == Some(session_id))
            .take(n)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// A [`tracing_subscriber::Layer`] feeding a [`LogBuffer`].
pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl LogCaptureLayer {
    /// Create a layer and the buffer it writes to.
    pub fn new(capacity: usize) -> (Self, LogBuffer) {
        let buffer = LogBuffer::new(capacity);
        (
            Self {
                buffer: buffer.clone(),
            },
            buffer,
        )
    }
}

/// Span extension holding the session a span belongs to.
struct SessionTag(String);

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for LogCaptureLayer {
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        attrs.record(&mut visitor);
        if let Some(session_id) = visitor.take_session()
            && let Some(span) = ctx.span(id)
        {
            span.extensions_mut().insert(SessionTag(session_id));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let session_id = visitor.take_session().or_else(|| {
            ctx.event_scope(event)?
                .find_map(|span| span.extensions().get::<SessionTag>().map(|t| t.0.clone()))
        });

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if message.is_empty() {
                message = extras.join(" ");
            } else {
                message = format!("{message} {{{}}}", extras.join(", "));
            }
        }

        let metadata = event.metadata();
        self.buffer.push(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: (*metadata.level()).into(),
            target: metadata.target().to_string(),
            message,
            session_id,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn take_session(&mut self) -> Option<String> {
        let pos = self.fields.iter().position(|(k, _)| k == SESSION_FIELD)?;
        Some(self.fields.remove(pos).1)
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name().to_string(), rendered));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn line(level: LogLevel, message: &str) -> LogLine {
        LogLine {
            time: "00:00:00".into(),
            level,
            target: "test".into(),
            message: message.into(),
            session_id: None,
        }
    }

    #[test]
    fn buffer_drops_oldest_past_capacity() {
        let buffer = LogBuffer::new(2);
        buffer.push(line(LogLevel::Info, "a"));
        buffer.push(line(LogLevel::Info, "b"));
        buffer.push(line(LogLevel::Info, "c"));

        let messages: Vec<String> = buffer.recent(10).into_iter().map(|l| l.message).collect();
        assert_eq!(messages, ["b", "c"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let buffer = LogBuffer::new(10);
        for m in ["1", "2", "3", "4"] {
            buffer.push(line(LogLevel::Debug, m));
        }
        let messages: Vec<String> = buffer.recent(2).into_iter().map(|l| l.message).collect();
        assert_eq!(messages, ["3", "4"]);
    }

    #[test]
    fn recent_at_least_filters_by_level() {
        let buffer = LogBuffer::new(10);
        buffer.push(line(LogLevel::Warn, "w1"));
        buffer.push(line(LogLevel::Debug, "d"));
        buffer.push(line(LogLevel::Error, "e"));
        buffer.push(line(LogLevel::Warn, "w2"));

        let messages: Vec<String> = buffer
            .recent_at_least(LogLevel::Warn, 2)
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(messages, ["e", "w2"]);
    }

    #[test]
    fn layer_captures_message_and_fields() {
        let (layer, buffer) = LogCaptureLayer::new(16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(status = 429, "Model call failed");
            tracing::info!("plain");
        });

        let lines = buffer.recent(10);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, LogLevel::Warn);
        assert_eq!(lines[0].message, "Model call failed {status=429}");
        assert_eq!(lines[1].message, "plain");
        assert_eq!(lines[1].time.len(), 8);
    }

    #[test]
    fn lines_are_tagged_with_their_session() {
        let (layer, buffer) = LogCaptureLayer::new(16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("turn", session_id = "ses-a");
            span.in_scope(|| tracing::warn!("API key rejected"));
            tracing::warn!(session_id = "ses-b", "Model call failed");
            tracing::warn!("untagged");
        });

        let a = buffer.recent_for_session("ses-a", LogLevel::Warn, 10);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].message, "API key rejected");

        let b = buffer.recent_for_session("ses-b", LogLevel::Warn, 10);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].message, "Model call failed");
        assert_eq!(b[0].session_id.as_deref(), Some("ses-b"));

        assert_eq!(buffer.recent(10).len(), 3);
        assert!(buffer.recent_for_session("ses-c", LogLevel::Trace, 10).is_empty());
    }
}
