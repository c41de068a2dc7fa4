//! Line-oriented progress reporting

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

/// Receiver of human-readable status lines
pub trait ProgressSink: Send + Sync {
    fn report(&self, line: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, line: &str) {
        self(line)
    }
}

/// Forwards progress lines to the tracing subscriber
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, line: &str) {
        info!(target: "proxyrank::progress", "{}", line);
    }
}

/// Streams progress lines over an unbounded channel
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, line: &str) {
        // A dropped receiver just means nobody is listening anymore
        let _ = self.tx.send(line.to_string());
    }
}

/// Cloneable handle that timestamps lines before handing them to a sink
#[derive(Clone)]
pub struct Progress {
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Progress {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn silent() -> Self {
        Self { sink: None }
    }

    pub fn emit(&self, message: impl AsRef<str>) {
        if let Some(sink) = &self.sink {
            let timestamp = chrono::Local::now().format("%H:%M:%S");
            sink.report(&format!("[{}] {}", timestamp, message.as_ref()));
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::silent()
    }
}
