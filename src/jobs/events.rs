//! Event delivery to observers.

use tokio::sync::mpsc;

use super::types::JobEvent;

/// Receiver of job events.
///
/// Called from the job's own task; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Forwards events into an unbounded channel.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: JobEvent) {}
}
