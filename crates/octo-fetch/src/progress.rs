//! Progress reporting
//!
//! Every fetch unit reports its lifecycle over an unbounded channel. The
//! channel is append-only and shared by all units; events from different
//! units interleave in no particular order.

use std::path::PathBuf;
use tokio::sync::mpsc;

/// Lifecycle event of one fetch unit, keyed by the record label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Network request about to be made
    Started { label: String },
    /// Destination already existed; no request made
    Skipped { label: String, path: PathBuf },
    /// Payload downloaded and verified
    Downloaded { label: String, bytes: usize },
    /// Non-fatal problem (transform fallback)
    Warning { label: String, message: String },
    /// Payload written
    Completed { label: String, path: PathBuf },
    /// Unit aborted
    Failed { label: String, error: String },
    /// Unit cancelled
    Cancelled { label: String },
}

impl ProgressEvent {
    /// Label of the unit this event belongs to
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Started { label }
            | Self::Skipped { label, .. }
            | Self::Downloaded { label, .. }
            | Self::Warning { label, .. }
            | Self::Completed { label, .. }
            | Self::Failed { label, .. }
            | Self::Cancelled { label } => label,
        }
    }

    /// Whether this event ends a unit
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped { .. } | Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Sending half of a progress channel
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half of a progress channel
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a progress channel
#[must_use]
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Optional progress sink; a dropped receiver is ignored
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Reporter<'a> {
    sender: Option<&'a ProgressSender>,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sender: Option<&'a ProgressSender>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_forwards_events() {
        let (tx, mut rx) = channel();
        let reporter = Reporter::new(Some(&tx));
        reporter.emit(ProgressEvent::Started { label: "a".into() });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.label(), "a");
        assert!(!event.is_terminal());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        Reporter::new(Some(&tx)).emit(ProgressEvent::Cancelled { label: "a".into() });
        Reporter::new(None).emit(ProgressEvent::Cancelled { label: "b".into() });
    }
}
