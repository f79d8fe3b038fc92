//! Tool progress notifications.
//!
//! Progress is a side channel: a tool may report what it is doing while it
//! runs, and nothing it sends here changes how the loop proceeds.

use compact_str::CompactString;
use tokio::sync::mpsc::UnboundedSender;

/// One progress notification from a running tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Name of the tool that sent it.
    pub tool: CompactString,
    /// The call being executed.
    pub call_id: CompactString,
    /// Short machine-friendly status, e.g. `started`.
    pub status: CompactString,
    /// Free-form human readable detail.
    pub message: String,
}

/// Handle a tool uses to report progress.
///
/// Sending never fails: with no observer attached, or once the observer has
/// gone away, notifications are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tool: CompactString,
    call_id: CompactString,
    tx: Option<UnboundedSender<Progress>>,
}

impl ProgressSender {
    pub fn new(
        tx: Option<UnboundedSender<Progress>>,
        tool: impl Into<CompactString>,
        call_id: impl Into<CompactString>,
    ) -> Self {
        Self {
            tool: tool.into(),
            call_id: call_id.into(),
            tx,
        }
    }

    /// A sender with no observer.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Whether anyone is listening.
    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Report `status` with a detail message.
    pub fn emit(&self, status: impl Into<CompactString>, message: impl Into<String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let progress = Progress {
            tool: self.tool.clone(),
            call_id: self.call_id.clone(),
            status: status.into(),
            message: message.into(),
        };
        if tx.send(progress).is_err() {
            tracing::trace!(tool = %self.tool, "progress observer dropped");
        }
    }
}
