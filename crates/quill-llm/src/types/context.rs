use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Per-call options travelling alongside a request
///
/// Streamed text fragments are pushed to `progress` as they arrive; the
/// final response still carries the full text. Cancelling the token makes
/// the adapter stop reading and drop the connection.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    progress: Option<UnboundedSender<String>>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// Context with no progress channel and a fresh token
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive streamed fragments on `sender`
    #[must_use]
    pub fn with_progress(mut self, sender: UnboundedSender<String>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Observe an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token the adapter watches
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Forward a fragment to the progress channel
    ///
    /// A dropped receiver is ignored; the call keeps running.
    pub fn report(&self, fragment: &str) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(fragment.to_owned());
        }
    }
}
