use buddybridge_core::event::StructuredError;
use tokio::sync::oneshot;

/// What a subscription request completes with.
pub type CompletionResult = Result<bool, StructuredError>;

/// Single-use completion handler for one subscription request.
///
/// `complete` takes `self`, so a handler cannot run twice.
pub struct Completion(Box<dyn FnOnce(CompletionResult) + Send + Sync + 'static>);

impl Completion {
    pub fn new(f: impl FnOnce(CompletionResult) + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A completion that forwards its result to the returned receiver.
    ///
    /// The receiver errors if the completion is dropped without running,
    /// which is what a dropped connection looks like.
    pub fn channel() -> (Self, oneshot::Receiver<CompletionResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    pub fn complete(self, result: CompletionResult) {
        (self.0)(result)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Completion")
    }
}
