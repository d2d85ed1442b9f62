use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::tracker::{PendingIqs, StanzaReceiver};

/// Feeds inbound wire stanzas into the IQ correlation table.
///
/// When the tracker has a timeout, expired IQs are swept on a fixed tick.
pub struct InboundDispatcher {
    tracker: Arc<PendingIqs>,
    sweep_interval: Option<Duration>,
}

impl InboundDispatcher {
    const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(tracker: Arc<PendingIqs>) -> Self {
        // Sweep often enough that a timeout is never overshot by more than
        // one interval.
        let sweep_interval = tracker
            .timeout()
            .map(|timeout| timeout.clamp(Duration::from_millis(10), Self::MAX_SWEEP_INTERVAL));
        Self {
            tracker,
            sweep_interval,
        }
    }

    /// Run until the inbound channel closes.
    ///
    /// Stanzas that do not answer a tracked IQ are left for other consumers;
    /// this loop only reports how many it ignored.
    pub async fn run(&self, mut inbound: StanzaReceiver) -> u64 {
        let mut ignored = 0_u64;
        let mut sweep = self.sweep_interval.map(tokio::time::interval);

        loop {
            let tick = async {
                match sweep.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                frame = inbound.recv() => {
                    let Some(frame) = frame else {
                        debug!(ignored, "inbound stanza channel closed, dispatcher stopping");
                        return ignored;
                    };
                    if !self.tracker.resolve_bytes(&frame) {
                        ignored += 1;
                        trace!(len = frame.len(), "inbound stanza not a tracked iq response");
                    }
                }
                _ = tick => {
                    let expired = self.tracker.sweep_expired();
                    if expired > 0 {
                        debug!(expired, "swept expired iqs");
                    }
                }
            }
        }
    }
}
