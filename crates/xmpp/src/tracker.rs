use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use minidom::Element;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use buddybridge_core::config::XmppConfig;

use crate::error::TrackerError;
use crate::stanza::{iq_response_kind, parse_stanza, serialize_stanza, IqResponseKind};

pub type StanzaSender = mpsc::Sender<Vec<u8>>;

pub type StanzaReceiver = mpsc::Receiver<Vec<u8>>;

pub fn stanza_channel(buffer: usize) -> (StanzaSender, StanzaReceiver) {
    mpsc::channel(buffer.max(1))
}

/// How a tracked IQ was answered.
#[derive(Debug, Clone)]
pub enum IqResponse {
    /// `type="result"`; the full response stanza.
    Result(Element),
    /// `type="error"`; the full response stanza.
    Error(Element),
    /// No response arrived within the configured timeout.
    TimedOut,
    /// The outbound wire was full, so the IQ was never written.
    WireFull,
}

/// Continuation run when a tracked IQ is answered.
///
/// Consumed on use, so it runs at most once.
pub struct IqContinuation(Box<dyn FnOnce(IqResponse) + Send + Sync + 'static>);

impl IqContinuation {
    pub fn new(f: impl FnOnce(IqResponse) + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn resolve(self, response: IqResponse) {
        (self.0)(response)
    }
}

impl std::fmt::Debug for IqContinuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IqContinuation")
    }
}

/// Send-with-correlation primitive offered by the XMPP transport.
///
/// Implementations assign the stanza id, remember the continuation under it,
/// and run the continuation at most once when the matching response arrives.
pub trait IqTracker: Send + Sync + 'static {
    fn send_iq(
        &self,
        iq: Element,
        continuation: IqContinuation,
    ) -> impl Future<Output = Result<String, TrackerError>> + Send;

    /// Drop every outstanding continuation without running it. Called when
    /// the connection is gone. Returns how many were dropped.
    fn abandon_pending(&self) -> usize;
}

struct PendingIq {
    continuation: IqContinuation,
    sent_at: Instant,
}

/// Correlation table for outstanding IQs, writing serialized stanzas to the
/// outbound wire channel.
pub struct PendingIqs {
    pending: DashMap<String, PendingIq>,
    wire_sender: StanzaSender,
    timeout: Option<Duration>,
}

impl PendingIqs {
    pub fn new(wire_sender: StanzaSender) -> Self {
        Self {
            pending: DashMap::new(),
            wire_sender,
            timeout: None,
        }
    }

    pub fn from_config(config: &XmppConfig, wire_sender: StanzaSender) -> Self {
        Self::new(wire_sender).with_timeout(config.iq_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Resolve the continuation waiting on this stanza, if any.
    ///
    /// Returns `true` when the stanza answered a tracked IQ.
    pub fn resolve(&self, stanza: &Element) -> bool {
        let Some((id, kind)) = iq_response_kind(stanza) else {
            return false;
        };

        let Some((id, pending)) = self.pending.remove(id) else {
            debug!(id = %id, "response for unknown or already resolved iq");
            return false;
        };

        debug!(
            id = %id,
            kind = ?kind,
            elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
            "iq resolved"
        );
        let response = match kind {
            IqResponseKind::Result => IqResponse::Result(stanza.clone()),
            IqResponseKind::Error => IqResponse::Error(stanza.clone()),
        };
        pending.continuation.resolve(response);
        true
    }

    pub fn resolve_bytes(&self, stanza: &[u8]) -> bool {
        match parse_stanza(stanza) {
            Some(element) => self.resolve(&element),
            None => {
                warn!(len = stanza.len(), "dropping unparseable inbound stanza");
                false
            }
        }
    }

    /// Time out every IQ older than the configured timeout.
    ///
    /// Returns how many were timed out. Does nothing without a timeout.
    pub fn sweep_expired(&self) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };

        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.sent_at.elapsed() >= timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for id in expired {
            // A response may have won the race since the scan.
            if let Some((id, pending)) = self.pending.remove(&id) {
                warn!(id = %id, timeout_secs = timeout.as_secs(), "iq timed out");
                pending.continuation.resolve(IqResponse::TimedOut);
                count += 1;
            }
        }
        count
    }

    /// Forget every outstanding IQ without running its continuation.
    ///
    /// Used when the connection is gone and no response can arrive.
    pub fn abandon_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            warn!(count, "abandoned pending iqs");
        }
        count
    }
}

impl IqTracker for PendingIqs {
    async fn send_iq(
        &self,
        mut iq: Element,
        continuation: IqContinuation,
    ) -> Result<String, TrackerError> {
        let id = Uuid::new_v4().to_string();
        iq.set_attr("id", id.as_str());

        let bytes = serialize_stanza(&iq).map_err(|e| TrackerError::Serialize(e.to_string()))?;

        // Register before writing so a fast response cannot miss the entry.
        self.pending.insert(
            id.clone(),
            PendingIq {
                continuation,
                sent_at: Instant::now(),
            },
        );

        // A stalled wire must not block the caller.
        match self.wire_sender.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                if let Some((_, pending)) = self.pending.remove(&id) {
                    pending.continuation.resolve(IqResponse::WireFull);
                }
                return Err(TrackerError::WireFull);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.pending.remove(&id);
                return Err(TrackerError::WireSendFailed);
            }
        }

        debug!(id = %id, to = ?iq.attr("to"), "iq sent");
        Ok(id)
    }

    fn abandon_pending(&self) -> usize {
        self.abandon_all()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use buddybridge_test_support::fixtures;
    use tracing_test::traced_test;

    use super::*;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recording(seen: &Seen) -> IqContinuation {
        let seen = seen.clone();
        IqContinuation::new(move |response| {
            let label = match response {
                IqResponse::Result(_) => "result".to_string(),
                IqResponse::Error(_) => "error".to_string(),
                IqResponse::TimedOut => "timeout".to_string(),
                IqResponse::WireFull => "wire-full".to_string(),
            };
            seen.lock().unwrap().push(label);
        })
    }

    fn ping() -> Element {
        Element::builder("iq", crate::stanza::NS_CLIENT)
            .attr("type", "get")
            .attr("to", "channels.example.com")
            .build()
    }

    fn response(id: &str, kind: &str) -> Element {
        parse_stanza(
            format!("<iq xmlns='jabber:client' type='{kind}' id='{id}' from='channels.example.com'/>")
                .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn send_assigns_id_and_writes_wire_bytes() {
        let (tx, mut rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();

        let id = tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        let bytes = rx.recv().await.expect("wire bytes");
        let sent = parse_stanza(&bytes).unwrap();
        assert_eq!(sent.attr("id"), Some(id.as_str()));
        assert_eq!(sent.attr("to"), Some("channels.example.com"));
        assert!(tracker.is_pending(&id));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn each_send_gets_a_distinct_id() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();

        let first = tracker.send_iq(ping(), recording(&seen)).await.unwrap();
        let second = tracker.send_iq(ping(), recording(&seen)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(tracker.pending_count(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn response_resolves_exactly_once() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();

        let id = tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert!(tracker.resolve(&response(&id, "result")));
        assert!(!tracker.resolve(&response(&id, "error")));
        assert_eq!(*seen.lock().unwrap(), vec!["result".to_string()]);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_requests_resolve_independently() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let first_seen = Seen::default();
        let second_seen = Seen::default();

        let first = tracker.send_iq(ping(), recording(&first_seen)).await.unwrap();
        let second = tracker
            .send_iq(ping(), recording(&second_seen))
            .await
            .unwrap();

        assert!(tracker.resolve(&response(&second, "error")));
        assert!(first_seen.lock().unwrap().is_empty());
        assert!(tracker.resolve(&response(&first, "result")));

        assert_eq!(*first_seen.lock().unwrap(), vec!["result".to_string()]);
        assert_eq!(*second_seen.lock().unwrap(), vec!["error".to_string()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_ids_and_requests_are_ignored() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();
        let id = tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert!(!tracker.resolve(&response("someone-else", "result")));
        assert!(!tracker.resolve(&response(&id, "set")));
        assert!(tracker.is_pending(&id));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn resolve_bytes_parses_wire_input() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();
        let id = tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        let error = fixtures::stanza_with_id("iq-error.xml", &id);
        assert!(tracker.resolve_bytes(error.as_bytes()));
        assert!(!tracker.resolve_bytes(b"<not-xml"));
        assert_eq!(*seen.lock().unwrap(), vec!["error".to_string()]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn closed_wire_drops_continuation_and_entry() {
        let (tx, rx) = stanza_channel(1);
        drop(rx);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();

        let result = tracker.send_iq(ping(), recording(&seen)).await;
        assert!(matches!(result, Err(TrackerError::WireSendFailed)));
        assert_eq!(tracker.pending_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_wire_resolves_without_blocking() {
        let (tx, mut rx) = stanza_channel(1);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();

        tracker.send_iq(ping(), recording(&seen)).await.unwrap();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            tracker.send_iq(ping(), recording(&seen)),
        )
        .await
        .expect("send must not wait for wire capacity");

        assert!(matches!(result, Err(TrackerError::WireFull)));
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["wire-full".to_string()]);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn abandon_pending_through_the_tracker_trait() {
        fn abandon<T: IqTracker>(tracker: &T) -> usize {
            tracker.abandon_pending()
        }

        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();
        tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert_eq!(abandon(&tracker), 1);
        assert_eq!(tracker.pending_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sweep_without_timeout_keeps_everything() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();
        tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert_eq!(tracker.sweep_expired(), 0);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn sweep_times_out_expired_iqs_once() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx).with_timeout(Some(Duration::ZERO));
        let seen = Seen::default();
        let id = tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert_eq!(tracker.sweep_expired(), 1);
        assert!(!tracker.resolve(&response(&id, "result")));
        assert_eq!(tracker.sweep_expired(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["timeout".to_string()]);
        assert!(logs_contain("iq timed out"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn abandon_all_drops_without_resolving() {
        let (tx, _rx) = stanza_channel(4);
        let tracker = PendingIqs::new(tx);
        let seen = Seen::default();
        tracker.send_iq(ping(), recording(&seen)).await.unwrap();
        tracker.send_iq(ping(), recording(&seen)).await.unwrap();

        assert_eq!(tracker.abandon_all(), 2);
        assert_eq!(tracker.pending_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn config_timeout_is_applied() {
        let (tx, _rx) = stanza_channel(1);
        let config = XmppConfig {
            iq_timeout_seconds: 5,
            ..XmppConfig::default()
        };
        let tracker = PendingIqs::from_config(&config, tx);
        assert_eq!(tracker.timeout(), Some(Duration::from_secs(5)));
    }
}
