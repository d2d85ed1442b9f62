use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EventBusError;

/// Top-level channel domains. Every channel name starts with one of these.
pub const DOMAINS: [&str; 3] = ["system", "xmpp", "ui"];

/// Hierarchical channel name validation and parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Channel(String);

impl Channel {
    /// Create a new channel, validating its format.
    pub fn new(name: impl Into<String>) -> Result<Self, EventBusError> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(EventBusError::InvalidChannel(name))
        }
    }

    /// Check if a channel name is valid.
    ///
    /// Lowercase `a-z`, `0-9` and dots only, no empty segments, and the first
    /// segment must be a known domain.
    pub fn is_valid(name: &str) -> bool {
        if name.is_empty() || name.starts_with('.') || name.ends_with('.') || name.contains("..") {
            return false;
        }

        if name
            .chars()
            .any(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.'))
        {
            return false;
        }

        name.split('.')
            .next()
            .is_some_and(|domain| DOMAINS.contains(&domain))
    }

    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

/// The standard event envelope wrapping all events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Hierarchical channel name (e.g., "ui.buddycloud.subscription")
    pub channel: Channel,

    /// When the event was created (UTC)
    pub timestamp: DateTime<Utc>,

    /// Unique identifier for this event
    pub id: Uuid,

    /// Links a reply to the request it answers. On request events it is the
    /// handle the caller listens for; a request without one cannot be answered.
    pub correlation_id: Option<Uuid>,

    /// Source component that emitted this event
    pub source: EventSource,

    pub payload: EventPayload,
}

impl Event {
    pub fn new(channel: Channel, source: EventSource, payload: EventPayload) -> Self {
        Self {
            channel,
            timestamp: Utc::now(),
            id: Uuid::new_v4(),
            correlation_id: None,
            source,
            payload,
        }
    }

    pub fn with_correlation(
        channel: Channel,
        source: EventSource,
        payload: EventPayload,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Self::new(channel, source, payload)
        }
    }
}

/// Identifies the source of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum EventSource {
    /// Core system component
    System(String),
    /// XMPP subsystem
    Xmpp,
    /// Remote client talking over the event channel
    Client(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EventPayload {
    // ── System events ──────────────────────────────────────────────
    ConnectionEstablished {
        jid: String,
    },
    ConnectionLost {
        reason: String,
        will_retry: bool,
    },

    // ── XMPP events ─────────────────────────────────────────────────
    /// Discovery located the channel server for this session.
    ChannelServerDiscovered {
        address: String,
    },
    /// A subscription request finished. Exactly one of the two fields is set.
    SubscriptionCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<StructuredError>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<bool>,
    },
    /// Out-of-band notification for caller defects that have no completion
    /// path to report through.
    ClientError {
        error: StructuredError,
    },

    // ── Client command events (consumed by the buddycloud router) ──
    SubscriptionRequested {
        request: SubscriptionRequest,
    },
}

/// Subscription state carried in a buddycloud `<subscription/>` element.
///
/// Unknown tokens are kept verbatim so the channel server decides whether
/// they are acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionState {
    Subscribed,
    Invited,
    Pending,
    Unconfigured,
    None,
    Other(String),
}

impl SubscriptionState {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionState::Subscribed => "subscribed",
            SubscriptionState::Invited => "invited",
            SubscriptionState::Pending => "pending",
            SubscriptionState::Unconfigured => "unconfigured",
            SubscriptionState::None => "none",
            SubscriptionState::Other(other) => other,
        }
    }
}

impl From<String> for SubscriptionState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "subscribed" => SubscriptionState::Subscribed,
            "invited" => SubscriptionState::Invited,
            "pending" => SubscriptionState::Pending,
            "unconfigured" => SubscriptionState::Unconfigured,
            "none" => SubscriptionState::None,
            _ => SubscriptionState::Other(value),
        }
    }
}

impl From<&str> for SubscriptionState {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<SubscriptionState> for String {
    fn from(state: SubscriptionState) -> Self {
        match state {
            SubscriptionState::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to set the subscription of `jid` on channel `node`.
///
/// All fields are optional so whatever the client sent is echoed back
/// unchanged in local errors; a well-formed request sets all three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionState>,
}

impl SubscriptionRequest {
    pub fn new(
        node: impl Into<String>,
        jid: impl Into<String>,
        subscription: impl Into<SubscriptionState>,
    ) -> Self {
        Self {
            node: Some(node.into()),
            jid: Some(jid.into()),
            subscription: Some(subscription.into()),
        }
    }
}

/// Error shape delivered to clients.
///
/// Errors raised by the remote party carry only `type` and `condition`.
/// `description` and `request` are reserved for errors produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error_type}: {condition}")]
pub struct StructuredError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<SubscriptionRequest>,
}

impl StructuredError {
    /// An error mirrored from a remote `<error/>` element.
    pub fn remote(error_type: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            condition: condition.into(),
            description: None,
            request: None,
        }
    }

    /// A `modify`/`client-error` raised before anything was sent.
    pub fn client_error(description: impl Into<String>, request: SubscriptionRequest) -> Self {
        Self {
            error_type: "modify".into(),
            condition: "client-error".into(),
            description: Some(description.into()),
            request: Some(request),
        }
    }

    pub fn is_local(&self) -> bool {
        self.description.is_some()
    }
}

pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, event: Event) -> Result<(), EventBusError>;
    fn subscribe(&self, pattern: &str) -> Result<EventSubscription, EventBusError>;
}

/// Event bus with one broadcast channel per domain. Subscriptions filter by
/// glob pattern on the full channel name.
///
/// A pattern that spans domains gets its own channel, fed at publish time
/// with matching events only, so it sees them in publish order and unrelated
/// traffic never counts towards its lag.
#[derive(Clone)]
pub struct BroadcastEventBus {
    senders: HashMap<&'static str, broadcast::Sender<Event>>,
    pattern_subscribers: Arc<DashMap<Uuid, PatternSubscriber>>,
    capacity: usize,
}

struct PatternSubscriber {
    matcher: GlobMatcher,
    sender: broadcast::Sender<Event>,
}

impl BroadcastEventBus {
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

    pub fn new(channel_capacity: usize) -> Self {
        let capacity = channel_capacity.max(1);
        let senders = DOMAINS
            .iter()
            .map(|domain| (*domain, broadcast::channel(capacity).0))
            .collect();
        Self {
            senders,
            pattern_subscribers: Arc::new(DashMap::new()),
            capacity,
        }
    }

    fn receiver_for_pattern(
        &self,
        pattern: &str,
        matcher: &GlobMatcher,
    ) -> Result<broadcast::Receiver<Event>, EventBusError> {
        let first_segment = pattern.split('.').next().unwrap_or_default();
        if first_segment.is_empty() {
            return Err(EventBusError::InvalidPattern(pattern.to_string()));
        }

        if has_glob_meta(first_segment) {
            let (sender, receiver) = broadcast::channel(self.capacity);
            self.pattern_subscribers.insert(
                Uuid::new_v4(),
                PatternSubscriber {
                    matcher: matcher.clone(),
                    sender,
                },
            );
            return Ok(receiver);
        }

        self.senders
            .get(first_segment)
            .map(|sender| sender.subscribe())
            .ok_or_else(|| EventBusError::InvalidPattern(pattern.to_string()))
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: Event) -> Result<(), EventBusError> {
        let sender = self
            .senders
            .get(event.channel.domain())
            .ok_or_else(|| EventBusError::InvalidChannel(event.channel.to_string()))?;

        // Dropped pattern subscriptions are pruned here.
        self.pattern_subscribers.retain(|_, subscriber| {
            if subscriber.matcher.is_match(event.channel.as_str()) {
                subscriber.sender.send(event.clone()).is_ok()
            } else {
                subscriber.sender.receiver_count() > 0
            }
        });

        // No subscribers is not an error.
        let _ = sender.send(event);
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<EventSubscription, EventBusError> {
        let matcher = Glob::new(pattern)
            .map_err(|_| EventBusError::InvalidPattern(pattern.to_string()))?
            .compile_matcher();
        let receiver = self.receiver_for_pattern(pattern, &matcher)?;

        Ok(EventSubscription { matcher, receiver })
    }
}

pub struct EventSubscription {
    matcher: GlobMatcher,
    receiver: broadcast::Receiver<Event>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Result<Event, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matcher.is_match(event.channel.as_str()) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    return Err(EventBusError::Lagged(count));
                }
            }
        }
    }
}

fn has_glob_meta(segment: &str) -> bool {
    segment.contains(['*', '?', '[', ']', '{', '}', '!'])
}
