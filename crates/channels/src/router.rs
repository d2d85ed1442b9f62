use std::sync::Arc;

use buddybridge_core::error::EventBusError;
use buddybridge_core::event::{
    Channel, Event, EventBus, EventPayload, EventSource, EventSubscription, StructuredError,
};
use buddybridge_xmpp::IqTracker;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::completion::{Completion, CompletionResult};
use crate::error::ChannelsError;
use crate::subscription::{SubscriptionHandler, CLIENT_ERROR_CHANNEL};

pub const SUBSCRIPTION_REQUEST_CHANNEL: &str = "ui.buddycloud.subscription";
pub const SUBSCRIPTION_RESULT_CHANNEL: &str = "xmpp.buddycloud.subscription.result";
pub const DISCOVERED_CHANNEL: &str = "xmpp.buddycloud.discovered";
pub const CONNECTION_ESTABLISHED_CHANNEL: &str = "system.connection.established";
pub const CONNECTION_LOST_CHANNEL: &str = "system.connection.lost";

/// Described in a client error when the router fell behind the bus.
pub const EVENTS_DROPPED: &str = "buddycloud router dropped events";

/// Connects the subscription handler to the event bus.
///
/// Subscription requests arrive as events; the request's correlation id is
/// the reply handle, and the outcome is published back correlated to it.
/// Discovery and connection events keep the session current.
pub struct BuddycloudRouter<T: IqTracker> {
    handler: Arc<SubscriptionHandler<T>>,
    event_bus: Arc<dyn EventBus>,
    configured_server: Option<String>,
}

impl<T: IqTracker> BuddycloudRouter<T> {
    pub fn new(
        handler: Arc<SubscriptionHandler<T>>,
        event_bus: Arc<dyn EventBus>,
        configured_server: Option<String>,
    ) -> Self {
        Self {
            handler,
            event_bus,
            configured_server,
        }
    }

    pub fn handler(&self) -> &Arc<SubscriptionHandler<T>> {
        &self.handler
    }

    /// Subscribe, then process events on a new task.
    ///
    /// Events published after this returns are seen by the router.
    pub fn spawn(self) -> Result<JoinHandle<Result<(), ChannelsError>>, ChannelsError> {
        let subscription = self.subscribe()?;
        Ok(tokio::spawn(async move { self.process(subscription).await }))
    }

    pub async fn run(&self) -> Result<(), ChannelsError> {
        let subscription = self.subscribe()?;
        self.process(subscription).await
    }

    /// One subscription over every channel the router acts on, so requests
    /// are handled in publish order relative to discovery and connection
    /// events.
    fn subscribe(&self) -> Result<EventSubscription, ChannelsError> {
        let pattern = format!(
            "{{{SUBSCRIPTION_REQUEST_CHANNEL},{DISCOVERED_CHANNEL},{CONNECTION_ESTABLISHED_CHANNEL},{CONNECTION_LOST_CHANNEL}}}"
        );
        self.event_bus
            .subscribe(&pattern)
            .map_err(|e| ChannelsError::SubscriptionFailed(e.to_string()))
    }

    async fn process(&self, mut subscription: EventSubscription) -> Result<(), ChannelsError> {
        info!(server = ?self.configured_server, "buddycloud router started");
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle_event(&event).await {
                        warn!(
                            channel = %event.channel,
                            error = %e,
                            "failed to handle buddycloud event"
                        );
                    }
                }
                Err(EventBusError::ChannelClosed) => {
                    debug!("event bus closed, buddycloud router stopping");
                    return Ok(());
                }
                Err(EventBusError::Lagged(count)) => {
                    warn!(count, "buddycloud router lagged, some events dropped");
                    self.report_lag(count);
                }
                Err(e) => {
                    error!(error = %e, "buddycloud router subscription error");
                    return Err(ChannelsError::SubscriptionFailed(e.to_string()));
                }
            }
        }
    }

    async fn handle_event(&self, event: &Event) -> Result<(), ChannelsError> {
        match &event.payload {
            EventPayload::SubscriptionRequested { request }
                if event.channel.as_str() == SUBSCRIPTION_REQUEST_CHANNEL =>
            {
                let completion = event
                    .correlation_id
                    .map(|correlation_id| self.completion_for(correlation_id));
                self.handler.handle(request.clone(), completion).await;
            }
            EventPayload::ChannelServerDiscovered { address } => {
                self.handler.session().set(address).await?;
                info!(server = %address, "channel server discovered");
            }
            EventPayload::ConnectionEstablished { jid } => {
                self.handler
                    .session()
                    .reset_to(self.configured_server.as_deref())
                    .await?;
                debug!(jid = %jid, server = ?self.configured_server, "session reset for new connection");
            }
            EventPayload::ConnectionLost { reason, .. } => {
                let abandoned = self.handler.tracker().abandon_pending();
                self.handler.session().clear().await;
                info!(reason = %reason, abandoned, "connection lost, channel server cleared");
            }
            _ => {}
        }
        Ok(())
    }

    /// Requests lost to lag have no completion left to answer them, so the
    /// loss goes out on the client error channel.
    fn report_lag(&self, count: u64) {
        let channel = match Channel::new(CLIENT_ERROR_CHANNEL) {
            Ok(c) => c,
            Err(_) => return,
        };
        let error = StructuredError {
            error_type: "wait".into(),
            condition: "resource-constraint".into(),
            description: Some(format!("{EVENTS_DROPPED}: {count}")),
            request: None,
        };
        let event = Event::new(channel, EventSource::Xmpp, EventPayload::ClientError { error });
        if let Err(e) = self.event_bus.publish(event) {
            warn!(error = %e, "failed to publish router lag notification");
        }
    }

    fn completion_for(&self, correlation_id: Uuid) -> Completion {
        let event_bus = self.event_bus.clone();
        Completion::new(move |result| publish_completed(event_bus.as_ref(), correlation_id, result))
    }
}

fn publish_completed(event_bus: &dyn EventBus, correlation_id: Uuid, result: CompletionResult) {
    let channel = match Channel::new(SUBSCRIPTION_RESULT_CHANNEL) {
        Ok(c) => c,
        Err(_) => return,
    };
    let payload = match result {
        Ok(result) => EventPayload::SubscriptionCompleted {
            error: None,
            result: Some(result),
        },
        Err(error) => EventPayload::SubscriptionCompleted {
            error: Some(error),
            result: None,
        },
    };

    let event = Event::with_correlation(channel, EventSource::Xmpp, payload, correlation_id);
    if let Err(e) = event_bus.publish(event) {
        warn!(
            correlation_id = %correlation_id,
            error = %e,
            "failed to publish subscription result"
        );
    }
}
