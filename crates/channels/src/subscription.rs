use std::sync::Arc;

use buddybridge_core::config::BuddycloudConfig;
use buddybridge_core::event::{
    Channel, Event, EventBus, EventPayload, EventSource, StructuredError, SubscriptionRequest,
};
use buddybridge_xmpp::IqTracker;
use tracing::{debug, warn};

use crate::completion::Completion;
use crate::session::ChannelServerSession;
use crate::stanza::{build_subscription_iq, DISCOVERY_REQUIRED, MISSING_CALLBACK};
use crate::translate::response_continuation;

pub const CLIENT_ERROR_CHANNEL: &str = "xmpp.error.client";

/// Validates subscription requests and sends them to the channel server.
pub struct SubscriptionHandler<T: IqTracker> {
    tracker: Arc<T>,
    session: ChannelServerSession,
    event_bus: Arc<dyn EventBus>,
    echo_request_on_missing_callback: bool,
}

impl<T: IqTracker> SubscriptionHandler<T> {
    pub fn new(tracker: Arc<T>, session: ChannelServerSession, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            tracker,
            session,
            event_bus,
            echo_request_on_missing_callback: false,
        }
    }

    pub fn with_config(mut self, config: &BuddycloudConfig) -> Self {
        self.echo_request_on_missing_callback = config.echo_request_on_missing_callback;
        self
    }

    pub fn session(&self) -> &ChannelServerSession {
        &self.session
    }

    pub fn tracker(&self) -> &Arc<T> {
        &self.tracker
    }

    /// Handle one `subscription` request.
    ///
    /// Returns once the stanza is handed to the tracker; the completion runs
    /// later, when the response arrives. Without a completion the request is
    /// dropped and a client error is published instead.
    pub async fn handle(&self, request: SubscriptionRequest, completion: Option<Completion>) {
        let Some(completion) = completion else {
            self.report_missing_callback(request);
            return;
        };

        let Some(server) = self.session.current().await else {
            debug!(node = ?request.node, "subscription requested before discovery");
            completion.complete(Err(StructuredError::client_error(
                DISCOVERY_REQUIRED,
                request,
            )));
            return;
        };

        let iq = build_subscription_iq(&server, &request);
        let node = request.node.clone();
        let continuation = response_continuation(request, completion);

        match self.tracker.send_iq(iq, continuation).await {
            Ok(id) => {
                debug!(id = %id, server = %server, node = ?node, "subscription iq sent");
            }
            Err(e) => {
                // A full wire has already completed the request; a closed one
                // never will.
                warn!(error = %e, server = %server, node = ?node, "subscription iq not sent");
            }
        }
    }

    fn report_missing_callback(&self, request: SubscriptionRequest) {
        let echoed = if self.echo_request_on_missing_callback {
            request
        } else {
            SubscriptionRequest::default()
        };
        let error = StructuredError::client_error(MISSING_CALLBACK, echoed);

        let channel = match Channel::new(CLIENT_ERROR_CHANNEL) {
            Ok(c) => c,
            Err(_) => return,
        };
        let event = Event::new(channel, EventSource::Xmpp, EventPayload::ClientError { error });

        if let Err(e) = self.event_bus.publish(event) {
            warn!(error = %e, "failed to publish missing callback notification");
        } else {
            debug!("subscription request without completion rejected");
        }
    }
}
