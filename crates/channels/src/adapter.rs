use std::sync::Arc;

use buddybridge_core::event::{BroadcastEventBus, EventBus};
use buddybridge_core::Config;
use buddybridge_xmpp::{stanza_channel, InboundDispatcher, PendingIqs, StanzaReceiver, StanzaSender};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::ChannelsError;
use crate::router::BuddycloudRouter;
use crate::session::ChannelServerSession;
use crate::subscription::SubscriptionHandler;

/// The connection side of a running adapter.
///
/// Stanzas to send to the server come out of `outbound`; stanzas received
/// from the server go into `inbound`.
pub struct WireEndpoints {
    pub outbound: StanzaReceiver,
    pub inbound: StanzaSender,
}

/// A running adapter: event bus, IQ tracker, inbound dispatcher and router.
pub struct BuddycloudAdapter {
    event_bus: Arc<BroadcastEventBus>,
    handler: Arc<SubscriptionHandler<PendingIqs>>,
    dispatcher: JoinHandle<u64>,
    router: JoinHandle<Result<(), ChannelsError>>,
}

impl BuddycloudAdapter {
    /// Build every component from `config` and spawn the background tasks.
    pub fn start(config: &Config) -> Result<(Self, WireEndpoints), ChannelsError> {
        let event_bus = Arc::new(BroadcastEventBus::new(config.event_bus.channel_capacity));
        let (wire_tx, outbound) = stanza_channel(config.xmpp.wire_buffer);
        let (inbound, inbound_rx) = stanza_channel(config.xmpp.wire_buffer);

        let tracker = Arc::new(PendingIqs::from_config(&config.xmpp, wire_tx));
        let session = ChannelServerSession::with_server(config.buddycloud.channel_server.clone())?;
        let bus: Arc<dyn EventBus> = event_bus.clone();
        let handler = Arc::new(
            SubscriptionHandler::new(tracker.clone(), session, bus.clone())
                .with_config(&config.buddycloud),
        );

        let router = BuddycloudRouter::new(
            handler.clone(),
            bus,
            config.buddycloud.channel_server.clone(),
        )
        .spawn()?;

        let dispatcher = InboundDispatcher::new(tracker);
        let dispatcher = tokio::spawn(async move { dispatcher.run(inbound_rx).await });

        info!(
            timeout = ?config.xmpp.iq_timeout(),
            server = ?config.buddycloud.channel_server,
            "buddycloud adapter started"
        );

        Ok((
            Self {
                event_bus,
                handler,
                dispatcher,
                router,
            },
            WireEndpoints { outbound, inbound },
        ))
    }

    pub fn event_bus(&self) -> &Arc<BroadcastEventBus> {
        &self.event_bus
    }

    pub fn handler(&self) -> &Arc<SubscriptionHandler<PendingIqs>> {
        &self.handler
    }

    pub fn session(&self) -> &ChannelServerSession {
        self.handler.session()
    }

    /// Stop the background tasks.
    pub fn shutdown(self) {
        self.router.abort();
        self.dispatcher.abort();
        info!("buddycloud adapter stopped");
    }
}
