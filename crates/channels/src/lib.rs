//! buddycloud channel subscription adapter.
//!
//! [`SubscriptionHandler`] turns subscription requests into owner
//! `subscriptions` IQs and completes each request once with the translated
//! response. [`BuddycloudRouter`] exposes the handler over the event bus.

pub mod adapter;
pub mod completion;
pub mod error;
pub mod router;
pub mod session;
pub mod stanza;
pub mod subscription;
pub mod translate;

pub use adapter::{BuddycloudAdapter, WireEndpoints};
pub use completion::{Completion, CompletionResult};
pub use error::ChannelsError;
pub use router::{
    BuddycloudRouter, CONNECTION_ESTABLISHED_CHANNEL, CONNECTION_LOST_CHANNEL,
    DISCOVERED_CHANNEL, EVENTS_DROPPED, SUBSCRIPTION_REQUEST_CHANNEL, SUBSCRIPTION_RESULT_CHANNEL,
};
pub use session::ChannelServerSession;
pub use stanza::{build_subscription_iq, DISCOVERY_REQUIRED, MISSING_CALLBACK, NO_RESPONSE, WIRE_FULL};
pub use subscription::{SubscriptionHandler, CLIENT_ERROR_CHANNEL};
pub use translate::{response_continuation, translate_response};
