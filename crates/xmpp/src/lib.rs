pub mod error;
pub mod inbound;
pub mod stanza;
pub mod tracker;

pub use error::TrackerError;
pub use inbound::InboundDispatcher;
pub use stanza::{
    iq_response_kind, parse_stanza, serialize_stanza, stanza_error_info, IqResponseKind,
    StanzaErrorInfo, NS_CLIENT, NS_PUBSUB_OWNER, NS_STANZAS,
};
pub use tracker::{
    stanza_channel, IqContinuation, IqResponse, IqTracker, PendingIqs, StanzaReceiver,
    StanzaSender,
};
