//! Outgoing buddycloud subscription stanzas.

use buddybridge_core::event::SubscriptionRequest;
use buddybridge_xmpp::{NS_CLIENT, NS_PUBSUB_OWNER};
use minidom::Element;

pub const MISSING_CALLBACK: &str = "Missing callback";
pub const DISCOVERY_REQUIRED: &str = "You must perform discovery first!";
pub const NO_RESPONSE: &str = "No response from channel server";
pub const WIRE_FULL: &str = "Outbound stanza queue is full";

/// Build the owner `subscriptions` IQ for `request`, addressed to `server`.
///
/// ```xml
/// <iq type="set" to="{server}">
///   <pubsub xmlns="http://jabber.org/protocol/pubsub#owner">
///     <subscriptions node="{node}">
///       <subscription jid="{jid}" subscription="{subscription}"/>
///     </subscriptions>
///   </pubsub>
/// </iq>
/// ```
///
/// Field values go through verbatim. Absent fields leave their attribute
/// off. The stanza id is left to the tracker.
pub fn build_subscription_iq(server: &str, request: &SubscriptionRequest) -> Element {
    let mut subscription = Element::builder("subscription", NS_PUBSUB_OWNER);
    if let Some(jid) = &request.jid {
        subscription = subscription.attr("jid", jid.as_str());
    }
    if let Some(state) = &request.subscription {
        subscription = subscription.attr("subscription", state.as_str());
    }

    let mut subscriptions = Element::builder("subscriptions", NS_PUBSUB_OWNER);
    if let Some(node) = &request.node {
        subscriptions = subscriptions.attr("node", node.as_str());
    }

    Element::builder("iq", NS_CLIENT)
        .attr("type", "set")
        .attr("to", server)
        .append(
            Element::builder("pubsub", NS_PUBSUB_OWNER)
                .append(subscriptions.append(subscription.build()).build())
                .build(),
        )
        .build()
}
