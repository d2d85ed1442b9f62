#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use buddybridge_core::event::{EventSubscription, SubscriptionRequest};
use buddybridge_xmpp::{parse_stanza, StanzaReceiver, NS_PUBSUB_OWNER};
use minidom::Element;
use tokio::time::timeout;

pub const SERVER: &str = "channels.example.com";
pub const NODE: &str = "/user/twelfth@night.org/posts";
pub const JID: &str = "juliet@shakespeare.lit";

pub const WAIT: Duration = Duration::from_millis(500);

pub fn subscribe_request() -> SubscriptionRequest {
    SubscriptionRequest::new(NODE, JID, "subscribed")
}

pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    timeout(WAIT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Next stanza written to the wire, parsed.
pub async fn next_stanza(wire: &mut StanzaReceiver) -> Element {
    let bytes = within("outbound stanza", wire.recv())
        .await
        .expect("wire closed");
    parse_stanza(&bytes).expect("outbound stanza should parse")
}

pub async fn assert_wire_idle(wire: &mut StanzaReceiver) {
    assert!(
        timeout(Duration::from_millis(30), wire.recv()).await.is_err(),
        "no stanza should have been sent"
    );
}

pub async fn assert_no_event(subscription: &mut EventSubscription) {
    assert!(
        timeout(Duration::from_millis(30), subscription.recv())
            .await
            .is_err(),
        "no event should have been published"
    );
}

/// `(node, jid, subscription)` attributes of an outgoing subscriptions IQ.
pub fn subscription_attrs(iq: &Element) -> (Option<String>, Option<String>, Option<String>) {
    let subscriptions = iq
        .get_child("pubsub", NS_PUBSUB_OWNER)
        .and_then(|pubsub| pubsub.get_child("subscriptions", NS_PUBSUB_OWNER))
        .expect("pubsub/subscriptions");
    let subscription = subscriptions
        .get_child("subscription", NS_PUBSUB_OWNER)
        .expect("subscription");
    (
        subscriptions.attr("node").map(str::to_string),
        subscription.attr("jid").map(str::to_string),
        subscription.attr("subscription").map(str::to_string),
    )
}

/// Poll `check` until it holds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    within(what, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
