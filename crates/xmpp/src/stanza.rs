//! Namespaces and helpers for reading raw stanzas.

use std::str::FromStr;

use minidom::Element;

pub const NS_CLIENT: &str = "jabber:client";

/// PubSub owner namespace for node and subscription management (XEP-0060).
pub const NS_PUBSUB_OWNER: &str = "http://jabber.org/protocol/pubsub#owner";

/// Defined stanza error conditions (RFC 6120).
pub const NS_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Error type used when a remote `<error/>` omits its `type` attribute.
pub const FALLBACK_ERROR_TYPE: &str = "cancel";

/// Condition used when a remote `<error/>` carries no condition element.
pub const FALLBACK_CONDITION: &str = "undefined-condition";

/// Parse raw wire bytes into an element. Returns `None` for empty or
/// malformed input.
pub fn parse_stanza(stanza: &[u8]) -> Option<Element> {
    let xml = std::str::from_utf8(stanza).ok()?.trim();
    if xml.is_empty() {
        return None;
    }
    Element::from_str(xml).ok()
}

pub fn serialize_stanza(element: &Element) -> Result<Vec<u8>, minidom::Error> {
    let mut bytes = Vec::new();
    element.write_to(&mut bytes)?;
    Ok(bytes)
}

/// How an inbound IQ answers an earlier request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqResponseKind {
    Result,
    Error,
}

/// Classify an inbound stanza as an IQ response, returning its id.
///
/// Requests (`get`/`set`) and non-IQ stanzas are not responses.
pub fn iq_response_kind(stanza: &Element) -> Option<(&str, IqResponseKind)> {
    if stanza.name() != "iq" {
        return None;
    }
    let id = stanza.attr("id")?;
    match stanza.attr("type")? {
        "result" => Some((id, IqResponseKind::Result)),
        "error" => Some((id, IqResponseKind::Error)),
        _ => None,
    }
}

/// The `type` and condition of a stanza error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaErrorInfo {
    pub error_type: String,
    pub condition: String,
}

/// Read the `<error/>` child of an error stanza.
///
/// The condition is the first child element of `<error/>` other than
/// `<text/>`, preferring one in the stanzas namespace. Missing pieces fall
/// back to `cancel` / `undefined-condition` so callers always get both.
pub fn stanza_error_info(stanza: &Element) -> StanzaErrorInfo {
    let Some(error) = stanza.children().find(|child| child.name() == "error") else {
        return StanzaErrorInfo {
            error_type: FALLBACK_ERROR_TYPE.to_string(),
            condition: FALLBACK_CONDITION.to_string(),
        };
    };

    let error_type = error
        .attr("type")
        .unwrap_or(FALLBACK_ERROR_TYPE)
        .to_string();

    let conditions = || error.children().filter(|child| child.name() != "text");
    let condition = conditions()
        .find(|child| child.ns() == NS_STANZAS)
        .or_else(|| conditions().next())
        .map(|child| child.name().to_string())
        .unwrap_or_else(|| FALLBACK_CONDITION.to_string());

    StanzaErrorInfo {
        error_type,
        condition,
    }
}
