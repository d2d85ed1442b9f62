use buddybridge_core::event::{StructuredError, SubscriptionRequest};
use buddybridge_xmpp::{stanza_error_info, IqContinuation, IqResponse};
use tracing::debug;

use crate::completion::{Completion, CompletionResult};
use crate::stanza::{NO_RESPONSE, WIRE_FULL};

/// Map a tracked IQ response onto the result a client sees.
///
/// Remote errors carry only `type` and `condition`. A timeout or a full wire
/// is reported as a local error and so also carries a description and the
/// request.
pub fn translate_response(response: IqResponse, request: &SubscriptionRequest) -> CompletionResult {
    match response {
        IqResponse::Result(_) => Ok(true),
        IqResponse::Error(stanza) => {
            let info = stanza_error_info(&stanza);
            Err(StructuredError::remote(info.error_type, info.condition))
        }
        IqResponse::TimedOut => Err(local_error("remote-server-timeout", NO_RESPONSE, request)),
        IqResponse::WireFull => Err(local_error("resource-constraint", WIRE_FULL, request)),
    }
}

fn local_error(condition: &str, description: &str, request: &SubscriptionRequest) -> StructuredError {
    StructuredError {
        error_type: "wait".into(),
        condition: condition.into(),
        description: Some(description.into()),
        request: Some(request.clone()),
    }
}

/// Wrap `completion` so it receives the translated response.
pub fn response_continuation(request: SubscriptionRequest, completion: Completion) -> IqContinuation {
    IqContinuation::new(move |response| {
        let result = translate_response(response, &request);
        debug!(node = ?request.node, ok = result.is_ok(), "subscription response translated");
        completion.complete(result);
    })
}
