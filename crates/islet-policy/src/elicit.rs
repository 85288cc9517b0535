//! The elicitation seam: interactive user consent for network access.
//!
//! The engine never talks to a UI directly. A frontend implements
//! [`ElicitationChannel`]; `decline` and `cancel` are both denials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request for user consent to one network access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRequest {
    /// Unique request ID.
    pub request_id: Uuid,
    /// Who is asking: a binding/MCP name, or a generic label.
    pub requester: String,
    /// The exact URL being requested.
    pub url: String,
    /// Human-readable message shown to the user.
    pub message: String,
}

impl ConsentRequest {
    /// Build a consent request for a URL.
    #[must_use]
    pub fn new(requester: impl Into<String>, url: impl Into<String>) -> Self {
        let requester = requester.into();
        let url = url.into();
        let message = format!("{requester} wants to access {url}");
        Self {
            request_id: Uuid::new_v4(),
            requester,
            url,
            message,
        }
    }
}

/// The user's decision on a [`ConsentRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentDecision {
    /// Allow this exact URL, valid for one hour.
    AllowOnce,
    /// Allow this exact URL for the process lifetime.
    AllowAlways,
    /// Refuse. Never cached; the next request asks again.
    Deny,
}

impl ConsentDecision {
    /// Whether this decision permits the request.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Deny)
    }
}

/// Channel through which the engine asks the user for consent.
///
/// Implementations that cannot reach a user should return
/// [`ConsentDecision::Deny`]; an engine configured without any channel
/// never elicits and treats "would elicit" as a denial.
#[async_trait]
pub trait ElicitationChannel: Send + Sync {
    /// Present the request and wait for a decision.
    ///
    /// Channel-level failures (closed UI, cancelled dialog) are denials.
    async fn elicit(&self, request: ConsentRequest) -> ConsentDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_allows() {
        assert!(ConsentDecision::AllowOnce.is_allowed());
        assert!(ConsentDecision::AllowAlways.is_allowed());
        assert!(!ConsentDecision::Deny.is_allowed());
    }

    #[test]
    fn test_request_message_names_requester_and_url() {
        let request = ConsentRequest::new("github", "https://10.0.0.5/health");
        assert!(request.message.contains("github"));
        assert!(request.message.contains("https://10.0.0.5/health"));
    }
}
