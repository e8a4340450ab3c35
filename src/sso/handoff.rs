//! Hand-off decision logic.
//!
//! A hand-off transfers the live session token to a trusted client
//! application by full browser navigation to
//! `{redirect}{separator}token={access_token}`. The decision of whether to
//! hand off or stay in the portal is computed as data here and turned into
//! an HTTP response by the handlers, never the other way around.

use std::fmt;

/// Where an authentication entry point sends the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffDecision {
    /// Stay in the portal; the value is the in-portal route.
    Portal(&'static str),
    /// One-shot full navigation to a trusted external target carrying the
    /// token. Not retryable: an interrupted navigation means
    /// re-authenticating.
    External(String),
}

impl HandoffDecision {
    pub fn location(&self) -> &str {
        match self {
            HandoffDecision::Portal(route) => route,
            HandoffDecision::External(url) => url,
        }
    }
}

/// Progress of a single authentication flow through the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Anonymous,
    Authenticating,
    AuthenticatedNoRedirect,
    AuthenticatedPendingHandoff,
    HandoffComplete,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Anonymous => "anonymous",
            FlowState::Authenticating => "authenticating",
            FlowState::AuthenticatedNoRedirect => "authenticated_no_redirect",
            FlowState::AuthenticatedPendingHandoff => "authenticated_pending_handoff",
            FlowState::HandoffComplete => "handoff_complete",
        };
        f.write_str(s)
    }
}

pub const POST_LOGIN_ROUTE: &str = "/apps";
pub const LOGIN_ROUTE: &str = "/login";

/// Append the token to an already-validated redirect target, preserving any
/// query the target carries.
pub fn handoff_url(redirect: &str, access_token: &str) -> String {
    let separator = if redirect.contains('?') { '&' } else { '?' };
    format!(
        "{}{}token={}",
        redirect,
        separator,
        urlencoding::encode(access_token)
    )
}

/// Decide where an authenticated user goes, given a redirect that already
/// survived allow-list validation and the freshly fetched access token (the
/// token may be absent when the fetch failed; in that case the user stays in
/// the portal rather than looping on a navigation that cannot carry a token).
pub fn post_auth_decision(
    validated_redirect: Option<&str>,
    fresh_token: Option<&str>,
) -> (FlowState, HandoffDecision) {
    match (validated_redirect, fresh_token) {
        (Some(redirect), Some(token)) => (
            FlowState::HandoffComplete,
            HandoffDecision::External(handoff_url(redirect, token)),
        ),
        (Some(_), None) => (
            FlowState::AuthenticatedNoRedirect,
            HandoffDecision::Portal(POST_LOGIN_ROUTE),
        ),
        (None, _) => (
            FlowState::AuthenticatedNoRedirect,
            HandoffDecision::Portal(POST_LOGIN_ROUTE),
        ),
    }
}
