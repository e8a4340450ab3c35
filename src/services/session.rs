//! Portal session plumbing: the cookies that carry token pairs between
//! requests, and the explicit session-change channel.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::services::provider::{ProviderSession, ProviderUser};

/// Ambient portal session cookie.
pub const PORTAL_COOKIE: &str = "sso_portal_session";

/// Recovery-scoped session cookie. Lives under its own path so the
/// password-reset flow never reads or writes the ambient session.
pub const RECOVERY_COOKIE: &str = "sso_recovery_session";
pub const RECOVERY_COOKIE_PATH: &str = "/auth/recovery";

/// Token pair persisted in a cookie. The payload is opaque provider
/// credential material; the portal adds nothing of its own to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookie {
    pub access_token: String,
    pub refresh_token: String,
}

impl SessionCookie {
    pub fn from_session(session: &ProviderSession) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        }
    }

    pub fn encode(&self) -> String {
        // Infallible for this struct; an empty value just reads as a
        // missing session on the next request.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Anything that does not decode is treated as no session at all.
    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// A snapshot published on the session-change channel.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user: ProviderUser,
    pub access_token: String,
}

/// Explicit session-change notification, replacing ambient framework
/// reactivity. The watch channel stores the new value before waking
/// subscribers, so a subscriber that observes a change always reads the
/// session that caused it.
#[derive(Clone)]
pub struct SessionContext {
    tx: std::sync::Arc<watch::Sender<Option<SessionSnapshot>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn publish(&self, session: Option<&ProviderSession>) {
        let snapshot = session.map(|s| SessionSnapshot {
            user: s.user.clone(),
            access_token: s.access_token.clone(),
        });
        // send_replace never fails: the context itself holds the sender
        // alive even with zero subscribers.
        self.tx.send_replace(snapshot);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.tx.subscribe()
    }
}
