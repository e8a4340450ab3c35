//! Password recovery: turn a one-time emailed credential into a
//! password-change-capable session, exactly once, then tear it down.
//!
//! The credential pair arrives in a URL fragment (never a query string, so
//! it is not sent to any server by normal navigation; the reset page posts
//! it here explicitly). Consumption is guarded twice: an in-process
//! [`OneShot`] latch on the flow object, and a digest recorded in the store
//! so a replay of the same link from anywhere is refused without touching
//! the provider. The recovery session lives on a dedicated provider handle
//! and a path-scoped cookie, isolated from the ambient portal session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::services::{
    provider::{ProviderSession, ProviderUser, SessionProvider},
    session::SessionCookie,
    ServiceError,
};
use crate::sso::DeferredStore;

/// One-time credential pair parsed out of the recovery link fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryCredentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl RecoveryCredentials {
    /// Parse `access_token`, `refresh_token` and the `type` marker from a
    /// raw fragment (`#` prefix optional). Anything other than a
    /// recovery-typed credential with a non-empty access token is rejected.
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);

        let mut access_token = None;
        let mut refresh_token = None;
        let mut kind = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "type" => kind = Some(value.into_owned()),
                _ => {}
            }
        }

        if kind.as_deref() != Some("recovery") {
            return None;
        }
        let access_token = access_token.filter(|t| !t.is_empty())?;
        Some(Self {
            access_token,
            refresh_token: refresh_token.unwrap_or_default(),
        })
    }

    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.access_token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Set-once latch. The first `acquire` wins; every later call is refused.
#[derive(Debug, Default)]
pub struct OneShot(AtomicBool);

impl OneShot {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn acquire(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct RecoveryService {
    provider: Arc<dyn SessionProvider>,
    store: Arc<dyn DeferredStore>,
    dedupe_ttl_seconds: i64,
}

impl RecoveryService {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        store: Arc<dyn DeferredStore>,
        dedupe_ttl_seconds: i64,
    ) -> Self {
        Self {
            provider,
            store,
            dedupe_ttl_seconds,
        }
    }

    /// Exchange the fragment credential for a recovery session. At most one
    /// exchange per credential ever reaches the provider.
    pub async fn exchange(
        &self,
        credentials: &RecoveryCredentials,
    ) -> Result<ProviderSession, ServiceError> {
        let first_use = self
            .store
            .consume_once(&credentials.digest(), self.dedupe_ttl_seconds)
            .await
            .map_err(ServiceError::Internal)?;
        if !first_use {
            tracing::warn!("Recovery credential replay refused");
            return Err(ServiceError::RecoveryLinkInvalid);
        }

        self.provider
            .set_session(&credentials.access_token, &credentials.refresh_token)
            .await
            .map_err(|e| match e {
                // Whatever the provider disliked about the credential, the
                // user-facing outcome is the same terminal state.
                ServiceError::Provider(msg) => {
                    tracing::warn!(error = %msg, "Recovery credential rejected by provider");
                    ServiceError::RecoveryLinkInvalid
                }
                other => other,
            })
    }

    /// Page reload during the flow: the recovery cookie is the session the
    /// dedicated client already holds. Validate it still works and return
    /// the user it belongs to.
    pub async fn resume(&self, cookie: &SessionCookie) -> Result<ProviderUser, ServiceError> {
        self.provider
            .fetch_user(&cookie.access_token)
            .await
            .map_err(|e| match e {
                ServiceError::Provider(_) => ServiceError::RecoveryLinkInvalid,
                other => other,
            })
    }

    /// Update the password on the recovery session. Provider errors are
    /// surfaced verbatim; the flow stays re-submittable.
    pub async fn update_password(
        &self,
        cookie: &SessionCookie,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.provider
            .update_password(&cookie.access_token, new_password)
            .await
    }

    /// Teardown after a successful reset: the recovery session must not be
    /// reusable. Best-effort, runs in the background.
    pub fn sign_out_background(&self, access_token: String) {
        let provider = self.provider.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.sign_out(&access_token).await {
                tracing::warn!(error = %e, "Recovery session sign-out failed");
            }
        });
    }
}

/// A single bootstrap attempt. The latch makes duplicate invocation on the
/// same flow a no-op even before the store-level digest guard is consulted.
pub struct RecoveryFlow {
    service: RecoveryService,
    latch: OneShot,
}

impl RecoveryFlow {
    pub fn new(service: RecoveryService) -> Self {
        Self {
            service,
            latch: OneShot::new(),
        }
    }

    pub async fn bootstrap(&self, fragment: &str) -> Result<ProviderSession, ServiceError> {
        if !self.latch.acquire() {
            tracing::warn!("Duplicate recovery bootstrap suppressed");
            return Err(ServiceError::RecoveryLinkInvalid);
        }

        let credentials =
            RecoveryCredentials::from_fragment(fragment).ok_or(ServiceError::RecoveryLinkInvalid)?;
        self.service.exchange(&credentials).await
    }
}
