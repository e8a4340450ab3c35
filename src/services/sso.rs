//! The hand-off orchestrator.
//!
//! Each authentication entry point (login, registration, the
//! confirmation/OAuth callback, app launch) lands here. The service decides
//! whether the user stays in the portal or is forwarded, with a token, to a
//! trusted external origin. Redirect targets that fail the allow-list are
//! silently degraded to in-portal routing; no token ever travels to an
//! untrusted origin.

use std::sync::Arc;

use crate::{
    config::RegisteredApp,
    services::{
        provider::{ProviderSession, SessionProvider},
        session::SessionCookie,
        ServiceError,
    },
    sso::{
        handoff::{post_auth_decision, FlowState, LOGIN_ROUTE, POST_LOGIN_ROUTE},
        DeferredStore, HandoffDecision, OriginAllowList,
    },
};

#[derive(Clone)]
pub struct SsoService {
    provider: Arc<dyn SessionProvider>,
    store: Arc<dyn DeferredStore>,
    allowlist: OriginAllowList,
    apps: Vec<RegisteredApp>,
    deferred_ttl_seconds: i64,
}

impl SsoService {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        store: Arc<dyn DeferredStore>,
        allowlist: OriginAllowList,
        apps: Vec<RegisteredApp>,
        deferred_ttl_seconds: i64,
    ) -> Self {
        Self {
            provider,
            store,
            allowlist,
            apps,
            deferred_ttl_seconds,
        }
    }

    pub fn allowlist(&self) -> &OriginAllowList {
        &self.allowlist
    }

    /// A bare-origin redirect (no path, no query) from a registered
    /// application resolves to that application's configured callback URL.
    /// Any redirect that already names a path is forwarded as given.
    fn resolve_target(&self, redirect: String) -> String {
        let bare = match url::Url::parse(&redirect) {
            Ok(u) => (u.path() == "/" || u.path().is_empty()) && u.query().is_none(),
            Err(_) => false,
        };
        if !bare {
            return redirect;
        }
        let origin = crate::sso::origin::normalized_origin(&redirect);
        self.apps
            .iter()
            .find(|a| crate::sso::origin::normalized_origin(&a.url) == origin)
            .map(|a| a.callback_url())
            .unwrap_or(redirect)
    }

    /// Password login. On success the decision carries either the hand-off
    /// navigation (allowed redirect present) or the in-portal landing route.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        redirect: Option<&str>,
    ) -> Result<(ProviderSession, HandoffDecision), ServiceError> {
        let validated = self.allowlist.validate_redirect(redirect);

        tracing::debug!(state = %FlowState::Authenticating, email = %email, "Login attempt");
        let session = self.provider.sign_in(email, password).await?;

        let (session, state, decision) = self.decide_handoff(session, validated).await;
        tracing::info!(state = %state, user_id = %session.user.id, "User logged in");
        Ok((session, decision))
    }

    /// Already-authenticated user loads the login screen with a redirect
    /// parameter (stale tab): implicit hand-off, no credential re-entry.
    /// Returns None when there is nothing to do; the caller falls back to
    /// the normal login screen and must not retry the navigation.
    pub async fn resume_login(
        &self,
        cookie: &SessionCookie,
        redirect: Option<&str>,
    ) -> Option<(ProviderSession, HandoffDecision)> {
        let validated = self
            .allowlist
            .validate_redirect(redirect)
            .map(|r| self.resolve_target(r))?;

        // Fresh token at hand-off time; a dead cookie session degrades to
        // the normal login screen.
        match self.provider.refresh_session(&cookie.refresh_token).await {
            Ok(session) => {
                let (state, decision) =
                    post_auth_decision(Some(&validated), Some(&session.access_token));
                tracing::info!(state = %state, user_id = %session.user.id, "Implicit hand-off for returning session");
                Some((session, decision))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stale session on login screen; showing login form");
                None
            }
        }
    }

    /// Registration. There is no session yet (email confirmation comes
    /// first), so an allowed redirect is parked in the deferred slot for the
    /// callback to consume. Returns whether a redirect was parked.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
        redirect: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let validated = self.allowlist.validate_redirect(redirect);

        self.provider.sign_up(email, password, full_name).await?;
        tracing::info!(email = %email, "User registered; confirmation email pending");

        match validated {
            Some(url) => {
                self.store
                    .save_redirect(&url, self.deferred_ttl_seconds)
                    .await
                    .map_err(ServiceError::Internal)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// OAuth sign-in start: park an allowed redirect (the callback is the
    /// shared consumption point) and forward to the provider's authorize
    /// endpoint.
    pub async fn oauth_start(
        &self,
        authorize_url: String,
        redirect: Option<&str>,
    ) -> Result<String, ServiceError> {
        if let Some(url) = self.allowlist.validate_redirect(redirect) {
            self.store
                .save_redirect(&url, self.deferred_ttl_seconds)
                .await
                .map_err(ServiceError::Internal)?;
        }
        Ok(authorize_url)
    }

    /// Confirmation/OAuth callback. Resolves the session (code exchange, or
    /// the ambient cookie as fallback for reloads), then consumes the
    /// deferred redirect exactly once. The stored value is validated against
    /// the allow-list again on read: it was validated when written, but a
    /// persisted value is never trusted blindly on replay.
    pub async fn complete_callback(
        &self,
        code: Option<&str>,
        cookie: Option<&SessionCookie>,
    ) -> Result<(Option<ProviderSession>, HandoffDecision), ServiceError> {
        let session = match code {
            Some(code) => match self.provider.exchange_code(code).await {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "Callback code exchange failed");
                    None
                }
            },
            None => match cookie {
                Some(cookie) => self
                    .provider
                    .refresh_session(&cookie.refresh_token)
                    .await
                    .ok(),
                None => None,
            },
        };

        let Some(session) = session else {
            tracing::debug!(state = %FlowState::Anonymous, "Callback without a resolvable session");
            return Ok((None, HandoffDecision::Portal(LOGIN_ROUTE)));
        };

        // Read-then-delete: a second callback invocation finds the slot empty
        // and lands on the portal's default screen.
        let deferred = self
            .store
            .take_redirect()
            .await
            .map_err(ServiceError::Internal)?;

        let validated = match deferred {
            Some(saved) if self.allowlist.is_allowed(&saved) => {
                Some(self.resolve_target(saved))
            }
            Some(saved) => {
                tracing::warn!(redirect = %saved, "Discarded untrusted deferred redirect");
                None
            }
            None => None,
        };

        let (state, decision) =
            post_auth_decision(validated.as_deref(), Some(&session.access_token));
        tracing::info!(state = %state, user_id = %session.user.id, "Callback completed");
        Ok((Some(session), decision))
    }

    /// Launch a registered application with a freshly fetched token.
    pub async fn launch_app(
        &self,
        cookie: &SessionCookie,
        app: &RegisteredApp,
    ) -> Result<(ProviderSession, String), ServiceError> {
        let session = self
            .provider
            .refresh_session(&cookie.refresh_token)
            .await
            .map_err(|_| ServiceError::NotAuthenticated)?;

        let target = app.callback_url();
        if !self.allowlist.is_allowed(&target) {
            // A registered app whose URL is not in the allow-list is a
            // configuration mistake, not a user error.
            tracing::error!(slug = %app.slug, url = %target, "Registered app is outside the trusted origin set");
            return Err(ServiceError::AppNotFound);
        }

        let url = crate::sso::handoff_url(&target, &session.access_token);
        tracing::info!(slug = %app.slug, user_id = %session.user.id, "Launching application");
        Ok((session, url))
    }

    async fn decide_handoff(
        &self,
        session: ProviderSession,
        validated_redirect: Option<String>,
    ) -> (ProviderSession, FlowState, HandoffDecision) {
        let Some(redirect) = validated_redirect else {
            return (
                session,
                FlowState::AuthenticatedNoRedirect,
                HandoffDecision::Portal(POST_LOGIN_ROUTE),
            );
        };
        let redirect = self.resolve_target(redirect);

        // The provider may rotate tokens between authentication and the
        // redirect; the forwarded token is fetched fresh, never the one
        // cached from sign-in.
        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                let (state, decision) =
                    post_auth_decision(Some(&redirect), Some(&fresh.access_token));
                (fresh, state, decision)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Fresh token fetch failed; staying in portal");
                let (state, decision) = post_auth_decision(Some(&redirect), None);
                (session, state, decision)
            }
        }
    }
}
