//! The session manager: sign-in and sign-out flows, the current user and its renewal.

pub mod events;
pub mod renew;

#[cfg(test)]
pub(crate) mod tests;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, OnceCell};
use tracing::{event, Level};
use url::Url;

pub use crate::core::models::SessionStatus;
pub use events::UserManagerEvent;

use crate::auth::{
    AccessTokenResponse, AuthorizationCodeTokenRequest, AuthorizationResponse, RefreshTokenRequest,
    RevocationRequest, TokenRequest, TokenTypeHint,
};
use crate::core::config::IdentityConfiguration;
use crate::core::models::{FlowState, IdentityUser};
use crate::core::types::Expiry;
use crate::error::{Error, Result};
use crate::oidc::types::Nonce;
use crate::oidc::ProviderMetadata;
use crate::provider::{HttpProviderClient, ProviderClient};
use crate::storage::{MemoryStore, Store};
use crate::token::{Expectations, JwksKeyResolver, KeyResolver, TokenValidator, ValidatedIdToken};
use crate::transport::coordinator::FlowHints;
use crate::transport::{FlowOutcome, Mechanism, Navigator, Purpose, TransportCoordinator};
use events::Events;
use renew::{renewal_delay, RenewScheduler};

/// The operations a host drives the session engine with.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Removes flow states older than the configured max age and returns how many were
    /// removed.
    async fn clear_stale_state(&self) -> usize;

    /// The current user, or `None` when there is no unexpired session.
    async fn get_user(&self) -> Result<Option<IdentityUser>>;
    async fn store_user(&self, user: IdentityUser) -> Result<()>;
    async fn remove_user(&self) -> Result<()>;

    async fn sign_in_popup(&self) -> Result<IdentityUser>;
    async fn sign_in_popup_callback(&self, url: Option<&Url>) -> Result<IdentityUser>;
    async fn sign_in_silent(&self) -> Result<IdentityUser>;
    async fn sign_in_silent_callback(&self, url: Option<&Url>) -> Result<()>;
    /// Returns once navigation has started; the user arrives through
    /// [`SessionManager::sign_in_redirect_callback`].
    async fn sign_in_redirect(&self) -> Result<()>;
    async fn sign_in_redirect_callback(&self, url: Option<&Url>) -> Result<IdentityUser>;

    async fn sign_out_popup(&self) -> Result<()>;
    async fn sign_out_popup_callback(&self, keep_open: bool, url: Option<&Url>) -> Result<()>;
    async fn sign_out_redirect(&self) -> Result<()>;
    async fn sign_out_redirect_callback(&self, url: Option<&Url>) -> Result<()>;

    /// Asks the provider, without user interaction, whether its session is still alive.
    /// The stored user is left untouched.
    async fn query_session_status(&self) -> Result<SessionStatus>;
    /// Revokes the current access token. `Ok(false)` when there was nothing to revoke or
    /// the provider could not be reached.
    async fn revoke_access_token(&self) -> Result<bool>;

    async fn start_silent_renew(&self) -> Result<()>;
    async fn stop_silent_renew(&self);
}

/// Collaborators the manager is constructed with.
#[derive(Clone)]
pub struct Runtime {
    navigator: Arc<dyn Navigator>,
    provider: Arc<dyn ProviderClient>,
    user_store: Arc<dyn Store>,
    state_store: Arc<dyn Store>,
    key_resolver: Option<Arc<dyn KeyResolver>>,
}

impl Runtime {
    /// Talks to the provider over HTTP and keeps everything in memory.
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            provider: Arc::new(HttpProviderClient::new()),
            user_store: Arc::new(MemoryStore::new()),
            state_store: Arc::new(MemoryStore::new()),
            key_resolver: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_user_store(mut self, store: Arc<dyn Store>) -> Self {
        self.user_store = store;
        self
    }

    /// Flow states must outlive the document for redirect flows to complete.
    pub fn with_state_store(mut self, store: Arc<dyn Store>) -> Self {
        self.state_store = store;
        self
    }

    /// Key source for signature checks when `validate_signature` is set. Defaults to the
    /// provider's JWKS.
    pub fn with_key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = Some(resolver);
        self
    }
}

struct Inner {
    config: Arc<IdentityConfiguration>,
    namespace: String,
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn Store>,
    coordinator: TransportCoordinator,
    key_resolver: Option<Arc<dyn KeyResolver>>,
    metadata: OnceCell<ProviderMetadata>,
    validator: OnceCell<TokenValidator>,
    user: parking_lot::Mutex<Option<IdentityUser>>,
    /// Serializes user writes; counts how often the user was removed.
    session: tokio::sync::Mutex<u64>,
    renew: RenewScheduler,
    events: Events,
}

/// [`SessionManager`] over an injected [`Runtime`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct UserManager {
    inner: Arc<Inner>,
}

impl UserManager {
    /// Validates `config` and loads any persisted user.
    #[tracing::instrument(skip_all, fields(authority = %config.authority, client_id = %config.client_id.0))]
    pub async fn initialize(config: IdentityConfiguration, runtime: Runtime) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let inner = Inner {
            namespace: config.storage_namespace(),
            coordinator: TransportCoordinator::new(config.clone(), runtime.navigator, runtime.state_store),
            renew: RenewScheduler::new(config.automatic_silent_renew),
            provider: runtime.provider,
            store: runtime.user_store,
            key_resolver: runtime.key_resolver,
            metadata: OnceCell::new(),
            validator: OnceCell::new(),
            user: parking_lot::Mutex::new(None),
            session: tokio::sync::Mutex::new(0),
            events: Events::new(),
            config,
        };
        let manager = Self {
            inner: Arc::new(inner),
        };

        if let Some(user) = manager.get_user().await? {
            event!(Level::DEBUG, subject = %user.subject, "Loaded persisted user");
            manager.schedule_renew(&user);
        }
        Ok(manager)
    }

    pub fn config(&self) -> &IdentityConfiguration {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserManagerEvent> {
        self.inner.events.subscribe()
    }

    async fn metadata(&self) -> Result<&ProviderMetadata> {
        let inner = &self.inner;
        inner
            .metadata
            .get_or_try_init(|| async {
                match &inner.config.metadata {
                    Some(metadata) => Ok(metadata.clone()),
                    None => {
                        event!(Level::DEBUG, authority = %inner.config.authority, "Discovering provider metadata");
                        let metadata = inner.provider.metadata(&inner.config.authority).await?;
                        metadata.check_issuer(&inner.config.authority)?;
                        Ok(metadata)
                    }
                }
            })
            .await
    }

    async fn validator(&self) -> Result<&TokenValidator> {
        if !self.inner.config.validate_signature {
            return self.inner.validator.get_or_try_init(|| async { Ok(TokenValidator::unverified()) }).await;
        }
        let metadata = self.metadata().await?;
        self.inner
            .validator
            .get_or_try_init(|| async {
                let resolver = match &self.inner.key_resolver {
                    Some(resolver) => resolver.clone(),
                    None => {
                        let jwks_uri = metadata.jwks_uri.clone().ok_or_else(|| {
                            Error::Configuration("signature validation needs a jwks_uri".into())
                        })?;
                        Arc::new(JwksKeyResolver::new(self.inner.provider.clone(), jwks_uri)) as Arc<dyn KeyResolver>
                    }
                };
                Ok::<_, Error>(TokenValidator::strict(resolver))
            })
            .await
    }

    async fn validate_id_token(&self, id_token: &str, nonce: Option<&Nonce>) -> Result<ValidatedIdToken> {
        let metadata = self.metadata().await?;
        let expected = Expectations {
            issuer: &metadata.issuer,
            client_id: &self.inner.config.client_id,
            nonce,
        };
        self.validator().await?.validate(id_token, &expected).await
    }

    fn callback_location(&self, url: Option<&Url>) -> Result<Url> {
        match url {
            Some(url) => Ok(url.clone()),
            None => self
                .inner
                .coordinator
                .navigator()
                .current_location()
                .ok_or_else(|| Error::CallbackMismatch("no callback location".into())),
        }
    }

    fn current_user(&self) -> Option<IdentityUser> {
        self.inner.user.lock().clone()
    }

    /// Writes `user` as the persisted and cached session without side effects.
    async fn save_user(&self, user: &IdentityUser) -> Result<()> {
        self.inner.store.save(&self.inner.namespace, user.to_record()?).await?;
        *self.inner.user.lock() = Some(user.clone());
        Ok(())
    }

    async fn epoch(&self) -> u64 {
        *self.inner.session.lock().await
    }

    /// Validates, persists and announces `user`. Callers hold the session lock.
    async fn commit_user(&self, user: &IdentityUser) -> Result<()> {
        user.validate()?;
        self.save_user(user).await?;
        self.schedule_renew(user);
        event!(Level::DEBUG, subject = %user.subject, "User stored");
        self.inner.events.emit(UserManagerEvent::UserLoaded(user.clone()));
        Ok(())
    }

    /// Stores a user obtained silently, unless the user was removed since `epoch`.
    async fn store_renewed(&self, user: IdentityUser, epoch: u64) -> Result<IdentityUser> {
        let session = self.inner.session.lock().await;
        if *session != epoch {
            event!(Level::INFO, subject = %user.subject, "User was removed during silent sign-in");
            return Err(Error::CallbackMismatch("user was removed during silent sign-in".into()));
        }
        self.commit_user(&user).await?;
        Ok(user)
    }

    fn schedule_renew(&self, user: &IdentityUser) {
        if !self.inner.renew.is_enabled() {
            return;
        }
        let delay = renewal_delay(user.expires_at, self.inner.config.silent_renew_lead_time);
        event!(Level::DEBUG, delay_secs = delay.as_secs(), "Scheduling silent renew");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.renew.schedule(delay, move |generation| async move {
            if let Some(inner) = weak.upgrade() {
                let manager = UserManager { inner };
                manager.renew(generation).await;
            }
        });
    }

    /// Runs one renewal: a silent sign-in, retried once after the retry delay.
    async fn renew(&self, generation: u64) {
        if !self.inner.renew.release(generation) {
            return;
        }

        let mut failure = None;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(self.inner.config.silent_renew_retry_delay).await;
                if !self.inner.renew.is_current(generation) {
                    return;
                }
            }
            match SessionManager::sign_in_silent(self).await {
                Ok(user) => {
                    event!(Level::INFO, subject = %user.subject, "Silent renew succeeded");
                    return;
                }
                Err(e) => {
                    if !self.inner.renew.is_current(generation) {
                        event!(Level::DEBUG, error = %e, "Silent renew cancelled");
                        return;
                    }
                    event!(Level::WARN, attempt, error = %e, "Silent renew failed");
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            self.inner.events.emit(UserManagerEvent::SilentRenewError(e));
        }
    }

    /// Redeems or reads the tokens of a completed sign-in and builds the resulting user.
    async fn redeem(&self, flow: &FlowState, response: AuthorizationResponse) -> Result<IdentityUser> {
        let tokens = if flow.response_type.is_code() {
            let code = response
                .code
                .clone()
                .ok_or_else(|| Error::Validation("callback carries no code".into()))?;
            let request = TokenRequest::AuthorizationCode(AuthorizationCodeTokenRequest {
                client_id: self.inner.config.client_id.clone(),
                redirect_uri: flow.redirect_uri.clone(),
                code,
                code_verifier: flow.code_verifier.as_ref().map(|v| v.value.clone()),
            });
            let metadata = self.metadata().await?;
            self.inner.provider.exchange(metadata.token_endpoint()?, &request).await?
        } else {
            AccessTokenResponse {
                access_token: response.access_token.clone().unwrap_or_default(),
                token_type: response.token_type.clone().unwrap_or_else(|| "Bearer".into()),
                refresh_token: None,
                expires_in: response.expires_in,
                scope: response.scope.clone(),
                id_token: response.id_token.clone(),
            }
        };

        let id_token = tokens
            .id_token
            .clone()
            .ok_or_else(|| Error::TokenValidation("response carries no id_token".into()))?;
        let validated = self.validate_id_token(&id_token, flow.nonce.as_ref()).await?;

        self.build_user(id_token, validated, tokens, flow, response.session_state)
            .await
    }

    async fn redeem_and_store(&self, flow: &FlowState, response: AuthorizationResponse) -> Result<IdentityUser> {
        let user = self.redeem(flow, response).await?;
        SessionManager::store_user(self, user.clone()).await?;
        Ok(user)
    }

    async fn build_user(
        &self,
        id_token: String,
        validated: ValidatedIdToken,
        tokens: AccessTokenResponse,
        flow: &FlowState,
        session_state: Option<String>,
    ) -> Result<IdentityUser> {
        let ValidatedIdToken { claims, mut profile } = validated;
        let access_token = Some(tokens.access_token).filter(|token| !token.is_empty());

        if self.inner.config.load_user_info {
            if let Some(access_token) = &access_token {
                self.merge_user_info(&claims.sub, access_token, &mut profile).await?;
            }
        }

        let expires_at = match tokens.expires_in {
            Some(lifetime) => Expiry::after(std::time::Duration::from_secs(lifetime)),
            None => Expiry(claims.exp),
        };

        Ok(IdentityUser {
            subject: claims.sub,
            id_token,
            access_token,
            token_type: tokens.token_type,
            refresh_token: tokens.refresh_token,
            expires_at,
            scope: tokens.scope.unwrap_or_else(|| flow.scope.clone()),
            session_state,
            profile,
        })
    }

    async fn merge_user_info(
        &self,
        subject: &str,
        access_token: &str,
        profile: &mut serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let metadata = self.metadata().await?;
        let Some(endpoint) = &metadata.userinfo_endpoint else {
            event!(Level::DEBUG, "Provider has no userinfo endpoint");
            return Ok(());
        };
        let claims = self.inner.provider.user_info(endpoint, access_token).await?;
        if claims.get("sub").and_then(|sub| sub.as_str()) != Some(subject) {
            return Err(Error::TokenValidation("userinfo sub does not match id_token".into()));
        }
        profile.extend(claims);
        Ok(())
    }

    /// Renews through the `refresh_token` grant.
    async fn refresh(&self, user: &IdentityUser, refresh_token: &str) -> Result<IdentityUser> {
        let metadata = self.metadata().await?;
        let request = TokenRequest::RefreshToken(RefreshTokenRequest {
            client_id: self.inner.config.client_id.clone(),
            refresh_token: refresh_token.to_string(),
            scope: None,
        });
        let tokens = self.inner.provider.exchange(metadata.token_endpoint()?, &request).await?;

        let mut profile = user.profile.clone();
        let (id_token, expires_at) = match &tokens.id_token {
            Some(id_token) => {
                let validated = self.validate_id_token(id_token, None).await?;
                if validated.claims.sub != user.subject {
                    return Err(Error::TokenValidation("refreshed token names another subject".into()));
                }
                profile = validated.profile;
                (id_token.clone(), Expiry(validated.claims.exp))
            }
            None => (user.id_token.clone(), user.expires_at),
        };
        let expires_at = match tokens.expires_in {
            Some(lifetime) => Expiry::after(std::time::Duration::from_secs(lifetime)),
            None => expires_at,
        };

        Ok(IdentityUser {
            subject: user.subject.clone(),
            id_token,
            access_token: Some(tokens.access_token),
            token_type: tokens.token_type,
            refresh_token: tokens.refresh_token.or_else(|| Some(refresh_token.to_string())),
            expires_at,
            scope: tokens.scope.unwrap_or_else(|| user.scope.clone()),
            session_state: user.session_state.clone(),
            profile,
        })
    }

    fn hints(&self) -> FlowHints {
        FlowHints {
            id_token_hint: self.current_user().map(|user| user.id_token),
        }
    }

    async fn finish_status_check(&self, flow: &FlowState, response: AuthorizationResponse) -> Result<SessionStatus> {
        let subject = match &response.id_token {
            Some(id_token) => Some(self.validate_id_token(id_token, flow.nonce.as_ref()).await?.claims.sub),
            None => None,
        };
        Ok(SessionStatus {
            active: true,
            subject,
            session_state: response.session_state,
        })
    }

    fn signed_in(outcome: Result<FlowOutcome>) -> Result<IdentityUser> {
        match outcome? {
            FlowOutcome::SignedIn(user) => Ok(user),
            other => Err(Error::CallbackMismatch(format!("expected a sign-in, got {:?}", other))),
        }
    }
}

#[async_trait]
impl SessionManager for UserManager {
    async fn clear_stale_state(&self) -> usize {
        self.inner.coordinator.clear_stale_state().await
    }

    async fn get_user(&self) -> Result<Option<IdentityUser>> {
        if let Some(user) = self.current_user().filter(|user| !user.is_expired()) {
            return Ok(Some(user));
        }

        let Some(record) = self.inner.store.load(&self.inner.namespace).await? else {
            *self.inner.user.lock() = None;
            return Ok(None);
        };
        let user = match IdentityUser::from_record(&record) {
            Ok(user) => user,
            Err(e) => {
                event!(Level::WARN, error = %e, "Discarding unreadable user record");
                self.inner.store.remove(&self.inner.namespace).await?;
                *self.inner.user.lock() = None;
                return Ok(None);
            }
        };

        if user.is_expired() {
            event!(Level::DEBUG, subject = %user.subject, "Persisted user has expired");
            *self.inner.user.lock() = None;
            return Ok(None);
        }
        *self.inner.user.lock() = Some(user.clone());
        Ok(Some(user))
    }

    #[tracing::instrument(skip_all, fields(subject = %user.subject))]
    async fn store_user(&self, user: IdentityUser) -> Result<()> {
        let _session = self.inner.session.lock().await;
        self.commit_user(&user).await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_user(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        *session += 1;
        self.inner.renew.cancel();
        *self.inner.user.lock() = None;
        if self.inner.store.remove(&self.inner.namespace).await?.is_some() {
            event!(Level::DEBUG, "User removed");
            self.inner.events.emit(UserManagerEvent::UserUnloaded);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn sign_in_popup(&self) -> Result<IdentityUser> {
        let redirect_uri = self.inner.config.redirect_uri_for(Mechanism::Popup)?.clone();
        let endpoint = self.metadata().await?.authorization_endpoint.clone();
        let handle = self
            .inner
            .coordinator
            .begin_flow(Mechanism::Popup, Purpose::SignIn, &endpoint, redirect_uri, FlowHints::default())
            .await?;
        Self::signed_in(self.inner.coordinator.wait(handle).await)
    }

    #[tracing::instrument(skip_all)]
    async fn sign_in_popup_callback(&self, url: Option<&Url>) -> Result<IdentityUser> {
        let url = self.callback_location(url)?;
        let (flow, response) = self
            .inner
            .coordinator
            .complete_flow(&url, Mechanism::Popup, &[Purpose::SignIn])
            .await?;

        let result = self.redeem_and_store(&flow, response).await;
        self.inner
            .coordinator
            .resolve(&flow.id, result.clone().map(FlowOutcome::SignedIn), false);
        result
    }

    #[tracing::instrument(skip(self))]
    async fn sign_in_silent(&self) -> Result<IdentityUser> {
        let epoch = self.epoch().await;
        if let Some(user) = self.current_user() {
            if let Some(refresh_token) = user.refresh_token.clone() {
                match self.refresh(&user, &refresh_token).await {
                    Ok(renewed) => return self.store_renewed(renewed, epoch).await,
                    Err(e) => {
                        event!(Level::INFO, error = %e, "Refresh token rejected, falling back to a frame");
                    }
                }
            }
        }

        let redirect_uri = self.inner.config.redirect_uri_for(Mechanism::Iframe)?.clone();
        let endpoint = self.metadata().await?.authorization_endpoint.clone();
        let hints = self.hints();
        let handle = self
            .inner
            .coordinator
            .begin_flow(Mechanism::Iframe, Purpose::SignIn, &endpoint, redirect_uri, hints)
            .await?;
        let user = Self::signed_in(self.inner.coordinator.wait(handle).await)?;
        self.store_renewed(user, epoch).await
    }

    #[tracing::instrument(skip_all)]
    async fn sign_in_silent_callback(&self, url: Option<&Url>) -> Result<()> {
        let url = self.callback_location(url)?;
        let (flow, response) = self
            .inner
            .coordinator
            .complete_flow(&url, Mechanism::Iframe, &[Purpose::SignIn, Purpose::SessionStatus])
            .await?;

        // The frame's opener stores a silently obtained user.
        let outcome = match flow.purpose {
            Purpose::SessionStatus => self.finish_status_check(&flow, response).await.map(FlowOutcome::Status),
            _ => self.redeem(&flow, response).await.map(FlowOutcome::SignedIn),
        };
        if self.inner.coordinator.resolve(&flow.id, outcome.clone(), false) {
            return outcome.map(|_| ());
        }
        match outcome? {
            FlowOutcome::SignedIn(user) => {
                event!(Level::DEBUG, state = %flow.id, "No opener for silent sign-in, storing directly");
                SessionManager::store_user(self, user).await
            }
            _ => Ok(()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn sign_in_redirect(&self) -> Result<()> {
        let redirect_uri = self.inner.config.redirect_uri_for(Mechanism::Redirect)?.clone();
        let endpoint = self.metadata().await?.authorization_endpoint.clone();
        self.inner
            .coordinator
            .begin_flow(Mechanism::Redirect, Purpose::SignIn, &endpoint, redirect_uri, FlowHints::default())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn sign_in_redirect_callback(&self, url: Option<&Url>) -> Result<IdentityUser> {
        let url = self.callback_location(url)?;
        let (flow, response) = self
            .inner
            .coordinator
            .complete_flow(&url, Mechanism::Redirect, &[Purpose::SignIn])
            .await?;
        self.redeem_and_store(&flow, response).await
    }

    #[tracing::instrument(skip(self))]
    async fn sign_out_popup(&self) -> Result<()> {
        let redirect_uri = self
            .inner
            .config
            .post_logout_redirect_uri_for(Mechanism::Popup)
            .cloned()
            .ok_or_else(|| Error::Configuration("no post logout redirect URI for popup sign-out".into()))?;
        let endpoint = self.metadata().await?.end_session_endpoint()?.clone();
        let hints = self.hints();

        let handle = self
            .inner
            .coordinator
            .begin_flow(Mechanism::Popup, Purpose::SignOut, &endpoint, redirect_uri, hints)
            .await?;
        self.remove_user().await?;

        match self.inner.coordinator.wait(handle).await? {
            FlowOutcome::SignedOut => {
                self.inner.events.emit(UserManagerEvent::UserSignedOut);
                Ok(())
            }
            other => Err(Error::CallbackMismatch(format!("expected a sign-out, got {:?}", other))),
        }
    }

    #[tracing::instrument(skip(self, url))]
    async fn sign_out_popup_callback(&self, keep_open: bool, url: Option<&Url>) -> Result<()> {
        let url = self.callback_location(url)?;
        let (flow, _) = self
            .inner
            .coordinator
            .complete_flow(&url, Mechanism::Popup, &[Purpose::SignOut])
            .await?;
        self.inner.coordinator.resolve(&flow.id, Ok(FlowOutcome::SignedOut), keep_open);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn sign_out_redirect(&self) -> Result<()> {
        let redirect_uri = self
            .inner
            .config
            .post_logout_redirect_uri_for(Mechanism::Redirect)
            .cloned()
            .ok_or_else(|| Error::Configuration("no post logout redirect URI".into()))?;
        let endpoint = self.metadata().await?.end_session_endpoint()?.clone();
        let hints = self.hints();

        self.inner
            .coordinator
            .begin_flow(Mechanism::Redirect, Purpose::SignOut, &endpoint, redirect_uri, hints)
            .await?;
        self.remove_user().await
    }

    #[tracing::instrument(skip_all)]
    async fn sign_out_redirect_callback(&self, url: Option<&Url>) -> Result<()> {
        let url = self.callback_location(url)?;
        self.inner
            .coordinator
            .complete_flow(&url, Mechanism::Redirect, &[Purpose::SignOut])
            .await?;
        self.inner.events.emit(UserManagerEvent::UserSignedOut);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn query_session_status(&self) -> Result<SessionStatus> {
        let redirect_uri = self.inner.config.redirect_uri_for(Mechanism::Iframe)?.clone();
        let endpoint = self.metadata().await?.authorization_endpoint.clone();
        let hints = self.hints();
        let handle = self
            .inner
            .coordinator
            .begin_flow(Mechanism::Iframe, Purpose::SessionStatus, &endpoint, redirect_uri, hints)
            .await?;

        match self.inner.coordinator.wait(handle).await {
            Ok(FlowOutcome::Status(status)) => Ok(status),
            Ok(other) => Err(Error::CallbackMismatch(format!("expected a session status, got {:?}", other))),
            Err(e) if e.is_interaction_required() => {
                event!(Level::DEBUG, error = %e, "Provider session is not active");
                Ok(SessionStatus::inactive())
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn revoke_access_token(&self) -> Result<bool> {
        let Some(mut user) = self.get_user().await? else {
            return Ok(false);
        };
        let Some(token) = user.access_token.take() else {
            return Ok(false);
        };
        let epoch = self.epoch().await;
        let endpoint = match self.metadata().await {
            Ok(metadata) => metadata.revocation_endpoint()?.clone(),
            Err(e @ Error::Network(_)) => {
                event!(Level::WARN, error = %e, "Provider metadata unavailable, access token not revoked");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let request = RevocationRequest {
            client_id: self.inner.config.client_id.clone(),
            token,
            token_type_hint: Some(TokenTypeHint::AccessToken),
        };
        if let Err(e) = self.inner.provider.revoke(&endpoint, &request).await {
            event!(Level::WARN, error = %e, "Access token revocation failed");
            return Ok(false);
        }

        let session = self.inner.session.lock().await;
        if *session == epoch {
            self.save_user(&user).await?;
        }
        event!(Level::INFO, subject = %user.subject, "Access token revoked");
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn start_silent_renew(&self) -> Result<()> {
        self.inner.renew.set_enabled(true);
        if let Some(user) = self.get_user().await? {
            self.schedule_renew(&user);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn stop_silent_renew(&self) {
        self.inner.renew.set_enabled(false);
        self.inner.renew.cancel();
    }
}
