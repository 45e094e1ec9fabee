use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{event, Level};
use url::Url;

use super::callback::{parse_callback, CallbackParams};
use super::{FlowStatus, FrameWindow, Mechanism, Navigator, PopupWindow, Purpose};
use crate::auth::authorization::append_query;
use crate::auth::{pkce, AuthorizationRequest, AuthorizationResponse};
use crate::core::config::IdentityConfiguration;
use crate::core::models::{FlowState, IdentityUser, SessionStatus};
use crate::core::types::{now_secs, StateToken};
use crate::error::{Error, Result};
use crate::oidc::models::EndSessionRequest;
use crate::oidc::types::Nonce;
use crate::storage::Store;
use crate::util::random::FromRandom;

/// What a completed flow produced, handed from the callback to the waiting opener.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    SignedIn(IdentityUser),
    SignedOut,
    Status(SessionStatus),
}

#[derive(Debug)]
pub struct CallbackMessage {
    pub outcome: Result<FlowOutcome>,
    /// Leave the popup open after delivery.
    pub keep_open: bool,
}

type PopupSlot = Arc<parking_lot::Mutex<Option<StateToken>>>;

/// Holds the single popup slot for one flow and frees it when dropped.
pub struct PopupClaim {
    slot: PopupSlot,
    state: StateToken,
}

impl PopupClaim {
    fn acquire(slot: &PopupSlot, state: &StateToken) -> Result<Self> {
        let mut current = slot.lock();
        if let Some(active) = current.as_ref() {
            event!(Level::WARN, active = %active, "Popup flow already in progress");
            return Err(Error::ConcurrentFlow);
        }
        *current = Some(state.clone());
        Ok(Self {
            slot: slot.clone(),
            state: state.clone(),
        })
    }
}

impl Drop for PopupClaim {
    fn drop(&mut self) {
        release_popup(&self.slot, &self.state);
    }
}

fn release_popup(slot: &PopupSlot, state: &StateToken) {
    let mut current = slot.lock();
    if current.as_ref() == Some(state) {
        *current = None;
    }
}

/// An opened flow whose completion is awaited in this process.
pub enum FlowHandle {
    Popup {
        state: StateToken,
        receiver: oneshot::Receiver<CallbackMessage>,
        window: Box<dyn PopupWindow>,
        claim: PopupClaim,
    },
    Frame {
        state: StateToken,
        receiver: oneshot::Receiver<CallbackMessage>,
        frame: Box<dyn FrameWindow>,
    },
    /// The document navigated away; completion arrives through the callback entry point.
    Redirected { state: StateToken },
}

impl FlowHandle {
    pub fn state(&self) -> &StateToken {
        match self {
            Self::Popup { state, .. } | Self::Frame { state, .. } | Self::Redirected { state } => state,
        }
    }
}

/// Hints forwarded to the provider with a flow.
#[derive(Debug, Clone, Default)]
pub struct FlowHints {
    pub id_token_hint: Option<String>,
}

/// Owns every in-flight [`FlowState`] and the channels their callbacks resolve.
pub struct TransportCoordinator {
    config: Arc<IdentityConfiguration>,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn Store>,
    waiters: parking_lot::Mutex<HashMap<StateToken, oneshot::Sender<CallbackMessage>>>,
    popup: PopupSlot,
    consume: tokio::sync::Mutex<()>,
}

impl TransportCoordinator {
    pub fn new(
        config: Arc<IdentityConfiguration>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            config,
            navigator,
            store,
            waiters: parking_lot::Mutex::new(HashMap::new()),
            popup: Arc::new(parking_lot::Mutex::new(None)),
            consume: tokio::sync::Mutex::new(()),
        }
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    fn key(&self, state: &StateToken) -> String {
        format!("{}{}", self.config.state_prefix(), state)
    }

    fn new_flow(&self, mechanism: Mechanism, purpose: Purpose, redirect_uri: Url) -> FlowState {
        let response_type = self.config.response_type;
        let nonce = if purpose != Purpose::SignOut && self.config.scope.has_openid() {
            Some(Nonce::from_random())
        } else {
            None
        };
        // Status checks never redeem their code.
        let code_verifier = if purpose == Purpose::SignIn && response_type.is_code() {
            Some(pkce::Verifier::from_random())
        } else {
            None
        };

        FlowState {
            id: StateToken::from_random(),
            nonce,
            code_verifier,
            mechanism,
            purpose,
            status: FlowStatus::Created,
            response_type,
            scope: self.config.scope.clone(),
            redirect_uri,
            created_at: now_secs(),
        }
    }

    fn request_url(&self, flow: &FlowState, endpoint: &Url, hints: FlowHints) -> Result<Url> {
        match flow.purpose {
            Purpose::SignOut => {
                let req = EndSessionRequest {
                    client_id: self.config.client_id.clone(),
                    state: flow.id.clone(),
                    id_token_hint: hints.id_token_hint,
                    post_logout_redirect_uri: Some(flow.redirect_uri.clone()),
                };
                let query = serde_urlencoded::to_string(&req)
                    .map_err(|e| Error::Configuration(format!("unencodable end session request: {}", e)))?;
                Ok(append_query(endpoint, &query))
            }
            Purpose::SignIn | Purpose::SessionStatus => {
                let oidc = match (flow.mechanism, flow.purpose) {
                    (Mechanism::Iframe, _) => {
                        crate::oidc::models::AuthorizationRequest::silent(flow.nonce.clone(), hints.id_token_hint)
                    }
                    _ => crate::oidc::models::AuthorizationRequest::with_nonce(flow.nonce.clone()),
                };
                let req = AuthorizationRequest {
                    client_id: self.config.client_id.clone(),
                    redirect_uri: flow.redirect_uri.clone(),
                    response_type: flow.response_type,
                    scope: flow.scope.clone(),
                    state: flow.id.clone(),
                    pkce_challenge: flow.code_verifier.as_ref().map(pkce::Challenge::from_verifier),
                    oidc,
                    extra: self.config.extra_query_params.clone(),
                };
                req.to_url(endpoint)
            }
        }
    }

    /// Generates a flow, persists it and opens `mechanism` at the request URL.
    #[tracing::instrument(skip(self, endpoint, redirect_uri, hints))]
    pub async fn begin_flow(
        &self,
        mechanism: Mechanism,
        purpose: Purpose,
        endpoint: &Url,
        redirect_uri: Url,
        hints: FlowHints,
    ) -> Result<FlowHandle> {
        let mut flow = self.new_flow(mechanism, purpose, redirect_uri);
        let url = self.request_url(&flow, endpoint, hints)?;

        let claim = match mechanism {
            Mechanism::Popup => Some(PopupClaim::acquire(&self.popup, &flow.id)?),
            _ => None,
        };

        match self.open(&mut flow, &url, claim).await {
            Ok(handle) => {
                event!(Level::DEBUG, state = %flow.id, "Flow awaiting callback");
                Ok(handle)
            }
            Err(e) => {
                event!(Level::WARN, state = %flow.id, error = %e, "Failed to open flow");
                self.abandon(&flow.id).await;
                Err(e)
            }
        }
    }

    async fn open(&self, flow: &mut FlowState, url: &Url, claim: Option<PopupClaim>) -> Result<FlowHandle> {
        flow.advance(FlowStatus::AwaitingCallback)?;
        self.store.save(&self.key(&flow.id), flow.to_record()?).await?;

        let state = flow.id.clone();
        match flow.mechanism {
            Mechanism::Popup => {
                let claim = claim.ok_or(Error::ConcurrentFlow)?;
                let receiver = self.register(&state);
                let window = self.navigator.open_popup(url).await?;
                Ok(FlowHandle::Popup {
                    state,
                    receiver,
                    window,
                    claim,
                })
            }
            Mechanism::Iframe => {
                let receiver = self.register(&state);
                let frame = self.navigator.create_frame(url).await?;
                Ok(FlowHandle::Frame {
                    state,
                    receiver,
                    frame,
                })
            }
            Mechanism::Redirect => {
                self.navigator.navigate(url).await?;
                Ok(FlowHandle::Redirected { state })
            }
        }
    }

    fn register(&self, state: &StateToken) -> oneshot::Receiver<CallbackMessage> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.lock().insert(state.clone(), sender);
        receiver
    }

    /// Awaits the outcome of a popup or frame flow.
    ///
    /// Frames are bounded by the silent request timeout; popups only by the user.
    pub async fn wait(&self, handle: FlowHandle) -> Result<FlowOutcome> {
        match handle {
            FlowHandle::Popup {
                state,
                mut receiver,
                window,
                claim,
            } => {
                let delivered = tokio::select! {
                    biased;
                    message = &mut receiver => message.ok(),
                    _ = window.closed() => None,
                };
                drop(claim);
                match delivered {
                    Some(message) => {
                        if !message.keep_open {
                            window.close().await;
                        }
                        message.outcome
                    }
                    None => {
                        event!(Level::INFO, state = %state, "Popup closed before callback");
                        self.abandon(&state).await;
                        Err(Error::PopupClosed)
                    }
                }
            }
            FlowHandle::Frame {
                state,
                receiver,
                frame,
            } => {
                let result = tokio::time::timeout(self.config.silent_request_timeout, receiver).await;
                frame.remove().await;
                match result {
                    Ok(Ok(message)) => message.outcome,
                    Ok(Err(_)) => Err(Error::CallbackMismatch(format!("flow {} was abandoned", state))),
                    Err(_) => {
                        event!(Level::WARN, state = %state, "Frame flow timed out");
                        self.abandon(&state).await;
                        Err(Error::Timeout(state.0))
                    }
                }
            }
            FlowHandle::Redirected { state } => Err(Error::CallbackMismatch(format!(
                "redirect flow {} completes through its callback",
                state
            ))),
        }
    }

    /// Consumes the flow a callback URL refers to, provided it was opened over
    /// `mechanism` for one of `purposes`.
    ///
    /// A flow is taken exactly once: later callbacks with the same state fail with
    /// [`Error::CallbackMismatch`]. Provider error responses consume the flow, are
    /// forwarded to the waiting opener and returned as [`Error::Authorization`].
    #[tracing::instrument(skip(self, url))]
    pub async fn complete_flow(
        &self,
        url: &Url,
        mechanism: Mechanism,
        purposes: &[Purpose],
    ) -> Result<(FlowState, AuthorizationResponse)> {
        let CallbackParams {
            state,
            error,
            response,
        } = parse_callback(url)?;

        let mut flow = {
            let _guard = self.consume.lock().await;
            let key = self.key(&state);
            let record = self
                .store
                .load(&key)
                .await?
                .ok_or_else(|| Error::CallbackMismatch(format!("no flow for state {}", state)))?;
            let flow = match FlowState::from_record(&record) {
                Ok(flow) => flow,
                Err(e) => {
                    self.store.remove(&key).await?;
                    return Err(Error::CallbackMismatch(format!("unreadable flow {}: {}", state, e)));
                }
            };

            if flow.mechanism != mechanism || !purposes.contains(&flow.purpose) {
                return Err(Error::CallbackMismatch(format!(
                    "flow {} is a {:?} {} flow",
                    state, flow.purpose, flow.mechanism
                )));
            }
            if !flow.matches_return_url(url) {
                return Err(Error::CallbackMismatch(format!(
                    "callback for {} did not return to {}",
                    state, flow.redirect_uri
                )));
            }

            self.store.remove(&key).await?;
            flow
        };

        if flow.is_stale(self.config.stale_state_max_age) {
            flow.advance(FlowStatus::Expired)?;
            event!(Level::INFO, state = %flow.id, "Callback for expired flow");
            let e = Error::CallbackMismatch(format!("flow {} expired", flow.id));
            self.resolve(&flow.id, Err(e.clone()), false);
            return Err(e);
        }

        if let Some(error) = error {
            flow.advance(FlowStatus::Failed)?;
            event!(Level::INFO, state = %flow.id, error = %error, "Provider returned an error");
            let e = Error::Authorization(error);
            self.resolve(&flow.id, Err(e.clone()), false);
            return Err(e);
        }

        flow.advance(FlowStatus::Completed)?;
        event!(Level::DEBUG, state = %flow.id, "Flow completed");
        Ok((flow, response))
    }

    /// Hands the outcome of a consumed flow to its waiting opener, if there is one.
    /// Returns whether the opener received it.
    pub fn resolve(&self, state: &StateToken, outcome: Result<FlowOutcome>, keep_open: bool) -> bool {
        let sender = self.waiters.lock().remove(state);
        release_popup(&self.popup, state);
        match sender {
            Some(sender) => sender.send(CallbackMessage { outcome, keep_open }).is_ok(),
            None => false,
        }
    }

    /// Forgets a flow without completing it.
    async fn abandon(&self, state: &StateToken) {
        self.waiters.lock().remove(state);
        release_popup(&self.popup, state);
        if let Err(e) = self.store.remove(&self.key(state)).await {
            event!(Level::WARN, state = %state, error = %e, "Failed to remove flow state");
        }
    }

    /// Removes flows older than the configured max age. Never fails; returns how many
    /// flows were removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear_stale_state(&self) -> usize {
        let prefix = self.config.state_prefix();
        let keys = match self.store.keys(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                event!(Level::WARN, error = %e, "Failed to list flow states");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let state = StateToken(key[prefix.len()..].to_string());
            let stale = match self.store.load(&key).await {
                Ok(Some(record)) => FlowState::from_record(&record)
                    .map(|flow| flow.is_stale(self.config.stale_state_max_age))
                    .unwrap_or(true),
                Ok(None) => false,
                Err(e) => {
                    event!(Level::WARN, key = %key, error = %e, "Failed to read flow state");
                    false
                }
            };
            if stale {
                event!(Level::DEBUG, state = %state, "Removing stale flow state");
                self.abandon(&state).await;
                removed += 1;
            }
        }
        removed
    }
}
