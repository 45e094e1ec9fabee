
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use url::Url;

use self::support::*;
use super::*;
use crate::auth::AuthorizationErrorKind;
use crate::core::types::ResponseType;
use crate::storage::{FileStore, MemoryStore};
use crate::token::validation::tests::{claims, sign};
use crate::token::StaticKeyResolver;

struct Harness {
    manager: UserManager,
    navigator: Arc<FakeNavigator>,
    provider: Arc<FakeProvider>,
    store: Arc<MemoryStore>,
}

async fn harness_with(config: IdentityConfiguration) -> Harness {
    let navigator = Arc::new(FakeNavigator::default());
    let provider = Arc::new(FakeProvider::default());
    let store = Arc::new(MemoryStore::new());
    let runtime = Runtime::new(navigator.clone())
        .with_provider(provider.clone())
        .with_user_store(store.clone());
    let manager = UserManager::initialize(config, runtime).await.unwrap();
    Harness {
        manager,
        navigator,
        provider,
        store,
    }
}

async fn harness() -> Harness {
    harness_with(config().with_automatic_silent_renew(false)).await
}

fn callback(base: &str, params: &str) -> Url {
    format!("{}?{}", base, params).parse().unwrap()
}

#[tokio::test]
async fn rejects_configuration_without_redirect_uris() {
    let authority: Url = "https://idp.example".parse().unwrap();
    let runtime = Runtime::new(Arc::new(FakeNavigator::default()));
    let result = UserManager::initialize(IdentityConfiguration::new(authority, "app1"), runtime).await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn stored_user_is_returned_unchanged() {
    let h = harness().await;
    let alice = user(300);

    h.manager.store_user(alice.clone()).await.unwrap();
    assert_eq!(h.manager.get_user().await.unwrap(), Some(alice));
}

#[tokio::test]
async fn expired_users_are_refused_and_never_returned() {
    let h = harness().await;
    let mut expired = user(300);
    expired.expires_at = Expiry(1);

    assert!(matches!(
        h.manager.store_user(expired.clone()).await,
        Err(Error::Validation(_))
    ));

    let namespace = h.manager.config().storage_namespace();
    h.store.save(&namespace, expired.to_record().unwrap()).await.unwrap();
    assert_eq!(h.manager.get_user().await.unwrap(), None);
    assert!(h.store.load(&namespace).await.unwrap().is_some());
}

#[tokio::test]
async fn unreadable_record_is_treated_as_absent() {
    let h = harness().await;
    let namespace = h.manager.config().storage_namespace();
    h.store.save(&namespace, "{not json".into()).await.unwrap();

    assert_eq!(h.manager.get_user().await.unwrap(), None);
    assert!(h.store.load(&namespace).await.unwrap().is_none());
}

#[tokio::test]
async fn remove_user_is_idempotent() {
    let h = harness().await;
    let mut events = h.manager.subscribe();
    h.manager.store_user(user(300)).await.unwrap();

    h.manager.remove_user().await.unwrap();
    h.manager.remove_user().await.unwrap();
    assert_eq!(h.manager.get_user().await.unwrap(), None);

    assert!(matches!(events.recv().await.unwrap(), UserManagerEvent::UserLoaded(_)));
    assert_eq!(events.recv().await.unwrap(), UserManagerEvent::UserUnloaded);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn persisted_user_survives_a_new_manager() {
    let dir = tempfile::tempdir().unwrap();
    let alice = user(300);

    for round in 0..2 {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let runtime = Runtime::new(Arc::new(FakeNavigator::default())).with_user_store(store);
        let manager = UserManager::initialize(config().with_automatic_silent_renew(false), runtime)
            .await
            .unwrap();
        if round == 0 {
            manager.store_user(alice.clone()).await.unwrap();
        } else {
            assert_eq!(manager.get_user().await.unwrap(), Some(alice.clone()));
        }
    }
}

#[tokio::test]
async fn popup_sign_in_resolves_to_the_exchanged_user() {
    let h = harness().await;
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in_popup().await });

    let (mechanism, opened) = h.navigator.opened().await;
    assert_eq!(mechanism, Mechanism::Popup);
    assert!(opened.as_str().starts_with("https://idp.example/authorize?"));
    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    h.provider.respond(Ok(token_response(Some(&nonce), "at-1")));

    let url = callback("https://app/cb", &format!("state={}&code=abc", state));
    let from_callback = h.manager.sign_in_popup_callback(Some(&url)).await.unwrap();
    let from_opener = pending.await.unwrap().unwrap();

    assert_eq!(from_callback, from_opener);
    assert_eq!(from_opener.subject, "alice");
    assert_eq!(from_opener.access_token.as_deref(), Some("at-1"));
    assert!(!from_opener.is_expired());
    assert_eq!(from_opener.profile["email"], "alice@example.com");
    assert_eq!(h.manager.get_user().await.unwrap(), Some(from_opener));
    assert_eq!(h.navigator.popups_closed(), 1);

    match &h.provider.exchanges()[0] {
        TokenRequest::AuthorizationCode(req) => {
            assert_eq!(req.code, "abc");
            assert_eq!(req.redirect_uri.as_str(), "https://app/cb");
            assert!(req.code_verifier.is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn cancelled_popup_sign_in_frees_the_popup() {
    let h = harness().await;
    let manager = h.manager.clone();
    let first = tokio::spawn(async move { manager.sign_in_popup().await });
    let (_, opened) = h.navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    // The abandoned window can still finish its sign-in.
    let nonce = query_param(&opened, "nonce").unwrap();
    h.provider.respond(Ok(token_response(Some(&nonce), "at-1")));
    let url = callback("https://app/cb", &format!("state={}&code=abc", state));
    h.manager.sign_in_popup_callback(Some(&url)).await.unwrap();

    let manager = h.manager.clone();
    let _second = tokio::spawn(async move { manager.sign_in_popup().await });
    let (mechanism, _) = h.navigator.opened().await;
    assert_eq!(mechanism, Mechanism::Popup);
    assert!(matches!(h.manager.sign_in_popup().await, Err(Error::ConcurrentFlow)));
}

#[tokio::test]
async fn second_popup_is_rejected_while_one_is_pending() {
    let h = harness().await;
    let manager = h.manager.clone();
    let _first = tokio::spawn(async move { manager.sign_in_popup().await });
    h.navigator.opened().await;

    assert!(matches!(h.manager.sign_in_popup().await, Err(Error::ConcurrentFlow)));
}

#[tokio::test]
async fn popup_error_reaches_callback_and_opener() {
    let h = harness().await;
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in_popup().await });
    let (_, opened) = h.navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();

    let url = callback("https://app/cb", &format!("state={}&error=access_denied", state));
    let err = h.manager.sign_in_popup_callback(Some(&url)).await.unwrap_err();
    assert!(matches!(&err, Error::Authorization(e) if e.kind == AuthorizationErrorKind::AccessDenied));
    assert_eq!(pending.await.unwrap().unwrap_err(), err);
    assert_eq!(h.manager.get_user().await.unwrap(), None);
}

#[tokio::test]
async fn closing_the_popup_fails_the_sign_in() {
    let h = harness().await;
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in_popup().await });
    h.navigator.opened().await;
    h.navigator.close_popups();

    assert_eq!(pending.await.unwrap().unwrap_err(), Error::PopupClosed);
}

#[tokio::test]
async fn mismatched_nonce_stores_nothing() {
    let h = harness().await;
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in_popup().await });
    let (_, opened) = h.navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();
    h.provider.respond(Ok(token_response(Some("replayed"), "at-1")));

    let url = callback("https://app/cb", &format!("state={}&code=abc", state));
    assert!(matches!(
        h.manager.sign_in_popup_callback(Some(&url)).await,
        Err(Error::TokenValidation(_))
    ));
    assert!(matches!(pending.await.unwrap(), Err(Error::TokenValidation(_))));
    assert_eq!(h.manager.get_user().await.unwrap(), None);
}

#[tokio::test]
async fn silent_sign_in_uses_a_prompt_less_frame() {
    let h = harness().await;
    h.manager.store_user(user(300)).await.unwrap();
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_in_silent().await });

    let (mechanism, opened) = h.navigator.opened().await;
    assert_eq!(mechanism, Mechanism::Iframe);
    assert_eq!(query_param(&opened, "prompt").as_deref(), Some("none"));
    assert_eq!(query_param(&opened, "redirect_uri").as_deref(), Some("https://app/silent"));
    assert!(query_param(&opened, "id_token_hint").is_some());

    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    h.provider.respond(Ok(token_response(Some(&nonce), "at-2")));
    let url = callback("https://app/silent", &format!("state={}&code=xyz", state));
    h.manager.sign_in_silent_callback(Some(&url)).await.unwrap();

    let renewed = pending.await.unwrap().unwrap();
    assert_eq!(renewed.access_token.as_deref(), Some("at-2"));
    assert_eq!(h.navigator.frames_removed(), 1);
}

#[tokio::test]
async fn silent_sign_in_prefers_the_refresh_token() {
    let h = harness().await;
    let mut alice = user(300);
    alice.refresh_token = Some("rt-1".into());
    h.manager.store_user(alice.clone()).await.unwrap();

    let mut refreshed = token_response(None, "at-3");
    refreshed.id_token = None;
    h.provider.respond(Ok(refreshed));

    let renewed = h.manager.sign_in_silent().await.unwrap();
    assert_eq!(renewed.access_token.as_deref(), Some("at-3"));
    assert_eq!(renewed.id_token, alice.id_token);
    assert_eq!(renewed.refresh_token.as_deref(), Some("rt-1"));
    assert!(h.navigator.frame_attempts().is_empty());
    assert!(matches!(&h.provider.exchanges()[0], TokenRequest::RefreshToken(req) if req.refresh_token == "rt-1"));
}

#[tokio::test]
async fn redirect_sign_in_completes_from_the_current_location() {
    let h = harness().await;
    h.manager.sign_in_redirect().await.unwrap();

    let (mechanism, opened) = h.navigator.opened().await;
    assert_eq!(mechanism, Mechanism::Redirect);
    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    h.provider.respond(Ok(token_response(Some(&nonce), "at-1")));

    h.navigator
        .set_location(callback("https://app/cb", &format!("state={}&code=abc", state)));
    let signed_in = h.manager.sign_in_redirect_callback(None).await.unwrap();
    assert_eq!(h.manager.get_user().await.unwrap(), Some(signed_in));

    let replay = h.manager.sign_in_redirect_callback(None).await.unwrap_err();
    assert!(replay.is_callback_mismatch());
}

#[tokio::test]
async fn implicit_redirect_reads_tokens_from_the_fragment() {
    let h = harness_with(
        config()
            .with_automatic_silent_renew(false)
            .with_response_type(ResponseType::IdTokenToken),
    )
    .await;
    h.manager.sign_in_redirect().await.unwrap();
    let (_, opened) = h.navigator.opened().await;
    assert_eq!(query_param(&opened, "response_type").as_deref(), Some("id_token token"));
    assert!(query_param(&opened, "code_challenge").is_none());

    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    let id_token = sign(&claims(Some(&nonce), 300));
    let url: Url = format!(
        "https://app/cb#state={}&id_token={}&access_token=at-i&token_type=Bearer&expires_in=300",
        state, id_token
    )
    .parse()
    .unwrap();

    let signed_in = h.manager.sign_in_redirect_callback(Some(&url)).await.unwrap();
    assert_eq!(signed_in.access_token.as_deref(), Some("at-i"));
    assert!(h.provider.exchanges().is_empty());
}

#[tokio::test]
async fn user_info_is_merged_when_enabled() {
    let h = harness_with(
        config()
            .with_automatic_silent_renew(false)
            .with_load_user_info(true),
    )
    .await;
    let info = json!({"sub": "alice", "nickname": "al"});
    h.provider.set_user_info(info.as_object().unwrap().clone());

    h.manager.sign_in_redirect().await.unwrap();
    let (_, opened) = h.navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    h.provider.respond(Ok(token_response(Some(&nonce), "at-1")));

    let url = callback("https://app/cb", &format!("state={}&code=abc", state));
    let signed_in = h.manager.sign_in_redirect_callback(Some(&url)).await.unwrap();
    assert_eq!(signed_in.profile["nickname"], "al");
    assert_eq!(signed_in.profile["email"], "alice@example.com");
}

#[tokio::test]
async fn popup_sign_out_can_keep_the_window_open() {
    let h = harness().await;
    let alice = user(300);
    h.manager.store_user(alice.clone()).await.unwrap();
    let mut events = h.manager.subscribe();

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.sign_out_popup().await });
    let (_, opened) = h.navigator.opened().await;
    assert!(opened.as_str().starts_with("https://idp.example/endsession?"));
    assert_eq!(query_param(&opened, "id_token_hint"), Some(alice.id_token));
    assert_eq!(
        query_param(&opened, "post_logout_redirect_uri").as_deref(),
        Some("https://app/popup-signed-out")
    );

    let state = query_param(&opened, "state").unwrap();
    let url = callback("https://app/popup-signed-out", &format!("state={}", state));
    h.manager.sign_out_popup_callback(true, Some(&url)).await.unwrap();
    pending.await.unwrap().unwrap();

    assert_eq!(h.navigator.popups_closed(), 0);
    assert_eq!(h.manager.get_user().await.unwrap(), None);
    assert_eq!(events.recv().await.unwrap(), UserManagerEvent::UserUnloaded);
    assert_eq!(events.recv().await.unwrap(), UserManagerEvent::UserSignedOut);
}

#[tokio::test]
async fn redirect_sign_out_removes_the_user_before_navigating_back() {
    let h = harness().await;
    h.manager.store_user(user(300)).await.unwrap();

    h.manager.sign_out_redirect().await.unwrap();
    assert_eq!(h.manager.get_user().await.unwrap(), None);

    let (mechanism, opened) = h.navigator.opened().await;
    assert_eq!(mechanism, Mechanism::Redirect);
    let state = query_param(&opened, "state").unwrap();
    let url = callback("https://app/signed-out", &format!("state={}", state));

    // Sign-out callbacks are not accepted by the sign-in entry point.
    assert!(h.manager.sign_in_redirect_callback(Some(&url)).await.unwrap_err().is_callback_mismatch());
    h.manager.sign_out_redirect_callback(Some(&url)).await.unwrap();
}

#[tokio::test]
async fn session_status_reports_an_active_session() {
    let h = harness().await;
    let alice = user(300);
    h.manager.store_user(alice.clone()).await.unwrap();

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.query_session_status().await });
    let (_, opened) = h.navigator.opened().await;
    assert_eq!(query_param(&opened, "prompt").as_deref(), Some("none"));
    assert!(query_param(&opened, "code_challenge").is_none());

    let state = query_param(&opened, "state").unwrap();
    let url = callback("https://app/silent", &format!("state={}&code=unused&session_state=ss-1", state));
    h.manager.sign_in_silent_callback(Some(&url)).await.unwrap();

    let status = pending.await.unwrap().unwrap();
    assert!(status.active);
    assert_eq!(status.session_state.as_deref(), Some("ss-1"));
    assert!(h.provider.exchanges().is_empty());
    assert_eq!(h.manager.get_user().await.unwrap(), Some(alice));
}

#[tokio::test]
async fn session_status_is_inactive_when_login_is_required() {
    let h = harness().await;
    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.query_session_status().await });
    let (_, opened) = h.navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();

    let url = callback("https://app/silent", &format!("state={}&error=login_required", state));
    assert!(h.manager.sign_in_silent_callback(Some(&url)).await.is_err());
    assert_eq!(pending.await.unwrap().unwrap(), SessionStatus::inactive());
}

#[tokio::test(start_paused = true)]
async fn session_status_times_out() {
    let h = harness().await;
    let err = h.manager.query_session_status().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(h.manager.clear_stale_state().await, 0);
}

#[tokio::test]
async fn revocation_clears_only_the_access_token() {
    let h = harness().await;
    assert!(!h.manager.revoke_access_token().await.unwrap());

    let alice = user(300);
    h.manager.store_user(alice.clone()).await.unwrap();
    assert!(h.manager.revoke_access_token().await.unwrap());

    let revoked = h.manager.get_user().await.unwrap().unwrap();
    assert_eq!(revoked.access_token, None);
    assert_eq!(revoked.id_token, alice.id_token);
    assert_eq!(h.provider.revocations()[0].token, "at-0");

    assert!(!h.manager.revoke_access_token().await.unwrap());
}

#[tokio::test]
async fn revocation_is_skipped_when_discovery_fails() {
    let mut unconfigured = config().with_automatic_silent_renew(false);
    unconfigured.metadata = None;
    let h = harness_with(unconfigured).await;
    h.manager.store_user(user(300)).await.unwrap();
    h.provider.fail_discovery(Error::Network("connection refused".into()));

    assert!(!h.manager.revoke_access_token().await.unwrap());
    assert!(h.provider.revocations().is_empty());
    let kept = h.manager.get_user().await.unwrap().unwrap();
    assert_eq!(kept.access_token.as_deref(), Some("at-0"));
}

#[tokio::test]
async fn discovered_issuer_must_match_the_authority() {
    let mut unconfigured = config().with_automatic_silent_renew(false);
    unconfigured.metadata = None;
    unconfigured.authority = "https://idp.example/tenant".parse().unwrap();
    let h = harness_with(unconfigured).await;
    h.manager.sign_in_redirect().await.unwrap();
    let (_, opened) = h.navigator.opened().await;
    assert!(opened.as_str().starts_with("https://idp.example/tenant/authorize?"));

    let mut other = config().with_automatic_silent_renew(false);
    other.metadata = None;
    let navigator = Arc::new(FakeNavigator::default());
    let runtime = Runtime::new(navigator).with_provider(Arc::new(MisnamedIssuer));
    let manager = UserManager::initialize(other, runtime).await.unwrap();
    assert!(matches!(manager.sign_in_redirect().await, Err(Error::Configuration(_))));
}

/// Publishes metadata naming an issuer other than the authority it was fetched from.
struct MisnamedIssuer;

#[async_trait]
impl ProviderClient for MisnamedIssuer {
    async fn metadata(&self, _authority: &Url) -> Result<ProviderMetadata> {
        ProviderMetadata::derive_from_authority(&"https://elsewhere.example".parse().unwrap())
    }

    async fn exchange(&self, _: &Url, _: &TokenRequest) -> Result<AccessTokenResponse> {
        Err(Error::Network("unused".into()))
    }

    async fn user_info(&self, _: &Url, _: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
        Err(Error::Network("unused".into()))
    }

    async fn revoke(&self, _: &Url, _: &RevocationRequest) -> Result<()> {
        Err(Error::Network("unused".into()))
    }

    async fn jwks(&self, _: &Url) -> Result<jsonwebtoken::jwk::JwkSet> {
        Err(Error::Network("unused".into()))
    }
}

#[tokio::test]
async fn signed_tokens_are_checked_against_the_resolver_keys() {
    let navigator = Arc::new(FakeNavigator::default());
    let provider = Arc::new(FakeProvider::default());
    let resolver = StaticKeyResolver::new(jsonwebtoken::DecodingKey::from_secret(b"another-secret"));
    let runtime = Runtime::new(navigator.clone())
        .with_provider(provider.clone())
        .with_state_store(Arc::new(MemoryStore::new()))
        .with_key_resolver(Arc::new(resolver));
    let config = config()
        .with_automatic_silent_renew(false)
        .with_validate_signature(true);
    let manager = UserManager::initialize(config, runtime).await.unwrap();

    manager.sign_in_redirect().await.unwrap();
    let (_, opened) = navigator.opened().await;
    let state = query_param(&opened, "state").unwrap();
    let nonce = query_param(&opened, "nonce").unwrap();
    provider.respond(Ok(token_response(Some(&nonce), "at-1")));

    let url = callback("https://app/cb", &format!("state={}&code=abc", state));
    assert!(matches!(
        manager.sign_in_redirect_callback(Some(&url)).await,
        Err(Error::TokenValidation(_))
    ));
    assert_eq!(manager.get_user().await.unwrap(), None);
}

#[tokio::test]
async fn failed_revocation_keeps_the_access_token() {
    let h = harness().await;
    h.manager.store_user(user(300)).await.unwrap();
    h.provider.fail_revocation(Error::Network("connection reset".into()));

    assert!(!h.manager.revoke_access_token().await.unwrap());
    let kept = h.manager.get_user().await.unwrap().unwrap();
    assert_eq!(kept.access_token.as_deref(), Some("at-0"));
}

#[tokio::test]
async fn clear_stale_state_keeps_fresh_flows() {
    let h = harness().await;
    h.manager.sign_in_redirect().await.unwrap();
    assert_eq!(h.manager.clear_stale_state().await, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_renewal_retries_once_and_keeps_the_stale_user() {
    let h = harness_with(config().with_silent_renew_lead_time(Duration::from_secs(10))).await;
    h.navigator.fail_frames(true);
    let mut events = h.manager.subscribe();

    let start = Instant::now();
    let alice = user(60);
    h.manager.store_user(alice.clone()).await.unwrap();

    loop {
        match events.recv().await.unwrap() {
            UserManagerEvent::SilentRenewError(e) => {
                assert!(matches!(e, Error::Network(_)));
                break;
            }
            _ => continue,
        }
    }

    let attempts = h.navigator.frame_attempts();
    assert_eq!(attempts.len(), 2);
    let first = attempts[0] - start;
    assert!(first >= Duration::from_secs(49) && first <= Duration::from_millis(50_100), "{:?}", first);
    let retry = attempts[1] - attempts[0];
    assert!(retry >= Duration::from_secs(5) && retry < Duration::from_millis(5_010), "{:?}", retry);
    assert_eq!(h.manager.get_user().await.unwrap(), Some(alice));
}

#[tokio::test(start_paused = true)]
async fn successful_renewal_replaces_the_user() {
    let h = harness_with(config().with_silent_renew_lead_time(Duration::from_secs(10))).await;
    let mut events = h.manager.subscribe();
    let mut alice = user(60);
    alice.refresh_token = Some("rt-1".into());
    let mut refreshed = token_response(None, "at-renewed");
    refreshed.id_token = None;
    h.provider.respond(Ok(refreshed));

    h.manager.store_user(alice).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), UserManagerEvent::UserLoaded(_)));
    match events.recv().await.unwrap() {
        UserManagerEvent::UserLoaded(user) => assert_eq!(user.access_token.as_deref(), Some("at-renewed")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(h.manager.inner.renew.is_pending());
}

#[tokio::test(start_paused = true)]
async fn removed_user_stays_removed_when_a_renewal_finishes() {
    let h = harness_with(config().with_silent_renew_lead_time(Duration::from_secs(10))).await;
    let mut alice = user(60);
    alice.refresh_token = Some("rt-1".into());
    let mut refreshed = token_response(None, "at-renewed");
    refreshed.id_token = None;
    h.provider.respond(Ok(refreshed));
    let gate = h.provider.hold_exchanges();

    h.manager.store_user(alice).await.unwrap();
    h.provider.exchange_started().await;
    let mut events = h.manager.subscribe();

    h.manager.remove_user().await.unwrap();
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.manager.get_user().await.unwrap(), None);
    assert!(h.store.load(&h.manager.config().storage_namespace()).await.unwrap().is_none());
    assert_eq!(events.recv().await.unwrap(), UserManagerEvent::UserUnloaded);
    assert!(events.try_recv().is_err());
    assert_eq!(h.provider.exchanges().len(), 1);
    assert!(h.navigator.frame_attempts().is_empty());
    assert!(!h.manager.inner.renew.is_pending());
}

#[tokio::test(start_paused = true)]
async fn stopped_renewal_never_fires() {
    let h = harness_with(config().with_silent_renew_lead_time(Duration::from_secs(10))).await;
    h.manager.store_user(user(60)).await.unwrap();
    h.manager.stop_silent_renew().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.navigator.frame_attempts().is_empty());

    h.manager.start_silent_renew().await.unwrap();
    assert!(h.manager.inner.renew.is_pending());
}
