use super::*;
use crate::api::RefreshGrant;
use crate::api::test_helpers::{ScriptedAuthApi, grant, refreshed, unauthorized};
use crate::cache::MemoryTokenCache;
use crate::state::Phase;
use std::sync::atomic::Ordering;
use tokio::sync::Notify;

fn controller(api: &Arc<ScriptedAuthApi>, cache: &Arc<MemoryTokenCache>) -> SessionController {
    SessionController::new(Arc::clone(api) as Arc<dyn AuthApi>, Arc::clone(cache) as Arc<dyn TokenCache>)
}

fn cached(token: &str, user_id: Option<&str>) -> Arc<MemoryTokenCache> {
    Arc::new(MemoryTokenCache::with_token(CachedToken {
        access_token: token.into(),
        user_id: user_id.map(ToOwned::to_owned),
    }))
}

fn alice() -> Credentials {
    Credentials { username: "alice".into(), password: "correcthorse".into() }
}

async fn wait_for_refresh_calls(api: &ScriptedAuthApi, n: usize) {
    while api.refreshes() < n {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// hydrate
// =============================================================================

#[tokio::test]
async fn hydrate_without_credential_skips_refresh() {
    let api = Arc::new(ScriptedAuthApi::new());
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    assert!(session.state().loading());

    let state = session.hydrate().await;
    assert!(!state.loading());
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert_eq!(api.refreshes(), 0);
}

#[tokio::test]
async fn hydrate_with_valid_credential_authenticates() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_refresh(Ok(refreshed("tok2")));
    let cache = cached("tok1", Some("42"));
    let session = controller(&api, &cache);

    let state = session.hydrate().await;
    assert_eq!(state.phase, Phase::Authenticated);
    assert_eq!(state.access_token.as_deref(), Some("tok2"));
    assert_eq!(state.user_id.as_deref(), Some("42"));
    assert_eq!(cache.load().unwrap().access_token, "tok2");
}

#[tokio::test]
async fn hydrate_with_expired_credential_lands_unauthenticated() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_refresh(Err(unauthorized()));
    let cache = cached("stale", Some("42"));
    let session = controller(&api, &cache);
    let mut nav = session.navigation();

    let state = session.hydrate().await;
    assert!(!state.loading());
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert!(state.access_token.is_none());
    assert!(cache.load().is_none());
    assert_eq!(nav.try_recv().unwrap(), Navigation::Landing);
}

#[tokio::test]
async fn hydrate_flips_loading_exactly_once() {
    for script in [None, Some(Ok(refreshed("tok"))), Some(Err(unauthorized()))] {
        let api = Arc::new(ScriptedAuthApi::new());
        let cache = match script {
            None => Arc::new(MemoryTokenCache::new()),
            Some(result) => {
                api.push_refresh(result);
                cached("tok0", Some("42"))
            }
        };
        let session = controller(&api, &cache);
        let mut rx = session.subscribe();
        let mut was_loading = rx.borrow_and_update().loading();
        assert!(was_loading);
        let watcher = tokio::spawn(async move {
            let mut flips = 0;
            while rx.changed().await.is_ok() {
                let loading = rx.borrow_and_update().loading();
                if was_loading && !loading {
                    flips += 1;
                }
                assert!(!(loading && !was_loading), "loading must never return to true");
                was_loading = loading;
            }
            flips
        });

        session.hydrate().await;
        session.hydrate().await;
        assert!(!session.state().loading());
        drop(session);
        assert_eq!(watcher.await.unwrap(), 1);
    }
}

// =============================================================================
// login / register
// =============================================================================

#[tokio::test]
async fn login_success_stores_session_and_signals_dashboard() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    let mut nav = session.navigation();

    let state = session.login(&alice()).await.unwrap();
    assert_eq!(state.access_token.as_deref(), Some("tok1"));
    assert_eq!(state.user_id.as_deref(), Some("42"));
    assert!(!state.loading());
    assert_eq!(nav.try_recv().unwrap(), Navigation::Dashboard);
    assert_eq!(cache.load().unwrap().user_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn login_failure_leaves_state_untouched() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Err(AuthError::Rejected { status: 401, detail: Some("Incorrect username or password".into()) }));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    let before = session.state();
    let mut nav = session.navigation();

    let err = session.login(&alice()).await.unwrap_err();
    assert_eq!(err.detail(), Some("Incorrect username or password"));
    assert_eq!(session.state(), before);
    assert!(nav.try_recv().is_err());
}

#[tokio::test]
async fn register_signs_in() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok-new", "7")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;

    let registration =
        Registration { username: "bob".into(), email: "bob@example.com".into(), password: "password123".into() };
    let state = session.register(&registration).await.unwrap();
    assert!(state.is_authenticated());
    assert_eq!(api.register_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// refresh
// =============================================================================

#[tokio::test]
async fn concurrent_refreshes_share_one_call() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedAuthApi::gated(Arc::clone(&gate)));
    api.push_login(Ok(grant("tok1", "42")));
    api.push_refresh(Ok(refreshed("tok2")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    let a = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    let b = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    wait_for_refresh_calls(&api, 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.state().phase, Phase::Refreshing);
    gate.notify_one();

    assert_eq!(a.await.unwrap().unwrap(), "tok2");
    assert_eq!(b.await.unwrap().unwrap(), "tok2");
    assert_eq!(api.refreshes(), 1);
    assert_eq!(session.state().phase, Phase::Authenticated);
}

#[tokio::test]
async fn refresh_without_user_id_carries_it_forward() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    api.push_refresh(Ok(refreshed("tok2")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    assert_eq!(session.refresh().await.unwrap(), "tok2");
    let state = session.state();
    assert_eq!(state.access_token.as_deref(), Some("tok2"));
    assert_eq!(state.user_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn refresh_failure_clears_and_signals_landing() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();
    let mut nav = session.navigation();

    assert!(session.refresh().await.is_err());
    let state = session.state();
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert!(state.access_token.is_none());
    assert!(state.user_id.is_none());
    assert!(cache.load().is_none());
    assert_eq!(nav.try_recv().unwrap(), Navigation::Landing);
}

#[tokio::test]
async fn logout_supersedes_inflight_refresh_success() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedAuthApi::gated(Arc::clone(&gate)));
    api.push_login(Ok(grant("tok1", "42")));
    api.push_refresh(Ok(RefreshGrant { access_token: "late".into(), user_id: Some("42".into()) }));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    wait_for_refresh_calls(&api, 1).await;

    session.logout().await;
    gate.notify_one();

    assert_eq!(pending.await.unwrap(), Err(AuthError::Superseded));
    let state = session.state();
    assert!(state.access_token.is_none());
    assert!(state.user_id.is_none());
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert!(cache.load().is_none());
}

#[tokio::test]
async fn logout_supersedes_inflight_refresh_failure() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedAuthApi::gated(Arc::clone(&gate)));
    api.push_login(Ok(grant("tok1", "42")));
    api.push_login(Ok(grant("tok9", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    wait_for_refresh_calls(&api, 1).await;

    session.logout().await;
    session.login(&alice()).await.unwrap();
    gate.notify_one();

    assert!(pending.await.unwrap().is_err());
    // The stale failure must not tear down the newer session.
    assert_eq!(session.state().access_token.as_deref(), Some("tok9"));
}

// =============================================================================
// update_access_token / logout
// =============================================================================

#[tokio::test]
async fn update_access_token_keeps_user_and_stays_quiet() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();
    let mut nav = session.navigation();

    let epoch = session.state().epoch();
    assert!(session.update_access_token(epoch, "tok3"));
    assert_eq!(session.state().user_id.as_deref(), Some("42"));
    assert_eq!(session.state().access_token.as_deref(), Some("tok3"));
    assert!(nav.try_recv().is_err());
}

#[tokio::test]
async fn update_access_token_without_session_is_refused() {
    let api = Arc::new(ScriptedAuthApi::new());
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    let epoch = session.state().epoch();
    assert!(!session.update_access_token(epoch, "tok3"));
    assert!(session.state().access_token.is_none());
}

#[tokio::test]
async fn update_access_token_from_an_ended_session_is_refused() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    api.push_login(Ok(grant("bob-tok", "99")));
    api.push_refresh(Ok(refreshed("tok2")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    let epoch = session.state().epoch();
    let token = session.refresh().await.unwrap();
    session.logout().await;
    session.login(&Credentials { username: "bob".into(), password: "hunter2hunter2".into() }).await.unwrap();

    assert!(!session.update_access_token(epoch, &token));
    let state = session.state();
    assert_eq!(state.access_token.as_deref(), Some("bob-tok"));
    assert_eq!(state.user_id.as_deref(), Some("99"));
    assert_eq!(cache.load().map(|c| c.access_token).as_deref(), Some("bob-tok"));
}

#[tokio::test]
async fn logout_clears_everything_and_revokes() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();
    let mut nav = session.navigation();

    session.logout().await;
    let state = session.state();
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert!(state.access_token.is_none());
    assert!(cache.load().is_none());
    assert_eq!(api.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(nav.try_recv().unwrap(), Navigation::Landing);

    // Refreshes work again once the logout finished.
    assert_ne!(session.refresh().await, Err(AuthError::LoggingOut));
}

#[tokio::test]
async fn guard_redirects_after_background_refresh_failure() {
    let api = Arc::new(ScriptedAuthApi::new());
    api.push_login(Ok(grant("tok1", "42")));
    let cache = Arc::new(MemoryTokenCache::new());
    let session = controller(&api, &cache);
    session.hydrate().await;
    session.login(&alice()).await.unwrap();

    let mut guard = session.guard();
    assert_eq!(guard.current(), crate::GuardDecision::Render);
    let _ = session.refresh().await;
    assert_eq!(guard.current(), crate::GuardDecision::Redirect("/login"));
}
