use super::*;

fn authenticated_store() -> SessionStore {
    let store = SessionStore::new();
    store.authenticate("tok1", "42");
    store
}

// =============================================================================
// refresh
// =============================================================================

#[test]
fn begin_refresh_moves_authenticated_to_refreshing() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    assert!(store.begin_refresh(epoch));
    assert_eq!(store.snapshot().phase, Phase::Refreshing);
}

#[test]
fn begin_refresh_keeps_unknown_while_loading() {
    let store = SessionStore::new();
    assert!(store.begin_refresh(0));
    assert_eq!(store.snapshot().phase, Phase::Unknown);
}

#[test]
fn begin_refresh_rejects_stale_epoch() {
    let store = authenticated_store();
    let stale = store.snapshot().epoch;
    store.begin_logout();
    assert!(!store.begin_refresh(stale));
}

#[test]
fn apply_refresh_carries_user_forward() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    store.begin_refresh(epoch);
    assert!(store.apply_refresh(epoch, "tok2", None));
    let state = store.snapshot();
    assert_eq!(state.access_token.as_deref(), Some("tok2"));
    assert_eq!(state.user_id.as_deref(), Some("42"));
    assert_eq!(state.phase, Phase::Authenticated);
}

#[test]
fn apply_refresh_rejects_stale_epoch() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    store.begin_refresh(epoch);
    store.begin_logout();
    assert!(!store.apply_refresh(epoch, "tok2", Some("42")));
    assert!(store.snapshot().access_token.is_none());
}

#[test]
fn fail_refresh_clears_and_bumps_epoch() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    store.begin_refresh(epoch);
    assert!(store.fail_refresh(epoch));
    let state = store.snapshot();
    assert!(state.access_token.is_none());
    assert!(state.user_id.is_none());
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert_ne!(state.epoch, epoch);
}

#[test]
fn fail_refresh_with_stale_epoch_is_ignored() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    store.begin_refresh(epoch);
    store.authenticate("tok9", "7");
    assert!(!store.fail_refresh(epoch));
    assert_eq!(store.snapshot().access_token.as_deref(), Some("tok9"));
}

// =============================================================================
// replace_token
// =============================================================================

#[test]
fn replace_token_requires_a_session() {
    let store = SessionStore::new();
    let epoch = store.snapshot().epoch;
    assert!(!store.replace_token(epoch, "tok"));
    assert!(store.snapshot().access_token.is_none());
}

#[test]
fn replace_token_keeps_user() {
    let store = authenticated_store();
    let epoch = store.snapshot().epoch;
    assert!(store.replace_token(epoch, "tok2"));
    let state = store.snapshot();
    assert_eq!(state.access_token.as_deref(), Some("tok2"));
    assert_eq!(state.user_id.as_deref(), Some("42"));
}

#[test]
fn replace_token_refuses_a_newer_session() {
    let store = authenticated_store();
    let stale = store.snapshot().epoch;
    store.begin_logout();
    store.finish_logout();
    store.authenticate("bob-tok", "99");

    assert!(!store.replace_token(stale, "tok2"));
    let state = store.snapshot();
    assert_eq!(state.access_token.as_deref(), Some("bob-tok"));
    assert_eq!(state.user_id.as_deref(), Some("99"));
}

// =============================================================================
// logout
// =============================================================================

#[test]
fn logout_passes_through_logging_out() {
    let store = authenticated_store();
    let mut rx = store.subscribe();
    rx.borrow_and_update();
    store.begin_logout();
    assert_eq!(rx.borrow_and_update().phase, Phase::LoggingOut);
    store.finish_logout();
    assert_eq!(rx.borrow_and_update().phase, Phase::Unauthenticated);
}

#[test]
fn logout_while_loading_stays_unknown() {
    let store = SessionStore::new();
    store.begin_logout();
    store.finish_logout();
    assert!(store.snapshot().loading());
}

// =============================================================================
// resolve_loading
// =============================================================================

#[test]
fn resolve_loading_flips_once() {
    let store = SessionStore::new();
    assert!(store.resolve_loading(None));
    assert!(!store.resolve_loading(None));
    assert_eq!(store.snapshot().phase, Phase::Unauthenticated);
}

#[test]
fn resolve_loading_uses_user_hint_when_missing() {
    let store = SessionStore::new();
    let epoch = store.snapshot().epoch;
    store.begin_refresh(epoch);
    assert!(store.apply_refresh(epoch, "tok", None));
    assert!(store.resolve_loading(Some("42")));
    let state = store.snapshot();
    assert_eq!(state.phase, Phase::Authenticated);
    assert_eq!(state.user_id.as_deref(), Some("42"));
}
