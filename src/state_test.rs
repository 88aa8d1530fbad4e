use super::*;

#[test]
fn new_state_starts_empty() {
    let state = test_helpers::test_app_state();
    assert_eq!(state.codes.active_count(), 0);
    assert!(!state.persistence.is_enabled());
    assert_eq!(state.config.reset_token, test_helpers::TEST_RESET_TOKEN);
}

#[tokio::test]
async fn clones_share_the_same_stores() {
    let state = test_helpers::test_app_state();
    let other = state.clone();

    other.rooms.get_or_create("shared").await;
    let issued = other.codes.issue("shared");

    assert_eq!(state.rooms.room_count().await, 1);
    assert_eq!(state.codes.resolve(&issued.code).unwrap().room_id, "shared");
}

#[tokio::test]
async fn store_backed_state_enables_persistence() {
    let (state, _store) = test_helpers::test_app_state_with_store();
    assert!(state.persistence.is_enabled());
}
