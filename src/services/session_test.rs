use super::*;
use crate::element::{Rect, StrokeFragment};
use crate::services::persistence::{DocumentStore, RoomDocument};
use crate::services::room::Mutation;
use crate::state::test_helpers;

fn rect(id: &str) -> Element {
    Element::Rect(Rect {
        id: id.into(),
        x: 0.0,
        y: 0.0,
        width: 10.0,
        height: 10.0,
        stroke_color: "#111".into(),
        stroke_width: 2.0,
        fill_color: None,
    })
}

// =============================================================================
// create_room
// =============================================================================

#[tokio::test]
async fn create_room_allocates_room_and_issues_code() {
    let state = test_helpers::test_app_state();

    let created = create_room(&state).await;

    assert!(state.rooms.get(&created.room_id).await.is_some());
    assert_eq!(created.issued.code.len(), 6);
    assert!(created.issued.code.chars().all(|c| c.is_ascii_digit()));
    let grant = state.codes.resolve(&created.issued.code).unwrap();
    assert_eq!(grant.room_id, created.room_id);
}

#[tokio::test]
async fn create_room_twice_gives_distinct_rooms_and_codes() {
    let state = test_helpers::test_app_state();

    let a = create_room(&state).await;
    let b = create_room(&state).await;

    assert_ne!(a.room_id, b.room_id);
    assert_ne!(a.issued.code, b.issued.code);
    assert_eq!(state.rooms.room_count().await, 2);
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn create_room_future_is_send() {
    let state = test_helpers::test_app_state();
    let fut = create_room(&state);
    assert_send(&fut);
}

#[test]
fn generated_room_id_shape() {
    let id = generate_room_id();
    let parts: Vec<&str> = id.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "room");
    assert!(!parts[1].is_empty());
    assert_eq!(parts[2].len(), 6);
    assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
}

#[test]
fn base36_encoding() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "z");
    assert_eq!(to_base36(36), "10");
    assert_eq!(to_base36(1_295), "zz");
}

// =============================================================================
// join
// =============================================================================

#[tokio::test]
async fn join_with_valid_code_binds_and_returns_snapshot() {
    let state = test_helpers::test_app_state();
    let created = create_room(&state).await;
    state.rooms.apply(&created.room_id, Mutation::AppendElement(rect("r1")), None).await;
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    let joined = join(&state, client_id, &created.issued.code).await.unwrap();

    assert_eq!(joined.room_id, created.room_id);
    assert_eq!(joined.expires_at, created.issued.expires_at);
    assert_eq!(joined.elements, vec![rect("r1")]);
    assert_eq!(state.sessions.room_of(client_id).await.as_deref(), Some(created.room_id.as_str()));

    let room = state.rooms.get(&created.room_id).await.unwrap();
    assert!(room.lock().await.members.contains_key(&client_id));
}

#[tokio::test]
async fn join_with_unknown_code_leaves_connection_unbound() {
    let state = test_helpers::test_app_state();
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    let err = join(&state, client_id, "000000").await.unwrap_err();

    assert_eq!(err, SessionError::InvalidOrExpiredCode);
    assert_eq!(err.to_string(), "Invalid or expired code");
    assert!(state.sessions.room_of(client_id).await.is_none());
}

#[tokio::test]
async fn join_with_expired_code_fails() {
    let state = test_helpers::test_app_state();
    let issued = state.codes.issue_at("room_x", now_ms() - 700_000);
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    let err = join(&state, client_id, &issued.code).await.unwrap_err();
    assert_eq!(err, SessionError::InvalidOrExpiredCode);
}

#[tokio::test]
async fn join_from_unregistered_connection_fails_generically() {
    let state = test_helpers::test_app_state();
    let created = create_room(&state).await;

    let err = join(&state, Uuid::new_v4(), &created.issued.code).await.unwrap_err();

    assert_eq!(err, SessionError::JoinFailed);
    assert_eq!(err.to_string(), "Join failed");
}

#[tokio::test]
async fn rejoin_moves_connection_to_new_room() {
    let state = test_helpers::test_app_state();
    let first = create_room(&state).await;
    let second = create_room(&state).await;
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    join(&state, client_id, &first.issued.code).await.unwrap();
    join(&state, client_id, &second.issued.code).await.unwrap();

    assert_eq!(state.sessions.room_of(client_id).await.as_deref(), Some(second.room_id.as_str()));
    let old = state.rooms.get(&first.room_id).await.unwrap();
    assert!(!old.lock().await.members.contains_key(&client_id));
    let new = state.rooms.get(&second.room_id).await.unwrap();
    assert!(new.lock().await.members.contains_key(&client_id));
}

#[tokio::test]
async fn code_is_reusable_by_many_participants() {
    let state = test_helpers::test_app_state();
    let created = create_room(&state).await;
    let (a, _tx_a, _rx_a) = test_helpers::connect_client(&state).await;
    let (b, _tx_b, _rx_b) = test_helpers::connect_client(&state).await;

    join(&state, a, &created.issued.code).await.unwrap();
    join(&state, b, &created.issued.code).await.unwrap();

    let room = state.rooms.get(&created.room_id).await.unwrap();
    assert_eq!(room.lock().await.members.len(), 2);
}

#[tokio::test]
async fn join_hydrates_room_from_document_store() {
    let (state, store) = test_helpers::test_app_state_with_store();
    let issued = state.codes.issue("persisted");
    let doc = RoomDocument { board_id: "persisted".into(), elements: vec![rect("saved")], updated_at: 42 };
    store.upsert(&doc).await.unwrap();
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    let joined = join(&state, client_id, &issued.code).await.unwrap();

    assert_eq!(joined.elements, vec![rect("saved")]);
}

// =============================================================================
// release
// =============================================================================

#[tokio::test]
async fn release_removes_membership_and_binding() {
    let state = test_helpers::test_app_state();
    let created = create_room(&state).await;
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;
    join(&state, client_id, &created.issued.code).await.unwrap();

    release(&state, client_id).await;

    assert!(state.sessions.room_of(client_id).await.is_none());
    assert_eq!(state.sessions.connection_count().await, 0);
    let room = state.rooms.get(&created.room_id).await.unwrap();
    let room = room.lock().await;
    assert!(room.members.is_empty());
}

#[tokio::test]
async fn release_keeps_room_elements() {
    let state = test_helpers::test_app_state();
    let created = create_room(&state).await;
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;
    join(&state, client_id, &created.issued.code).await.unwrap();
    let fragment = StrokeFragment { id: "s1".into(), color: "#000".into(), width: 1.0, points: vec![1.0, 2.0] };
    state.rooms.apply(&created.room_id, Mutation::AppendStroke(fragment), None).await;

    release(&state, client_id).await;

    assert_eq!(state.rooms.snapshot(&created.room_id).await.elements.len(), 1);
}

#[tokio::test]
async fn release_of_unjoined_connection_is_noop() {
    let state = test_helpers::test_app_state();
    let (client_id, _tx, _rx) = test_helpers::connect_client(&state).await;

    release(&state, client_id).await;
    release(&state, client_id).await;

    assert_eq!(state.sessions.connection_count().await, 0);
}

// =============================================================================
// room_elements
// =============================================================================

#[tokio::test]
async fn room_elements_of_unknown_room_is_empty() {
    let state = test_helpers::test_app_state();
    assert!(room_elements(&state, "nobody-here").await.is_empty());
}

#[tokio::test]
async fn room_elements_reads_through_document_store() {
    let (state, store) = test_helpers::test_app_state_with_store();
    let doc = RoomDocument { board_id: "default".into(), elements: vec![rect("a"), rect("b")], updated_at: 9 };
    store.upsert(&doc).await.unwrap();

    let elements = room_elements(&state, "default").await;

    assert_eq!(elements, vec![rect("a"), rect("b")]);
}
