use super::*;
use crate::element::{Circle, Stroke};
use crate::frame::Data;
use tokio::time::{Duration, timeout};

fn fragment(id: &str, points: &[f64]) -> StrokeFragment {
    StrokeFragment { id: id.into(), color: "#000".into(), width: 2.0, points: points.to_vec() }
}

fn circle(id: &str) -> Element {
    Element::Circle(Circle {
        id: id.into(),
        x: 10.0,
        y: 10.0,
        radius: 5.0,
        stroke_color: "#000".into(),
        stroke_width: 1.0,
        fill_color: None,
    })
}

async fn assert_channel_has_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("channel closed")
}

async fn assert_channel_empty(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

// =============================================================================
// Room
// =============================================================================

#[test]
fn new_room_is_empty() {
    let room = Room::new("r");
    assert!(room.elements.is_empty());
    assert!(room.members.is_empty());
    assert_eq!(room.updated_at, 0);
}

#[test]
fn apply_bumps_stamp_strictly() {
    let mut room = Room::new("r");
    room.apply(Mutation::AppendElement(circle("c1")));
    let first = room.updated_at;
    room.apply(Mutation::AppendElement(circle("c2")));
    assert!(room.updated_at > first);
    assert!(first > 0);
}

#[test]
fn same_element_twice_yields_two_entries() {
    let mut room = Room::new("r");
    room.apply(Mutation::AppendElement(circle("c1")));
    room.apply(Mutation::AppendElement(circle("c1")));
    assert_eq!(room.elements.len(), 2);
    assert_eq!(room.elements[0], room.elements[1]);
}

#[test]
fn replace_all_swaps_collection() {
    let mut room = Room::new("r");
    room.apply(Mutation::AppendElement(circle("c1")));
    room.replace_all(Vec::new());
    assert!(room.elements.is_empty());
}

#[tokio::test]
async fn broadcast_sends_to_all_except_excluded_member() {
    let mut room = Room::new("r");
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (tx_c, mut rx_c) = mpsc::channel(8);
    room.members.insert(a, tx_a);
    room.members.insert(b, tx_b);
    room.members.insert(c, tx_c);

    let frame = Frame::request("draw:element", Data::new()).with_room_id("r");
    let delivered = room.broadcast(&frame, Some(b));

    assert_eq!(delivered, 2);
    assert_eq!(assert_channel_has_frame(&mut rx_a).await.syscall, "draw:element");
    assert_eq!(assert_channel_has_frame(&mut rx_c).await.syscall, "draw:element");
    assert_channel_empty(&mut rx_b).await;
}

#[tokio::test]
async fn broadcast_skips_full_channel() {
    let mut room = Room::new("r");
    let (tx, _rx) = mpsc::channel(1);
    room.members.insert(Uuid::new_v4(), tx);

    let frame = Frame::request("cursor:move", Data::new());
    assert_eq!(room.broadcast(&frame, None), 1);
    assert_eq!(room.broadcast(&frame, None), 0);
}

// =============================================================================
// RoomStore
// =============================================================================

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let store = RoomStore::new();
    let first = store.get_or_create("room_a").await;
    let second = store.get_or_create("room_a").await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.room_count().await, 1);
}

#[tokio::test]
async fn concurrent_get_or_create_yields_single_room() {
    let store = RoomStore::new();
    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.get_or_create("shared").await }));
    }
    let mut rooms = Vec::new();
    for h in handles {
        rooms.push(h.await.expect("task should not panic"));
    }
    assert!(rooms.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(store.room_count().await, 1);
}

#[tokio::test]
async fn apply_merges_strokes_by_id() {
    let store = RoomStore::new();
    store.apply("r", Mutation::AppendStroke(fragment("s1", &[0.0, 0.0])), None).await;
    store.apply("r", Mutation::AppendStroke(fragment("s1", &[1.0, 1.0])), None).await;

    let snap = store.snapshot("r").await;

    assert_eq!(snap.elements.len(), 1);
    assert_eq!(
        snap.elements[0],
        Element::Stroke(Stroke { id: "s1".into(), color: "#000".into(), width: 2.0, points: vec![0.0, 0.0, 1.0, 1.0] })
    );
}

#[tokio::test]
async fn concurrent_fragments_for_one_stroke_never_lose_points() {
    let store = RoomStore::new();
    let mut handles = Vec::new();
    for i in 0..50_i32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let p = f64::from(i);
            store.apply("r", Mutation::AppendStroke(fragment("s1", &[p, p])), None).await;
        }));
    }
    for h in handles {
        h.await.expect("task should not panic");
    }

    let snap = store.snapshot("r").await;
    let Element::Stroke(stroke) = &snap.elements[0] else {
        panic!("expected stroke");
    };
    assert_eq!(snap.elements.len(), 1);
    assert_eq!(stroke.points.len(), 100);
}

#[tokio::test]
async fn apply_fans_out_inside_boundary() {
    let store = RoomStore::new();
    let sender = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let (tx_sender, mut rx_sender) = mpsc::channel(8);
    let (tx_peer, mut rx_peer) = mpsc::channel(8);
    {
        let room = store.get_or_create("r").await;
        let mut room = room.lock().await;
        room.members.insert(sender, tx_sender);
        room.members.insert(peer, tx_peer);
    }

    let frame = Frame::request("draw:element", Data::new()).with_room_id("r");
    store
        .apply("r", Mutation::AppendElement(circle("c1")), Some((&frame, Some(sender))))
        .await;

    assert_eq!(assert_channel_has_frame(&mut rx_peer).await.syscall, "draw:element");
    assert_channel_empty(&mut rx_sender).await;
}

#[tokio::test]
async fn replace_all_only_touches_its_room() {
    let store = RoomStore::new();
    store.apply("a", Mutation::AppendElement(circle("c1")), None).await;
    store.apply("b", Mutation::AppendElement(circle("c2")), None).await;

    store.replace_all("a", Vec::new(), None).await;

    assert!(store.snapshot("a").await.elements.is_empty());
    assert_eq!(store.snapshot("b").await.elements.len(), 1);
}

#[tokio::test]
async fn room_ids_lists_every_room() {
    let store = RoomStore::new();
    store.get_or_create("a").await;
    store.get_or_create("b").await;
    let mut ids = store.room_ids().await;
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(store.get("c").await.is_none());
}
