//! Room store: authoritative per-room element state.
//!
//! DESIGN
//! ======
//! The store is a map of room id to `Arc<Mutex<Room>>`. The outer `RwLock`
//! only guards membership of the map (get-or-create); each room's own
//! mutex is its apply boundary. Mutation and fan-out for a room happen under
//! that one lock, so every member observes mutations in the order the room
//! applied them, and two fragments for the same stroke can never interleave
//! their read-modify-write of the points.
//!
//! No storage or network I/O happens here. Fan-out is a non-blocking
//! `try_send` into each member's outbound channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::element::{Element, StrokeFragment, merge_stroke};
use crate::frame::{Frame, now_ms};

pub type RoomHandle = Arc<Mutex<Room>>;

// =============================================================================
// ROOM
// =============================================================================

/// One isolated workspace: ordered elements plus the live members that
/// receive its fan-out.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    /// Render order; later elements draw on top.
    pub elements: Vec<Element>,
    /// Connected members: `client_id` -> sender for outgoing frames.
    pub members: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Stamp (ms since epoch) of the last change to `elements`. Strictly
    /// increasing; 0 for a room that has never changed.
    pub updated_at: i64,
}

/// A change to a room's element collection.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Create a stroke or extend an existing one.
    AppendStroke(StrokeFragment),
    /// Insert a new element. Never merges by id.
    AppendElement(Element),
}

/// Point-in-time copy of a room's elements and their stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub elements: Vec<Element>,
    pub updated_at: i64,
}

impl Room {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), elements: Vec::new(), members: HashMap::new(), updated_at: 0 }
    }

    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::AppendStroke(fragment) => {
                merge_stroke(&mut self.elements, fragment);
            }
            Mutation::AppendElement(element) => self.elements.push(element),
        }
        self.touch();
    }

    /// Swap in a whole element collection (reset, hydration).
    pub fn replace_all(&mut self, elements: Vec<Element>) {
        self.elements = elements;
        self.touch();
    }

    /// Adopt a persisted collection along with the stamp it was written at.
    pub fn restore(&mut self, elements: Vec<Element>, updated_at: i64) {
        self.elements = elements;
        self.updated_at = updated_at;
    }

    /// Send `frame` to every member except `exclude`.
    ///
    /// Best-effort: a member whose channel is full or closed misses this frame.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<Uuid>) -> usize {
        let mut delivered = 0;
        for (client_id, tx) in &self.members {
            if exclude == Some(*client_id) {
                continue;
            }
            if tx.try_send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(room_id = %self.id, %client_id, syscall = %frame.syscall, "fan-out dropped frame");
            }
        }
        delivered
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot { room_id: self.id.clone(), elements: self.elements.clone(), updated_at: self.updated_at }
    }

    fn touch(&mut self) {
        self.updated_at = now_ms().max(self.updated_at + 1);
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone, Default)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
}

impl RoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room for `room_id`, allocating an empty one if needed.
    ///
    /// Concurrent callers for the same id always get the same handle.
    pub async fn get_or_create(&self, room_id: &str) -> RoomHandle {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id))))
            .clone()
    }

    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Replace a room's element collection wholesale, fanning `fanout` out
    /// inside the same boundary.
    pub async fn replace_all(
        &self,
        room_id: &str,
        elements: Vec<Element>,
        fanout: Option<(&Frame, Option<Uuid>)>,
    ) {
        let room = self.get_or_create(room_id).await;
        let mut room = room.lock().await;
        room.replace_all(elements);
        if let Some((frame, exclude)) = fanout {
            room.broadcast(frame, exclude);
        }
    }

    /// Apply one mutation under the room's boundary, fanning `fanout` out to
    /// the members inside the same boundary.
    pub async fn apply(&self, room_id: &str, mutation: Mutation, fanout: Option<(&Frame, Option<Uuid>)>) {
        let room = self.get_or_create(room_id).await;
        let mut room = room.lock().await;
        room.apply(mutation);
        if let Some((frame, exclude)) = fanout {
            room.broadcast(frame, exclude);
        }
    }

    pub async fn snapshot(&self, room_id: &str) -> RoomSnapshot {
        let room = self.get_or_create(room_id).await;
        room.lock().await.snapshot()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
