//! Persistence gateway: best-effort mirror of rooms into a document store.
//!
//! DESIGN
//! ======
//! One document per room: `{boardId, elements, updatedAt}`. `hydrate` reads
//! it into the room at join time; `checkpoint` spawns a detached task that
//! snapshots the room and upserts it. The live room is authoritative, so
//! neither operation ever reports failure to its caller: errors end as a
//! `warn!` line. With no store configured both are no-ops.
//!
//! ORDERING
//! ========
//! Detached checkpoints can finish out of order. The snapshot carries the
//! room's strictly increasing `updated_at` stamp, and the store ignores an
//! upsert older than what it already holds, so a slow early checkpoint can't
//! roll the document back past a later one.

#[cfg(test)]
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::element::Element;
use crate::services::room::{RoomSnapshot, RoomStore};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("document store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("document decode failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Durable copy of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
    pub board_id: String,
    pub elements: Vec<Element>,
    /// Stamp of the room state this document mirrors (ms since epoch).
    pub updated_at: i64,
}

impl From<RoomSnapshot> for RoomDocument {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self { board_id: snapshot.room_id, elements: snapshot.elements, updated_at: snapshot.updated_at }
    }
}

/// Opaque keyed document store.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document for `board_id`, if any.
    async fn fetch(&self, board_id: &str) -> Result<Option<RoomDocument>, PersistenceError>;

    /// Insert or replace the document for `doc.board_id`, unless the stored
    /// copy has a newer `updated_at`.
    async fn upsert(&self, doc: &RoomDocument) -> Result<(), PersistenceError>;
}

// =============================================================================
// POSTGRES STORE
// =============================================================================

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn fetch(&self, board_id: &str) -> Result<Option<RoomDocument>, PersistenceError> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            "SELECT elements, updated_at FROM room_documents WHERE board_id = $1",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((elements, updated_at)) = row else {
            return Ok(None);
        };
        let elements: Vec<Element> = serde_json::from_value(elements)?;
        Ok(Some(RoomDocument { board_id: board_id.to_string(), elements, updated_at }))
    }

    async fn upsert(&self, doc: &RoomDocument) -> Result<(), PersistenceError> {
        let elements = serde_json::to_value(&doc.elements)?;
        sqlx::query(
            "INSERT INTO room_documents (board_id, elements, updated_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (board_id) DO UPDATE SET \
                 elements = EXCLUDED.elements, updated_at = EXCLUDED.updated_at \
             WHERE room_documents.updated_at <= EXCLUDED.updated_at",
        )
        .bind(&doc.board_id)
        .bind(&elements)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Process-local store with the same upsert rule as Postgres.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, RoomDocument>>,
}

#[cfg(test)]
impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, board_id: &str) -> Option<RoomDocument> {
        self.docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(board_id)
            .cloned()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, board_id: &str) -> Result<Option<RoomDocument>, PersistenceError> {
        Ok(self.get(board_id))
    }

    async fn upsert(&self, doc: &RoomDocument) -> Result<(), PersistenceError> {
        let mut docs = self
            .docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let is_stale = docs
            .get(&doc.board_id)
            .is_some_and(|stored| stored.updated_at > doc.updated_at);
        if !is_stale {
            docs.insert(doc.board_id.clone(), doc.clone());
        }
        Ok(())
    }
}

// =============================================================================
// GATEWAY
// =============================================================================

#[derive(Clone)]
pub struct PersistenceGateway {
    rooms: RoomStore,
    store: Option<Arc<dyn DocumentStore>>,
}

impl PersistenceGateway {
    #[must_use]
    pub fn new(rooms: RoomStore, store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { rooms, store }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Load the persisted document into the room, if there is one.
    ///
    /// Skips the overwrite when the in-memory room changed after the
    /// document was written. Failures are logged and swallowed.
    pub async fn hydrate(&self, room_id: &str) {
        let Some(store) = &self.store else {
            return;
        };

        let doc = match store.fetch(room_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(%room_id, "no persisted document; keeping in-memory state");
                return;
            }
            Err(e) => {
                warn!(error = %e, %room_id, "room hydrate failed; keeping in-memory state");
                return;
            }
        };

        let room = self.rooms.get_or_create(room_id).await;
        let mut room = room.lock().await;
        if room.updated_at > doc.updated_at {
            debug!(%room_id, "in-memory room is newer than persisted document; skipping hydrate");
            return;
        }
        room.restore(doc.elements, doc.updated_at);
        info!(%room_id, count = room.elements.len(), "hydrated room from document store");
    }

    /// Spawn a detached upsert of the room's current state.
    ///
    /// Returns the task handle (for tests and shutdown), or `None` when no
    /// store is configured.
    pub fn checkpoint(&self, room_id: &str) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        let rooms = self.rooms.clone();
        let room_id = room_id.to_string();

        Some(tokio::spawn(async move {
            let Some(room) = rooms.get(&room_id).await else {
                return;
            };
            let doc = RoomDocument::from(room.lock().await.snapshot());
            if let Err(e) = store.upsert(&doc).await {
                warn!(error = %e, %room_id, "room checkpoint failed");
            }
        }))
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
