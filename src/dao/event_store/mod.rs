#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{EventEntity, ParticipantEntity, Revision, VersionedEvent};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the document store holding one document per event.
pub trait EventStore: Send + Sync {
    /// Fetch the event document and its version marker. `Ok(None)` when absent.
    fn load_event(&self, id: String) -> BoxFuture<'static, StorageResult<Option<VersionedEvent>>>;

    /// Create or replace the whole document, last writer wins.
    fn save_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Replace the document only if it is still at `expected`.
    ///
    /// With `expected == None` the write is unconditional. A lost race is
    /// reported as [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict),
    /// a missing document as `NotFound`.
    fn replace_event(
        &self,
        event: EventEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Participant records kept outside the event document, for backends that
    /// store them separately. Most backends keep them inline.
    fn load_detached_participants(
        &self,
        _event_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Whether `load_event` polling can stand in for change notifications.
    fn watchable(&self) -> bool {
        true
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
