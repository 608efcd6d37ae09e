use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoEventDocument, doc_id, doc_id_at_revision},
};
use crate::dao::{
    event_store::EventStore,
    models::{EventEntity, Revision, VersionedEvent},
    storage::StorageResult,
};

const EVENT_COLLECTION_NAME: &str = "events";

/// MongoDB-backed [`EventStore`] using a `revision` counter as version marker.
#[derive(Clone)]
pub struct MongoEventStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept alive alongside the database handle so reconnects swap both.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoEventStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoEventDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEventDocument>(EVENT_COLLECTION_NAME)
    }

    async fn find_event(&self, id: &str) -> MongoResult<Option<VersionedEvent>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadEvent {
                id: id.to_owned(),
                source,
            })?;

        Ok(document.map(MongoEventDocument::into_versioned))
    }

    async fn upsert_event(&self, event: EventEntity) -> MongoResult<()> {
        let id = event.id.clone();
        let collection = self.collection().await;
        let next_revision = match collection
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadEvent {
                id: id.clone(),
                source,
            })? {
            Some(existing) => existing.revision() + 1,
            None => 0,
        };

        let document = MongoEventDocument::from_entity(event, next_revision);
        collection
            .replace_one(doc_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveEvent { id, source })?;

        Ok(())
    }

    async fn compare_and_replace(
        &self,
        event: EventEntity,
        expected: Option<Revision>,
    ) -> MongoResult<()> {
        let id = event.id.clone();
        let Some(expected) = expected else {
            return self.upsert_event(event).await;
        };

        let expected = expected
            .0
            .parse::<i64>()
            .map_err(|_| MongoDaoError::InvalidRevision {
                id: id.clone(),
                revision: expected.0.clone(),
            })?;

        let collection = self.collection().await;
        let document = MongoEventDocument::from_entity(event, expected + 1);
        let result = collection
            .replace_one(doc_id_at_revision(&id, expected), &document)
            .await
            .map_err(|source| MongoDaoError::SaveEvent {
                id: id.clone(),
                source,
            })?;

        if result.matched_count > 0 {
            return Ok(());
        }

        // Nothing matched: either the revision moved on or the document is gone.
        match self.find_event(&id).await? {
            Some(_) => Err(MongoDaoError::RevisionConflict { id }),
            None => Err(MongoDaoError::MissingEvent { id }),
        }
    }
}

impl EventStore for MongoEventStore {
    fn load_event(&self, id: String) -> BoxFuture<'static, StorageResult<Option<VersionedEvent>>> {
        let store = self.clone();
        Box::pin(async move { store.find_event(&id).await.map_err(Into::into) })
    }

    fn save_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_event(event).await.map_err(Into::into) })
    }

    fn replace_event(
        &self,
        event: EventEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .compare_and_replace(event, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
