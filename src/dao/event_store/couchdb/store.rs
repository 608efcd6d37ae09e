use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::dao::{
    event_store::EventStore,
    models::{EventEntity, Revision, VersionedEvent},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchEventDocument, event_doc_id},
};

/// CouchDB-backed [`EventStore`]; `_rev` is the version marker.
#[derive(Clone)]
pub struct CouchEventStore {
    client: Client,
    /// `<base_url>/<database>`, without trailing slash.
    db_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchEventStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let db_url = Arc::<str>::from(config.database_url());
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            db_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.db_url, path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.db_url.to_string();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_event(&self, event_id: &str) -> CouchResult<Option<VersionedEvent>> {
        let doc_id = event_doc_id(event_id);
        let response = self
            .request(Method::GET, &doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document = response
                    .json::<CouchEventDocument>()
                    .await
                    .map_err(|source| CouchDaoError::DecodeResponse {
                        path: doc_id.clone(),
                        source,
                    })?;
                Ok(Some(document.into_versioned(event_id)))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status: other,
            }),
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        let response = self
            .request(Method::HEAD, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|value| value.to_str().ok())
                .map(|etag| etag.trim_matches('"').to_owned())),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_event(&self, event: EventEntity, rev: Option<Revision>) -> CouchResult<()> {
        let document = CouchEventDocument::from((event, rev));
        let response = self
            .request(Method::PUT, &document.id)
            .json(&document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict { path: document.id }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id,
                status: other,
            }),
        }
    }
}

impl EventStore for CouchEventStore {
    fn load_event(&self, id: String) -> BoxFuture<'static, StorageResult<Option<VersionedEvent>>> {
        let store = self.clone();
        Box::pin(async move { store.get_event(&id).await.map_err(Into::into) })
    }

    fn save_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = event_doc_id(&event.id);
            let rev = store.current_rev(&doc_id).await?.map(Revision);
            store.put_event(event, rev).await.map_err(Into::into)
        })
    }

    fn replace_event(
        &self,
        event: EventEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = event_doc_id(&event.id);
            let rev = match expected {
                Some(rev) => Some(rev),
                None => {
                    // Unconditional write: adopt whatever revision is current.
                    debug!(doc_id = %doc_id, "replacing event without revision guard");
                    store.current_rev(&doc_id).await?.map(Revision)
                }
            };
            store.put_event(event, rev).await.map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.db_url.to_string();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
