use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};

use crate::services::retry::RetryPolicy;

use super::error::{MongoDaoError, MongoResult};

const CONNECT_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: 10,
    base_delay: Duration::from_millis(250),
    max_delay: Duration::from_secs(5),
    max_jitter: Duration::ZERO,
};

/// Build a client and wait until the server answers a ping.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    CONNECT_POLICY
        .run(
            "mongodb initial ping",
            |_| {
                let database = database.clone();
                async move {
                    database
                        .run_command(doc! { "ping": 1 })
                        .await
                        .map_err(|source| MongoDaoError::InitialPing { source })
                }
            },
            |_| true,
        )
        .await?;

    Ok((client, database))
}
