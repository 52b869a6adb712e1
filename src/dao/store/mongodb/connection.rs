use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Ping attempts for a fresh connection. The storage supervisor backs off
/// between whole connection attempts, so this only absorbs a slow start.
pub const CONNECT_PINGS: u32 = 3;
/// In-place reconnects ping once; the supervisor owns the retry loop.
pub const RECONNECT_PINGS: u32 = 1;

const PING_BACKOFF: Duration = Duration::from_millis(250);

/// Open a client for the configured database and wait for it to answer a ping.
pub async fn open_database(config: &MongoConfig, pings: u32) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut attempt = 1;
    while let Err(source) = database.run_command(doc! { "ping": 1 }).await {
        if attempt >= pings {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source,
            });
        }
        debug!(attempt, error = %source, database = %config.database_name, "MongoDB not answering yet");
        sleep(PING_BACKOFF * attempt).await;
        attempt += 1;
    }

    Ok((client, database))
}
