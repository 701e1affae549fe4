use async_trait::async_trait;
use railq_core::{KeyValueStore, StoreError};
use redis::AsyncCommands;
use tracing::info;

/// Session storage shared through Redis, one string key per entry.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStore {
    pub async fn new(connection_string: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis session store configured (prefix '{}')", key_prefix);
        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced_key(&self.key_prefix, key)
    }
}

fn namespaced_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

fn backend_error(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        let value: Option<String> = conn.get(self.namespaced(key)).await.map_err(backend_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        conn.set::<_, _, ()>(self.namespaced(key), value)
            .await
            .map_err(backend_error)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        conn.del::<_, ()>(self.namespaced(key)).await.map_err(backend_error)
    }
}
