//  src/db/redis.rs

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};

use crate::utils::errors::StoreError;

use super::store::CacheMirror;

/// Thin, cheap-to-clone handle.
#[derive(Clone)]
pub struct RedisPool {
    manager: Arc<ConnectionManager>,
    /// namespace prepended to every hash name
    prefix: String,
}

impl RedisPool {
    /// Build once at start-up and share between the job loop and Actix.
    pub async fn new(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager: Arc::new(manager),
            prefix: "gridbot".into(),
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.manager.as_ref().clone()
    }

    /// Uniformly name-spaces hashes:  `"gridbot:trailing-trade-common"`
    pub fn with_prefix(&self, key: impl AsRef<str>) -> String {
        format!("{}:{}", self.prefix, key.as_ref())
    }
}

#[async_trait]
impl CacheMirror for RedisPool {
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection();
        let started = Instant::now();
        let raw: Option<String> = con.hget(self.with_prefix(hash), field).await?;
        log::debug!("redis HGET {hash} {field} took {:?}", started.elapsed());
        Ok(raw)
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.connection();
        let started = Instant::now();
        con.hset::<_, _, _, ()>(self.with_prefix(hash), field, value).await?;
        log::debug!("redis HSET {hash} {field} took {:?}", started.elapsed());
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        let mut con = self.connection();
        con.hdel::<_, _, ()>(self.with_prefix(hash), field).await?;
        Ok(())
    }
}
