use std::time::Duration;

use log::info;
use redis::{aio::ConnectionManager, Client, RedisError};

use crate::traits::{Cache, CacheError};

/// A [`Cache`] shared by every server instance. Claims use `SET key value NX EX ttl`, so check-and-set is a single
/// server-side operation.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("🧠️ Connected to Redis cache");
        Ok(Self { conn })
    }
}

impl From<RedisError> for CacheError {
    fn from(e: RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl Cache for RedisCache {
    async fn claim_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> =
            redis::cmd("SET").arg(key).arg("1").arg("NX").arg("EX").arg(ttl_secs(ttl)).query_async(&mut conn).await?;
        match reply.as_deref() {
            Some("OK") => Ok(true),
            None => Ok(false),
            Some(other) => Err(CacheError::UnexpectedResponse(format!("SET NX replied with {other}"))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs(ttl)).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}
