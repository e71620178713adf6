//! Redis-backed [`RemoteStore`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::error::Result;
use crate::remote::{RemoteStore, Script};

/// Remote store over a reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!(url, "Connected to redis");
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Milliseconds for a PX argument; zero means no expiry.
fn ttl_millis(ttl: Option<Duration>) -> Option<u64> {
    ttl.filter(|ttl| !ttl.is_zero())
        .map(|ttl| (ttl.as_millis() as u64).max(1))
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<String> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_ref());
        if let Some(millis) = ttl_millis(ttl) {
            cmd.arg("PX").arg(millis);
        }
        let ack: String = cmd.query_async(&mut conn).await?;
        Ok(ack)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed)
    }

    async fn get_del(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn eval(&self, script: &Script, keys: &[&str], args: &[String]) -> Result<i64> {
        let mut conn = self.conn.clone();
        let lua = redis::Script::new(script.source());
        let mut invocation = lua.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }
        let result: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(result)
    }
}
