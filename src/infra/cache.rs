use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::Client;

/// Redis handle for the rate-limit windows. Connections are opened per call
/// so the handle survives runtimes coming and going.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("invalid REDIS_URL")?;
        let cache = Self { client };
        cache.ping().await.context("redis is unreachable")?;
        Ok(cache)
    }

    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Drops members of the sorted set `key` older than `window_ms`, adds
    /// `member` scored `now_ms`, and returns the resulting size. The key
    /// expires once the window has passed without new members.
    pub async fn window_add(
        &self,
        key: &str,
        member: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> Result<u32> {
        let mut conn = self.connection().await?;
        let (count,): (u32,) = redis::pipe()
            .atomic()
            .zrembyscore(key, 0, now_ms - window_ms)
            .ignore()
            .zadd(key, member, now_ms)
            .ignore()
            .zcard(key)
            .pexpire(key, window_ms)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    pub async fn window_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
