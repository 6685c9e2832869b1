use redis::aio::ConnectionManager;
use redis::Client;

/// Redis handle for the quote cache. The manager reconnects on its own after
/// a dropped socket, so a Redis restart only costs a few cache misses.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let conn = Client::open(url)?.get_connection_manager().await?;
        Ok(RedisClient { conn })
    }

    pub async fn ping(&self) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
