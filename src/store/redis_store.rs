use async_trait::async_trait;
use parking_lot::RwLock;
use redis::{aio::MultiplexedConnection, AsyncCommands, Script};
use tracing::{debug, info};

use super::{KeyValueStore, WindowStatus};
use crate::error::{StoreError, StoreResult};

/// Purga, cuenta y registra en una sola ejecución del servidor.
///
/// KEYS[1] = clave de la ventana
/// ARGV = now, window, max_calls, member
const WINDOW_ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max_calls = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= max_calls then
    return 0
end

redis.call('ZADD', key, now, ARGV[4])
redis.call('EXPIRE', key, window)
return 1
"#;

/// Backing store sobre Redis
pub struct RedisStore {
    conn: RwLock<Option<MultiplexedConnection>>,
    admit_script: Script,
}

impl RedisStore {
    /// Abre la conexión y verifica con PING
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("🔌 Conectado a Redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            admit_script: Script::new(WINDOW_ADMIT_SCRIPT),
        })
    }

    // La conexión multiplexada se clona por operación
    fn connection(&self) -> StoreResult<MultiplexedConnection> {
        self.conn.read().clone().ok_or(StoreError::Closed)
    }

    /// Miembro único aunque varias acciones caigan en el mismo segundo
    fn window_member(now: u64) -> String {
        format!("{}-{:016x}", now, fastrand::u64(..))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.conn.write().take().is_some() {
            info!("🔌 Conexión a Redis cerrada");
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        debug!("💾 {} guardado (ttl {}s)", key, ttl_secs);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection()?;
        let count: i64 = conn.incr(key, 1).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection()?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn window_admit(
        &self,
        key: &str,
        now: u64,
        window_secs: u64,
        max_calls: u64,
    ) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let admitted: i64 = self
            .admit_script
            .key(key)
            .arg(now)
            .arg(window_secs)
            .arg(max_calls)
            .arg(Self::window_member(now))
            .invoke_async(&mut conn)
            .await?;
        Ok(admitted == 1)
    }

    async fn window_status(&self, key: &str, now: u64, window_secs: u64) -> StoreResult<WindowStatus> {
        let mut conn = self.connection()?;
        // Ventana: now - window < t <= now
        let min = format!("({}", now.saturating_sub(window_secs));
        let max = now.to_string();

        let (calls, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("ZCOUNT")
            .arg(key)
            .arg(&min)
            .arg(&max)
            .cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(&min)
            .arg(&max)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        Ok(WindowStatus {
            calls,
            oldest: oldest.first().map(|(_, score)| *score as u64),
        })
    }
}
