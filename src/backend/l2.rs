//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享存储（L2）的Redis实现。

use crate::backend::redis_provider::{DefaultRedisProvider, RedisProvider, StoreConnection};
use crate::backend::RemoteStore;
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::RedisResult;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// 原子地写入数据键并维护命名空间索引
///
/// 索引是有序集合，分数为成员的过期时间点（毫秒，无过期为 `+inf`）。
/// 每次写入时顺带移除已过期的成员，并让索引本身随最晚过期的成员一起过期。
const SET_SCRIPT: &str = r#"
if redis.replicate_commands then redis.replicate_commands() end
local t = redis.call("TIME")
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
    redis.call("ZADD", KEYS[2], string.format("%.0f", now + ttl), ARGV[3])
else
    redis.call("SET", KEYS[1], ARGV[1])
    redis.call("ZADD", KEYS[2], "+inf", ARGV[3])
end
redis.call("ZREMRANGEBYSCORE", KEYS[2], "-inf", string.format("%.0f", now))
local top = redis.call("ZRANGE", KEYS[2], -1, -1, "WITHSCORES")
if top[2] == "inf" or top[2] == "+inf" then
    redis.call("PERSIST", KEYS[2])
else
    redis.call("PEXPIREAT", KEYS[2], top[2])
end
return 1
"#;

/// 原子地删除命名空间索引中的全部数据键及索引本身
const CLEAR_SCRIPT: &str = r#"
local members = redis.call("ZRANGE", KEYS[1], 0, -1)
for _, member in ipairs(members) do
    redis.call("DEL", ARGV[1] .. member)
end
redis.call("DEL", KEYS[1])
return #members
"#;

/// 命名空间的数据键
///
/// 命名空间放在哈希标签中，同一命名空间的所有键落在同一个集群槽上。
pub fn data_key(namespace: &str, key: &str) -> String {
    format!("{}{}", data_prefix(namespace), key)
}

/// 命名空间的键索引（有序集合，分数为过期时间点）
pub fn index_key(namespace: &str) -> String {
    format!("{{{}}}:idx", namespace)
}

fn data_prefix(namespace: &str) -> String {
    format!("{{{}}}:k:", namespace)
}

/// 基于Redis的共享存储
///
/// 持有固定数量的连接槽，按轮询方式使用。启动时预先建立
/// `min_idle_size` 条连接，其余在首次使用时建立。
pub struct RedisStore {
    config: RedisConfig,
    provider: Arc<dyn RedisProvider>,
    slots: Vec<OnceCell<StoreConnection>>,
    next: AtomicUsize,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("mode", &self.config.mode)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl RedisStore {
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        Self::connect_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    #[instrument(skip(config, provider), level = "info", fields(mode = ?config.mode))]
    pub async fn connect_with_provider(
        config: &RedisConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        let pool_size = config.pool_max_size.max(1);
        let eager = config.min_idle_size.clamp(1, pool_size);
        let slots: Vec<OnceCell<StoreConnection>> =
            (0..pool_size).map(|_| OnceCell::new()).collect();

        for slot in slots.iter().take(eager) {
            let conn = provider.open_connection(config).await?;
            let _ = slot.set(conn);
        }
        info!(
            "Redis store connected: mode={:?}, connections={}/{}",
            config.mode, eager, pool_size
        );

        Ok(Self {
            config: config.clone(),
            provider,
            slots,
            next: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// 订阅变更频道用的客户端
    pub fn subscriber_client(&self) -> Result<redis::Client> {
        self.provider.subscriber_client(&self.config)
    }

    async fn connection(&self) -> Result<StoreConnection> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let conn = self.slots[index]
            .get_or_try_init(|| self.provider.open_connection(&self.config))
            .await?;
        Ok(conn.clone())
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.timeout(), fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(format!(
                "redis {} timed out after {}ms",
                op, self.config.timeout_ms
            ))),
        }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// 向频道发布消息，返回收到消息的订阅者数量
    #[instrument(skip(self, payload), level = "debug")]
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(channel).arg(payload);
        self.run("PUBLISH", cmd.query_async::<usize>(&mut conn)).await
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("GET");
        cmd.arg(data_key(namespace, key));
        let value = self
            .run("GET", cmd.query_async::<Option<Vec<u8>>>(&mut conn))
            .await?;
        debug!(
            "L2 get: namespace={}, key={}, found={}",
            namespace,
            key,
            value.is_some()
        );
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.connection().await?;
        let ttl_ms = ttl.map_or(0, |ttl| ttl.as_millis().max(1) as u64);
        let script = redis::Script::new(SET_SCRIPT);
        let _: i64 = self
            .run(
                "SET",
                script
                    .key(data_key(namespace, key))
                    .key(index_key(namespace))
                    .arg(value)
                    .arg(ttl_ms)
                    .arg(key)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(data_key(namespace, key))
            .ignore()
            .cmd("ZREM")
            .arg(index_key(namespace))
            .arg(key)
            .ignore();
        self.run("DEL", pipe.query_async::<()>(&mut conn)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self, namespace: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(CLEAR_SCRIPT);
        let removed: i64 = self
            .run(
                "CLEAR",
                script
                    .key(index_key(namespace))
                    .arg(data_prefix(namespace))
                    .invoke_async(&mut conn),
            )
            .await?;
        debug!("L2 clear: namespace={}, removed={}", namespace, removed);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let response = self
            .run("PING", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        debug!("Redis ping response: {}", response);
        Ok(())
    }
}
