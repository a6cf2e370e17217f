//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了仅使用共享存储的缓存服务。

use super::CacheService;
use crate::backend::{ttl_from_millis, RemoteStore};
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use crate::sync::write_pool::WritePool;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 共享存储缓存服务
///
/// 所有操作直接作用于共享存储，没有本地缓存层，也不广播变更。
/// 涉及多个命名空间的变更会逐个尝试全部命名空间，之后返回遇到的第一个错误。
pub struct RemoteCacheService {
    store: Arc<dyn RemoteStore>,
    pool: Arc<WritePool>,
    serializer: SerializerEnum,
}

fn owned_names(cache_names: &[&str]) -> Vec<String> {
    cache_names.iter().map(|n| n.to_string()).collect()
}

impl RemoteCacheService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        pool: Arc<WritePool>,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            store,
            pool,
            serializer,
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<WritePool> {
        &self.pool
    }

    fn record(namespace: &str, op: &str, start: Instant, result: &str) {
        GLOBAL_METRICS.record_duration(namespace, "L2", op, start.elapsed().as_secs_f64());
        GLOBAL_METRICS.record_request(namespace, "L2", op, result);
    }
}

#[async_trait]
impl CacheService for RemoteCacheService {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        match self.store.get(cache_name, key).await {
            Ok(Some(value)) => {
                Self::record(cache_name, "get", start, "hit");
                Ok(Some(value))
            }
            Ok(None) => {
                Self::record(cache_name, "get", start, "miss");
                Ok(None)
            }
            Err(e) => {
                Self::record(cache_name, "get", start, "error");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn save(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool> {
        let ttl = ttl_from_millis(ttl_ms);
        let mut first_error = None;
        for name in cache_names {
            let start = Instant::now();
            match self.store.set(name, key, &value, ttl).await {
                Ok(()) => Self::record(name, "save", start, "ok"),
                Err(e) => {
                    Self::record(name, "save", start, "error");
                    warn!("Save failed: namespace={}, key={}, error={}", name, key, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(true), Err)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn save_async(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let names = owned_names(cache_names);
        let key = key.to_string();
        let ttl = ttl_from_millis(ttl_ms);
        let accepted = self.pool.submit(async move {
            for name in &names {
                match store.set(name, &key, &value, ttl).await {
                    Ok(()) => debug!("Async save done: namespace={}, key={}", name, key),
                    Err(e) => {
                        GLOBAL_METRICS.record_request(name, "L2", "save_async", "error");
                        warn!("Async save failed: namespace={}, key={}, error={}", name, key, e);
                    }
                }
            }
        });
        Ok(accepted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate(&self, cache_names: &[&str], key: &str) -> Result<bool> {
        let mut first_error = None;
        for name in cache_names {
            let start = Instant::now();
            match self.store.delete(name, key).await {
                Ok(()) => Self::record(name, "invalidate", start, "ok"),
                Err(e) => {
                    Self::record(name, "invalidate", start, "error");
                    warn!("Invalidate failed: namespace={}, key={}, error={}", name, key, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(true), Err)
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate_all(&self, cache_names: &[&str]) -> Result<bool> {
        let mut first_error = None;
        for name in cache_names {
            let start = Instant::now();
            match self.store.clear(name).await {
                Ok(()) => Self::record(name, "clear", start, "ok"),
                Err(e) => {
                    Self::record(name, "clear", start, "error");
                    warn!("Clear failed: namespace={}, error={}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(true), Err)
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate_async(&self, cache_names: &[&str], key: &str) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let names = owned_names(cache_names);
        let key = key.to_string();
        Ok(self.pool.submit(async move {
            for name in &names {
                if let Err(e) = store.delete(name, &key).await {
                    warn!("Async invalidate failed: namespace={}, key={}, error={}", name, key, e);
                }
            }
        }))
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate_all_async(&self, cache_names: &[&str]) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let names = owned_names(cache_names);
        Ok(self.pool.submit(async move {
            for name in &names {
                if let Err(e) = store.clear(name).await {
                    warn!("Async clear failed: namespace={}, error={}", name, e);
                }
            }
        }))
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    async fn shutdown(&self) -> Result<()> {
        let report = self.pool.shutdown().await;
        debug!("Remote cache service shut down: {:?}", report);
        Ok(())
    }
}
