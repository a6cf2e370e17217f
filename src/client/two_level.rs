//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了两级缓存服务：本地缓存层在前，共享存储在后，通过变更广播保持一致。

use super::CacheService;
use crate::backend::l1::LocalTierRegistry;
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::SerializerEnum;
use crate::sync::bus::MutationBus;
use crate::sync::event::{node_id, MutationEvent};
use crate::sync::invalidation::InvalidationListener;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 两级缓存服务
///
/// 包装一个作用于共享存储的 [`CacheService`]。每次变更的顺序固定为：
/// 先写共享存储，再更新本节点的本地缓存，最后广播一次事件。
/// 共享存储失败时不写入本地缓存，而是使所有列出命名空间的本地条目失效并照常广播，
/// 然后把错误返回给调用方；部分命名空间可能已经在共享存储中变更，
/// 本地不能保留与之不符的副本。广播失败只记录日志，
/// 其他节点的本地缓存在过期前可能保持陈旧。
///
/// 读取未命中时从共享存储回填本地缓存，不做并发合并，
/// 同一个键的并发未命中会各自查询共享存储。
pub struct TieredCacheService {
    inner: Arc<dyn CacheService>,
    tiers: Arc<LocalTierRegistry>,
    bus: Arc<dyn MutationBus>,
    origin_id: String,
}

impl TieredCacheService {
    pub fn new(
        inner: Arc<dyn CacheService>,
        tiers: Arc<LocalTierRegistry>,
        bus: Arc<dyn MutationBus>,
    ) -> Self {
        Self {
            inner,
            tiers,
            bus,
            origin_id: node_id().to_string(),
        }
    }

    /// 覆盖节点标识，同一进程中模拟多个节点时使用
    pub fn with_origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = origin_id.into();
        self
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn local_tiers(&self) -> &Arc<LocalTierRegistry> {
        &self.tiers
    }

    pub fn bus(&self) -> &Arc<dyn MutationBus> {
        &self.bus
    }

    /// 与本服务共享本地缓存和节点标识的失效监听器
    pub fn listener(&self) -> InvalidationListener {
        InvalidationListener::new(Arc::clone(&self.tiers), self.origin_id.clone())
    }

    async fn broadcast(&self, cache_names: &[&str], key: Option<&str>) {
        let event = MutationEvent::new(&self.origin_id, cache_names, key);
        match self.bus.publish(&event).await {
            Ok(receivers) => {
                GLOBAL_METRICS.record_mutation_event("publish", "ok");
                debug!(
                    "Mutation event published: names={:?}, key={:?}, receivers={}",
                    cache_names, key, receivers
                );
            }
            Err(e) => {
                GLOBAL_METRICS.record_mutation_event("publish", "error");
                warn!(
                    "Failed to publish mutation event: names={:?}, key={:?}, error={}",
                    cache_names, key, e
                );
            }
        }
    }

    /// 共享存储变更失败后的收尾：失效本地条目并广播，再返回原错误
    async fn drop_local_after_failure(
        &self,
        cache_names: &[&str],
        key: Option<&str>,
        error: CacheError,
    ) -> CacheError {
        warn!(
            "Store mutation failed, dropping local entries: names={:?}, key={:?}, error={}",
            cache_names, key, error
        );
        for name in cache_names {
            match key {
                Some(key) => {
                    self.tiers.invalidate(name, key).await;
                }
                None => {
                    self.tiers.invalidate_all(name);
                }
            }
        }
        self.broadcast(cache_names, key).await;
        error
    }

    async fn put_local(&self, cache_names: &[&str], key: &str, value: &[u8]) {
        for name in cache_names {
            self.tiers.get_or_create(name).put(key, value.to_vec()).await;
        }
    }
}

#[async_trait]
impl CacheService for TieredCacheService {
    #[instrument(skip(self), level = "debug", fields(origin = %self.origin_id))]
    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(tier) = self.tiers.get(cache_name) {
            if let Some(value) = tier.get(key).await {
                GLOBAL_METRICS.record_request(cache_name, "L1", "get", "hit");
                return Ok(Some(value));
            }
        }
        GLOBAL_METRICS.record_request(cache_name, "L1", "get", "miss");

        let value = self.inner.get(cache_name, key).await?;
        if let Some(value) = &value {
            self.tiers
                .get_or_create(cache_name)
                .put(key, value.clone())
                .await;
        }
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(origin = %self.origin_id))]
    async fn save(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool> {
        let saved = match self
            .inner
            .save(cache_names, key, value.clone(), ttl_ms)
            .await
        {
            Ok(saved) => saved,
            Err(e) => return Err(self.drop_local_after_failure(cache_names, Some(key), e).await),
        };
        self.put_local(cache_names, key, &value).await;
        self.broadcast(cache_names, Some(key)).await;
        Ok(saved)
    }

    /// 共享存储写入交给写入池后立即更新本地缓存并广播；
    /// 写入池拒绝时本地缓存保持不变，也不广播。
    ///
    /// 广播发生在池中的写入落地之前。其他节点若在这段时间内收到事件并回源读取，
    /// 可能把旧值重新缓存到本地，直到本地过期或下一次变更为止。
    #[instrument(skip(self, value), level = "debug", fields(origin = %self.origin_id))]
    async fn save_async(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool> {
        let accepted = self
            .inner
            .save_async(cache_names, key, value.clone(), ttl_ms)
            .await?;
        if !accepted {
            warn!("Async save rejected: names={:?}, key={}", cache_names, key);
            return Ok(false);
        }
        self.put_local(cache_names, key, &value).await;
        self.broadcast(cache_names, Some(key)).await;
        Ok(true)
    }

    #[instrument(skip(self), level = "debug", fields(origin = %self.origin_id))]
    async fn invalidate(&self, cache_names: &[&str], key: &str) -> Result<bool> {
        let removed = match self.inner.invalidate(cache_names, key).await {
            Ok(removed) => removed,
            Err(e) => return Err(self.drop_local_after_failure(cache_names, Some(key), e).await),
        };
        for name in cache_names {
            self.tiers.invalidate(name, key).await;
        }
        self.broadcast(cache_names, Some(key)).await;
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug", fields(origin = %self.origin_id))]
    async fn invalidate_all(&self, cache_names: &[&str]) -> Result<bool> {
        let cleared = match self.inner.invalidate_all(cache_names).await {
            Ok(cleared) => cleared,
            Err(e) => return Err(self.drop_local_after_failure(cache_names, None, e).await),
        };
        for name in cache_names {
            self.tiers.invalidate_all(name);
        }
        self.broadcast(cache_names, None).await;
        Ok(cleared)
    }

    async fn invalidate_async(&self, _cache_names: &[&str], _key: &str) -> Result<bool> {
        Err(CacheError::NotSupported(
            "asynchronous invalidation on the tiered cache".to_string(),
        ))
    }

    async fn invalidate_all_async(&self, _cache_names: &[&str]) -> Result<bool> {
        Err(CacheError::NotSupported(
            "asynchronous clear on the tiered cache".to_string(),
        ))
    }

    fn serializer(&self) -> &SerializerEnum {
        self.inner.serializer()
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}
