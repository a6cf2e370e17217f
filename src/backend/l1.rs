//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地缓存层（L1）及其按命名空间划分的注册表。

use crate::config::TierPolicy;
use dashmap::DashMap;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// 本地缓存层统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: u64,
}

/// 单个命名空间的本地缓存
///
/// 基于Moka，淘汰策略在创建时固定：容量超限时按近似最近使用淘汰，
/// 访问/写入过期在读取时惰性检查，也可由清理任务主动执行。
pub struct LocalTier {
    namespace: String,
    cache: Cache<String, Vec<u8>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl LocalTier {
    /// 按策略创建本地缓存
    pub fn new(namespace: impl Into<String>, policy: &TierPolicy) -> Self {
        let namespace = namespace.into();
        let mut builder = Cache::<String, Vec<u8>>::builder().name(&namespace);
        if let Some(capacity) = policy.initial_capacity() {
            builder = builder.initial_capacity(capacity);
        }
        if let Some(max) = policy.maximum_size() {
            builder = builder.max_capacity(max);
        }
        if let Some(idle) = policy.expire_after_access() {
            builder = builder.time_to_idle(idle);
        }
        if let Some(ttl) = policy.expire_after_write() {
            builder = builder.time_to_live(ttl);
        }
        if let Some(refresh) = policy.refresh_after_write() {
            debug!(
                namespace = %namespace,
                refresh_ms = refresh.as_millis() as u64,
                "refresh_after_write is advisory, entries are only expired"
            );
        }

        Self {
            namespace,
            cache: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            "L1 get: namespace={}, key={}, found={}",
            self.namespace,
            key,
            value.is_some()
        );
        value
    }

    pub async fn put(&self, key: &str, value: Vec<u8>) {
        debug!(
            "L1 put: namespace={}, key={}, value_len={}",
            self.namespace,
            key,
            value.len()
        );
        self.cache.insert(key.to_string(), value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.cache.invalidate(key).await;
        debug!("L1 invalidate: namespace={}, key={}", self.namespace, key);
    }

    /// 清空本层的全部条目
    ///
    /// 与并发写入之间不保证原子性，竞争中的写入可能保留也可能被清除。
    pub fn invalidate_all(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.cache.invalidate_all();
        debug!("L1 invalidate_all: namespace={}", self.namespace);
    }

    /// 执行Moka挂起的维护任务（过期清理、淘汰）
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

/// 本地缓存注册表
///
/// 每个命名空间在每个节点上至多一个 [`LocalTier`]，首次访问时通过
/// 原子的“不存在则插入”创建，并发的首次访问得到同一个实例。
pub struct LocalTierRegistry {
    policy: TierPolicy,
    tiers: DashMap<String, Arc<LocalTier>>,
}

impl LocalTierRegistry {
    pub fn new(policy: TierPolicy) -> Self {
        Self {
            policy,
            tiers: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// 查找已存在的本地缓存，不会创建
    pub fn get(&self, namespace: &str) -> Option<Arc<LocalTier>> {
        self.tiers.get(namespace).map(|tier| tier.value().clone())
    }

    /// 获取本地缓存，不存在时创建
    pub fn get_or_create(&self, namespace: &str) -> Arc<LocalTier> {
        if let Some(tier) = self.get(namespace) {
            return tier;
        }
        self.tiers
            .entry(namespace.to_string())
            .or_insert_with(|| {
                info!("Creating local tier for namespace: {}", namespace);
                Arc::new(LocalTier::new(namespace, &self.policy))
            })
            .value()
            .clone()
    }

    /// 使单个键失效，命名空间未创建时返回 `false`
    pub async fn invalidate(&self, namespace: &str, key: &str) -> bool {
        match self.get(namespace) {
            Some(tier) => {
                tier.invalidate(key).await;
                true
            }
            None => false,
        }
    }

    /// 清空命名空间，命名空间未创建时返回 `false`
    pub fn invalidate_all(&self, namespace: &str) -> bool {
        match self.get(namespace) {
            Some(tier) => {
                tier.invalidate_all();
                true
            }
            None => false,
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.tiers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<LocalTier>> {
        self.tiers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// 启动主动清理任务
    ///
    /// 按固定间隔对所有本地缓存执行维护，`token` 取消后退出。
    #[instrument(skip(self, token), level = "info")]
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Local tier sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        for tier in registry.snapshot() {
                            tier.run_pending_tasks().await;
                        }
                    }
                }
            }
        })
    }
}
