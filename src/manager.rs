//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责按配置组装缓存服务及其后台任务。

use crate::backend::l1::LocalTierRegistry;
use crate::backend::l2::RedisStore;
use crate::backend::RemoteStore;
use crate::client::{l2::RemoteCacheService, two_level::TieredCacheService, CacheService};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::serialization::SerializerEnum;
use crate::sync::bus::{MutationBus, RedisBus};
use crate::sync::event::node_id;
use crate::sync::invalidation::ListenerHandle;
use crate::sync::write_pool::{ShutdownReport, WritePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 缓存管理器
///
/// 启用两级缓存时对外提供 [`TieredCacheService`]，并在后台运行失效监听器；
/// 否则只提供直接访问共享存储的 [`RemoteCacheService`]。
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn RemoteStore>,
    bus: Option<Arc<dyn MutationBus>>,
    pool: Arc<WritePool>,
    service: Arc<dyn CacheService>,
    tiered: Option<Arc<TieredCacheService>>,
    listener: Mutex<Option<ListenerHandle>>,
    sweeper: CancellationToken,
}

impl CacheManager {
    /// 连接Redis并启动缓存服务
    #[instrument(skip(config), level = "info", fields(two_level = config.enable_two_level))]
    pub async fn start(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        if !config.enabled {
            return Err(CacheError::Configuration(
                "cache is disabled (enabled = false)".to_string(),
            ));
        }

        let store = Arc::new(RedisStore::connect(&config.redis).await?);
        let bus: Option<Arc<dyn MutationBus>> = if config.enable_two_level {
            Some(Arc::new(RedisBus::new(store.clone(), config.topic.clone())?))
        } else {
            None
        };
        Self::assemble(config, store, bus).await
    }

    /// 使用给定的共享存储和广播通道组装缓存服务
    pub async fn assemble(
        config: CacheConfig,
        store: Arc<dyn RemoteStore>,
        bus: Option<Arc<dyn MutationBus>>,
    ) -> Result<Self> {
        Self::assemble_as(config, store, bus, node_id()).await
    }

    /// 以指定的节点标识组装缓存服务
    #[instrument(skip(config, store, bus), level = "info")]
    pub async fn assemble_as(
        config: CacheConfig,
        store: Arc<dyn RemoteStore>,
        bus: Option<Arc<dyn MutationBus>>,
        origin_id: &str,
    ) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WritePool::new(&config.executor));
        let serializer = SerializerEnum::from_compression(config.redis.use_compression);
        let remote: Arc<dyn CacheService> = Arc::new(RemoteCacheService::new(
            Arc::clone(&store),
            Arc::clone(&pool),
            serializer,
        ));
        let sweeper = CancellationToken::new();

        if !config.enable_two_level {
            info!("缓存管理器已启动: 仅共享存储");
            return Ok(Self {
                config,
                store,
                bus,
                pool,
                service: remote,
                tiered: None,
                listener: Mutex::new(None),
                sweeper,
            });
        }

        let bus = bus.ok_or_else(|| {
            CacheError::Configuration("two-level cache requires a mutation bus".to_string())
        })?;
        let tiers = Arc::new(LocalTierRegistry::new(config.local.clone()));
        let tiered = Arc::new(
            TieredCacheService::new(remote, Arc::clone(&tiers), Arc::clone(&bus))
                .with_origin_id(origin_id),
        );
        let listener = tiered.listener().spawn(Arc::clone(&bus)).await?;
        if let Some(interval) = config.local.cleanup_interval() {
            tiers.spawn_sweeper(interval, sweeper.clone());
        }

        info!("缓存管理器已启动: 两级缓存, topic={}", config.topic);
        Ok(Self {
            config,
            store,
            bus: Some(bus),
            pool,
            service: tiered.clone(),
            tiered: Some(tiered),
            listener: Mutex::new(Some(listener)),
            sweeper,
        })
    }

    /// 对外提供的缓存服务
    pub fn service(&self) -> Arc<dyn CacheService> {
        Arc::clone(&self.service)
    }

    /// 两级缓存服务，未启用时为 `None`
    pub fn tiered(&self) -> Option<&Arc<TieredCacheService>> {
        self.tiered.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn bus(&self) -> Option<&Arc<dyn MutationBus>> {
        self.bus.as_ref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WritePool> {
        &self.pool
    }

    /// 关闭缓存服务
    ///
    /// 先停止失效监听和清理任务，再关闭写入池。
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        info!("开始关闭缓存管理器...");
        if let Some(listener) = self.listener.lock().await.take() {
            listener.stop().await;
        }
        self.sweeper.cancel();

        let report = self.pool.shutdown().await;
        if report.dropped > 0 {
            warn!("缓存管理器关闭: {} 个异步写入未执行", report.dropped);
        } else {
            info!("缓存管理器已关闭");
        }
        Ok(report)
    }
}
