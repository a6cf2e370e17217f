//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分层缓存的配置结构和解析逻辑。
//!
//! 配置由外部加载后以普通结构体的形式交给缓存核心使用，
//! 支持从TOML字符串或文件解析。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 默认的变更广播频道
pub const DEFAULT_TOPIC: &str = "oxtier:mutations";

/// 缓存总配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,
    /// 是否启用两级缓存（本地层 + Redis），关闭时只使用Redis
    pub enable_two_level: bool,
    /// 变更广播频道名称，每个部署配置一次
    pub topic: String,
    /// Redis连接配置
    pub redis: RedisConfig,
    /// 异步写入线程池配置
    pub executor: ExecutorConfig,
    /// 本地缓存层淘汰策略
    pub local: TierPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_two_level: true,
            topic: DEFAULT_TOPIC.to_string(),
            redis: RedisConfig::default(),
            executor: ExecutorConfig::default(),
            local: TierPolicy::default(),
        }
    }
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 集群模式
    Cluster,
}

/// Redis连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接模式
    pub mode: RedisMode,
    /// 单机模式的主机地址
    pub host: String,
    /// 单机模式的端口
    pub port: u16,
    /// 集群模式的节点列表（host:port）
    pub cluster_nodes: Vec<String>,
    /// Redis 密码（可选，使用 SecretString 保护）
    pub password: Option<SecretString>,
    /// 数据库索引（仅单机模式）
    pub database: i64,
    /// 启动时预先建立的连接数
    pub min_idle_size: usize,
    /// 最大连接数
    pub pool_max_size: usize,
    /// 连接及命令超时时间（毫秒）
    pub timeout_ms: u64,
    /// 是否压缩缓存值（以CPU换带宽），关闭时使用未压缩的JSON
    pub use_compression: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            host: "127.0.0.1".to_string(),
            port: 6379,
            cluster_nodes: Vec::new(),
            password: None,
            database: 0,
            min_idle_size: 1,
            pool_max_size: 4,
            timeout_ms: 3000,
            use_compression: false,
        }
    }
}

impl RedisConfig {
    /// 连接及命令超时时间
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 异步写入线程池配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 常驻工作任务数
    pub core_size: usize,
    /// 最大工作任务数
    pub max_size: usize,
    /// 有界队列容量
    pub queue_capacity: usize,
    /// 非常驻工作任务的空闲存活时间（秒）
    pub keep_alive_secs: u64,
    /// 关闭时等待队列排空的最长时间（秒）
    pub await_termination_secs: u64,
    /// 工作任务名称前缀
    pub name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_size: 4,
            max_size: 8,
            queue_capacity: 1024,
            keep_alive_secs: 60,
            await_termination_secs: 60,
            name_prefix: "redis-pool".to_string(),
        }
    }
}

/// 本地缓存层淘汰策略
///
/// 每个命名空间的本地缓存实例创建时使用同一份策略。
/// 时间字段单位为毫秒，`None` 或 `0` 表示禁用。
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TierPolicy {
    /// 最后一次访问后多久过期
    pub expire_after_access_ms: Option<u64>,
    /// 写入后多久过期
    pub expire_after_write_ms: Option<u64>,
    /// 写入后多久刷新（仅作提示，Moka 不支持刷新）
    pub refresh_after_write_ms: Option<u64>,
    /// 初始容量
    pub initial_capacity: Option<usize>,
    /// 最大条目数
    pub maximum_size: Option<u64>,
    /// 主动清理过期条目的间隔（秒）
    pub cleanup_interval_secs: Option<u64>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            expire_after_access_ms: None,
            expire_after_write_ms: Some(300_000),
            refresh_after_write_ms: None,
            initial_capacity: None,
            maximum_size: Some(10_000),
            cleanup_interval_secs: None,
        }
    }
}

fn enabled_millis(value: Option<u64>) -> Option<Duration> {
    value.filter(|ms| *ms > 0).map(Duration::from_millis)
}

impl TierPolicy {
    /// 不带任何淘汰规则的策略
    pub fn unbounded() -> Self {
        Self {
            expire_after_access_ms: None,
            expire_after_write_ms: None,
            refresh_after_write_ms: None,
            initial_capacity: None,
            maximum_size: None,
            cleanup_interval_secs: None,
        }
    }

    pub fn expire_after_access(&self) -> Option<Duration> {
        enabled_millis(self.expire_after_access_ms)
    }

    pub fn expire_after_write(&self) -> Option<Duration> {
        enabled_millis(self.expire_after_write_ms)
    }

    pub fn refresh_after_write(&self) -> Option<Duration> {
        enabled_millis(self.refresh_after_write_ms)
    }

    pub fn initial_capacity(&self) -> Option<usize> {
        self.initial_capacity.filter(|c| *c > 0)
    }

    pub fn maximum_size(&self) -> Option<u64> {
        self.maximum_size.filter(|s| *s > 0)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        self.cleanup_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// 本地缓存的最大陈旧时间上界
    ///
    /// 丢失失效消息时，本地条目最多保留这么久；两项都未配置时返回 `None`。
    pub fn staleness_bound(&self) -> Option<Duration> {
        match (self.expire_after_write(), self.expire_after_access()) {
            (Some(w), Some(a)) => Some(w.min(a)),
            (Some(w), None) => Some(w),
            (None, a) => a,
        }
    }
}

impl CacheConfig {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| CacheError::Configuration(e.to_string()))
    }

    /// 从TOML文件解析配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 集群模式缺少节点列表属于启动期致命错误。
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(CacheError::Configuration(
                "topic cannot be empty".to_string(),
            ));
        }

        let redis = &self.redis;
        match redis.mode {
            RedisMode::Standalone => {
                if redis.host.trim().is_empty() {
                    return Err(CacheError::Configuration(
                        "redis.host is required in standalone mode".to_string(),
                    ));
                }
            }
            RedisMode::Cluster => {
                if redis.cluster_nodes.iter().all(|n| n.trim().is_empty()) {
                    return Err(CacheError::StoreConnectivity(
                        "You need to config the redis.cluster_nodes property for cluster mode"
                            .to_string(),
                    ));
                }
            }
        }

        if redis.pool_max_size == 0 {
            return Err(CacheError::Configuration(
                "redis.pool_max_size cannot be zero".to_string(),
            ));
        }
        if redis.min_idle_size > redis.pool_max_size {
            return Err(CacheError::Configuration(format!(
                "redis.min_idle_size ({}) must be <= redis.pool_max_size ({})",
                redis.min_idle_size, redis.pool_max_size
            )));
        }
        if !(100..=60000).contains(&redis.timeout_ms) {
            return Err(CacheError::Configuration(
                "redis.timeout_ms must be between 100 and 60000 ms".to_string(),
            ));
        }

        let executor = &self.executor;
        if executor.core_size == 0 {
            return Err(CacheError::Configuration(
                "executor.core_size cannot be zero".to_string(),
            ));
        }
        if executor.max_size < executor.core_size {
            return Err(CacheError::Configuration(format!(
                "executor.max_size ({}) must be >= executor.core_size ({})",
                executor.max_size, executor.core_size
            )));
        }
        if executor.queue_capacity == 0 {
            return Err(CacheError::Configuration(
                "executor.queue_capacity cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}
