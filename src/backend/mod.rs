//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的存储后端：本地缓存层（L1）与共享存储（L2）。

pub mod l1;
pub mod l2;
pub mod memory;
pub mod redis_provider;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 共享键值存储能力
///
/// 共享存储是唯一的数据来源。所有调用都等待存储确认后才返回，
/// 失败以错误形式交给调用方，不在此层吞掉。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 读取命名空间下的键
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入命名空间下的键，`ttl` 为 `None` 时永不过期
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// 删除命名空间下的键
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// 清空命名空间下的全部键
    async fn clear(&self, namespace: &str) -> Result<()>;

    /// 检查存储是否可达
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// 将毫秒TTL转换为存储使用的过期时间，`0` 表示不过期
pub fn ttl_from_millis(ttl_ms: u64) -> Option<Duration> {
    if ttl_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ttl_ms))
    }
}
