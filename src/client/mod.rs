//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存服务的接口和实现。

pub mod l2;
pub mod two_level;

use crate::error::Result;
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

/// 缓存服务操作接口
///
/// 读取只针对一个命名空间；写入和失效可同时作用于多个命名空间，
/// 对每个命名空间使用相同的键。`ttl_ms` 为 `0` 表示不过期。
///
/// 同步操作在共享存储确认后返回，存储错误原样传递。
/// 异步操作只负责提交到写入池：返回 `true` 表示已接受，
/// 之后的执行失败只记录日志。
#[async_trait]
pub trait CacheService: Send + Sync {
    /// 读取缓存值
    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入缓存值
    async fn save(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool>;

    /// 异步写入缓存值
    async fn save_async(
        &self,
        cache_names: &[&str],
        key: &str,
        value: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<bool>;

    /// 删除单个键
    async fn invalidate(&self, cache_names: &[&str], key: &str) -> Result<bool>;

    /// 清空命名空间
    async fn invalidate_all(&self, cache_names: &[&str]) -> Result<bool>;

    /// 异步删除单个键
    async fn invalidate_async(&self, cache_names: &[&str], key: &str) -> Result<bool>;

    /// 异步清空命名空间
    async fn invalidate_all_async(&self, cache_names: &[&str]) -> Result<bool>;

    /// 值使用的序列化器
    fn serializer(&self) -> &SerializerEnum;

    /// 释放后台资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// 缓存服务扩展特征
///
/// 提供类型安全的读写接口
#[async_trait]
pub trait CacheServiceExt: CacheService {
    /// 读取缓存值（反序列化）
    #[instrument(skip(self), level = "debug")]
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        cache_name: &str,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(cache_name, key).await? {
            Some(data) => Ok(Some(self.serializer().deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// 写入缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn save_as<T: Serialize + Send + Sync>(
        &self,
        cache_names: &[&str],
        key: &str,
        value: &T,
        ttl_ms: u64,
    ) -> Result<bool> {
        let bytes = self.serializer().serialize(value)?;
        self.save(cache_names, key, bytes, ttl_ms).await
    }

    /// 异步写入缓存值（序列化在调用线程完成）
    #[instrument(skip(self, value), level = "debug")]
    async fn save_as_async<T: Serialize + Send + Sync>(
        &self,
        cache_names: &[&str],
        key: &str,
        value: &T,
        ttl_ms: u64,
    ) -> Result<bool> {
        let bytes = self.serializer().serialize(value)?;
        self.save_async(cache_names, key, bytes, ttl_ms).await
    }
}

impl<T: CacheService + ?Sized> CacheServiceExt for T {}
