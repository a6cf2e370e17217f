//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的共享存储实现，用于单进程部署、基准测试和测试。

use crate::backend::RemoteStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// 进程内共享存储
///
/// 多个缓存节点可共享同一个实例（通过 `Arc`），模拟同一个Redis。
/// 过期条目在读取时惰性删除。
#[derive(Default)]
pub struct MemoryStore {
    spaces: DashMap<String, DashMap<String, MemoryEntry>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累计读取次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 累计写入次数（含删除和清空）
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 命名空间中未过期的条目数
    pub fn len(&self, namespace: &str) -> usize {
        self.spaces
            .get(namespace)
            .map(|space| space.iter().filter(|e| !e.value().is_expired()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let Some(space) = self.spaces.get(namespace) else {
            return Ok(None);
        };
        let expired = match space.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            space.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.spaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if let Some(space) = self.spaces.get(namespace) {
            space.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.spaces.remove(namespace);
        Ok(())
    }
}
