//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 异步写入集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node, eventually, setup_logging};
use futures::StreamExt;
use oxtier::backend::l1::LocalTierRegistry;
use oxtier::client::l2::RemoteCacheService;
use oxtier::client::two_level::TieredCacheService;
use oxtier::config::{ExecutorConfig, TierPolicy};
use oxtier::serialization::SerializerEnum;
use oxtier::sync::bus::MutationBus;
use oxtier::sync::write_pool::WritePool;
use oxtier::{CacheService, CacheServiceExt, InProcessBus, MemoryStore, RemoteStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn small_pool() -> Arc<WritePool> {
    Arc::new(WritePool::new(&ExecutorConfig {
        core_size: 1,
        max_size: 1,
        queue_capacity: 1,
        keep_alive_secs: 1,
        await_termination_secs: 1,
        name_prefix: "small-pool".to_string(),
    }))
}

/// 测试异步写入最终可见
///
/// save_async 提交后立即返回，共享存储在有限时间内观察到写入的值
#[tokio::test]
async fn test_save_async_eventually_visible() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    let value = json!({ "status": "PAID" });
    assert!(node
        .service
        .save_as_async(&["order"], "1", &value, 1000)
        .await
        .unwrap());

    let expected = serde_json::to_vec(&value).unwrap();
    let visible = eventually(Duration::from_secs(2), || {
        let store = store.clone();
        let expected = expected.clone();
        async move { store.get("order", "1").await.unwrap() == Some(expected) }
    })
    .await;
    assert!(visible, "async save never reached the shared store");

    let local: Option<serde_json::Value> = node.service.get_as("order", "1").await.unwrap();
    assert_eq!(local, Some(value));
    node.stop().await;
}

/// 占满写入池：一个任务在执行，一个任务在队列中
async fn saturate(pool: &WritePool, gate: &Arc<tokio::sync::Notify>) {
    for _ in 0..2 {
        let gate = gate.clone();
        assert!(pool.submit(async move { gate.notified().await }));
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }
}

/// 测试写入池饱和时拒绝提交
///
/// 被拒绝的异步写入返回 false，共享存储不变
#[tokio::test]
async fn test_rejected_async_save_returns_false() {
    let store = Arc::new(MemoryStore::new());
    let pool = small_pool();
    let service = RemoteCacheService::new(store.clone(), pool.clone(), SerializerEnum::default());

    let gate = Arc::new(tokio::sync::Notify::new());
    saturate(&pool, &gate).await;

    let accepted = service
        .save_async(&["order"], "1", b"1".to_vec(), 0)
        .await
        .unwrap();
    assert!(!accepted);
    assert!(!service.invalidate_async(&["order"], "1").await.unwrap());

    gate.notify_waiters();
    pool.shutdown().await;
    assert_eq!(store.get("order", "1").await.unwrap(), None);
}

/// 测试两级缓存的异步写入被拒绝
///
/// 返回 false，本地缓存不写入，也不广播事件
#[tokio::test]
async fn test_rejected_tiered_async_save_leaves_local_untouched() {
    let store = Arc::new(MemoryStore::new());
    let pool = small_pool();
    let remote: Arc<dyn CacheService> = Arc::new(RemoteCacheService::new(
        store.clone(),
        pool.clone(),
        SerializerEnum::default(),
    ));
    let bus = Arc::new(InProcessBus::default());
    let mut events = bus.subscribe().await.unwrap();
    let tiers = Arc::new(LocalTierRegistry::new(TierPolicy::default()));
    let service = TieredCacheService::new(remote, Arc::clone(&tiers), bus.clone())
        .with_origin_id("node-a");

    let gate = Arc::new(tokio::sync::Notify::new());
    saturate(&pool, &gate).await;

    let accepted = service
        .save_async(&["order"], "1", b"\"PAID\"".to_vec(), 0)
        .await
        .unwrap();
    assert!(!accepted);
    assert!(tiers.get("order").is_none());

    let received = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
    assert!(received.is_err(), "a rejected save must not be broadcast");

    gate.notify_waiters();
    pool.shutdown().await;
    assert_eq!(store.get("order", "1").await.unwrap(), None);
}

/// 测试异步写入在过期时间后失效
#[tokio::test]
async fn test_save_async_honours_ttl() {
    let store = Arc::new(MemoryStore::new());
    let pool = small_pool();
    let service = RemoteCacheService::new(store.clone(), pool.clone(), SerializerEnum::default());

    assert!(service
        .save_async(&["session"], "s", b"1".to_vec(), 50)
        .await
        .unwrap());
    let written = eventually(Duration::from_secs(1), || {
        let store = store.clone();
        async move { store.get("session", "s").await.unwrap().is_some() }
    })
    .await;
    assert!(written);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.get("session", "s").await.unwrap(), None);
    pool.shutdown().await;
}

/// 测试关闭时报告丢弃的任务
#[tokio::test]
async fn test_shutdown_reports_dropped_writes() {
    let pool = Arc::new(WritePool::new(&ExecutorConfig {
        core_size: 1,
        max_size: 1,
        queue_capacity: 8,
        keep_alive_secs: 1,
        await_termination_secs: 1,
        name_prefix: "slow-pool".to_string(),
    }));
    for _ in 0..4 {
        assert!(pool.submit(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }));
    }

    let report = pool.shutdown().await;
    assert!(!report.graceful);
    assert_eq!(report.dropped, 4);
    assert_eq!(report.completed, 0);
    assert!(pool.is_shut_down());

    let again = pool.shutdown().await;
    assert_eq!(again.dropped, 0);
}
