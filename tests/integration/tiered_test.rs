//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 两级缓存集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{
    build_node, eventually, generate_unique_namespace, setup_logging, spawn_node, CountingStore,
    FailingStore, PartialFailStore,
};
use futures::StreamExt;
use oxtier::config::{CacheConfig, TierPolicy};
use oxtier::error::CacheError;
use oxtier::sync::bus::MutationBus;
use oxtier::{CacheManager, CacheService, CacheServiceExt, InProcessBus, MemoryStore, RemoteStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    status: String,
}

/// 测试写入后同节点读取
///
/// 对多个命名空间和键，save 返回后 get 立即得到写入的值
#[tokio::test]
async fn test_save_then_get_on_same_node() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store, bus, TierPolicy::default());

    for ns in ["order", "user", "inventory"] {
        for i in 0..5 {
            let key = format!("k{}", i);
            let value = json!({ "ns": ns, "i": i });
            assert!(node.service.save_as(&[ns], &key, &value, 60_000).await.unwrap());
            let got: Option<serde_json::Value> = node.service.get_as(ns, &key).await.unwrap();
            assert_eq!(got, Some(value));
        }
    }
    node.stop().await;
}

/// 测试多命名空间写入
#[tokio::test]
async fn test_save_populates_every_namespace() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    node.service
        .save(&["a", "b"], "shared", b"\"v\"".to_vec(), 0)
        .await
        .unwrap();

    for ns in ["a", "b"] {
        let tier = node.tiers.get(ns).expect("local tier should exist");
        assert_eq!(tier.get("shared").await, Some(b"\"v\"".to_vec()));
        assert_eq!(
            store.get(ns, "shared").await.unwrap(),
            Some(b"\"v\"".to_vec())
        );
    }
    node.stop().await;
}

/// 测试本地命中不访问共享存储
#[tokio::test]
async fn test_local_hit_skips_shared_store() {
    let store = Arc::new(CountingStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    node.service
        .save(&["order"], "1", b"1".to_vec(), 0)
        .await
        .unwrap();
    for _ in 0..3 {
        assert!(node.service.get("order", "1").await.unwrap().is_some());
    }
    assert_eq!(store.gets(), 0);
    node.stop().await;
}

/// 测试删除单个键
///
/// 删除后两层都不再持有该键
#[tokio::test]
async fn test_invalidate_removes_from_both_tiers() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    node.service
        .save_as(&["order"], "1", &json!("x"), 60_000)
        .await
        .unwrap();
    node.service
        .save_as(&["order"], "2", &json!("y"), 60_000)
        .await
        .unwrap();
    assert!(node.service.invalidate(&["order"], "1").await.unwrap());

    assert_eq!(node.service.get("order", "1").await.unwrap(), None);
    assert_eq!(store.get("order", "1").await.unwrap(), None);
    assert!(node.service.get("order", "2").await.unwrap().is_some());
    node.stop().await;
}

/// 测试清空命名空间
///
/// 写入的至少3个键全部变为不存在，其他命名空间不受影响
#[tokio::test]
async fn test_invalidate_all_clears_namespace() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    let keys = ["a", "b", "c", "d"];
    for key in keys {
        node.service
            .save(&["order"], key, key.as_bytes().to_vec(), 0)
            .await
            .unwrap();
    }
    node.service
        .save(&["user"], "a", b"keep".to_vec(), 0)
        .await
        .unwrap();

    assert!(node.service.invalidate_all(&["order"]).await.unwrap());

    for key in keys {
        assert_eq!(node.service.get("order", key).await.unwrap(), None);
    }
    assert_eq!(store.len("order"), 0);
    assert_eq!(
        node.service.get("user", "a").await.unwrap(),
        Some(b"keep".to_vec())
    );
    node.stop().await;
}

/// 测试未命中且共享存储无值时不创建本地缓存
#[tokio::test]
async fn test_absent_value_populates_nothing() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store, bus, TierPolicy::default());

    assert_eq!(node.service.get("cold", "missing").await.unwrap(), None);
    assert!(node.tiers.get("cold").is_none());
    node.stop().await;
}

/// 测试跨节点失效（端到端）
///
/// 节点B先读取并缓存旧值；节点A写入新值后，B的监听器处理广播，
/// B再次读取时本地未命中并从共享存储取回新值
#[tokio::test]
async fn test_remote_save_invalidates_peer() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node_a = spawn_node("node-a", store.clone(), bus.clone()).await;
    let node_b = spawn_node("node-b", store.clone(), bus.clone()).await;

    let pending = Order {
        status: "PENDING".to_string(),
    };
    node_a
        .service
        .save_as(&["order"], "123", &pending, 60_000)
        .await
        .unwrap();
    let cached: Option<Order> = node_b.service.get_as("order", "123").await.unwrap();
    assert_eq!(cached, Some(pending));
    assert!(node_b.tiers.get("order").is_some());

    let paid = Order {
        status: "PAID".to_string(),
    };
    node_a
        .service
        .save_as(&["order"], "123", &paid, 60_000)
        .await
        .unwrap();

    let tier_b = node_b.tiers.get("order").unwrap();
    let invalidated = eventually(Duration::from_secs(2), || {
        let tier_b = tier_b.clone();
        async move { tier_b.stats().invalidations > 0 }
    })
    .await;
    assert!(invalidated, "node B never applied the mutation event");
    assert_eq!(tier_b.get("123").await, None);

    let fresh: Option<Order> = node_b.service.get_as("order", "123").await.unwrap();
    assert_eq!(fresh, Some(paid));

    node_a.stop().await;
    node_b.stop().await;
}

/// 测试冷缓存并发未命中
///
/// 同一个键的两个并发读取都会查询共享存储，不做合并
#[tokio::test]
async fn test_concurrent_cold_misses_query_store_twice() {
    let store = Arc::new(CountingStore::with_read_delay(Duration::from_millis(50)));
    store.set("order", "999", b"\"v\"", None).await.unwrap();
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    let (first, second) = tokio::join!(
        node.service.get("order", "999"),
        node.service.get("order", "999")
    );
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());
    assert_eq!(store.gets(), 2);
    node.stop().await;
}

/// 测试共享存储失败
///
/// 错误原样返回，本地缓存不写入新值，失效事件照常广播
#[tokio::test]
async fn test_store_failure_skips_local_write() {
    let bus = Arc::new(InProcessBus::default());
    let mut events = bus.subscribe().await.unwrap();
    let node = build_node(
        "node-a",
        Arc::new(FailingStore),
        bus.clone(),
        TierPolicy::default(),
    );

    let err = node
        .service
        .save(&["order"], "1", b"1".to_vec(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::StoreConnectivity(_)));
    assert!(err.is_connectivity());
    assert!(node.tiers.get("order").is_none());

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("failed save should still broadcast an invalidation")
        .unwrap()
        .unwrap();
    assert_eq!(event.cache_names, vec!["order".to_string()]);
    assert_eq!(event.key.as_deref(), Some("1"));

    assert!(node.service.invalidate(&["order"], "1").await.is_err());
    assert!(node.service.get("order", "1").await.is_err());
    node.stop().await;
}

/// 测试部分命名空间失效失败
///
/// 共享存储只对 "bad" 失败："good" 中的键已被删除，
/// 写入节点和其他节点都不能继续返回本地缓存的旧值
#[tokio::test]
async fn test_partial_invalidate_failure_drops_local_copies() {
    setup_logging();
    let store = Arc::new(PartialFailStore::new("bad"));
    let bus = Arc::new(InProcessBus::default());
    let node_a = spawn_node("node-a", store.clone(), bus.clone()).await;
    node_a
        .service
        .save(&["good"], "k", b"\"old\"".to_vec(), 60_000)
        .await
        .unwrap();
    let node_b = spawn_node("node-b", store.clone(), bus.clone()).await;
    assert!(node_b.service.get("good", "k").await.unwrap().is_some());
    let tier_b = node_b.tiers.get("good").unwrap();

    let result = node_a.service.invalidate(&["good", "bad"], "k").await;
    assert!(matches!(result, Err(CacheError::StoreConnectivity(_))));
    assert_eq!(store.get("good", "k").await.unwrap(), None);

    let invalidated = eventually(Duration::from_secs(2), || {
        let tier_b = tier_b.clone();
        async move { tier_b.get("k").await.is_none() }
    })
    .await;
    assert!(invalidated, "node B kept a value deleted from the store");
    assert_eq!(node_b.service.get("good", "k").await.unwrap(), None);
    assert_eq!(node_a.service.get("good", "k").await.unwrap(), None);

    node_a.stop().await;
    node_b.stop().await;
}

/// 测试部分命名空间写入失败
///
/// 其他命名空间仍然写入共享存储，本地缓存不保留新值
#[tokio::test]
async fn test_partial_save_failure_writes_remaining_namespaces() {
    let store = Arc::new(PartialFailStore::new("bad"));
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store.clone(), bus, TierPolicy::default());

    node.service
        .save(&["good"], "k", b"\"old\"".to_vec(), 0)
        .await
        .unwrap();
    assert!(node.service.get("good", "k").await.unwrap().is_some());

    let result = node
        .service
        .save(&["bad", "good"], "k", b"\"new\"".to_vec(), 0)
        .await;
    assert!(result.is_err());
    assert_eq!(
        store.get("good", "k").await.unwrap(),
        Some(b"\"new\"".to_vec())
    );
    assert_eq!(node.tiers.get("good").unwrap().get("k").await, None);
    assert_eq!(
        node.service.get("good", "k").await.unwrap(),
        Some(b"\"new\"".to_vec())
    );

    let cleared = node.service.invalidate_all(&["good", "bad"]).await;
    assert!(cleared.is_err());
    assert_eq!(store.get("good", "k").await.unwrap(), None);
    assert_eq!(node.service.get("good", "k").await.unwrap(), None);
    node.stop().await;
}

/// 测试两级缓存不支持异步失效
#[tokio::test]
async fn test_async_invalidation_not_supported() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InProcessBus::default());
    let node = build_node("node-a", store, bus, TierPolicy::default());

    assert!(matches!(
        node.service.invalidate_async(&["order"], "1").await,
        Err(CacheError::NotSupported(_))
    ));
    assert!(matches!(
        node.service.invalidate_all_async(&["order"]).await,
        Err(CacheError::NotSupported(_))
    ));
    node.stop().await;
}

/// 测试缓存管理器组装两级缓存
#[tokio::test]
async fn test_manager_assembles_tiered_service() {
    setup_logging();
    let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());
    let bus: Arc<dyn MutationBus> = Arc::new(InProcessBus::default());
    let config = CacheConfig::default();
    let ns = generate_unique_namespace("manager");

    let manager = CacheManager::assemble_as(config, store.clone(), Some(bus), "manager-node")
        .await
        .unwrap();
    let tiered = manager.tiered().expect("two-level is enabled by default");
    assert_eq!(tiered.origin_id(), "manager-node");

    let service = manager.service();
    service.save_as(&[ns.as_str()], "k", &json!(1), 0).await.unwrap();
    let got: Option<i32> = service.get_as(&ns, "k").await.unwrap();
    assert_eq!(got, Some(1));
    assert!(store.get(&ns, "k").await.unwrap().is_some());

    let report = manager.shutdown().await.unwrap();
    assert!(report.graceful);
    assert_eq!(report.dropped, 0);
}

/// 测试关闭两级缓存时只使用共享存储
#[tokio::test]
async fn test_manager_remote_only() {
    let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());
    let config = CacheConfig {
        enable_two_level: false,
        ..CacheConfig::default()
    };

    let manager = CacheManager::assemble(config, store.clone(), None)
        .await
        .unwrap();
    assert!(manager.tiered().is_none());

    let service = manager.service();
    service.save(&["r"], "k", b"1".to_vec(), 0).await.unwrap();
    assert!(service.invalidate_async(&["r"], "k").await.unwrap());
    let removed = eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.get("r", "k").await.unwrap().is_none() }
    })
    .await;
    assert!(removed);
    manager.shutdown().await.unwrap();
}
