//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态查询命令的实现。
//!
//! 状态命令自行连接共享存储，连接失败时照常输出配置并标记存储不可达。

use crate::cli::StatusArgs;
use crate::config::CacheConfig;
use crate::manager::CacheManager;
use crate::metrics::get_metrics_string;
use crate::sync::event::node_id;
use anyhow::Result;
use std::fmt::Write;

pub async fn execute(config: CacheConfig, args: &StatusArgs) -> Result<()> {
    let (store, node, manager) = match CacheManager::start(config.clone()).await {
        Ok(manager) => {
            let store = manager.store().ping().await.map_err(|e| e.to_string());
            let node = manager
                .tiered()
                .map(|tiered| tiered.origin_id().to_string())
                .unwrap_or_else(|| node_id().to_string());
            (store, node, Some(manager))
        }
        Err(e) => (Err(e.to_string()), node_id().to_string(), None),
    };

    print!("{}", render_report(&config, &store, &node));
    if args.metrics {
        println!("\n=== Metrics ===\n");
        print!("{}", get_metrics_string());
    }

    if let Some(manager) = manager {
        manager.shutdown().await?;
    }
    Ok(())
}

fn render_report(
    config: &CacheConfig,
    store: &std::result::Result<(), String>,
    node: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Cache Status ===\n");
    let _ = writeln!(out, "Mode:        {:?}", config.redis.mode);
    let _ = writeln!(out, "Two-level:   {}", config.enable_two_level);
    let _ = writeln!(out, "Topic:       {}", config.topic);
    let _ = writeln!(out, "Compression: {}", config.redis.use_compression);

    match store {
        Ok(()) => {
            let _ = writeln!(out, "Store:       ✅ REACHABLE");
        }
        Err(e) => {
            let _ = writeln!(out, "Store:       ❌ UNREACHABLE ({})", e);
        }
    }

    if config.enable_two_level {
        let _ = writeln!(out, "Node:        {}", node);
        match config.local.staleness_bound() {
            Some(bound) => {
                let _ = writeln!(out, "Staleness:   <= {:?}", bound);
            }
            None => {
                let _ = writeln!(out, "Staleness:   unbounded (no local expiry configured)");
            }
        }
    }
    out
}
