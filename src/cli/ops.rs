//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了读写命令的实现。

use crate::cli::{ClearArgs, DelArgs, GetArgs, SetArgs};
use crate::client::CacheServiceExt;
use crate::manager::CacheManager;
use anyhow::Result;
use serde_json::Value;

fn names(caches: &[String]) -> Vec<&str> {
    caches.iter().map(String::as_str).collect()
}

pub async fn get(manager: &CacheManager, args: &GetArgs) -> Result<()> {
    let service = manager.service();
    match service.get_as::<Value>(&args.cache, &args.key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("(nil)"),
    }
    Ok(())
}

pub async fn set(manager: &CacheManager, args: &SetArgs) -> Result<()> {
    let value: Value =
        serde_json::from_str(&args.value).unwrap_or_else(|_| Value::String(args.value.clone()));
    let service = manager.service();
    let caches = names(&args.caches);

    let accepted = if args.background {
        service
            .save_as_async(&caches, &args.key, &value, args.ttl_ms)
            .await?
    } else {
        service.save_as(&caches, &args.key, &value, args.ttl_ms).await?
    };
    if accepted {
        println!("OK");
    } else {
        println!("REJECTED (write pool saturated)");
    }
    Ok(())
}

pub async fn del(manager: &CacheManager, args: &DelArgs) -> Result<()> {
    manager
        .service()
        .invalidate(&names(&args.caches), &args.key)
        .await?;
    println!("OK");
    Ok(())
}

pub async fn clear(manager: &CacheManager, args: &ClearArgs) -> Result<()> {
    manager
        .service()
        .invalidate_all(&names(&args.caches))
        .await?;
    println!("OK");
    Ok(())
}
