//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了变更事件监听命令的实现。

use crate::manager::CacheManager;
use anyhow::{anyhow, Result};
use futures::StreamExt;

pub async fn execute(manager: &CacheManager) -> Result<()> {
    let bus = manager
        .bus()
        .ok_or_else(|| anyhow!("Mutation events require enable_two_level = true"))?;
    let mut stream = bus.subscribe().await?;
    println!("Listening on topic '{}', press Ctrl-C to stop", manager.config().topic);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    let key = event.key.as_deref().unwrap_or("*");
                    println!("{} {:?} {}", event.origin_id, event.cache_names, key);
                }
                Some(Err(e)) => eprintln!("error: {}", e),
                None => break,
            }
        }
    }
    Ok(())
}
