//! oxtier - 分层缓存库
//!
//! 每个命名空间一个进程内的本地缓存层，位于共享的Redis之前；
//! 写入先落共享存储，再通过发布/订阅广播变更，使其他节点的本地缓存失效。

#![doc(html_root_url = "https://docs.rs/oxtier/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod serialization;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{memory::MemoryStore, RemoteStore};
pub use client::{
    l2::RemoteCacheService, two_level::TieredCacheService, CacheService, CacheServiceExt,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use manager::CacheManager;
pub use sync::{
    bus::MutationBus, event::MutationEvent, invalidation::InvalidationListener,
    local_bus::InProcessBus,
};

/// oxtier 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
