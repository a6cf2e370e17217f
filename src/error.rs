//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分层缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 远端存储错误在同步调用中原样传递给调用方；
/// 广播和监听器错误只在本地记录，不会影响写入结果。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// 共享存储不可达或连接失败
    #[error("Store connectivity error: {0}")]
    StoreConnectivity(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 变更事件广播失败
    #[error("Broadcast delivery error: {0}")]
    Broadcast(String),

    /// 应用远端变更事件失败
    #[error("Listener application error: {0}")]
    Listener(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl CacheError {
    /// 是否属于共享存储连通性错误（包括超时）
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CacheError::StoreConnectivity(_) | CacheError::RedisError(_) | CacheError::Timeout(_)
        )
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
