//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨节点传播的变更事件及节点标识。

use crate::error::{CacheError, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static! {
    static ref NODE_ID: String = Uuid::new_v4().to_string();
}

/// 当前进程的节点标识
///
/// 进程启动时生成一次，之后不变。
pub fn node_id() -> &'static str {
    NODE_ID.as_str()
}

/// 变更事件
///
/// 线上格式为JSON：`{"originId": ..., "cacheNames": [...], "key": ... | null}`，
/// `key` 为 `null` 表示清空这些命名空间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// 发出事件的节点
    pub origin_id: String,
    /// 受影响的命名空间
    pub cache_names: Vec<String>,
    /// 受影响的键
    pub key: Option<String>,
}

impl MutationEvent {
    pub fn new(origin_id: &str, cache_names: &[&str], key: Option<&str>) -> Self {
        Self {
            origin_id: origin_id.to_string(),
            cache_names: cache_names.iter().map(|n| n.to_string()).collect(),
            key: key.map(str::to_string),
        }
    }

    pub fn is_clear_all(&self) -> bool {
        self.key.is_none()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
