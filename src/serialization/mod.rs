//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存值的编解码机制。
//!
//! 缓存核心只处理字节，类型化的读写通过这里的序列化器完成。

pub mod json;

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 序列化器特征
pub trait Serializer: Send + Sync {
    /// 序列化值为字节数组
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// 从字节数组反序列化值
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

/// 序列化器枚举
///
/// 用于在 trait object 中携带序列化器
#[derive(Clone, Debug)]
pub enum SerializerEnum {
    Json(JsonSerializer),
}

impl SerializerEnum {
    /// 根据压缩开关选择编解码器
    pub fn from_compression(use_compression: bool) -> Self {
        if use_compression {
            SerializerEnum::Json(JsonSerializer::with_compression())
        } else {
            SerializerEnum::Json(JsonSerializer::new())
        }
    }
}

impl Default for SerializerEnum {
    fn default() -> Self {
        SerializerEnum::Json(JsonSerializer::new())
    }
}

impl Serializer for SerializerEnum {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerEnum::Json(s) => s.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            SerializerEnum::Json(s) => s.deserialize(data),
        }
    }
}
