//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 序列化单元测试

use oxtier::serialization::{JsonSerializer, Serializer, SerializerEnum};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Order {
    id: u64,
    status: String,
    lines: Vec<String>,
}

fn sample() -> Order {
    Order {
        id: 123,
        status: "PAID".to_string(),
        lines: vec!["sku-1".into(); 64],
    }
}

#[test]
fn test_json_serializer_round_trip() {
    let serializer = JsonSerializer::new();
    let bytes = serializer.serialize(&sample()).unwrap();
    assert_eq!(bytes[0], b'{');

    let decoded: Order = serializer.deserialize(&bytes).unwrap();
    assert_eq!(decoded, sample());
}

/// 压缩后的值更小，且未开启压缩的节点也能读取
#[test]
fn test_compressed_values_are_readable_by_plain_nodes() {
    let compressing = SerializerEnum::from_compression(true);
    let plain = SerializerEnum::from_compression(false);

    let compressed = compressing.serialize(&sample()).unwrap();
    let uncompressed = plain.serialize(&sample()).unwrap();
    assert!(compressed.len() < uncompressed.len());

    let decoded: Order = plain.deserialize(&compressed).unwrap();
    assert_eq!(decoded, sample());
    let decoded: Order = compressing.deserialize(&uncompressed).unwrap();
    assert_eq!(decoded, sample());
}

#[test]
fn test_invalid_payload_is_a_serialization_error() {
    let serializer = JsonSerializer::new();
    let err = serializer.deserialize::<Order>(b"not json").unwrap_err();
    assert!(matches!(err, oxtier::error::CacheError::Serialization(_)));
}
