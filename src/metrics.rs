//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储缓存系统的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "namespace:layer:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时（累积时间和计数）
    /// key: "namespace:layer:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
    /// 异步写入池中未完成的任务数
    pub pool_pending: Arc<Mutex<HashMap<String, usize>>>,
    /// 变更事件统计
    /// key: "direction:result"，如 "publish:error"、"receive:applied"
    pub mutation_events: Arc<Mutex<HashMap<String, u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `namespace` - 命名空间
    /// * `layer` - 缓存层（L1/L2）
    /// * `op` - 操作类型（get/save/invalidate/clear）
    /// * `result` - 操作结果（hit/miss/ok/error）
    pub fn record_request(&self, namespace: &str, layer: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "cache_request", namespace, layer, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}:{}", namespace, layer, op, result);
        *lock(&self.requests_total).entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, namespace: &str, layer: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}:{}", namespace, layer, op);
        let mut map = lock(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置写入池未完成任务数
    pub fn set_pool_pending(&self, pool: &str, pending: usize) {
        lock(&self.pool_pending).insert(pool.to_string(), pending);
    }

    /// 记录变更事件
    pub fn record_mutation_event(&self, direction: &str, result: &str) {
        let key = format!("{}:{}", direction, result);
        *lock(&self.mutation_events).entry(key).or_insert(0) += 1;
    }

    /// 读取请求计数，不存在时为0
    pub fn request_count(&self, namespace: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", namespace, layer, op, result);
        lock(&self.requests_total).get(&key).copied().unwrap_or(0)
    }

    /// 读取变更事件计数，不存在时为0
    pub fn mutation_event_count(&self, direction: &str, result: &str) -> u64 {
        let key = format!("{}:{}", direction, result);
        lock(&self.mutation_events).get(&key).copied().unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本格式返回，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let reqs = lock(&metrics.requests_total);
    let dur = lock(&metrics.operation_duration);
    let pending = lock(&metrics.pool_pending);
    let events = lock(&metrics.mutation_events);

    let mut output = String::new();
    for (k, v) in reqs.iter() {
        let parts: Vec<&str> = k.rsplitn(4, ':').collect();
        if let [result, op, layer, namespace] = parts.as_slice() {
            output.push_str(&format!(
                "cache_requests_total{{namespace=\"{}\", layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}\n",
                namespace, layer, op, result, v
            ));
        }
    }
    for (k, (total, count)) in dur.iter() {
        let parts: Vec<&str> = k.rsplitn(3, ':').collect();
        if let [op, layer, namespace] = parts.as_slice() {
            output.push_str(&format!(
                "cache_operation_duration_seconds_sum{{namespace=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                namespace, layer, op, total
            ));
            output.push_str(&format!(
                "cache_operation_duration_seconds_count{{namespace=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                namespace, layer, op, count
            ));
        }
    }
    for (k, v) in pending.iter() {
        output.push_str(&format!("cache_write_pool_pending{{pool=\"{}\"}} {}\n", k, v));
    }
    for (k, v) in events.iter() {
        if let Some((direction, result)) = k.split_once(':') {
            output.push_str(&format!(
                "cache_mutation_events_total{{direction=\"{}\", result=\"{}\"}} {}\n",
                direction, result, v
            ));
        }
    }
    output
}
