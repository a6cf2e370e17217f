//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的日志和链路追踪初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志和 OpenTelemetry Tracing
///
/// 应在应用程序启动时调用一次。`filter` 为空时读取 `RUST_LOG`，
/// 仍未设置时使用 `info`。全局 subscriber 已存在时返回 `false`。
pub fn init_tracing(service_name: &str, filter: Option<&str>) -> bool {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // 未配置导出器，span 只在进程内传播
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(telemetry);

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
