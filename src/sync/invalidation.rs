//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存失效监听器，用于应用其他节点广播的变更事件。

use crate::backend::l1::LocalTierRegistry;
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::sync::bus::{MutationBus, MutationStream};
use crate::sync::event::MutationEvent;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const RESUBSCRIBE_BASE_DELAY_MS: u64 = 500;
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(30);

/// 处理单个事件的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// 本节点发出的事件，已忽略
    IgnoredSelf,
    /// 已在若干个本地命名空间上应用
    Applied { namespaces: usize },
}

/// 计算重新订阅延迟 (指数退避)
fn resubscribe_delay(attempt: u32) -> Duration {
    let delay = RESUBSCRIBE_BASE_DELAY_MS.saturating_mul(2_u64.saturating_pow(attempt));
    Duration::from_millis(delay).min(RESUBSCRIBE_MAX_DELAY)
}

/// 缓存失效监听器
///
/// 只使本地缓存失效，从不回填或重新广播。尚未创建的命名空间直接跳过。
#[derive(Clone)]
pub struct InvalidationListener {
    tiers: Arc<LocalTierRegistry>,
    origin_id: String,
}

impl InvalidationListener {
    pub fn new(tiers: Arc<LocalTierRegistry>, origin_id: impl Into<String>) -> Self {
        Self {
            tiers,
            origin_id: origin_id.into(),
        }
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// 处理一个变更事件
    #[instrument(skip(self, event), level = "debug", fields(origin = %event.origin_id, key = ?event.key))]
    pub async fn on_message(&self, event: &MutationEvent) -> Result<ListenerOutcome> {
        if event.origin_id == self.origin_id {
            debug!("Ignoring mutation event from this node");
            return Ok(ListenerOutcome::IgnoredSelf);
        }
        if event.cache_names.is_empty() {
            return Err(CacheError::Listener(
                "mutation event carries no cache names".to_string(),
            ));
        }

        let mut applied = 0;
        for name in &event.cache_names {
            let hit = match &event.key {
                Some(key) => self.tiers.invalidate(name, key).await,
                None => self.tiers.invalidate_all(name),
            };
            if hit {
                applied += 1;
            }
        }
        debug!(
            "Applied mutation event: names={:?}, key={:?}, local_tiers={}",
            event.cache_names, event.key, applied
        );
        Ok(ListenerOutcome::Applied {
            namespaces: applied,
        })
    }

    async fn handle(&self, item: Result<MutationEvent>) {
        let outcome = match item {
            Ok(event) => self.on_message(&event).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(ListenerOutcome::IgnoredSelf) => {
                GLOBAL_METRICS.record_mutation_event("receive", "ignored");
            }
            Ok(ListenerOutcome::Applied { .. }) => {
                GLOBAL_METRICS.record_mutation_event("receive", "applied");
            }
            Err(e) => {
                GLOBAL_METRICS.record_mutation_event("receive", "error");
                error!("Failed to apply mutation event: {}", e);
            }
        }
    }

    /// 订阅广播通道并在后台处理事件
    ///
    /// 首次订阅失败时直接返回错误；之后通道断开会按指数退避重新订阅，
    /// 断开期间的事件丢失。单个事件处理失败只记录日志，不会终止监听。
    #[instrument(skip(self, bus), level = "info", fields(origin = %self.origin_id))]
    pub async fn spawn(self, bus: Arc<dyn MutationBus>) -> Result<ListenerHandle> {
        let stream = bus.subscribe().await?;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        info!("Invalidation listener subscribed");

        let handle = tokio::spawn(async move {
            self.run(bus, stream, cancelled).await;
        });
        Ok(ListenerHandle { token, handle })
    }

    async fn run(&self, bus: Arc<dyn MutationBus>, mut stream: MutationStream, token: CancellationToken) {
        loop {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Invalidation listener stopped");
                        return;
                    }
                    next = stream.next() => match next {
                        Some(item) => self.handle(item).await,
                        None => break,
                    }
                }
            }

            warn!("Mutation stream closed, resubscribing");
            let mut attempt = 0;
            stream = loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    result = bus.subscribe() => match result {
                        Ok(stream) => {
                            info!("Invalidation listener resubscribed");
                            break stream;
                        }
                        Err(e) => {
                            let delay = resubscribe_delay(attempt);
                            attempt = attempt.saturating_add(1);
                            warn!("Resubscribe failed: {}, retrying in {:?}", e, delay);
                            tokio::select! {
                                _ = token.cancelled() => return,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            };
        }
    }
}

/// 后台监听任务句柄
pub struct ListenerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ListenerHandle {
    /// 停止监听并等待后台任务结束
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Invalidation listener task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
