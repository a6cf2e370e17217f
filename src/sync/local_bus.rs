//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的变更事件广播通道。

use crate::error::{CacheError, Result};
use crate::sync::bus::{MutationBus, MutationStream};
use crate::sync::event::MutationEvent;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

/// 进程内广播通道
///
/// 用于同一进程内的多个缓存节点（测试、单进程部署）。
/// 订阅者落后超过容量时丢失最早的事件，流中产生一个错误项。
#[derive(Clone)]
pub struct InProcessBus {
    sender: broadcast::Sender<MutationEvent>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MutationBus for InProcessBus {
    async fn publish(&self, event: &MutationEvent) -> Result<usize> {
        // 没有订阅者不算错误
        Ok(self.sender.send(event.clone()).unwrap_or(0))
    }

    async fn subscribe(&self) -> Result<MutationStream> {
        let receiver = self.sender.subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(RecvError::Lagged(skipped)) => Some((
                    Err(CacheError::Listener(format!(
                        "subscriber lagged, {} mutation events lost",
                        skipped
                    ))),
                    receiver,
                )),
                Err(RecvError::Closed) => None,
            }
        });
        Ok(stream.boxed())
    }
}
