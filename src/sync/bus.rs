//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了变更事件广播通道的接口及其Redis发布/订阅实现。

use crate::backend::l2::RedisStore;
use crate::error::Result;
use crate::sync::event::MutationEvent;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, instrument};

/// 变更事件流
pub type MutationStream = BoxStream<'static, Result<MutationEvent>>;

/// 变更事件广播通道
///
/// 尽力而为、至多一次的投递：不持久化、不重放，订阅前或断线期间发布的事件会丢失。
#[async_trait]
pub trait MutationBus: Send + Sync {
    /// 发布事件，返回收到事件的订阅者数量
    async fn publish(&self, event: &MutationEvent) -> Result<usize>;

    /// 订阅事件
    ///
    /// 返回时订阅已经生效，之后发布的事件都会出现在流中。
    async fn subscribe(&self) -> Result<MutationStream>;
}

/// 基于Redis发布/订阅的广播通道
pub struct RedisBus {
    store: Arc<RedisStore>,
    subscriber: redis::Client,
    topic: String,
}

impl RedisBus {
    pub fn new(store: Arc<RedisStore>, topic: impl Into<String>) -> Result<Self> {
        let subscriber = store.subscriber_client()?;
        Ok(Self {
            store,
            subscriber,
            topic: topic.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MutationBus for RedisBus {
    #[instrument(skip(self, event), level = "debug", fields(topic = %self.topic))]
    async fn publish(&self, event: &MutationEvent) -> Result<usize> {
        let payload = event.encode()?;
        let receivers = self.store.publish(&self.topic, &payload).await?;
        debug!(
            "Published mutation event: names={:?}, key={:?}, receivers={}",
            event.cache_names, event.key, receivers
        );
        Ok(receivers)
    }

    #[instrument(skip(self), level = "debug", fields(topic = %self.topic))]
    async fn subscribe(&self) -> Result<MutationStream> {
        let mut pubsub = self.subscriber.get_async_pubsub().await?;
        pubsub.subscribe(&self.topic).await?;
        debug!("Subscribed to mutation topic {}", self.topic);

        let stream = pubsub.into_on_message().map(|msg| {
            let payload: Vec<u8> = msg.get_payload()?;
            MutationEvent::decode(&payload)
        });
        Ok(stream.boxed())
    }
}
