//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis提供者接口和默认实现。

use crate::{
    config::{RedisConfig, RedisMode},
    error::{CacheError, Result},
};
use async_trait::async_trait;
use redis::{
    aio::{ConnectionLike, ConnectionManager},
    cluster::ClusterClient,
    cluster_async::ClusterConnection,
    Client, Cmd, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, Pipeline, ProtocolVersion,
    RedisConnectionInfo, RedisFuture, Value,
};
use secrecy::ExposeSecret;
use tokio::time::timeout;

/// 到共享存储的一条多路复用连接
///
/// 单机模式为自动重连的 `ConnectionManager`，集群模式为按槽路由的集群连接。
#[derive(Clone)]
pub enum StoreConnection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

impl ConnectionLike for StoreConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_command(cmd),
            StoreConnection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConnection::Standalone(conn) => conn.get_db(),
            StoreConnection::Cluster(conn) => conn.get_db(),
        }
    }
}

#[async_trait]
pub trait RedisProvider: Send + Sync {
    /// 建立一条数据连接
    async fn open_connection(&self, config: &RedisConfig) -> Result<StoreConnection>;

    /// 构造用于订阅变更频道的客户端
    ///
    /// 集群中的 PUBLISH 会传播到所有节点，因此订阅任意一个节点即可。
    fn subscriber_client(&self, config: &RedisConfig) -> Result<Client>;
}

pub struct DefaultRedisProvider;

fn connection_info(config: &RedisConfig, host: &str, port: u16) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_string(), port),
        redis: RedisConnectionInfo {
            db: config.database,
            username: None,
            password: config
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string()),
            protocol: ProtocolVersion::RESP2,
        },
    }
}

fn cluster_urls(config: &RedisConfig) -> Vec<String> {
    config
        .cluster_nodes
        .iter()
        .map(|node| node.trim())
        .filter(|node| !node.is_empty())
        .map(|node| {
            if node.starts_with("redis://") {
                node.to_string()
            } else {
                format!("redis://{}", node)
            }
        })
        .collect()
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn open_connection(&self, config: &RedisConfig) -> Result<StoreConnection> {
        match config.mode {
            RedisMode::Standalone => {
                let client = Client::open(connection_info(config, &config.host, config.port))?;
                let manager = timeout(config.timeout(), client.get_connection_manager())
                    .await
                    .map_err(|_| {
                        CacheError::StoreConnectivity(format!(
                            "Connection timed out after {}ms. Target: {}:{}",
                            config.timeout_ms, config.host, config.port
                        ))
                    })??;
                Ok(StoreConnection::Standalone(manager))
            }
            RedisMode::Cluster => {
                let nodes = cluster_urls(config);
                if nodes.is_empty() {
                    return Err(CacheError::StoreConnectivity(
                        "You need to config the redis.cluster_nodes property for cluster mode"
                            .to_string(),
                    ));
                }

                let mut builder = ClusterClient::builder(nodes);
                if let Some(password) = &config.password {
                    builder = builder.password(password.expose_secret().to_string());
                }
                let client = builder.build()?;

                let conn = timeout(config.timeout(), client.get_async_connection())
                    .await
                    .map_err(|_| {
                        CacheError::StoreConnectivity(format!(
                            "Cluster connection timed out after {}ms",
                            config.timeout_ms
                        ))
                    })??;
                Ok(StoreConnection::Cluster(conn))
            }
        }
    }

    fn subscriber_client(&self, config: &RedisConfig) -> Result<Client> {
        let info = match config.mode {
            RedisMode::Standalone => connection_info(config, &config.host, config.port),
            RedisMode::Cluster => {
                let url = cluster_urls(config).into_iter().next().ok_or_else(|| {
                    CacheError::StoreConnectivity(
                        "You need to config the redis.cluster_nodes property for cluster mode"
                            .to_string(),
                    )
                })?;
                let mut info = url.as_str().into_connection_info()?;
                info.redis.password = config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().to_string());
                info
            }
        };
        Ok(Client::open(info)?)
    }
}
