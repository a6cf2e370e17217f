//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了异步写入池，用于在后台执行对共享存储的写入。

use crate::config::ExecutorConfig;
use crate::metrics::GLOBAL_METRICS;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

type Job = BoxFuture<'static, ()>;

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// 已完成的任务数
    pub completed: u64,
    /// 因超时被丢弃的任务数
    pub dropped: usize,
    /// 是否在等待时间内排空
    pub graceful: bool,
}

struct PoolShared {
    name: String,
    receiver: Mutex<mpsc::Receiver<Job>>,
    live_workers: AtomicUsize,
    pending: AtomicUsize,
    completed: AtomicU64,
    next_worker_id: AtomicUsize,
}

impl PoolShared {
    async fn run_job(&self, job: Job) {
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!("Write pool {} job panicked", self.name);
        }
        let pending = self.pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        self.completed.fetch_add(1, Ordering::Relaxed);
        GLOBAL_METRICS.set_pool_pending(&self.name, pending);
    }

    /// 常驻工作任务一直等待，非常驻工作任务空闲超过 `idle` 后退出
    async fn work(&self, idle: Option<Duration>, first: Option<Job>) {
        if let Some(job) = first {
            self.run_job(job).await;
        }
        loop {
            let next = match idle {
                Some(idle) => {
                    match timeout(idle, async { self.receiver.lock().await.recv().await }).await {
                        Ok(next) => next,
                        Err(_) => {
                            debug!("Idle worker retired");
                            break;
                        }
                    }
                }
                None => self.receiver.lock().await.recv().await,
            };
            match next {
                Some(job) => self.run_job(job).await,
                None => break,
            }
        }
    }
}

/// 异步写入池
///
/// `core_size` 个常驻工作任务从有界队列取任务执行；队列满时临时增加工作任务，
/// 总数不超过 `max_size`，空闲 `keep_alive` 后退出。仍然无法容纳时拒绝提交。
pub struct WritePool {
    shared: Arc<PoolShared>,
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    tracker: TaskTracker,
    token: CancellationToken,
    max_size: usize,
    keep_alive: Duration,
    await_termination: Duration,
}

impl WritePool {
    /// 创建写入池并启动常驻工作任务，需要在Tokio运行时中调用
    pub fn new(config: &ExecutorConfig) -> Self {
        let core_size = config.core_size.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let pool = Self {
            shared: Arc::new(PoolShared {
                name: config.name_prefix.clone(),
                receiver: Mutex::new(receiver),
                live_workers: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                next_worker_id: AtomicUsize::new(0),
            }),
            sender: RwLock::new(Some(sender)),
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            max_size: config.max_size.max(core_size),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            await_termination: Duration::from_secs(config.await_termination_secs),
        };
        for _ in 0..core_size {
            pool.shared.live_workers.fetch_add(1, Ordering::AcqRel);
            pool.spawn_worker(None, None);
        }
        info!(
            "Write pool {} started: core={}, max={}, queue={}",
            config.name_prefix, core_size, pool.max_size, config.queue_capacity
        );
        pool
    }

    fn spawn_worker(&self, idle: Option<Duration>, first: Option<Job>) {
        let id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!("write_worker", worker = %format!("{}-{}", self.shared.name, id));
        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();
        self.tracker.spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => debug!("Worker cancelled"),
                    _ = shared.work(idle, first) => {}
                }
                shared.live_workers.fetch_sub(1, Ordering::AcqRel);
            }
            .instrument(span),
        );
    }

    /// 尝试增加一个非常驻工作任务并交给它第一个任务
    fn try_spawn_overflow(&self, job: Job) -> std::result::Result<(), Job> {
        let reserved = self
            .shared
            .live_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_size).then_some(live + 1)
            });
        match reserved {
            Ok(_) => {
                self.spawn_worker(Some(self.keep_alive), Some(job));
                Ok(())
            }
            Err(_) => Err(job),
        }
    }

    /// 提交任务，不等待执行
    ///
    /// 被接受时返回 `true`；池已满或已关闭时返回 `false`。
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            warn!("Write pool {} is shut down, rejecting job", self.shared.name);
            return false;
        };

        let pending = self.shared.pending.fetch_add(1, Ordering::AcqRel) + 1;
        let accepted = match sender.try_send(job.boxed()) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => self.try_spawn_overflow(job).is_ok(),
            Err(TrySendError::Closed(_)) => false,
        };
        if accepted {
            GLOBAL_METRICS.set_pool_pending(&self.shared.name, pending);
        } else {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(
                "Write pool {} saturated ({} workers), rejecting job",
                self.shared.name,
                self.live_workers()
            );
        }
        accepted
    }

    /// 排队和执行中的任务数
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// 关闭写入池
    ///
    /// 停止接受新任务，等待已有任务在 `await_termination` 内完成；
    /// 超时后取消剩余任务并报告丢弃的数量。重复调用立即返回。
    pub async fn shutdown(&self) -> ShutdownReport {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
        self.tracker.close();

        let graceful = timeout(self.await_termination, self.tracker.wait())
            .await
            .is_ok();
        let dropped = if graceful {
            0
        } else {
            self.token.cancel();
            if timeout(Duration::from_secs(1), self.tracker.wait())
                .await
                .is_err()
            {
                warn!("Write pool {} workers did not stop after cancel", self.shared.name);
            }
            self.shared.pending.swap(0, Ordering::AcqRel)
        };

        let report = ShutdownReport {
            completed: self.completed(),
            dropped,
            graceful,
        };
        if dropped > 0 {
            warn!(
                "Write pool {} shut down forcibly, {} tasks will not be executed",
                self.shared.name, dropped
            );
        } else {
            info!("Write pool {} shut down", self.shared.name);
        }
        GLOBAL_METRICS.set_pool_pending(&self.shared.name, 0);
        report
    }
}

impl Drop for WritePool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
