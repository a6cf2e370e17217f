//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的同步机制，包括变更广播、失效监听和异步写入池。

pub mod bus;
pub mod event;
pub mod invalidation;
pub mod local_bus;
pub mod write_pool;
