#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A bus service that survives restarts of the bus daemon.
//! 能够在总线守护进程重启后存活的总线服务。

pub mod bus;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod lifecycle;
pub mod object;
pub mod service;

pub use error::{Error, Result};
pub use service::run_service;
