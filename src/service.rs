//! The process body: loop, signals, setup, dispatch, shutdown.
//!
//! 进程主体：事件循环、信号、设置、分派、关闭。

use crate::{
    bus::Bus,
    config::Config,
    error::Result,
    event_loop::{EventLoop, ShutdownReason, ShutdownSignal},
    lifecycle::ConnectionLifecycleManager,
};
use tracing::info;

/// Runs the service on `bus` until SIGINT or SIGTERM.
///
/// A failing first `setup()` returns before the loop is entered; a failing
/// rebuild stops the loop. Both are fatal. On a clean stop the well-known
/// name is released and the handle closed before returning.
///
/// 在 `bus` 上运行服务，直到收到 SIGINT 或 SIGTERM。
///
/// 首次 `setup()` 失败会在进入循环前返回；重建失败会停止循环。两者都是致命的。
/// 正常停止时，在返回前会释放知名名称并关闭句柄。
pub async fn run_service<B: Bus>(bus: B, config: Config) -> Result<ShutdownReason> {
    let mut event_loop = EventLoop::new();
    // Without a source the loop would have nothing to wait on between connections.
    event_loop.add_signal(ShutdownSignal::Interrupt)?;
    event_loop.add_signal(ShutdownSignal::Terminate)?;

    let mut manager = ConnectionLifecycleManager::new(bus, config, event_loop);
    manager.setup()?;

    let reason = manager.run().await?;
    info!(?reason, rebuilds = manager.rebuild_count(), "Shutting down");
    manager.shutdown().await?;
    Ok(reason)
}
