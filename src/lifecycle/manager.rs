//! 连接生命周期管理器 - 唯一可以替换当前连接的实体
//! Connection Lifecycle Manager - The only entity allowed to replace the current connection
//!
//! 该模块将连接工厂、对象发布、名称申请和断开监视串联成（重新）设置流程，
//! 并在传输断开时重建整个连接状态。
//!
//! This module chains the connection factory, object publishing, name claiming
//! and disconnect watching into the (re)setup sequence, and rebuilds the whole
//! connection state whenever the transport is severed.

use super::{
    BusConnectionFactory, DisconnectWatcher, LifecycleState, NameClaimer, ObjectPublisher,
    StateManager, check,
};
use crate::{
    bus::{Bus, BusConnection, HandleId},
    config::Config,
    error::{Error, Result, SetupStep},
    event_loop::{EventLoop, LoopEvent, ShutdownReason},
    object::ServiceObject,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Owns the current connection handle and the event loop it is attached to.
///
/// 拥有当前连接句柄及其所附加的事件循环。
pub struct ConnectionLifecycleManager<B: Bus> {
    // Field order is drop order: the connection is released before the loop.
    /// 当前连接（可能为空）
    /// The current connection (may be empty)
    current: Option<B::Connection>,
    event_loop: EventLoop,
    state: StateManager,
    bus: B,
    config: Config,
    object: Arc<ServiceObject>,
    rebuilds: u64,
}

impl<B: Bus> ConnectionLifecycleManager<B> {
    /// 创建新的生命周期管理器
    /// Create a new lifecycle manager
    pub fn new(bus: B, config: Config, event_loop: EventLoop) -> Self {
        let object = Arc::new(ServiceObject::new(&config.service));
        Self {
            current: None,
            event_loop,
            state: StateManager::new(),
            bus,
            config,
            object,
            rebuilds: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current_state()
    }

    /// 当前连接句柄的ID
    /// Id of the current connection handle
    pub fn current_handle(&self) -> Option<HandleId> {
        self.current.as_ref().map(BusConnection::id)
    }

    /// 由断开通知触发的重建次数
    /// Number of rebuilds triggered by disconnect notifications
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    #[cfg(test)]
    pub(crate) fn event_loop_mut(&mut self) -> &mut EventLoop {
        &mut self.event_loop
    }

    pub fn object(&self) -> &ServiceObject {
        &self.object
    }

    /// (Re)builds the connection: tears down the previous handle (detach,
    /// then close), creates a new one, publishes the object, claims the name,
    /// arms the disconnect watcher and attaches the handle to the loop last.
    ///
    /// Any failure is fatal to the process; the caller must not retry.
    ///
    /// （重新）构建连接：拆除旧句柄（先分离，再关闭），创建新句柄，发布对象，
    /// 申请名称，设置断开监视器，最后将句柄附加到事件循环。
    ///
    /// 任何失败对进程而言都是致命的；调用方不得重试。
    pub fn setup(&mut self) -> Result<()> {
        let result = self.build();
        if let Err(e) = &result {
            error!(error = %e, "Connection setup failed");
            if self.state.current_state() == LifecycleState::Building {
                self.state.transition_to(LifecycleState::Empty)?;
            }
        }
        result
    }

    fn build(&mut self) -> Result<()> {
        if let Some(previous) = self.current.take() {
            self.teardown(previous)?;
        }

        self.state.transition_to(LifecycleState::Building)?;
        let mut connection =
            BusConnectionFactory::new(&self.bus, &self.config.connection).create()?;
        let handle = connection.id();

        ObjectPublisher::publish(&mut connection, &self.object)?;
        NameClaimer::claim_async(&mut connection, &self.config.service.well_known_name)?;
        DisconnectWatcher::arm_async(&mut connection, &self.event_loop.handle())?;
        check(
            handle,
            SetupStep::AttachEvent,
            connection.attach_event(&mut self.event_loop),
        )?;

        self.current = Some(connection);
        self.state.transition_to(LifecycleState::Live)?;
        info!(
            %handle,
            name = %self.config.service.well_known_name,
            path = %self.object.object_path(),
            "Connection attached to event loop"
        );
        Ok(())
    }

    /// Detaches, then closes. The handle is closed even if detaching fails.
    ///
    /// 先分离，再关闭。即使分离失败，句柄也会被关闭。
    fn teardown(&mut self, mut previous: B::Connection) -> Result<()> {
        let handle = previous.id();
        let detached = check(
            handle,
            SetupStep::DetachEvent,
            previous.detach_event(&mut self.event_loop),
        );
        previous.close();
        self.state.transition_to(LifecycleState::Empty)?;
        detached?;
        debug!(%handle, "Previous connection detached and closed");
        Ok(())
    }

    /// Dispatches events until the loop is told to stop.
    ///
    /// 分派事件，直到循环被告知停止。
    pub async fn run(&mut self) -> Result<ShutdownReason> {
        info!(handle = ?self.current_handle(), "Entering event loop");
        loop {
            let event = self
                .event_loop
                .next_event()
                .await
                .ok_or(Error::EventLoopClosed)?;
            if let Some(reason) = self.dispatch(event)? {
                return Ok(reason);
            }
        }
    }

    /// Handles one event. Returns the shutdown reason once the loop must stop.
    ///
    /// 处理单个事件。当循环必须停止时返回关闭原因。
    pub fn dispatch(&mut self, event: LoopEvent) -> Result<Option<ShutdownReason>> {
        match event {
            LoopEvent::Disconnected { handle } => {
                if self.current_handle() != Some(handle) {
                    warn!(
                        %handle,
                        current = ?self.current_handle(),
                        "Ignoring disconnect notification from a replaced handle"
                    );
                    return Ok(None);
                }
                self.rebuilds += 1;
                info!(%handle, rebuild = self.rebuilds, "Bus connection lost, rebuilding");
                self.setup()?;
                Ok(None)
            }
            LoopEvent::Shutdown(reason) => {
                info!(?reason, "Leaving event loop");
                Ok(Some(reason))
            }
        }
    }

    /// Releases the well-known name, then detaches, flushes and closes the
    /// handle. The loop is dropped last, with the manager.
    ///
    /// A failed release is returned as `Error::ReleaseName`, but only after
    /// the handle has been closed.
    ///
    /// 释放知名名称，然后分离、刷新并关闭句柄。事件循环随管理器最后被释放。
    /// 释放失败会以 `Error::ReleaseName` 返回，但只在句柄关闭之后。
    pub async fn shutdown(mut self) -> Result<()> {
        self.state.transition_to(LifecycleState::ShuttingDown)?;
        let Some(mut connection) = self.current.take() else {
            return Ok(());
        };
        let handle = connection.id();
        let name = self.config.service.well_known_name.clone();

        let released = connection.release_name(&name).await;
        if let Err(e) = &released {
            error!(%handle, %name, error = %e, "Failed to release well-known name");
        }
        if let Err(e) = connection.detach_event(&mut self.event_loop) {
            warn!(%handle, error = %e, "Failed to detach connection");
        }
        connection.flush_close().await?;
        info!(%handle, "Connection closed");

        released.map_err(|cause| Error::ReleaseName { name, cause })
    }
}
