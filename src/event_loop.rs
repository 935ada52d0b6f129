//! The single cooperative event loop that drives the service.
//!
//! All callbacks arrive here as `LoopEvent`s and are dispatched one at a
//! time on the loop's thread, so the connection slot needs no locking.
//!
//! 驱动服务的单一协作式事件循环。
//!
//! 所有回调都以 `LoopEvent` 的形式到达这里，并在循环线程上逐个分派，
//! 因此连接槽位不需要任何锁。

use crate::{
    bus::HandleId,
    error::{BusError, BusResult, Error, Result},
};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, trace};

/// The process signals that stop the loop.
/// 使循环停止的进程信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    fn kind(&self) -> SignalKind {
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
        }
    }
}

/// Why the loop stopped.
/// 循环停止的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT was delivered.
    Interrupt,
    /// SIGTERM was delivered.
    Terminate,
    /// `EventLoopHandle::request_exit` was called.
    Requested,
}

impl From<ShutdownSignal> for ShutdownReason {
    fn from(signal: ShutdownSignal) -> Self {
        match signal {
            ShutdownSignal::Interrupt => ShutdownReason::Interrupt,
            ShutdownSignal::Terminate => ShutdownReason::Terminate,
        }
    }
}

/// Events dispatched by the loop.
///
/// 由循环分派的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// The local transport of `handle` was severed.
    /// `handle` 的本地传输已断开。
    Disconnected { handle: HandleId },
    /// The loop must stop.
    /// 循环必须停止。
    Shutdown(ShutdownReason),
}

/// A cloneable sender into the loop.
///
/// 指向事件循环的可克隆发送端。
#[derive(Debug, Clone)]
pub struct EventLoopHandle {
    tx: mpsc::UnboundedSender<LoopEvent>,
}

impl EventLoopHandle {
    /// Asks the loop to stop. Returns `false` if the loop is already gone.
    ///
    /// 请求循环停止。如果循环已不存在则返回 `false`。
    pub fn request_exit(&self) -> bool {
        self.send(LoopEvent::Shutdown(ShutdownReason::Requested))
    }

    /// Creates the one-shot notifier for `handle`'s disconnect notification.
    /// 为 `handle` 的断开通知创建一次性通知器。
    pub fn disconnect_notifier(&self, handle: HandleId) -> DisconnectNotifier {
        DisconnectNotifier {
            handle,
            events: self.clone(),
        }
    }

    fn send(&self, event: LoopEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Fires at most once: `notify` consumes it, and dropping it unfired is how a
/// closed handle stays silent.
///
/// 最多触发一次：`notify` 会消耗它，而未触发就被丢弃正是已关闭句柄保持静默的方式。
#[derive(Debug)]
pub struct DisconnectNotifier {
    handle: HandleId,
    events: EventLoopHandle,
}

impl DisconnectNotifier {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn notify(self) {
        trace!(handle = %self.handle, "Delivering local disconnect notification");
        if !self.events.send(LoopEvent::Disconnected {
            handle: self.handle,
        }) {
            debug!(handle = %self.handle, "Event loop gone, dropping disconnect notification");
        }
    }
}

/// The process-wide event loop. Created before any connection exists and
/// outlives every one of them.
///
/// 进程级事件循环。在任何连接存在之前创建，并且比所有连接存活得更久。
#[derive(Debug)]
pub struct EventLoop {
    tx: mpsc::UnboundedSender<LoopEvent>,
    rx: mpsc::UnboundedReceiver<LoopEvent>,
    signal_sources: Vec<JoinHandle<()>>,
    attached: Option<HandleId>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            signal_sources: Vec::new(),
            attached: None,
        }
    }

    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Registers a signal source that turns `signal` into a shutdown event.
    /// Must be called from within the tokio runtime.
    ///
    /// 注册一个信号源，将 `signal` 转换为关闭事件。必须在tokio运行时内调用。
    pub fn add_signal(&mut self, signal_kind: ShutdownSignal) -> Result<()> {
        let mut stream = signal(signal_kind.kind()).map_err(Error::Signal)?;
        let events = self.handle();
        let task = tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!(signal = ?signal_kind, "Signal received");
                if !events.send(LoopEvent::Shutdown(signal_kind.into())) {
                    break;
                }
            }
        });
        self.signal_sources.push(task);
        debug!(signal = ?signal_kind, "Signal source registered");
        Ok(())
    }

    /// Waits for the next event. Suspension happens only here.
    ///
    /// 等待下一个事件。只会在这里挂起。
    pub async fn next_event(&mut self) -> Option<LoopEvent> {
        self.rx.recv().await
    }

    /// Takes an already queued event without waiting.
    /// 在不等待的情况下取出一个已排队的事件。
    pub fn try_next_event(&mut self) -> Option<LoopEvent> {
        self.rx.try_recv().ok()
    }

    /// The handle currently attached, if any.
    /// 当前附加的句柄（如果有）。
    pub fn attached(&self) -> Option<HandleId> {
        self.attached
    }

    /// Claims the loop's single bus slot for `handle`.
    ///
    /// 为 `handle` 占用循环唯一的总线槽位。
    pub fn attach_source(&mut self, handle: HandleId) -> BusResult<EventLoopHandle> {
        match self.attached {
            Some(current) if current != handle => Err(BusError::AlreadyAttached(current)),
            _ => {
                self.attached = Some(handle);
                trace!(%handle, "Bus source attached to event loop");
                Ok(self.handle())
            }
        }
    }

    pub fn detach_source(&mut self, handle: HandleId) -> BusResult<()> {
        match self.attached {
            Some(current) if current == handle => {
                self.attached = None;
                trace!(%handle, "Bus source detached from event loop");
                Ok(())
            }
            _ => Err(BusError::NotAttached(handle)),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        for task in self.signal_sources.drain(..) {
            task.abort();
        }
    }
}
