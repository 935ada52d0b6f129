//! Traits for abstracting over bus-client implementations.
use super::{BusAddress, CredentialFlags, HandleId};
use crate::{
    error::BusResult,
    event_loop::{DisconnectNotifier, EventLoop},
    object::InterfaceDescriptor,
};
use async_trait::async_trait;
use std::sync::Arc;

/// A source of fresh connection handles.
///
/// This trait allows for abstracting over the underlying bus client,
/// enabling an in-memory bus for testing and a real system bus in production.
///
/// 新连接句柄的来源。
///
/// 此trait允许对底层总线客户端进行抽象，从而可以在测试中使用内存总线，在生产中使用真实的系统总线。
pub trait Bus: Send + Sync + 'static {
    type Connection: BusConnection;

    /// Allocates a new, unconfigured handle. Performs no I/O.
    /// 分配一个新的、未配置的句柄。不执行任何I/O。
    fn new_connection(&self) -> BusResult<Self::Connection>;
}

/// One attempt at a live transport session.
///
/// Every method except `release_name` and `flush_close` is non-blocking: it
/// either completes against local state or queues work that the event loop
/// drives once the handle is attached. A handle is never reused after
/// `close`; dropping a handle closes it as well.
///
/// 一次建立活动传输会话的尝试。
///
/// 除 `release_name` 和 `flush_close` 外，所有方法都是非阻塞的：要么立即在本地状态上完成，
/// 要么将工作排队，待句柄附加到事件循环后由其驱动。句柄在 `close` 后永不重用；
/// 丢弃句柄同样会关闭它。
#[async_trait]
pub trait BusConnection: Send + Sized + 'static {
    fn id(&self) -> HandleId;

    fn set_address(&mut self, address: &BusAddress) -> BusResult<()>;

    /// Marks the handle as a client of a bus daemon rather than a direct
    /// peer-to-peer connection.
    /// 将句柄标记为总线守护进程的客户端，而不是点对点直连。
    fn set_bus_client(&mut self, enabled: bool) -> BusResult<()>;

    fn negotiate_creds(&mut self, creds: CredentialFlags) -> BusResult<()>;

    /// Waits for the socket to appear instead of failing when the daemon is
    /// not listening.
    /// 在守护进程未监听时等待套接字出现，而不是直接失败。
    fn set_watch_bind(&mut self, enabled: bool) -> BusResult<()>;

    fn set_connected_signal(&mut self, enabled: bool) -> BusResult<()>;

    /// Starts the handle. Connecting happens later, on the event loop.
    /// 启动句柄。实际连接稍后在事件循环上进行。
    fn start(&mut self) -> BusResult<()>;

    /// Registers `descriptor` under `path` and `interface`.
    /// 在 `path` 和 `interface` 下注册 `descriptor`。
    fn add_object(
        &mut self,
        path: &str,
        interface: &str,
        descriptor: Arc<dyn InterfaceDescriptor>,
    ) -> BusResult<()>;

    /// Queues a request for ownership of `name`. The outcome is not reported.
    /// 将对 `name` 所有权的请求排队。结果不会被报告。
    fn request_name_async(&mut self, name: &str) -> BusResult<()>;

    /// Arms `notifier` to fire when this handle's own transport goes away.
    /// 设置 `notifier`，在此句柄自身的传输断开时触发。
    fn match_disconnected_async(&mut self, notifier: DisconnectNotifier) -> BusResult<()>;

    fn attach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()>;

    fn detach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()>;

    /// Closes the handle without flushing. An armed disconnect notifier does
    /// not fire.
    /// 关闭句柄而不刷新。已设置的断开通知器不会触发。
    fn close(self);

    async fn release_name(&mut self, name: &str) -> BusResult<()>;

    /// Flushes queued outgoing messages, then closes the handle.
    /// 刷新排队的待发送消息，然后关闭句柄。
    async fn flush_close(self) -> BusResult<()>;
}
