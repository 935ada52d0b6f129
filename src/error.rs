//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::{bus::HandleId, lifecycle::LifecycleState};
use std::fmt;
use thiserror::Error;

/// The configuration or registration call that failed while building a connection.
///
/// 构建连接期间失败的配置或注册调用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    NewConnection,
    SetAddress,
    SetBusClient,
    NegotiateCredentials,
    SetWatchBind,
    SetConnectedSignal,
    Start,
    AddObject,
    RequestName,
    MatchDisconnected,
    AttachEvent,
    DetachEvent,
}

impl SetupStep {
    /// Returns the stable, log-friendly name of the step.
    /// 返回该步骤稳定的、便于日志记录的名称。
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::NewConnection => "new_connection",
            SetupStep::SetAddress => "set_address",
            SetupStep::SetBusClient => "set_bus_client",
            SetupStep::NegotiateCredentials => "negotiate_creds",
            SetupStep::SetWatchBind => "set_watch_bind",
            SetupStep::SetConnectedSignal => "set_connected_signal",
            SetupStep::Start => "start",
            SetupStep::AddObject => "add_object",
            SetupStep::RequestName => "request_name",
            SetupStep::MatchDisconnected => "match_disconnected",
            SetupStep::AttachEvent => "attach_event",
            SetupStep::DetachEvent => "detach_event",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a bus backend.
///
/// 总线后端报告的错误。
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport locator could not be parsed.
    /// 无法解析传输地址。
    #[error("invalid bus address '{address}': {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    /// The handle was started before an address was configured.
    /// 在配置地址之前启动了句柄。
    #[error("no bus address configured")]
    NoAddress,

    #[error("connection handle is already started")]
    AlreadyStarted,

    #[error("connection handle has not been started")]
    NotStarted,

    /// Another handle already occupies the event loop.
    /// 另一个句柄已经占用了事件循环。
    #[error("event loop already has handle {0} attached")]
    AlreadyAttached(HandleId),

    #[error("handle {0} is not attached to the event loop")]
    NotAttached(HandleId),

    #[error("invalid object path '{0}'")]
    InvalidObjectPath(String),

    #[error("interface '{0}' is not served by this bus")]
    UnsupportedInterface(String),

    #[error("invalid well-known name '{0}'")]
    InvalidName(String),

    /// The operation needs a live transport and there is none.
    /// 操作需要一个活动的传输，但当前没有。
    #[error("connection is not established")]
    NotConnected,

    #[error("name '{0}' has no owner")]
    NameHasNoOwner(String),

    #[error("no object at '{path}' implements '{interface}'")]
    UnknownObject { path: String, interface: String },

    /// A failure injected by the in-memory bus.
    /// 由内存总线注入的故障。
    #[error("injected failure in {0}")]
    Injected(&'static str),

    #[error("D-Bus error: {0}")]
    Zbus(#[from] zbus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for bus backends.
/// 总线后端专用的 `Result` 类型。
pub type BusResult<T> = std::result::Result<T, BusError>;

/// The primary error type for the reconnecting service.
/// 自动重连服务的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration or registration call failed while (re)building the
    /// connection. Always fatal to the process.
    ///
    /// (重新)构建连接时配置或注册调用失败。对进程而言总是致命的。
    #[error("setup failed at {step}: {cause}")]
    SetupFailed {
        step: SetupStep,
        #[source]
        cause: BusError,
    },

    /// A peer asked for a property the object does not expose.
    /// 对端请求了对象未公开的属性。
    #[error("Unknown property '{name}'")]
    UnknownProperty { name: String },

    /// A bus call outside of setup failed.
    /// 在设置流程之外的总线调用失败。
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// The well-known name could not be released at shutdown. The handle is
    /// still closed; the process exits with a failure status.
    ///
    /// 关闭时无法释放知名名称。句柄仍会被关闭；进程以失败状态退出。
    #[error("failed to release well-known name '{name}': {cause}")]
    ReleaseName {
        name: String,
        #[source]
        cause: BusError,
    },

    #[error("failed to register signal source: {0}")]
    Signal(#[source] std::io::Error),

    #[error("invalid lifecycle transition from {current:?} to {attempted:?}")]
    InvalidTransition {
        current: LifecycleState,
        attempted: LifecycleState,
    },

    /// The event loop's channel closed while the service was running.
    /// 服务运行时事件循环的通道被关闭。
    #[error("event loop closed")]
    EventLoopClosed,
}

impl Error {
    /// Whether the error must terminate the process.
    ///
    /// 该错误是否必须终止进程。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnknownProperty { .. })
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for zbus::fdo::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::UnknownProperty { .. } => zbus::fdo::Error::UnknownProperty(err.to_string()),
            other => zbus::fdo::Error::Failed(other.to_string()),
        }
    }
}
