//! 定义了服务和总线连接的可配置参数。
//! Defines configurable parameters for the service and its bus connection.

use crate::bus::CredentialFlags;
use std::time::Duration;

/// The locator of the system-level bus socket.
/// 系统级总线套接字的地址。
pub const SYSTEM_BUS_ADDRESS: &str = "unix:path=/run/dbus/system_bus_socket";

/// The well-known name claimed by the service.
/// 服务所申请的知名名称。
pub const SERVICE_NAME: &str = "org.freedesktop.ReconnectExample";

pub const OBJECT_PATH: &str = "/org/freedesktop/ReconnectExample";

pub const INTERFACE_NAME: &str = "org.freedesktop.ReconnectExample";

pub const PROPERTY_NAME: &str = "Example";

pub const PROPERTY_VALUE: &str = "example";

/// A structure containing all configurable parameters of the service.
///
/// 包含服务所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bus connection parameters.
    /// 总线连接参数。
    pub connection: ConnectionConfig,

    /// What the service publishes on the bus.
    /// 服务在总线上发布的内容。
    pub service: ServiceConfig,
}

/// Parameters applied to every freshly constructed connection handle.
///
/// 应用于每个新构建的连接句柄的参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The transport locator, e.g. `unix:path=/run/dbus/system_bus_socket`.
    /// 传输地址，例如 `unix:path=/run/dbus/system_bus_socket`。
    pub address: String,
    /// Peer credentials requested during authentication.
    /// 认证期间请求的对端凭据。
    pub credentials: CredentialFlags,
    /// Wait for the socket to appear instead of failing when the daemon is
    /// not listening yet.
    ///
    /// 在守护进程尚未监听时等待套接字出现，而不是直接失败。
    pub watch_bind: bool,
    /// Emit a local notification once the transport is connected.
    /// 传输连接后发出本地通知。
    pub connected_signal: bool,
    /// How often a watch-bound handle re-checks the socket path.
    ///
    /// 启用了 watch-bind 的句柄重新检查套接字路径的间隔。
    pub watch_bind_interval: Duration,
}

/// The published object and the name it is reachable under.
///
/// 发布的对象及其可访问的名称。
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub well_known_name: String,
    pub object_path: String,
    pub interface_name: String,
    pub property_name: String,
    pub property_value: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: SYSTEM_BUS_ADDRESS.to_string(),
            credentials: CredentialFlags::default(),
            watch_bind: true,
            connected_signal: true,
            watch_bind_interval: Duration::from_millis(500),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            well_known_name: SERVICE_NAME.to_string(),
            object_path: OBJECT_PATH.to_string(),
            interface_name: INTERFACE_NAME.to_string(),
            property_name: PROPERTY_NAME.to_string(),
            property_value: PROPERTY_VALUE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_system_bus() {
        let config = Config::default();
        assert_eq!(config.connection.address, SYSTEM_BUS_ADDRESS);
        assert!(config.connection.watch_bind);
        assert!(config.connection.connected_signal);
        assert_eq!(
            config.connection.credentials,
            CredentialFlags::UID | CredentialFlags::EUID | CredentialFlags::EFFECTIVE_CAPS
        );
        assert_eq!(config.service.well_known_name, "org.freedesktop.ReconnectExample");
        assert_eq!(config.service.property_name, "Example");
        assert_eq!(config.service.property_value, "example");
    }
}
