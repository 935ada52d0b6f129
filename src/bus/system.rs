//! The system-bus backend built on `zbus`.
//!
//! Configuration calls only record what the handle should do. Attaching the
//! handle spawns its driver task on the event loop's runtime, which waits for
//! the socket, connects with the object already served, asks for the
//! well-known names and then watches the transport until it goes away.
//!
//! 基于 `zbus` 的系统总线后端。
//!
//! 配置调用只记录句柄应该做什么。附加句柄时会在事件循环的运行时上启动其驱动任务，
//! 该任务等待套接字出现，在对象已就绪的情况下建立连接，申请知名名称，
//! 然后监视传输直到其断开。

use super::{BusAddress, BusConnection, CredentialFlags, HandleId, traits::Bus};
use crate::{
    config::{ConnectionConfig, INTERFACE_NAME},
    error::{BusError, BusResult},
    event_loop::{DisconnectNotifier, EventLoop},
    object::{InterfaceDescriptor, PropertyValue},
};
use async_trait::async_trait;
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{sync::OnceCell, task::JoinHandle};
use tracing::{debug, info, warn};

/// Serves an `InterfaceDescriptor` on the bus. The bus member is always
/// `Example`; its value is read from the descriptor's own property.
struct DescriptorInterface {
    descriptor: Arc<dyn InterfaceDescriptor>,
    property: String,
}

#[zbus::interface(name = "org.freedesktop.ReconnectExample")]
impl DescriptorInterface {
    #[zbus(property(emits_changed_signal = "const"))]
    async fn example(&self) -> zbus::fdo::Result<String> {
        match self.descriptor.get_property(&self.property)? {
            PropertyValue::String(value) => Ok(value),
        }
    }
}

/// Connects handles to the bus daemon named by their address.
///
/// 将句柄连接到其地址所指定的总线守护进程。
#[derive(Debug, Clone)]
pub struct SystemBus {
    watch_bind_interval: Duration,
}

impl SystemBus {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            watch_bind_interval: config.watch_bind_interval,
        }
    }
}

impl Bus for SystemBus {
    type Connection = SystemConnection;

    fn new_connection(&self) -> BusResult<SystemConnection> {
        Ok(SystemConnection {
            id: HandleId::next(),
            watch_bind_interval: self.watch_bind_interval,
            address: None,
            bus_client: false,
            creds: CredentialFlags::empty(),
            watch_bind: false,
            connected_signal: false,
            started: false,
            object: None,
            names: Vec::new(),
            watcher: None,
            driver: None,
            connection: Arc::new(OnceCell::new()),
        })
    }
}

#[derive(Debug, Clone)]
struct ServedObject {
    path: String,
    property: String,
    descriptor: Arc<dyn InterfaceDescriptor>,
}

/// A handle on the system bus.
///
/// 系统总线上的句柄。
#[derive(Debug)]
pub struct SystemConnection {
    id: HandleId,
    watch_bind_interval: Duration,
    address: Option<BusAddress>,
    bus_client: bool,
    creds: CredentialFlags,
    watch_bind: bool,
    connected_signal: bool,
    started: bool,
    object: Option<ServedObject>,
    names: Vec<String>,
    watcher: Option<DisconnectNotifier>,
    driver: Option<JoinHandle<()>>,
    connection: Arc<OnceCell<zbus::Connection>>,
}

#[async_trait]
impl BusConnection for SystemConnection {
    fn id(&self) -> HandleId {
        self.id
    }

    fn set_address(&mut self, address: &BusAddress) -> BusResult<()> {
        self.address = Some(address.clone());
        Ok(())
    }

    fn set_bus_client(&mut self, enabled: bool) -> BusResult<()> {
        // A non-client handle connects peer-to-peer: no `Hello`, no names.
        self.bus_client = enabled;
        Ok(())
    }

    fn negotiate_creds(&mut self, creds: CredentialFlags) -> BusResult<()> {
        // The credentials are carried by the unix socket itself; the bus
        // daemon reads them from the peer during authentication.
        self.creds = creds;
        Ok(())
    }

    fn set_watch_bind(&mut self, enabled: bool) -> BusResult<()> {
        self.watch_bind = enabled;
        Ok(())
    }

    fn set_connected_signal(&mut self, enabled: bool) -> BusResult<()> {
        self.connected_signal = enabled;
        Ok(())
    }

    fn start(&mut self) -> BusResult<()> {
        if self.address.is_none() {
            return Err(BusError::NoAddress);
        }
        if self.started {
            return Err(BusError::AlreadyStarted);
        }
        self.started = true;
        Ok(())
    }

    fn add_object(
        &mut self,
        path: &str,
        interface: &str,
        descriptor: Arc<dyn InterfaceDescriptor>,
    ) -> BusResult<()> {
        if interface != INTERFACE_NAME || descriptor.interface_name() != interface {
            return Err(BusError::UnsupportedInterface(interface.to_string()));
        }
        zbus::zvariant::ObjectPath::try_from(path)
            .map_err(|_| BusError::InvalidObjectPath(path.to_string()))?;
        // The generated interface carries exactly one property.
        let property = match descriptor.property_names().as_slice() {
            [property] => property.to_string(),
            _ => return Err(BusError::UnsupportedInterface(interface.to_string())),
        };
        self.object = Some(ServedObject {
            path: path.to_string(),
            property,
            descriptor,
        });
        Ok(())
    }

    fn request_name_async(&mut self, name: &str) -> BusResult<()> {
        zbus::names::WellKnownName::try_from(name)
            .map_err(|_| BusError::InvalidName(name.to_string()))?;
        self.names.push(name.to_string());
        Ok(())
    }

    fn match_disconnected_async(&mut self, notifier: DisconnectNotifier) -> BusResult<()> {
        self.watcher = Some(notifier);
        Ok(())
    }

    fn attach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()> {
        if !self.started {
            return Err(BusError::NotStarted);
        }
        let address = self.address.clone().ok_or(BusError::NoAddress)?;
        event_loop.attach_source(self.id)?;

        if self.driver.is_none() {
            let driver = Driver {
                id: self.id,
                address,
                bus_client: self.bus_client,
                creds: self.creds,
                watch_bind: self.watch_bind,
                watch_bind_interval: self.watch_bind_interval,
                connected_signal: self.connected_signal,
                object: self.object.clone(),
                names: self.names.clone(),
                watcher: self.watcher.take(),
                connection: self.connection.clone(),
            };
            self.driver = Some(tokio::spawn(driver.run()));
        }
        Ok(())
    }

    fn detach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()> {
        event_loop.detach_source(self.id)?;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        Ok(())
    }

    fn close(self) {
        drop(self);
    }

    async fn release_name(&mut self, name: &str) -> BusResult<()> {
        let connection = self.connection.get().ok_or(BusError::NotConnected)?;
        let released = connection.release_name(name).await?;
        debug!(handle = %self.id, name, released, "ReleaseName answered");
        Ok(())
    }

    async fn flush_close(self) -> BusResult<()> {
        // zbus writes each message out before the send call returns, so there
        // is nothing queued to flush.
        drop(self);
        Ok(())
    }
}

impl Drop for SystemConnection {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Everything the driver task needs, moved out of the handle on attach.
struct Driver {
    id: HandleId,
    address: BusAddress,
    bus_client: bool,
    creds: CredentialFlags,
    watch_bind: bool,
    watch_bind_interval: Duration,
    connected_signal: bool,
    object: Option<ServedObject>,
    names: Vec<String>,
    watcher: Option<DisconnectNotifier>,
    connection: Arc<OnceCell<zbus::Connection>>,
}

impl Driver {
    async fn run(self) {
        let connection = match self.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(
                    handle = %self.id,
                    address = %self.address,
                    error = %e,
                    "Failed to connect to bus"
                );
                self.disconnected();
                return;
            }
        };
        if self.connected_signal {
            info!(
                handle = %self.id,
                unique_name = ?connection.unique_name().map(|n| n.to_string()),
                "Connected to bus"
            );
        }
        if self.connection.set(connection.clone()).is_err() {
            debug!(handle = %self.id, "Connection cell already set");
        }

        if !self.bus_client && !self.names.is_empty() {
            debug!(handle = %self.id, "Peer-to-peer handle, skipping name requests");
        }
        for name in self.names.iter().filter(|_| self.bus_client) {
            match connection.request_name(name.as_str()).await {
                Ok(()) => info!(handle = %self.id, name = %name, "Name acquired"),
                Err(e) => {
                    warn!(handle = %self.id, name = %name, error = %e, "Name request failed")
                }
            }
        }

        let stream = zbus::MessageStream::from(&connection);
        tokio::pin!(stream);
        while let Some(message) = stream.next().await {
            if let Err(zbus::Error::InputOutput(e)) = message {
                debug!(handle = %self.id, error = %e, "Transport error");
                break;
            }
        }
        self.disconnected();
    }

    async fn connect(&self) -> zbus::Result<zbus::Connection> {
        debug!(
            handle = %self.id,
            address = %self.address,
            bus_client = self.bus_client,
            creds = ?self.creds,
            "Connecting"
        );
        loop {
            if self.watch_bind && !self.address.socket_path().exists() {
                tokio::time::sleep(self.watch_bind_interval).await;
                continue;
            }

            let mut builder = zbus::connection::Builder::address(self.address.as_str())?;
            if !self.bus_client {
                builder = builder.p2p();
            }
            if let Some(object) = &self.object {
                builder = builder.serve_at(
                    object.path.as_str(),
                    DescriptorInterface {
                        descriptor: object.descriptor.clone(),
                        property: object.property.clone(),
                    },
                )?;
            }
            match builder.build().await {
                Ok(connection) => return Ok(connection),
                Err(e) if self.watch_bind => {
                    debug!(handle = %self.id, error = %e, "Bus not available yet");
                    tokio::time::sleep(self.watch_bind_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn disconnected(self) {
        match self.watcher {
            Some(watcher) => watcher.notify(),
            None => debug!(handle = %self.id, "Disconnected with no watcher armed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{OBJECT_PATH, SERVICE_NAME, ServiceConfig},
        event_loop::LoopEvent,
        object::ServiceObject,
    };

    const MISSING_SOCKET: &str = "unix:path=/nonexistent/dbus-reconnect/bus_socket";

    fn new_connection() -> SystemConnection {
        let config = ConnectionConfig {
            watch_bind_interval: Duration::from_millis(10),
            ..ConnectionConfig::default()
        };
        SystemBus::new(&config).new_connection().unwrap()
    }

    fn started_connection(watch_bind: bool) -> SystemConnection {
        let mut connection = new_connection();
        let address = BusAddress::parse(MISSING_SOCKET).unwrap();
        connection.set_address(&address).unwrap();
        connection.set_bus_client(true).unwrap();
        connection.set_watch_bind(watch_bind).unwrap();
        connection.start().unwrap();
        connection
    }

    fn service_object(config: &ServiceConfig) -> Arc<dyn InterfaceDescriptor> {
        Arc::new(ServiceObject::new(config))
    }

    #[test]
    fn test_start_requires_address_and_runs_once() {
        let mut connection = new_connection();
        assert!(matches!(connection.start(), Err(BusError::NoAddress)));

        let address = BusAddress::parse(MISSING_SOCKET).unwrap();
        connection.set_address(&address).unwrap();
        connection.start().unwrap();
        assert!(matches!(connection.start(), Err(BusError::AlreadyStarted)));
    }

    #[test]
    fn test_attach_before_start_is_rejected() {
        let mut event_loop = EventLoop::new();
        let mut connection = new_connection();
        assert!(matches!(
            connection.attach_event(&mut event_loop),
            Err(BusError::NotStarted)
        ));
        assert_eq!(event_loop.attached(), None);
    }

    #[test]
    fn test_add_object_validates_interface_and_path() {
        let config = ServiceConfig::default();
        let mut connection = new_connection();

        assert!(matches!(
            connection.add_object(OBJECT_PATH, "org.example.Other", service_object(&config)),
            Err(BusError::UnsupportedInterface(_))
        ));
        assert!(matches!(
            connection.add_object("relative/path", INTERFACE_NAME, service_object(&config)),
            Err(BusError::InvalidObjectPath(_))
        ));
        assert!(connection.object.is_none());

        connection
            .add_object(OBJECT_PATH, INTERFACE_NAME, service_object(&config))
            .unwrap();
        assert!(connection.object.is_some());
    }

    #[tokio::test]
    async fn test_served_property_follows_configured_name() {
        let config = ServiceConfig {
            property_name: "Greeting".into(),
            ..ServiceConfig::default()
        };
        let mut connection = new_connection();
        connection
            .add_object(OBJECT_PATH, INTERFACE_NAME, service_object(&config))
            .unwrap();

        let object = connection.object.clone().unwrap();
        assert_eq!(object.property, "Greeting");
        let served = DescriptorInterface {
            descriptor: object.descriptor,
            property: object.property,
        };
        assert_eq!(served.example().await.unwrap(), "example");
    }

    #[test]
    fn test_request_name_rejects_unique_names() {
        let mut connection = new_connection();
        assert!(matches!(
            connection.request_name_async(":1.5"),
            Err(BusError::InvalidName(_))
        ));
        connection.request_name_async(SERVICE_NAME).unwrap();
        assert_eq!(connection.names, vec![SERVICE_NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_release_name_before_connecting_fails() {
        let mut connection = new_connection();
        assert!(matches!(
            connection.release_name(SERVICE_NAME).await,
            Err(BusError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_detach_then_close_never_notifies() {
        let mut event_loop = EventLoop::new();
        let mut connection = started_connection(true);
        let handle = connection.id();
        connection
            .match_disconnected_async(event_loop.handle().disconnect_notifier(handle))
            .unwrap();
        connection.attach_event(&mut event_loop).unwrap();
        assert_eq!(event_loop.attached(), Some(handle));

        // The driver is polling for the missing socket.
        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.detach_event(&mut event_loop).unwrap();
        connection.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(event_loop.attached(), None);
        assert_eq!(event_loop.try_next_event(), None);
    }

    #[tokio::test]
    async fn test_unreachable_bus_without_watch_bind_notifies() {
        let mut event_loop = EventLoop::new();
        let mut connection = started_connection(false);
        let handle = connection.id();
        connection
            .match_disconnected_async(event_loop.handle().disconnect_notifier(handle))
            .unwrap();
        connection.attach_event(&mut event_loop).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), event_loop.next_event())
            .await
            .unwrap();
        assert_eq!(event, Some(LoopEvent::Disconnected { handle }));
    }
}
