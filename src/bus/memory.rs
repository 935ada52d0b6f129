//! An in-process bus daemon.
//!
//! `MemoryBus` behaves like a bus daemon reached over a local socket: handles
//! connect once attached while the daemon runs, own names, serve property
//! reads and see their transport severed when the daemon stops. Every call a
//! handle receives is journaled so call order can be inspected, and any
//! operation can be made to fail once.
//!
//! 进程内的总线守护进程。
//!
//! `MemoryBus` 的行为类似于通过本地套接字访问的总线守护进程：句柄在守护进程运行时
//! 附加后即连接、拥有名称、响应属性读取，并在守护进程停止时看到传输被断开。
//! 句柄收到的每个调用都会被记录，以便检查调用顺序，并且任何操作都可以被设置为失败一次。

use super::{BusAddress, BusConnection, CredentialFlags, HandleId, traits::Bus};
use crate::{
    error::{BusError, BusResult, Result},
    event_loop::{DisconnectNotifier, EventLoop},
    object::{InterfaceDescriptor, PropertyValue},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, info, trace, warn};

/// A call received by a handle.
///
/// 句柄收到的一次调用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    NewConnection,
    SetAddress,
    SetBusClient,
    NegotiateCreds,
    SetWatchBind,
    SetConnectedSignal,
    Start,
    AddObject,
    RequestName,
    MatchDisconnected,
    AttachEvent,
    DetachEvent,
    ReleaseName,
    Flush,
    Close,
}

impl BusOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusOp::NewConnection => "new_connection",
            BusOp::SetAddress => "set_address",
            BusOp::SetBusClient => "set_bus_client",
            BusOp::NegotiateCreds => "negotiate_creds",
            BusOp::SetWatchBind => "set_watch_bind",
            BusOp::SetConnectedSignal => "set_connected_signal",
            BusOp::Start => "start",
            BusOp::AddObject => "add_object",
            BusOp::RequestName => "request_name",
            BusOp::MatchDisconnected => "match_disconnected",
            BusOp::AttachEvent => "attach_event",
            BusOp::DetachEvent => "detach_event",
            BusOp::ReleaseName => "release_name",
            BusOp::Flush => "flush",
            BusOp::Close => "close",
        }
    }
}

impl fmt::Display for BusOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal entry.
/// 一条日志记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCall {
    pub handle: HandleId,
    pub op: BusOp,
}

#[derive(Debug)]
struct PublishedObject {
    path: String,
    interface: String,
    descriptor: Arc<dyn InterfaceDescriptor>,
}

#[derive(Debug, Default)]
struct HandleRecord {
    address: Option<BusAddress>,
    bus_client: bool,
    creds: CredentialFlags,
    watch_bind: bool,
    connected_signal: bool,
    started: bool,
    attached: bool,
    connected: bool,
    severed: bool,
    closed: bool,
    objects: Vec<PublishedObject>,
    requested_names: Vec<String>,
    watcher: Option<DisconnectNotifier>,
}

#[derive(Debug)]
struct DaemonState {
    running: bool,
    handles: HashMap<HandleId, HandleRecord>,
    owners: HashMap<String, HandleId>,
    journal: Vec<BusCall>,
    failures: Vec<BusOp>,
}

impl DaemonState {
    /// Journals the call, then consumes a pending injected failure for `op`.
    fn record(&mut self, handle: HandleId, op: BusOp) -> BusResult<()> {
        self.journal.push(BusCall { handle, op });
        if let Some(pos) = self.failures.iter().position(|f| *f == op) {
            self.failures.remove(pos);
            debug!(%handle, %op, "Injected failure");
            return Err(BusError::Injected(op.as_str()));
        }
        Ok(())
    }

    fn open_handle(&mut self, handle: HandleId) -> BusResult<&mut HandleRecord> {
        match self.handles.get_mut(&handle) {
            Some(record) if !record.closed => Ok(record),
            _ => Err(BusError::NotConnected),
        }
    }

    fn connect(&mut self, handle: HandleId) {
        let Some(record) = self.handles.get_mut(&handle) else {
            return;
        };
        record.connected = true;
        if record.connected_signal {
            trace!(%handle, "Local Connected notification");
        }
        info!(
            %handle,
            address = ?record.address.as_ref().map(BusAddress::as_str),
            bus_client = record.bus_client,
            creds = ?record.creds,
            "Handle connected to in-memory bus"
        );
        let names = record.requested_names.clone();
        for name in names {
            self.grant_name(handle, &name);
        }
    }

    fn grant_name(&mut self, handle: HandleId, name: &str) {
        match self.owners.get(name) {
            Some(owner) if *owner != handle => {
                warn!(%handle, %owner, name, "Name already owned, request dropped");
            }
            _ => {
                self.owners.insert(name.to_string(), handle);
                info!(%handle, name, "Name acquired");
            }
        }
    }

    fn sever(&mut self, handle: HandleId) {
        let Some(record) = self.handles.get_mut(&handle) else {
            return;
        };
        if record.closed || record.severed {
            return;
        }
        record.severed = true;
        record.connected = false;
        let watcher = if record.attached {
            record.watcher.take()
        } else {
            None
        };
        self.owners.retain(|_, owner| *owner != handle);
        debug!(%handle, "Transport severed");
        if let Some(watcher) = watcher {
            watcher.notify();
        }
    }

    fn close(&mut self, handle: HandleId) {
        let Some(record) = self.handles.get_mut(&handle) else {
            return;
        };
        if record.closed {
            return;
        }
        record.closed = true;
        record.connected = false;
        record.attached = false;
        // Closing never fires the disconnect notification.
        record.watcher = None;
        self.owners.retain(|_, owner| *owner != handle);
        self.journal.push(BusCall {
            handle,
            op: BusOp::Close,
        });
        trace!(%handle, "Handle closed");
    }
}

/// An in-process bus. Clones share the same daemon.
///
/// 进程内总线。克隆体共享同一个守护进程。
#[derive(Debug, Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<DaemonState>>,
}

impl MemoryBus {
    /// Creates a bus whose daemon is already listening.
    /// 创建一个守护进程已在监听的总线。
    pub fn new() -> Self {
        Self::with_daemon(true)
    }

    /// Creates a bus whose daemon is not listening yet.
    /// 创建一个守护进程尚未监听的总线。
    pub fn stopped() -> Self {
        Self::with_daemon(false)
    }

    fn with_daemon(running: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(DaemonState {
                running,
                handles: HashMap::new(),
                owners: HashMap::new(),
                journal: Vec::new(),
                failures: Vec::new(),
            })),
        }
    }

    /// Makes the next `op` call on any handle fail.
    ///
    /// 使任意句柄上的下一次 `op` 调用失败。
    pub fn fail_next(&self, op: BusOp) {
        self.state.lock().failures.push(op);
    }

    /// Stops the daemon. Every connected handle has its transport severed.
    ///
    /// 停止守护进程。每个已连接句柄的传输都会被断开。
    pub fn stop_daemon(&self) {
        let mut state = self.state.lock();
        state.running = false;
        let connected: Vec<HandleId> = state
            .handles
            .iter()
            .filter(|(_, r)| r.connected)
            .map(|(id, _)| *id)
            .collect();
        info!(severed = connected.len(), "In-memory bus daemon stopped");
        for handle in connected {
            state.sever(handle);
        }
    }

    /// Starts the daemon. Attached handles waiting for the socket connect.
    ///
    /// 启动守护进程。正在等待套接字的已附加句柄将完成连接。
    pub fn start_daemon(&self) {
        let mut state = self.state.lock();
        state.running = true;
        let waiting: Vec<HandleId> = state
            .handles
            .iter()
            .filter(|(_, r)| r.attached && !r.closed && !r.severed && !r.connected)
            .map(|(id, _)| *id)
            .collect();
        info!(waiting = waiting.len(), "In-memory bus daemon started");
        for handle in waiting {
            state.connect(handle);
        }
    }

    pub fn restart_daemon(&self) {
        self.stop_daemon();
        self.start_daemon();
    }

    /// Severs the transport of a single handle.
    /// 断开单个句柄的传输。
    pub fn sever(&self, handle: HandleId) {
        self.state.lock().sever(handle);
    }

    /// Reads a property the way a remote peer would, addressed by name.
    ///
    /// 以远程对端的方式按名称读取属性。
    pub fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<PropertyValue> {
        let state = self.state.lock();
        let owner = state
            .owners
            .get(destination)
            .copied()
            .ok_or_else(|| BusError::NameHasNoOwner(destination.to_string()))?;
        let record = state
            .handles
            .get(&owner)
            .filter(|r| r.connected)
            .ok_or(BusError::NotConnected)?;
        let object = record
            .objects
            .iter()
            .find(|o| o.path == path && o.interface == interface)
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
                interface: interface.to_string(),
            })?;
        object.descriptor.get_property(property)
    }

    pub fn name_owner(&self, name: &str) -> Option<HandleId> {
        self.state.lock().owners.get(name).copied()
    }

    /// The full journal, in call order.
    /// 完整的调用日志，按调用顺序排列。
    pub fn calls(&self) -> Vec<BusCall> {
        self.state.lock().journal.clone()
    }

    pub fn ops_for(&self, handle: HandleId) -> Vec<BusOp> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.handle == handle)
            .map(|c| c.op)
            .collect()
    }

    /// Every handle ever created, oldest first.
    /// 创建过的所有句柄，按从旧到新的顺序。
    pub fn handles(&self) -> Vec<HandleId> {
        let mut ids: Vec<HandleId> = self.state.lock().handles.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Handles that have not been closed yet.
    /// 尚未关闭的句柄。
    pub fn open_handles(&self) -> Vec<HandleId> {
        let mut ids: Vec<HandleId> = self
            .state
            .lock()
            .handles
            .iter()
            .filter(|(_, r)| !r.closed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn is_closed(&self, handle: HandleId) -> bool {
        self.with_record(handle, |r| r.closed)
    }

    pub fn is_attached(&self, handle: HandleId) -> bool {
        self.with_record(handle, |r| r.attached)
    }

    pub fn is_connected(&self, handle: HandleId) -> bool {
        self.with_record(handle, |r| r.connected)
    }

    fn with_record(&self, handle: HandleId, f: impl FnOnce(&HandleRecord) -> bool) -> bool {
        self.state.lock().handles.get(&handle).is_some_and(f)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for MemoryBus {
    type Connection = MemoryConnection;

    fn new_connection(&self) -> BusResult<MemoryConnection> {
        let handle = HandleId::next();
        let mut state = self.state.lock();
        state.record(handle, BusOp::NewConnection)?;
        state.handles.insert(handle, HandleRecord::default());
        Ok(MemoryConnection {
            id: handle,
            state: self.state.clone(),
        })
    }
}

/// A handle on a `MemoryBus`. Dropping it closes it.
///
/// `MemoryBus` 上的句柄。丢弃即关闭。
#[derive(Debug)]
pub struct MemoryConnection {
    id: HandleId,
    state: Arc<Mutex<DaemonState>>,
}

impl MemoryConnection {
    fn configure(
        &mut self,
        op: BusOp,
        f: impl FnOnce(&mut HandleRecord) -> BusResult<()>,
    ) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, op)?;
        f(state.open_handle(self.id)?)
    }

    fn release(&self, name: &str) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, BusOp::ReleaseName)?;
        if !state.open_handle(self.id)?.connected {
            return Err(BusError::NotConnected);
        }
        if state.owners.get(name) == Some(&self.id) {
            state.owners.remove(name);
            info!(handle = %self.id, name, "Name released");
        }
        state.open_handle(self.id)?.requested_names.retain(|n| n != name);
        Ok(())
    }
}

#[async_trait]
impl BusConnection for MemoryConnection {
    fn id(&self) -> HandleId {
        self.id
    }

    fn set_address(&mut self, address: &BusAddress) -> BusResult<()> {
        self.configure(BusOp::SetAddress, |r| {
            r.address = Some(address.clone());
            Ok(())
        })
    }

    fn set_bus_client(&mut self, enabled: bool) -> BusResult<()> {
        self.configure(BusOp::SetBusClient, |r| {
            r.bus_client = enabled;
            Ok(())
        })
    }

    fn negotiate_creds(&mut self, creds: CredentialFlags) -> BusResult<()> {
        self.configure(BusOp::NegotiateCreds, |r| {
            r.creds = creds;
            Ok(())
        })
    }

    fn set_watch_bind(&mut self, enabled: bool) -> BusResult<()> {
        self.configure(BusOp::SetWatchBind, |r| {
            r.watch_bind = enabled;
            Ok(())
        })
    }

    fn set_connected_signal(&mut self, enabled: bool) -> BusResult<()> {
        self.configure(BusOp::SetConnectedSignal, |r| {
            r.connected_signal = enabled;
            Ok(())
        })
    }

    fn start(&mut self) -> BusResult<()> {
        self.configure(BusOp::Start, |r| {
            if r.address.is_none() {
                return Err(BusError::NoAddress);
            }
            if r.started {
                return Err(BusError::AlreadyStarted);
            }
            r.started = true;
            Ok(())
        })
    }

    fn add_object(
        &mut self,
        path: &str,
        interface: &str,
        descriptor: Arc<dyn InterfaceDescriptor>,
    ) -> BusResult<()> {
        self.configure(BusOp::AddObject, |r| {
            if !path.starts_with('/') {
                return Err(BusError::InvalidObjectPath(path.to_string()));
            }
            if descriptor.interface_name() != interface {
                return Err(BusError::UnsupportedInterface(interface.to_string()));
            }
            r.objects.push(PublishedObject {
                path: path.to_string(),
                interface: interface.to_string(),
                descriptor,
            });
            Ok(())
        })
    }

    fn request_name_async(&mut self, name: &str) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, BusOp::RequestName)?;
        if name.starts_with(':') || !name.contains('.') {
            return Err(BusError::InvalidName(name.to_string()));
        }
        let record = state.open_handle(self.id)?;
        record.requested_names.push(name.to_string());
        let connected = record.connected;
        if connected {
            state.grant_name(self.id, name);
        }
        Ok(())
    }

    fn match_disconnected_async(&mut self, notifier: DisconnectNotifier) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, BusOp::MatchDisconnected)?;
        let record = state.open_handle(self.id)?;
        if record.attached && record.severed {
            notifier.notify();
        } else {
            record.watcher = Some(notifier);
        }
        Ok(())
    }

    fn attach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, BusOp::AttachEvent)?;
        let running = state.running;
        let record = state.open_handle(self.id)?;
        if !record.started {
            return Err(BusError::NotStarted);
        }
        event_loop.attach_source(self.id)?;
        record.attached = true;
        let (severed, watch_bind) = (record.severed, record.watch_bind);

        if severed {
            // A notification that arrived while detached is dispatched now.
            if let Some(watcher) = record.watcher.take() {
                watcher.notify();
            }
        } else if running {
            state.connect(self.id);
        } else if !watch_bind {
            debug!(handle = %self.id, "Daemon not listening and watch-bind is off");
            state.sever(self.id);
        } else {
            debug!(handle = %self.id, "Waiting for the bus socket to appear");
        }
        Ok(())
    }

    fn detach_event(&mut self, event_loop: &mut EventLoop) -> BusResult<()> {
        let mut state = self.state.lock();
        state.record(self.id, BusOp::DetachEvent)?;
        let record = state.open_handle(self.id)?;
        event_loop.detach_source(self.id)?;
        record.attached = false;
        Ok(())
    }

    fn close(self) {
        drop(self);
    }

    async fn release_name(&mut self, name: &str) -> BusResult<()> {
        self.release(name)
    }

    async fn flush_close(self) -> BusResult<()> {
        self.state.lock().record(self.id, BusOp::Flush)?;
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.lock().close(self.id);
    }
}
