//! The bus-client abstraction consumed by the lifecycle manager, and its backends.
//!
//! 生命周期管理器所使用的总线客户端抽象及其后端实现。
pub mod address;
pub mod creds;
pub mod memory;
pub mod system;
pub mod traits;

pub use address::BusAddress;
pub use creds::CredentialFlags;
pub use memory::{BusCall, BusOp, MemoryBus, MemoryConnection};
pub use system::{SystemBus, SystemConnection};
pub use traits::{Bus, BusConnection};

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connection handle for its whole life.
///
/// Ids are never reused within a process, so an event carrying an id can
/// always be matched against the handle that is current.
///
/// 在连接句柄的整个生命周期内标识它。进程内ID不会被重用，
/// 因此携带ID的事件总能与当前句柄进行比对。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
