//! tests/common/harness.rs
#![allow(dead_code)]

use dbus_reconnect::{
    bus::{HandleId, MemoryBus},
    config::{Config, INTERFACE_NAME, OBJECT_PATH, PROPERTY_NAME, SERVICE_NAME},
    event_loop::{EventLoop, EventLoopHandle},
    lifecycle::ConnectionLifecycleManager,
    object::PropertyValue,
};
use std::sync::Once;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dbus_reconnect=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A test harness pairing an in-memory bus with a manager driven on it.
pub struct TestHarness {
    pub bus: MemoryBus,
    pub manager: ConnectionLifecycleManager<MemoryBus>,
    pub exit: EventLoopHandle,
}

impl TestHarness {
    /// Creates a manager on a running daemon without signal sources.
    pub fn new() -> Self {
        Self::with_bus(MemoryBus::new())
    }

    pub fn with_bus(bus: MemoryBus) -> Self {
        init_tracing();
        let event_loop = EventLoop::new();
        let exit = event_loop.handle();
        let manager = ConnectionLifecycleManager::new(bus.clone(), Config::default(), event_loop);
        Self { bus, manager, exit }
    }

    pub fn current(&self) -> HandleId {
        self.manager
            .current_handle()
            .expect("manager holds no connection")
    }
}

/// Reads the published property the way a peer on the bus would.
pub fn read_example(bus: &MemoryBus) -> dbus_reconnect::Result<PropertyValue> {
    bus.get_property(SERVICE_NAME, OBJECT_PATH, INTERFACE_NAME, PROPERTY_NAME)
}
