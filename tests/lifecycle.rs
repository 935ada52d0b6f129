//! End-to-end lifecycle scenarios against the in-memory bus daemon.

mod common;

use common::harness::{TestHarness, read_example};
use dbus_reconnect::{
    bus::{BusOp, MemoryBus},
    config::SERVICE_NAME,
    event_loop::ShutdownReason,
    lifecycle::LifecycleState,
    object::PropertyValue,
};
use std::time::Duration;

#[tokio::test]
async fn test_survives_daemon_restarts() {
    let mut harness = TestHarness::new();
    harness.manager.setup().unwrap();
    let first = harness.current();
    assert_eq!(
        read_example(&harness.bus).unwrap(),
        PropertyValue::String("example".into())
    );

    // 1. Restart the daemon a few times while the loop is running.
    let bus = harness.bus.clone();
    let exit = harness.exit.clone();
    let script = tokio::spawn(async move {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus.restart_daemon();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        exit.request_exit();
    });

    // 2. The loop rebuilds once per restart and stops on request.
    let reason = harness.manager.run().await.unwrap();
    script.await.unwrap();
    assert_eq!(reason, ShutdownReason::Requested);
    assert_eq!(harness.manager.rebuild_count(), 3);

    // 3. The final connection owns the name and serves the same value.
    let last = harness.current();
    assert_ne!(first, last);
    assert_eq!(harness.bus.open_handles(), vec![last]);
    assert_eq!(harness.bus.name_owner(SERVICE_NAME), Some(last));
    assert_eq!(harness.manager.state(), LifecycleState::Live);
    assert_eq!(
        read_example(&harness.bus).unwrap(),
        PropertyValue::String("example".into())
    );

    // 4. Shutdown gives the name back and closes the handle.
    harness.manager.shutdown().await.unwrap();
    assert_eq!(harness.bus.name_owner(SERVICE_NAME), None);
    assert!(harness.bus.open_handles().is_empty());
}

#[tokio::test]
async fn test_daemon_stays_down_across_rebuild() {
    let mut harness = TestHarness::new();
    harness.manager.setup().unwrap();
    let first = harness.current();

    let bus = harness.bus.clone();
    let exit = harness.exit.clone();
    let script = tokio::spawn(async move {
        bus.stop_daemon();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The rebuilt handle is waiting on the socket; bring the daemon back.
        bus.start_daemon();
        exit.request_exit();
    });

    harness.manager.run().await.unwrap();
    script.await.unwrap();

    let second = harness.current();
    assert_ne!(first, second);
    assert_eq!(harness.manager.rebuild_count(), 1);
    assert!(harness.bus.is_connected(second));
    assert_eq!(harness.bus.name_owner(SERVICE_NAME), Some(second));
    assert!(read_example(&harness.bus).is_ok());
}

#[tokio::test]
async fn test_severing_a_replaced_handle_is_silent() {
    let mut harness = TestHarness::new();
    harness.manager.setup().unwrap();
    let first = harness.current();

    // Replace the handle explicitly; severing the old one afterwards is silent.
    harness.manager.setup().unwrap();
    harness.bus.sever(first);
    harness.exit.request_exit();

    harness.manager.run().await.unwrap();
    assert_eq!(harness.manager.rebuild_count(), 0);
    assert_eq!(harness.bus.open_handles(), vec![harness.current()]);
}

#[tokio::test]
async fn test_rebuild_failure_stops_the_loop() {
    let mut harness = TestHarness::with_bus(MemoryBus::new());
    harness.manager.setup().unwrap();
    let first = harness.current();

    harness.bus.fail_next(BusOp::RequestName);
    harness.bus.sever(first);

    let err = harness.manager.run().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(harness.manager.current_handle(), None);
    assert!(harness.bus.open_handles().is_empty());
}
