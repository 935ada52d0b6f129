//! The local "disconnected" subscription of a handle.

use super::check;
use crate::{
    bus::BusConnection,
    error::{Result, SetupStep},
    event_loop::EventLoopHandle,
};

/// Arms a handle so that losing its own transport delivers
/// `LoopEvent::Disconnected` for that handle, exactly once. Closing the
/// handle disarms it.
///
/// 设置句柄，使其自身传输丢失时针对该句柄恰好投递一次 `LoopEvent::Disconnected`。
/// 关闭句柄会解除该设置。
pub struct DisconnectWatcher;

impl DisconnectWatcher {
    pub fn arm_async<C: BusConnection>(connection: &mut C, events: &EventLoopHandle) -> Result<()> {
        let notifier = events.disconnect_notifier(connection.id());
        check(
            connection.id(),
            SetupStep::MatchDisconnected,
            connection.match_disconnected_async(notifier),
        )
    }
}
