//! Asynchronous well-known name requests.

use super::check;
use crate::{
    bus::BusConnection,
    error::{Result, SetupStep},
};

/// Queues a request for a well-known name. The outcome is not awaited: if
/// the daemon is unreachable the request waits until the handle is live, and
/// a refused request is only logged by the bus backend.
///
/// 将知名名称的请求排队。不等待其结果：如果守护进程不可达，请求会等待直到句柄可用；
/// 被拒绝的请求仅由总线后端记录日志。
pub struct NameClaimer;

impl NameClaimer {
    pub fn claim_async<C: BusConnection>(connection: &mut C, name: &str) -> Result<()> {
        check(
            connection.id(),
            SetupStep::RequestName,
            connection.request_name_async(name),
        )
    }
}
