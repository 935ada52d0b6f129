//! 连接生命周期 - 构建、发布、监视并重建总线连接
//! Connection lifecycle - builds, publishes, watches and rebuilds the bus connection
pub mod factory;
pub mod manager;
pub mod name_claimer;
pub mod publisher;
pub mod state;
pub mod watcher;

pub use factory::BusConnectionFactory;
pub use manager::ConnectionLifecycleManager;
pub use name_claimer::NameClaimer;
pub use publisher::ObjectPublisher;
pub use state::{LifecycleState, StateManager};
pub use watcher::DisconnectWatcher;

use crate::{
    bus::HandleId,
    error::{BusResult, Error, Result, SetupStep},
};
use tracing::{debug, error};

/// Logs the outcome of one setup step and turns a bus failure into
/// `Error::SetupFailed`.
///
/// 记录单个设置步骤的结果，并将总线故障转换为 `Error::SetupFailed`。
pub(crate) fn check<T>(handle: HandleId, step: SetupStep, result: BusResult<T>) -> Result<T> {
    match result {
        Ok(value) => {
            debug!(%handle, %step, "Setup step succeeded");
            Ok(value)
        }
        Err(cause) => {
            error!(%handle, %step, error = %cause, "Setup step failed");
            Err(Error::SetupFailed { step, cause })
        }
    }
}
