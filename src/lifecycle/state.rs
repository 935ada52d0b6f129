//! 状态管理器 - 负责管理连接槽位的状态转换
//! State Manager - Manages state transitions of the connection slot

use crate::error::{Error, Result};
use tracing::{trace, warn};

/// 连接槽位的状态
/// State of the connection slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 没有当前连接
    /// No current connection
    Empty,
    /// 正在构建新连接
    /// A new connection is being built
    Building,
    /// 连接已附加到事件循环
    /// The connection is attached to the event loop
    Live,
    /// 进程正在退出（终止状态）
    /// The process is exiting (terminal)
    ShuttingDown,
}

impl LifecycleState {
    /// 获取状态名称
    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Empty => "Empty",
            LifecycleState::Building => "Building",
            LifecycleState::Live => "Live",
            LifecycleState::ShuttingDown => "ShuttingDown",
        }
    }
}

/// 状态管理器，负责验证和执行状态转换
/// State manager responsible for validating and performing state transitions
#[derive(Debug)]
pub struct StateManager {
    current_state: LifecycleState,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            current_state: LifecycleState::Empty,
        }
    }

    /// 获取当前状态
    /// Gets the current state
    pub fn current_state(&self) -> LifecycleState {
        self.current_state
    }

    /// 尝试转换到新状态
    /// Attempts to transition to a new state
    pub fn transition_to(&mut self, new_state: LifecycleState) -> Result<()> {
        if !self.is_valid_transition(new_state) {
            warn!(
                current_state = ?self.current_state,
                attempted_state = ?new_state,
                "Invalid state transition attempted"
            );
            return Err(Error::InvalidTransition {
                current: self.current_state,
                attempted: new_state,
            });
        }

        let old_state = self.current_state;
        self.current_state = new_state;
        trace!(?old_state, ?new_state, "State transition successful");
        Ok(())
    }

    /// 验证状态转换是否合法
    /// Validate if state transition is legal
    fn is_valid_transition(&self, new_state: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self.current_state, new_state) {
            // 关闭是终止状态
            // ShuttingDown is terminal
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,

            (Empty, Building) => true,
            (Building, Live) => true,
            // 构建失败
            // Failed build
            (Building, Empty) => true,
            // 重建前的拆除
            // Teardown before a rebuild
            (Live, Empty) => true,

            _ => false,
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_rebuild_cycle() {
        let mut manager = StateManager::new();
        assert_eq!(manager.current_state(), Empty);

        for _ in 0..3 {
            manager.transition_to(Building).unwrap();
            manager.transition_to(Live).unwrap();
            manager.transition_to(Empty).unwrap();
        }
        assert_eq!(manager.current_state(), Empty);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut manager = StateManager::new();
        assert!(manager.transition_to(Live).is_err());
        assert!(manager.transition_to(Empty).is_err());

        manager.transition_to(Building).unwrap();
        assert!(manager.transition_to(Building).is_err());

        manager.transition_to(Live).unwrap();
        assert!(matches!(
            manager.transition_to(Building),
            Err(Error::InvalidTransition {
                current: Live,
                attempted: Building
            })
        ));
    }

    #[test]
    fn test_shutting_down_is_terminal() {
        let mut manager = StateManager::new();
        manager.transition_to(Building).unwrap();
        manager.transition_to(ShuttingDown).unwrap();
        assert_eq!(manager.current_state().name(), "ShuttingDown");

        for state in [Empty, Building, Live, ShuttingDown] {
            assert!(manager.transition_to(state).is_err());
        }
    }
}
