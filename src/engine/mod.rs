// ==========================================
// 需求预测冲减模块 - 引擎层
// ==========================================
// 职责: 订单匹配、冲减求解、订单变更通知、计划上下文
// 红线: Engine 不拼 SQL
// ==========================================

pub mod context;
pub mod events;
pub mod matcher;
pub mod netting;

// 重导出核心引擎
pub use context::{lock_context, PlanningContext, SharedContext, DEFAULT_SOLVER_NAME};
pub use events::{dispatch, NoOpOrderObserver, OrderChangeObserver, OrderEvent, OrderEventKind};
pub use matcher::ForecastMatcher;
pub use netting::{ForecastSolver, NettingOutcome};
