// ==========================================
// 需求预测冲减模块 - 数据仓储层
// ==========================================
// 红线: Repository 不含冲减逻辑
// ==========================================
// 职责: 预测内存仓储（含字典）、日历登记簿、SQLite 持久化
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod calendar_registry;
pub mod error;
pub mod forecast_repo;
pub mod forecast_store;

// 重导出核心仓储
pub use calendar_registry::{CalendarDeletionGuard, CalendarRegistry};
pub use error::{RepositoryError, RepositoryResult};
pub use forecast_repo::{ForecastKey, ForecastRepository};
pub use forecast_store::ForecastStore;
