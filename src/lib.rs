// ==========================================
// 需求预测冲减模块 - 核心库
// ==========================================
// 职责: 预测分桶与按权重分配、订单对预测的冲减
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 预测仓储 / 日历登记簿 / 持久化
pub mod repository;

// 引擎层 - 匹配与冲减
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 模块参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DeliveryPolicy, DemandKind, DemandPolicy, PlanPolicy, SolverMode};

// 领域实体
pub use domain::{
    BucketCalendar, BucketSize, CustomerOrder, DateRange, Demand, Forecast, ForecastBucket,
    ForecastError, ForecastResult, Hierarchies, Hierarchy, OrderBook, WeightedCalendar,
};

// 仓储
pub use repository::{CalendarRegistry, ForecastRepository, ForecastStore};

// 引擎
pub use engine::{ForecastSolver, NettingOutcome, OrderEvent, PlanningContext, SharedContext};

// 配置
pub use config::{ConfigManager, ForecastConfig};

// ==========================================
// 常量定义
// ==========================================

// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 名称
pub const APP_NAME: &str = "需求预测冲减模块";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
