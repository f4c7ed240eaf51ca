// ==========================================
// 需求预测冲减模块 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、分配规则
// 红线: 不含数据访问逻辑,不含冲减求解逻辑
// ==========================================

pub mod calendar;
pub mod demand;
pub mod error;
pub mod forecast;
pub mod hierarchy;
pub mod order;
pub mod record;
pub mod time;
pub mod types;

// 重导出核心类型
pub use calendar::{BucketCalendar, BucketSize, CalendarBucket, WeightedCalendar};
pub use demand::Demand;
pub use error::{ForecastError, ForecastResult};
pub use forecast::{Forecast, ForecastBucket};
pub use hierarchy::{Hierarchies, Hierarchy};
pub use order::{BucketConsumption, CustomerOrder, OrderAllocation, OrderBook};
pub use record::{BucketRecord, ForecastRecord, ForecastSnapshot, SolverRecord};
pub use time::DateRange;
pub use types::{DeliveryPolicy, DemandKind, DemandPolicy, PlanPolicy, PolicyToken, SolverMode};
