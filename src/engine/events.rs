// ==========================================
// 需求预测冲减模块 - 订单变更通知
// ==========================================
// 职责: 定义订单变更事件与观察者 trait
// 说明: PlanningContext 发布事件，自动模式的冲减求解器订阅
// ==========================================

use crate::config::ForecastConfig;
use crate::domain::error::ForecastResult;
use crate::domain::hierarchy::Hierarchies;
use crate::domain::order::{CustomerOrder, OrderBook};
use crate::engine::netting::NettingOutcome;
use crate::repository::ForecastRepository;
use serde::{Deserialize, Serialize};

// ==========================================
// 订单事件类型
// ==========================================

/// 订单事件触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    /// 订单新增
    Created,
    /// 订单修改（数量 / 交期 / 物料 / 客户）
    Modified,
    /// 订单删除
    Deleted,
}

impl OrderEventKind {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            OrderEventKind::Created => "Created",
            OrderEventKind::Modified => "Modified",
            OrderEventKind::Deleted => "Deleted",
        }
    }
}

/// 订单变更事件
///
/// 修改事件同时携带修改前后的订单，便于先回退再冲减
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    Created(CustomerOrder),
    Modified {
        before: CustomerOrder,
        after: CustomerOrder,
    },
    Deleted(CustomerOrder),
}

impl OrderEvent {
    pub fn kind(&self) -> OrderEventKind {
        match self {
            OrderEvent::Created(_) => OrderEventKind::Created,
            OrderEvent::Modified { .. } => OrderEventKind::Modified,
            OrderEvent::Deleted(_) => OrderEventKind::Deleted,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::Created(order) | OrderEvent::Deleted(order) => &order.id,
            OrderEvent::Modified { after, .. } => &after.id,
        }
    }
}

// ==========================================
// 观察者 Trait
// ==========================================

/// 订单变更观察者
///
/// # 实现说明
/// - `ForecastSolver` 实现此 trait，只有自动模式才订阅
/// - 事件处理直接修改传入的预测仓储，并在订单簿中记账
pub trait OrderChangeObserver {
    /// 是否订阅订单变更
    fn is_subscribed(&self) -> bool;

    /// 处理订单变更事件
    ///
    /// # 返回
    /// - `Ok(outcomes)`: 本次事件引起的冲减 / 回退结果
    /// - `Err`: 处理失败（已提交的分桶状态不回滚）
    fn on_order_change(
        &self,
        event: &OrderEvent,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        orders: &mut OrderBook,
    ) -> ForecastResult<Vec<NettingOutcome>>;
}

/// 空操作观察者
///
/// 手动模式下由 PlanningContext 使用，订单留待批量冲减
#[derive(Debug, Clone, Default)]
pub struct NoOpOrderObserver;

impl OrderChangeObserver for NoOpOrderObserver {
    fn is_subscribed(&self) -> bool {
        false
    }

    fn on_order_change(
        &self,
        event: &OrderEvent,
        _repo: &mut ForecastRepository,
        _hierarchies: &Hierarchies,
        _config: &ForecastConfig,
        _orders: &mut OrderBook,
    ) -> ForecastResult<Vec<NettingOutcome>> {
        tracing::debug!(
            "NoOpOrderObserver: 跳过事件 - order_id={}, kind={}",
            event.order_id(),
            event.kind().as_str()
        );
        Ok(Vec::new())
    }
}

/// 向观察者分发事件（未订阅则跳过）
pub fn dispatch(
    observer: &dyn OrderChangeObserver,
    event: &OrderEvent,
    repo: &mut ForecastRepository,
    hierarchies: &Hierarchies,
    config: &ForecastConfig,
    orders: &mut OrderBook,
) -> ForecastResult<Vec<NettingOutcome>> {
    if !observer.is_subscribed() {
        tracing::debug!(
            order_id = event.order_id(),
            kind = event.kind().as_str(),
            "观察者未订阅，跳过订单事件"
        );
        return Ok(Vec::new());
    }
    observer.on_order_change(event, repo, hierarchies, config, orders)
}
