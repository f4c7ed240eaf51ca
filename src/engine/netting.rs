// ==========================================
// 需求预测冲减模块 - 冲减求解器
// ==========================================
// 职责: 订单匹配预测后，按交期沿分桶扣减剩余数量
// 红线: 分桶剩余数量永不为负
// 红线: 同一订单重复冲减会重复扣减（调用方负责只冲减一次）
// 红线: 回退只恢复订单台账记录的扣减量，未冲减过的订单不回退
// ==========================================
// 输入: 订单 + 预测仓储（可变）+ 层级 + 模块参数
// 输出: NettingOutcome（匹配的预测、已冲减、未冲减、逐桶扣减量）
// ==========================================

use crate::config::ForecastConfig;
use crate::domain::demand::Demand;
use crate::domain::error::ForecastResult;
use crate::domain::forecast::Forecast;
use crate::domain::hierarchy::Hierarchies;
use crate::domain::order::{BucketConsumption, CustomerOrder, OrderAllocation, OrderBook};
use crate::domain::record::SolverRecord;
use crate::domain::types::SolverMode;
use crate::engine::events::{OrderChangeObserver, OrderEvent};
use crate::engine::matcher::ForecastMatcher;
use crate::repository::ForecastRepository;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::instrument;

// ==========================================
// 冲减结果
// ==========================================

/// 单个订单的冲减结果
///
/// 回退时 netted 表示恢复到预测的数量，unnetted 表示台账中未能恢复的数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NettingOutcome {
    pub order_id: String,
    /// 匹配到的预测（None 表示没有匹配）
    pub forecast: Option<String>,
    pub netted: f64,
    /// 未能冲减的数量（缺口）
    pub unnetted: f64,
    pub consumptions: Vec<BucketConsumption>,
}

impl NettingOutcome {
    fn unmatched(order: &CustomerOrder) -> Self {
        Self {
            order_id: order.id.clone(),
            forecast: None,
            netted: 0.0,
            unnetted: order.quantity.max(0.0),
            consumptions: Vec::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.forecast.is_some()
    }

    pub fn is_fully_netted(&self) -> bool {
        self.unnetted <= 0.0
    }

    /// 本次冲减的台账
    pub fn allocation(&self) -> OrderAllocation {
        OrderAllocation {
            order_id: self.order_id.clone(),
            forecast: self.forecast.clone(),
            consumptions: self.consumptions.clone(),
        }
    }
}

// ==========================================
// ForecastSolver - 冲减求解器
// ==========================================
#[derive(Debug, Clone)]
pub struct ForecastSolver {
    name: String,
    mode: SolverMode,
}

impl ForecastSolver {
    /// 创建求解器（默认手动模式）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: SolverMode::Manual,
        }
    }

    pub fn from_record(record: &SolverRecord) -> Self {
        Self {
            name: record.name.clone(),
            mode: record.mode(),
        }
    }

    pub fn to_record(&self) -> SolverRecord {
        SolverRecord {
            name: self.name.clone(),
            automatic: self.is_automatic(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> SolverMode {
        self.mode
    }

    pub fn is_automatic(&self) -> bool {
        self.mode == SolverMode::Automatic
    }

    /// 切换运行模式（自动模式订阅订单变更通知）
    pub fn set_automatic(&mut self, automatic: bool) {
        self.mode = if automatic {
            SolverMode::Automatic
        } else {
            SolverMode::Manual
        };
        tracing::info!(solver = %self.name, mode = %self.mode, "冲减求解器模式已切换");
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 冲减单个订单
    ///
    /// 规则:
    /// 1) 找不到匹配的预测 → 不修改任何分桶，全部数量计入缺口
    /// 2) 从覆盖交期的分桶开始，每桶扣减 min(剩余, 分桶剩余)
    /// 3) PLANSHORT: 只扣交期所在分桶
    /// 4) PLANLATE: 向后续分桶结转，直到计划期结束
    /// 5) 交期早于计划期: PLANLATE 从第一个分桶开始，PLANSHORT 不冲减
    #[instrument(skip(self, repo, hierarchies, config, order), fields(
        solver = %self.name,
        order = %order.id,
        quantity = order.quantity
    ))]
    pub fn solve_order(
        &self,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        order: &CustomerOrder,
    ) -> ForecastResult<NettingOutcome> {
        let Some(name) = matched_forecast(repo, hierarchies, config, order) else {
            return Ok(NettingOutcome::unmatched(order));
        };

        let forecast = repo.require_mut(&name)?;
        let window = netting_window(forecast, order.due);
        let mut remaining = order.quantity.max(0.0);
        let mut consumptions = Vec::new();

        for idx in window {
            if remaining <= 0.0 {
                break;
            }
            let bucket = &mut forecast.buckets_mut()[idx];
            let taken = bucket.consume(remaining);
            if taken > 0.0 {
                remaining -= taken;
                consumptions.push(BucketConsumption {
                    bucket_start: bucket.start(),
                    quantity: taken,
                });
            }
        }

        let outcome = NettingOutcome {
            order_id: order.id.clone(),
            forecast: Some(name),
            netted: order.quantity.max(0.0) - remaining,
            unnetted: remaining,
            consumptions,
        };
        if outcome.is_fully_netted() {
            tracing::debug!(netted = outcome.netted, "订单已冲减");
        } else {
            tracing::info!(
                netted = outcome.netted,
                shortfall = outcome.unnetted,
                "订单冲减存在缺口"
            );
        }
        Ok(outcome)
    }

    /// 按台账回退一次冲减
    ///
    /// 只恢复台账中记录的分桶数量（每桶不超过其已冲减量），
    /// 预测已被删除时跳过
    #[instrument(skip(self, repo, allocation), fields(
        solver = %self.name,
        order = %allocation.order_id
    ))]
    pub fn reverse_allocation(
        &self,
        repo: &mut ForecastRepository,
        allocation: &OrderAllocation,
    ) -> NettingOutcome {
        let requested = allocation.total();
        let mut outcome = NettingOutcome {
            order_id: allocation.order_id.clone(),
            forecast: allocation.forecast.clone(),
            netted: 0.0,
            unnetted: requested,
            consumptions: Vec::new(),
        };
        let Some(forecast) = allocation
            .forecast
            .as_deref()
            .and_then(|name| repo.get_mut(name))
        else {
            if allocation.forecast.is_some() {
                tracing::warn!(forecast = ?allocation.forecast, "预测已不存在，跳过回退");
            }
            return outcome;
        };

        for consumption in &allocation.consumptions {
            let Some(bucket) = forecast
                .buckets_mut()
                .iter_mut()
                .find(|b| b.start() == consumption.bucket_start)
            else {
                continue;
            };
            let given = bucket.restore(consumption.quantity);
            if given > 0.0 {
                outcome.consumptions.push(BucketConsumption {
                    bucket_start: consumption.bucket_start,
                    quantity: given,
                });
            }
        }

        outcome.netted = outcome.consumptions.iter().map(|c| c.quantity).sum();
        outcome.unnetted = (requested - outcome.netted).max(0.0);
        tracing::debug!(restored = outcome.netted, "订单冲减已回退");
        outcome
    }

    /// 冲减订单当前版本：先回退旧版本台账，再冲减并记账
    ///
    /// # 返回
    /// (旧版本回退结果, 本次冲减结果)
    fn renet_order(
        &self,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        orders: &mut OrderBook,
        order: &CustomerOrder,
    ) -> ForecastResult<(Option<NettingOutcome>, NettingOutcome)> {
        let reversed = orders
            .take_allocation(&order.id)
            .map(|previous| self.reverse_allocation(repo, &previous));
        let outcome = self.solve_order(repo, hierarchies, config, order)?;
        orders.record_allocation(outcome.allocation());
        Ok((reversed, outcome))
    }

    /// 批量冲减待处理订单
    ///
    /// 顺序: 先回退已删除订单的台账，再按 交期 → 优先级 → 创建序号
    /// 冲减待处理订单（修改过的订单先回退旧版本）；处理后清除待冲减标记
    #[instrument(skip_all, fields(solver = %self.name))]
    pub fn solve_all(
        &self,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        orders: &mut OrderBook,
    ) -> ForecastResult<Vec<NettingOutcome>> {
        let mut restored = 0.0;
        for allocation in orders.drain_retired() {
            restored += self.reverse_allocation(repo, &allocation).netted;
        }

        let pending = orders.pending_orders();
        let mut outcomes = Vec::with_capacity(pending.len());
        for order in &pending {
            let (reversed, outcome) = self.renet_order(repo, hierarchies, config, orders, order)?;
            restored += reversed.map(|r| r.netted).unwrap_or(0.0);
            outcomes.push(outcome);
        }

        let netted: f64 = outcomes.iter().map(|o| o.netted).sum();
        let shortfall: f64 = outcomes.iter().map(|o| o.unnetted).sum();
        let unmatched = outcomes.iter().filter(|o| !o.is_matched()).count();
        tracing::info!(
            order_count = outcomes.len(),
            unmatched,
            netted,
            shortfall,
            restored,
            "批量冲减完成"
        );
        Ok(outcomes)
    }

    /// 订单变更回调（手动模式不做任何处理）
    ///
    /// - Created: 冲减并记账
    /// - Modified: 回退旧版本台账（如有），再冲减新版本
    /// - Deleted: 回退已删除订单的台账（从未冲减则不回退）
    pub fn callback(
        &self,
        event: &OrderEvent,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        orders: &mut OrderBook,
    ) -> ForecastResult<Vec<NettingOutcome>> {
        if !self.is_automatic() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            solver = %self.name,
            order_id = event.order_id(),
            kind = event.kind().as_str(),
            "处理订单变更事件"
        );
        match event {
            OrderEvent::Created(order) | OrderEvent::Modified { after: order, .. } => {
                let (reversed, outcome) =
                    self.renet_order(repo, hierarchies, config, orders, order)?;
                Ok(reversed.into_iter().chain(Some(outcome)).collect())
            }
            OrderEvent::Deleted(order) => Ok(orders
                .take_retired(&order.id)
                .map(|allocation| self.reverse_allocation(repo, &allocation))
                .into_iter()
                .collect()),
        }
    }
}

impl OrderChangeObserver for ForecastSolver {
    fn is_subscribed(&self) -> bool {
        self.is_automatic()
    }

    fn on_order_change(
        &self,
        event: &OrderEvent,
        repo: &mut ForecastRepository,
        hierarchies: &Hierarchies,
        config: &ForecastConfig,
        orders: &mut OrderBook,
    ) -> ForecastResult<Vec<NettingOutcome>> {
        self.callback(event, repo, hierarchies, config, orders)
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn matched_forecast(
    repo: &ForecastRepository,
    hierarchies: &Hierarchies,
    config: &ForecastConfig,
    order: &CustomerOrder,
) -> Option<String> {
    ForecastMatcher::new(repo, hierarchies, config)
        .match_order(order)
        .map(|f| f.name().to_string())
}

/// 冲减分桶序列（下标）
///
/// 起点为第一个 end > due 的分桶：覆盖交期则为交期分桶，
/// 否则交期落在计划期之前或日历空档中，只有 PLANLATE 才向后寻找
fn netting_window(forecast: &Forecast, due: NaiveDateTime) -> Vec<usize> {
    let buckets = forecast.buckets();
    let plan_late = forecast.policy().plan_late();

    let Some(first) = buckets.iter().position(|b| b.range().end > due) else {
        return Vec::new();
    };
    let covers_due = buckets[first].range().contains(due);

    match (covers_due, plan_late) {
        (_, true) => (first..buckets.len()).collect(),
        (true, false) => vec![first],
        (false, false) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{BucketSize, WeightedCalendar};
    use crate::domain::time::DateRange;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn dt(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn setup(policy: &str, per_week: f64) -> (ForecastRepository, ForecastConfig) {
        let horizon = DateRange::new(dt(1, 5), dt(2, 2));
        let config = ForecastConfig::default().with_horizon(horizon);
        let mut repo = ForecastRepository::new();
        let f = repo
            .create_forecast("F1", Some("A"), Some("X"), horizon)
            .unwrap();
        f.set_calendar(Arc::new(WeightedCalendar::regular(
            "weeks",
            dt(1, 5),
            dt(2, 2),
            BucketSize::Week,
            1.0,
        )))
        .unwrap();
        f.set_policy(policy).unwrap();
        f.set_quantity_range(horizon, per_week * 4.0).unwrap();
        (repo, config)
    }

    fn order(qty: f64, due: NaiveDateTime) -> CustomerOrder {
        CustomerOrder::new("O1", "A", Some("X"), qty, due)
    }

    #[test]
    fn test_plan_short_clamps_to_due_bucket() {
        let (mut repo, config) = setup("PLANSHORT", 100.0);
        let solver = ForecastSolver::new("netting");

        let outcome = solver
            .solve_order(&mut repo, &Hierarchies::new(), &config, &order(150.0, dt(1, 14)))
            .unwrap();

        assert!((outcome.netted - 100.0).abs() < 1e-9);
        assert!((outcome.unnetted - 50.0).abs() < 1e-9);
        let f = repo.get("F1").unwrap();
        assert!(f.buckets()[1].net().abs() < 1e-9);
        assert!((f.buckets()[2].net() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_late_carries_forward() {
        let (mut repo, config) = setup("PLANLATE", 100.0);
        let solver = ForecastSolver::new("netting");

        let outcome = solver
            .solve_order(&mut repo, &Hierarchies::new(), &config, &order(150.0, dt(1, 14)))
            .unwrap();

        assert!(outcome.is_fully_netted());
        assert_eq!(outcome.consumptions.len(), 2);
        assert_eq!(outcome.consumptions[1].bucket_start, dt(1, 19));
        let f = repo.get("F1").unwrap();
        assert!((f.buckets()[2].net() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_excess_past_horizon_is_shortfall() {
        let (mut repo, config) = setup("PLANLATE", 100.0);
        let solver = ForecastSolver::new("netting");

        let outcome = solver
            .solve_order(&mut repo, &Hierarchies::new(), &config, &order(250.0, dt(1, 27)))
            .unwrap();

        assert!((outcome.netted - 100.0).abs() < 1e-9);
        assert!((outcome.unnetted - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_due_before_horizon() {
        let (mut repo, config) = setup("PLANSHORT", 100.0);
        let solver = ForecastSolver::new("netting");
        let outcome = solver
            .solve_order(&mut repo, &Hierarchies::new(), &config, &order(10.0, dt(1, 1)))
            .unwrap();
        assert!(outcome.is_matched());
        assert_eq!(outcome.netted, 0.0);

        let (mut repo, config) = setup("PLANLATE", 100.0);
        let outcome = solver
            .solve_order(&mut repo, &Hierarchies::new(), &config, &order(10.0, dt(1, 1)))
            .unwrap();
        assert_eq!(outcome.consumptions[0].bucket_start, dt(1, 5));
    }

    #[test]
    fn test_reverse_restores_netted_quantity() {
        let (mut repo, config) = setup("PLANLATE", 100.0);
        let solver = ForecastSolver::new("netting");
        let h = Hierarchies::new();
        let o = order(150.0, dt(1, 14));

        let outcome = solver.solve_order(&mut repo, &h, &config, &o).unwrap();
        let reversed = solver.reverse_allocation(&mut repo, &outcome.allocation());

        assert!((reversed.netted - 150.0).abs() < 1e-9);
        assert_eq!(reversed.unnetted, 0.0);
        let f = repo.get("F1").unwrap();
        assert!(f.buckets().iter().all(|b| (b.net() - b.total()).abs() < 1e-9));
    }

    #[test]
    fn test_reverse_only_touches_recorded_buckets() {
        let (mut repo, config) = setup("PLANLATE", 100.0);
        let solver = ForecastSolver::new("netting");
        let h = Hierarchies::new();

        let first = solver
            .solve_order(&mut repo, &h, &config, &order(80.0, dt(1, 14)))
            .unwrap();
        let second = CustomerOrder::new("O2", "A", Some("X"), 50.0, dt(1, 14));
        solver.solve_order(&mut repo, &h, &config, &second).unwrap();

        solver.reverse_allocation(&mut repo, &first.allocation());

        // O2 的扣减 (第二周 20 + 第三周 30) 保持不变
        let f = repo.get("F1").unwrap();
        assert!((f.buckets()[1].net() - 80.0).abs() < 1e-9);
        assert!((f.buckets()[2].net() - 70.0).abs() < 1e-9);
        assert!((f.quantity() - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_skips_missing_forecast() {
        let (mut repo, _config) = setup("PLANLATE", 100.0);
        let solver = ForecastSolver::new("netting");
        let allocation = OrderAllocation {
            order_id: "O1".to_string(),
            forecast: Some("GONE".to_string()),
            consumptions: vec![BucketConsumption {
                bucket_start: dt(1, 12),
                quantity: 10.0,
            }],
        };

        let reversed = solver.reverse_allocation(&mut repo, &allocation);
        assert_eq!(reversed.netted, 0.0);
        assert_eq!(reversed.unnetted, 10.0);
    }

    #[test]
    fn test_manual_callback_is_noop() {
        let (mut repo, config) = setup("PLANLATE", 100.0);
        let mut solver = ForecastSolver::new("netting");
        let mut orders = OrderBook::new();
        let event = OrderEvent::Created(order(30.0, dt(1, 14)));

        let outcomes = solver
            .callback(&event, &mut repo, &Hierarchies::new(), &config, &mut orders)
            .unwrap();
        assert!(outcomes.is_empty());
        assert!((repo.get("F1").unwrap().quantity() - 400.0).abs() < 1e-9);

        solver.set_automatic(true);
        let outcomes = solver
            .callback(&event, &mut repo, &Hierarchies::new(), &config, &mut orders)
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!((repo.get("F1").unwrap().quantity() - 370.0).abs() < 1e-9);
        assert!((orders.allocation("O1").unwrap().total() - 30.0).abs() < 1e-9);
    }
}
