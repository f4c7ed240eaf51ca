// ==========================================
// 需求预测冲减模块 - 预测与预测分桶
// ==========================================
// 职责: 预测汇总实体、分桶生成、数量分配（按权重 × 重叠时长）
// 红线: 已有分桶数量后不得更换日历
// 红线: 汇总预测的数量与交期由分桶派生，不可直接设置
// ==========================================

use crate::domain::calendar::{BucketCalendar, CalendarBucket};
use crate::domain::demand::Demand;
use crate::domain::error::{ForecastError, ForecastResult};
use crate::domain::time::DateRange;
use crate::domain::types::{DemandKind, DemandPolicy};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// ForecastBucket - 预测分桶
// ==========================================
// 归属: 由 Forecast 独占，只保留所属预测名称作为回指
// 可见性: 始终隐藏
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastBucket {
    owner: String,
    name: String,
    range: DateRange,
    weight: f64,

    // ===== 数量 =====
    total: f64, // 分配得到的预测数量
    net: f64,   // 冲减后剩余数量

    // ===== 与所属预测保持一致的属性 =====
    priority: i32,
    item: Option<String>,
    customer: Option<String>,
    operation: Option<String>,
    policy: DemandPolicy,
}

impl ForecastBucket {
    fn new(owner: &Forecast, source: CalendarBucket) -> Self {
        Self {
            owner: owner.name.clone(),
            name: format!(
                "{} - {}",
                owner.name,
                source.range.start.format("%Y-%m-%dT%H:%M:%S")
            ),
            range: source.range,
            weight: source.weight,
            total: 0.0,
            net: 0.0,
            priority: owner.priority,
            item: owner.item.clone(),
            customer: owner.customer.clone(),
            operation: owner.operation.clone(),
            policy: owner.policy,
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn start(&self) -> NaiveDateTime {
        self.range.start
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// 分配得到的预测数量
    pub fn total(&self) -> f64 {
        self.total
    }

    /// 冲减后剩余数量
    pub fn net(&self) -> f64 {
        self.net
    }

    /// 已被订单冲减的数量
    pub fn consumed(&self) -> f64 {
        (self.total - self.net).max(0.0)
    }

    /// 重设预测数量，已冲减部分保持不变
    pub(crate) fn assign_total(&mut self, total: f64) {
        let consumed = self.consumed();
        self.total = total;
        self.net = (total - consumed).max(0.0);
    }

    /// 冲减，返回实际扣减量（不会出现负数）
    pub(crate) fn consume(&mut self, quantity: f64) -> f64 {
        let taken = quantity.min(self.net).max(0.0);
        self.net -= taken;
        taken
    }

    /// 冲减回退，返回实际恢复量（不超过已冲减量）
    pub(crate) fn restore(&mut self, quantity: f64) -> f64 {
        let given = quantity.min(self.consumed()).max(0.0);
        self.net += given;
        given
    }

    /// 直接写入剩余数量（仅用于持久化恢复）
    pub(crate) fn restore_state(&mut self, total: f64, net: f64) {
        self.total = total;
        self.net = net.clamp(0.0, total.max(0.0));
    }
}

impl Demand for ForecastBucket {
    fn kind(&self) -> DemandKind {
        DemandKind::Bucket
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn due(&self) -> Option<NaiveDateTime> {
        Some(self.range.start)
    }

    fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    fn quantity(&self) -> f64 {
        self.net
    }

    fn policy(&self) -> DemandPolicy {
        self.policy
    }

    fn is_hidden(&self) -> bool {
        true
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.owner)
    }

    fn set_quantity(&mut self, quantity: f64) -> ForecastResult<()> {
        self.assign_total(quantity);
        Ok(())
    }

    fn set_due(&mut self, _due: NaiveDateTime) -> ForecastResult<()> {
        Err(ForecastError::InvalidMutation {
            forecast: self.name.clone(),
            field: "交期".to_string(),
        })
    }
}

// ==========================================
// Forecast - 预测汇总
// ==========================================
#[derive(Debug, Clone)]
pub struct Forecast {
    name: String,
    item: Option<String>,
    customer: Option<String>,
    priority: i32,
    operation: Option<String>,
    policy: DemandPolicy,
    calendar: Option<Arc<dyn BucketCalendar>>,
    horizon: DateRange,
    buckets: Vec<ForecastBucket>,
}

impl Forecast {
    /// 创建预测（尚未设置日历，无分桶）
    pub fn new(
        name: impl Into<String>,
        item: Option<&str>,
        customer: Option<&str>,
        horizon: DateRange,
    ) -> Self {
        Self {
            name: name.into(),
            item: item.map(str::to_string),
            customer: customer.map(str::to_string),
            priority: 0,
            operation: None,
            policy: DemandPolicy::default(),
            calendar: None,
            horizon,
            buckets: Vec::new(),
        }
    }

    pub fn horizon(&self) -> DateRange {
        self.horizon
    }

    pub fn calendar(&self) -> Option<&Arc<dyn BucketCalendar>> {
        self.calendar.as_ref()
    }

    pub fn calendar_name(&self) -> Option<&str> {
        self.calendar.as_ref().map(|c| c.name())
    }

    pub fn buckets(&self) -> &[ForecastBucket] {
        &self.buckets
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut [ForecastBucket] {
        &mut self.buckets
    }

    /// 覆盖指定时间点的分桶
    pub fn bucket_at(&self, at: NaiveDateTime) -> Option<&ForecastBucket> {
        self.buckets.iter().find(|b| b.range.contains(at))
    }

    /// 分配得到的预测总量
    pub fn total_quantity(&self) -> f64 {
        self.buckets.iter().map(|b| b.total).sum()
    }

    // ==========================================
    // 分桶生成
    // ==========================================

    /// 设置分桶日历
    ///
    /// 规则:
    /// - 任一分桶已有非零数量 → 拒绝，分桶保持不变
    /// - 否则丢弃旧分桶，按日历在计划期内的每个分桶生成零数量的预测分桶
    #[instrument(skip(self, calendar), fields(forecast = %self.name, calendar = calendar.name()))]
    pub fn set_calendar(&mut self, calendar: Arc<dyn BucketCalendar>) -> ForecastResult<()> {
        if let Some(bucket) = self
            .buckets
            .iter()
            .find(|b| b.total != 0.0 || b.net != 0.0)
        {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(bucket.range),
                "分桶已有预测数量，不能再修改日历",
            ));
        }

        let generated: Vec<ForecastBucket> = calendar
            .buckets_over(&self.horizon)
            .into_iter()
            .map(|cb| ForecastBucket::new(self, cb))
            .collect();

        tracing::debug!(bucket_count = generated.len(), "预测分桶已生成");
        self.buckets = generated;
        self.calendar = Some(calendar);
        Ok(())
    }

    // ==========================================
    // 数量分配
    // ==========================================

    /// 按日期区间设置预测数量
    ///
    /// 规则:
    /// 1) 未设置日历 → 数据校验错误
    /// 2) start == end → 覆盖该时点的分桶直接取 quantity
    /// 3) 否则按 权重 × 重叠秒数 在相交分桶间按比例分配
    /// 4) 相交分桶权重全为 0 → 数据校验错误，分桶不变
    #[instrument(skip(self), fields(forecast = %self.name))]
    pub fn set_quantity_range(&mut self, range: DateRange, quantity: f64) -> ForecastResult<()> {
        if self.calendar.is_none() {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(range),
                "未设置日历，无法分配预测数量",
            ));
        }
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(range),
                format!("预测数量必须为非负数: {}", quantity),
            ));
        }

        // 退化区间：直接写入单个分桶
        if range.is_degenerate() {
            let name = self.name.clone();
            let bucket = self
                .buckets
                .iter_mut()
                .find(|b| b.range.contains(range.start))
                .ok_or_else(|| {
                    ForecastError::validation(name, Some(range), "该时点没有对应的预测分桶")
                })?;
            bucket.assign_total(quantity);
            return Ok(());
        }

        // 权重贡献 = 分桶权重 × 重叠时长
        let contributions: Vec<(usize, f64)> = self
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.range.intersects(&range))
            .map(|(idx, b)| (idx, b.weight * b.range.overlap_secs(&range) as f64))
            .collect();
        let total_weight: f64 = contributions.iter().map(|(_, c)| *c).sum();

        if total_weight <= 0.0 {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(range),
                "预测数量分配到了没有可用产能的日期区间（相交分桶权重均为 0）",
            ));
        }

        // 最后一个有权重的分桶承接舍入余量，保证总量守恒
        let last_weighted = contributions
            .iter()
            .rev()
            .find(|(_, c)| *c > 0.0)
            .map(|(idx, _)| *idx);
        let mut assigned = 0.0;
        for (idx, contribution) in &contributions {
            let share = if Some(*idx) == last_weighted {
                quantity - assigned
            } else {
                quantity * contribution / total_weight
            };
            assigned += share;
            self.buckets[*idx].assign_total(share);
        }

        tracing::debug!(
            bucket_count = contributions.len(),
            quantity,
            "预测数量已分配"
        );
        Ok(())
    }

    // ==========================================
    // 属性传播（分桶始终与所属预测一致）
    // ==========================================

    /// 仅由 ForecastRepository 调用，以保证字典同步
    pub(crate) fn set_item(&mut self, item: Option<&str>) {
        self.item = item.map(str::to_string);
        for b in &mut self.buckets {
            b.item = self.item.clone();
        }
    }

    /// 仅由 ForecastRepository 调用，以保证字典同步
    pub(crate) fn set_customer(&mut self, customer: Option<&str>) {
        self.customer = customer.map(str::to_string);
        for b in &mut self.buckets {
            b.customer = self.customer.clone();
        }
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
        for b in &mut self.buckets {
            b.priority = priority;
        }
    }

    pub fn set_operation(&mut self, operation: Option<&str>) {
        self.operation = operation.map(str::to_string);
        for b in &mut self.buckets {
            b.operation = self.operation.clone();
        }
    }

    /// 重置为默认策略后应用策略标记
    pub fn set_policy(&mut self, tokens: &str) -> ForecastResult<()> {
        self.apply_policy(DemandPolicy::default(), tokens)
    }

    /// 在当前策略上叠加策略标记
    pub fn add_policy(&mut self, tokens: &str) -> ForecastResult<()> {
        self.apply_policy(self.policy, tokens)
    }

    fn apply_policy(&mut self, base: DemandPolicy, tokens: &str) -> ForecastResult<()> {
        let policy = base.with_tokens(tokens).map_err(|token| {
            ForecastError::validation(self.name.clone(), None, format!("无法识别的策略: {}", token))
        })?;
        self.policy = policy;
        for b in &mut self.buckets {
            b.policy = policy;
        }
        Ok(())
    }
}

impl Demand for Forecast {
    fn kind(&self) -> DemandKind {
        DemandKind::Aggregate
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn due(&self) -> Option<NaiveDateTime> {
        self.buckets.first().map(|b| b.range.start)
    }

    fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// 剩余（净）预测数量
    fn quantity(&self) -> f64 {
        self.buckets.iter().map(|b| b.net).sum()
    }

    fn policy(&self) -> DemandPolicy {
        self.policy
    }

    fn set_quantity(&mut self, _quantity: f64) -> ForecastResult<()> {
        Err(ForecastError::InvalidMutation {
            forecast: self.name.clone(),
            field: "数量".to_string(),
        })
    }

    fn set_due(&mut self, _due: NaiveDateTime) -> ForecastResult<()> {
        Err(ForecastError::InvalidMutation {
            forecast: self.name.clone(),
            field: "交期".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::{BucketSize, WeightedCalendar};
    use crate::domain::types::PlanPolicy;
    use chrono::NaiveDate;

    fn dt(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn weekly_forecast() -> Forecast {
        let horizon = DateRange::new(dt(1, 5), dt(2, 2));
        let mut f = Forecast::new("F1", Some("ITEM-A"), Some("CUST-X"), horizon);
        let cal = WeightedCalendar::regular("weeks", dt(1, 5), dt(2, 2), BucketSize::Week, 1.0);
        f.set_calendar(Arc::new(cal)).unwrap();
        f
    }

    #[test]
    fn test_set_calendar_generates_zero_buckets() {
        let f = weekly_forecast();
        assert_eq!(f.buckets().len(), 4);
        assert!(f.buckets().iter().all(|b| b.total() == 0.0 && b.is_hidden()));
        assert_eq!(f.buckets()[0].owner(), Some("F1"));
        assert_eq!(f.buckets()[0].item(), Some("ITEM-A"));
        assert_eq!(f.due(), Some(dt(1, 5)));
    }

    #[test]
    fn test_even_distribution() {
        let mut f = weekly_forecast();
        f.set_quantity_range(DateRange::new(dt(1, 5), dt(2, 2)), 100.0)
            .unwrap();
        for b in f.buckets() {
            assert!((b.total() - 25.0).abs() < 1e-9);
        }
        assert!((f.quantity() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_overlap_uses_overlap_duration() {
        let mut f = weekly_forecast();
        // 第 1 周 7 天 + 第 2 周前 3.5 天
        let range = DateRange::new(dt(1, 5), dt(1, 12) + chrono::Duration::hours(84));
        f.set_quantity_range(range, 21.0).unwrap();
        assert!((f.buckets()[0].total() - 14.0).abs() < 1e-9);
        assert!((f.buckets()[1].total() - 7.0).abs() < 1e-9);
        assert_eq!(f.buckets()[2].total(), 0.0);
    }

    #[test]
    fn test_aggregate_quantity_and_due_are_derived() {
        let mut f = weekly_forecast();
        assert!(matches!(
            f.set_quantity(10.0),
            Err(ForecastError::InvalidMutation { .. })
        ));
        assert!(matches!(
            f.set_due(dt(1, 6)),
            Err(ForecastError::InvalidMutation { .. })
        ));
    }

    #[test]
    fn test_quantity_without_calendar_rejected() {
        let mut f = Forecast::new("F0", Some("A"), None, DateRange::new(dt(1, 1), dt(2, 1)));
        let err = f
            .set_quantity_range(DateRange::new(dt(1, 1), dt(1, 8)), 5.0)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_policy_propagates_to_buckets() {
        let mut f = weekly_forecast();
        f.set_policy("PLANSHORT").unwrap();
        f.set_priority(3);
        f.set_operation(Some("SHIP-EU"));
        for b in f.buckets() {
            assert_eq!(b.policy().plan, PlanPolicy::PlanShort);
            assert_eq!(b.priority(), 3);
            assert_eq!(b.operation(), Some("SHIP-EU"));
        }
        f.add_policy("SINGLEDELIVERY").unwrap();
        assert_eq!(f.policy().plan, PlanPolicy::PlanShort);
        assert!(f.buckets()[0].policy().single_delivery());
        assert!(f.set_policy("BOGUS").is_err());
    }

    #[test]
    fn test_bucket_consume_and_restore_are_clamped() {
        let mut f = weekly_forecast();
        f.set_quantity_range(DateRange::instant(dt(1, 5)), 100.0)
            .unwrap();
        let bucket = &mut f.buckets_mut()[0];
        assert_eq!(bucket.consume(150.0), 100.0);
        assert_eq!(bucket.net(), 0.0);
        assert_eq!(bucket.restore(30.0), 30.0);
        assert_eq!(bucket.restore(500.0), 70.0);
        assert_eq!(bucket.net(), 100.0);
    }

    #[test]
    fn test_redistribution_keeps_consumption() {
        let mut f = weekly_forecast();
        f.set_quantity_range(DateRange::instant(dt(1, 5)), 100.0)
            .unwrap();
        f.buckets_mut()[0].consume(40.0);
        f.set_quantity_range(DateRange::instant(dt(1, 5)), 120.0)
            .unwrap();
        assert_eq!(f.buckets()[0].total(), 120.0);
        assert_eq!(f.buckets()[0].net(), 80.0);
    }
}
