// ==========================================
// 需求预测冲减模块 - 分桶日历
// ==========================================
// 职责: 定义时间分桶及每个分桶的权重
// 规则: 分桶为半开区间 [start, end)，按开始时间升序、互不重叠
//       分桶之间允许存在空档（空档内权重取 default_weight）
// ==========================================

use crate::domain::error::{ForecastError, ForecastResult};
use crate::domain::time::DateRange;
use chrono::{Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

// ==========================================
// CalendarBucket - 日历分桶
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarBucket {
    pub range: DateRange,
    pub weight: f64,
}

// ==========================================
// Trait: BucketCalendar
// ==========================================
// 用途: 预测分桶生成 + 数量分配的权重来源
pub trait BucketCalendar: Debug + Send + Sync {
    /// 日历名称
    fn name(&self) -> &str;

    /// 指定时间点的权重
    fn value_at(&self, at: NaiveDateTime) -> f64;

    /// 与区间相交的全部分桶（按时间升序，不裁剪）
    fn buckets_over(&self, range: &DateRange) -> Vec<CalendarBucket>;
}

/// 分桶粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketSize {
    Day,
    Week,
    Month,
}

impl BucketSize {
    fn advance(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            BucketSize::Day => from.checked_add_signed(Duration::days(1)),
            BucketSize::Week => from.checked_add_signed(Duration::weeks(1)),
            BucketSize::Month => from.checked_add_months(Months::new(1)),
        }
    }
}

// ==========================================
// WeightedCalendar - 带权重的分桶日历
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedCalendar {
    name: String,
    default_weight: f64,
    buckets: Vec<CalendarBucket>,
}

impl WeightedCalendar {
    /// 创建空日历
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_weight: 0.0,
            buckets: Vec::new(),
        }
    }

    /// 生成等粒度日历，[start, end) 内每个分桶权重相同
    ///
    /// 最后一个分桶可能越过 end（保持粒度完整）
    pub fn regular(
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        size: BucketSize,
        weight: f64,
    ) -> Self {
        let mut calendar = Self::new(name);
        let mut cursor = start;
        while cursor < end {
            let Some(next) = size.advance(cursor) else {
                break;
            };
            calendar.buckets.push(CalendarBucket {
                range: DateRange::new(cursor, next),
                weight,
            });
            cursor = next;
        }
        calendar
    }

    /// 设置空档默认权重
    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight;
        self
    }

    /// 追加分桶
    ///
    /// # 返回
    /// - Err: 区间为空或与已有分桶重叠
    pub fn with_bucket(
        mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        weight: f64,
    ) -> ForecastResult<Self> {
        self.add_bucket(start, end, weight)?;
        Ok(self)
    }

    /// 插入分桶（保持升序）
    pub fn add_bucket(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        weight: f64,
    ) -> ForecastResult<()> {
        let range = DateRange::new(start, end);
        if range.is_degenerate() {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(range),
                "日历分桶长度为 0",
            ));
        }
        if self.buckets.iter().any(|b| b.range.intersects(&range)) {
            return Err(ForecastError::validation(
                self.name.clone(),
                Some(range),
                "日历分桶与已有分桶重叠",
            ));
        }
        let pos = self
            .buckets
            .partition_point(|b| b.range.start < range.start);
        self.buckets.insert(pos, CalendarBucket { range, weight });
        Ok(())
    }

    /// 修改覆盖指定时间点的分桶权重
    pub fn set_weight_at(&mut self, at: NaiveDateTime, weight: f64) -> bool {
        match self.buckets.iter_mut().find(|b| b.range.contains(at)) {
            Some(bucket) => {
                bucket.weight = weight;
                true
            }
            None => false,
        }
    }

    pub fn buckets(&self) -> &[CalendarBucket] {
        &self.buckets
    }
}

impl BucketCalendar for WeightedCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_at(&self, at: NaiveDateTime) -> f64 {
        self.buckets
            .iter()
            .find(|b| b.range.contains(at))
            .map(|b| b.weight)
            .unwrap_or(self.default_weight)
    }

    fn buckets_over(&self, range: &DateRange) -> Vec<CalendarBucket> {
        self.buckets
            .iter()
            .filter(|b| b.range.intersects(range))
            .copied()
            .collect()
    }
}
