// ==========================================
// 需求预测冲减模块 - 时间区间
// ==========================================
// 约定: 半开区间 [start, end)
// 基本时间单位: 秒
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 日期区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    /// 创建区间（start > end 时自动交换）
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// 单点区间 (start == end)
    pub fn instant(at: NaiveDateTime) -> Self {
        Self { start: at, end: at }
    }

    /// 是否为退化区间
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// 区间长度（秒）
    #[inline]
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// 时间点是否落在区间内（含 start，不含 end）
    #[inline]
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start && at < self.end
    }

    /// 两区间是否相交（接触不算相交）
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 重叠时长（秒），不相交返回 0
    pub fn overlap_secs(&self, other: &Self) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            (end - start).num_seconds()
        } else {
            0
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}",
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}
