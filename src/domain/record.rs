// ==========================================
// 需求预测冲减模块 - 持久化记录
// ==========================================
// 职责: 与格式无关的读写结构（serde），供 SQLite / JSON 等外部读写层使用
// 说明: 分桶记录可携带显式 start/end，也可省略日期按日历分桶顺序继承
// ==========================================

use crate::domain::demand::Demand;
use crate::domain::forecast::Forecast;
use crate::domain::hierarchy::Hierarchies;
use crate::domain::types::{DemandPolicy, SolverMode};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 预测分桶记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRecord {
    #[serde(default)]
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDateTime>,
    /// 冲减后剩余数量（缺省视为未冲减）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<f64>,
}

/// 预测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub name: String,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub calendar: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub policy: DemandPolicy,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub buckets: Vec<BucketRecord>,
}

/// 冲减求解器记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverRecord {
    pub name: String,
    #[serde(default)]
    pub automatic: bool,
}

impl SolverRecord {
    pub fn mode(&self) -> SolverMode {
        if self.automatic {
            SolverMode::Automatic
        } else {
            SolverMode::Manual
        }
    }
}

/// 完整快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    #[serde(default)]
    pub forecasts: Vec<ForecastRecord>,
    #[serde(default)]
    pub solver: Option<SolverRecord>,
    /// 物料/客户层级（缺省时不覆盖现有层级）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchies: Option<Hierarchies>,
}

impl ForecastSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl Forecast {
    /// 导出为记录（只导出有数量或已冲减的分桶）
    pub fn to_record(&self) -> ForecastRecord {
        let buckets = self
            .buckets()
            .iter()
            .filter(|b| b.total() != 0.0 || b.net() != 0.0)
            .map(|b| BucketRecord {
                quantity: b.total(),
                start: Some(b.range().start),
                end: Some(b.range().end),
                net: (b.net() != b.total()).then(|| b.net()),
            })
            .collect();

        ForecastRecord {
            name: self.name().to_string(),
            item: self.item().map(str::to_string),
            customer: self.customer().map(str::to_string),
            calendar: self.calendar_name().map(str::to_string),
            priority: self.priority(),
            policy: self.policy(),
            operation: self.operation().map(str::to_string),
            buckets,
        }
    }
}
