// ==========================================
// 需求预测冲减模块 - 模块参数
// ==========================================
// 说明: 在开始并发使用前设置一次，冲减时只读
// ==========================================

use crate::domain::time::DateRange;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 预测模块参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// true: 先沿客户层级向上查找，再沿物料层级；false 反之
    pub customer_then_item_hierarchy: bool,

    /// 订单与预测是否必须使用相同的交付工序才算匹配
    pub match_using_delivery_operation: bool,

    /// 新建预测默认计划期
    pub horizon: DateRange,
}

impl ForecastConfig {
    /// 从当天零点起一年
    pub fn default_horizon() -> DateRange {
        let start: NaiveDateTime = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();
        DateRange::new(start, start + Duration::days(365))
    }

    pub fn with_horizon(mut self, horizon: DateRange) -> Self {
        self.horizon = horizon;
        self
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            customer_then_item_hierarchy: true,
            match_using_delivery_operation: true,
            horizon: Self::default_horizon(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ForecastConfig::default();
        assert!(cfg.customer_then_item_hierarchy);
        assert!(cfg.match_using_delivery_operation);
        assert_eq!(cfg.horizon.duration_secs(), 365 * 86_400);
    }
}
